//! Rendering engine for a single build.
//!
//! - **pages**: Markdown/HTML source → deployed page
//! - **embed**: `<embed>` expansion, built-in handlers and plugins
//! - **meta**: Paths, front matter and the template context of a page
//! - **assets**: Byte copy of everything else
//!
//! # Render Flow
//!
//! ```text
//! render_file()
//!     │
//!     ├── .md / .html ──► render_page() ──► source template ──► embeds
//!     │                         │
//!     │                         └──► front matter, title, body ──► layout ──► embeds ──► write
//!     │
//!     └── other ──────► copy_asset()
//! ```

pub mod assets;
pub mod embed;
pub mod meta;
pub mod pages;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

use crate::config::{DirConfigCache, SiteConfig};
use crate::i18n::I18n;
use crate::utils::template::Templates;

pub use assets::copy_asset;
pub use pages::render_page;

// ============================================================================
// Site State
// ============================================================================

/// Everything a render task reads, loaded once per build.
#[derive(Debug)]
pub struct Site {
    pub config: SiteConfig,
    pub templates: Templates,
    pub i18n: I18n,
    pub dir_configs: DirConfigCache,
}

impl Site {
    pub fn new(config: SiteConfig, templates: Templates, i18n: I18n) -> Self {
        let dir_configs = DirConfigCache::new(config.root());
        Self {
            config,
            templates,
            i18n,
            dir_configs,
        }
    }

    pub fn root(&self) -> &Path {
        self.config.root()
    }

    pub fn deploy_dir(&self) -> &Path {
        self.config.deploy_dir()
    }
}

// ============================================================================
// Source Kinds and Deploy Paths
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Markdown,
    Html,
    Asset,
}

impl SourceKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("md") => Self::Markdown,
            Some("html") => Self::Html,
            _ => Self::Asset,
        }
    }
}

/// Deployed counterpart of a source path: `.md` becomes `.html`.
pub fn deploy_relative(relative: &Path) -> PathBuf {
    match SourceKind::of(relative) {
        SourceKind::Markdown => relative.with_extension("html"),
        _ => relative.to_path_buf(),
    }
}

/// Check whether a source file must be (re)generated.
///
/// Stale when in full mode, when the deployed file is missing, or when the
/// source is at least as new as the deployed file.
pub fn is_stale(relative: &Path, src_mtime: SystemTime, deploy_root: &Path, full: bool) -> bool {
    if full {
        return true;
    }
    let deployed = deploy_root.join(deploy_relative(relative));
    let Ok(dst_mtime) = deployed.metadata().and_then(|meta| meta.modified()) else {
        return true;
    };
    src_mtime >= dst_mtime
}

// ============================================================================
// Tree Walk
// ============================================================================

#[inline]
fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Walk the source tree below `root`.
///
/// Skips every path with a component starting with `.`, and the deploy
/// directory when it lives inside the tree. Parents come before children.
pub fn source_entries<'a>(root: &Path, deploy_dir: &'a Path) -> impl Iterator<Item = DirEntry> + 'a {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| !is_hidden(entry) && entry.path() != deploy_dir)
        .filter_map(|entry| entry.ok())
}

/// Render or copy one stale source file into the deploy tree.
pub fn render_file(site: &Arc<Site>, source: &Path) -> Result<()> {
    match SourceKind::of(source) {
        SourceKind::Markdown | SourceKind::Html => render_page(site, source).map(|_| ()),
        SourceKind::Asset => copy_asset(site, source),
    }
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{CONFIG_FILE, ZAS_DIR};
    use std::fs;

    pub const LAYOUT: &str = "<html><head><title>{{ title }}</title></head><body>{{ body }}</body></html>";

    /// Create a repository at `root` and load it as a site.
    pub fn site_with(root: &Path, config: &str, layout: &str) -> Arc<Site> {
        fs::create_dir_all(root.join(ZAS_DIR)).unwrap();
        fs::write(root.join(CONFIG_FILE), config).unwrap();
        fs::write(root.join(".zas/layout.html"), layout).unwrap();

        let config = SiteConfig::load(root).unwrap();
        let templates = Templates::load(config.layout_path()).unwrap();
        let i18n = I18n::empty(&config.site.language);
        Arc::new(Site::new(config, templates, i18n))
    }

    pub fn site(root: &Path) -> Arc<Site> {
        site_with(root, "", LAYOUT)
    }
}
