//! Build orchestration.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── startup (concurrent) ──► layout, i18n, deploy directory
//!     │
//!     ├── count pass ──► expected number of render tasks
//!     │
//!     ├── dispatch pass
//!     │       ├── directory ──► create deploy counterpart
//!     │       └── stale file ──► spawn render thread
//!     │
//!     ├── join ──► first error ends the wait
//!     │
//!     └── reap() (incremental builds only)
//! ```
//!
//! Every render thread sends its error (if any) before its completion
//! signal, so the join never consumes the last completion and misses the
//! error that came with it.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::SystemTime;

use crate::compiler::{Site, is_stale, render_file, source_entries};
use crate::config::SiteConfig;
use crate::i18n::I18n;
use crate::log;
use crate::reaper::reap;
use crate::utils::template::Templates;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Regenerate everything and skip reaping.
    pub full: bool,
    /// Log every rendered and reaped file.
    pub verbose: bool,
}

#[derive(Debug, Default)]
pub struct BuildStats {
    /// Number of render tasks dispatched.
    pub rendered: usize,
    /// Deployed files removed because their source is gone.
    pub reaped: Vec<PathBuf>,
}

/// Bring the deploy tree up to date with the source tree.
pub fn build_site(config: SiteConfig, options: BuildOptions) -> Result<BuildStats> {
    let ((templates, i18n), deploy) = rayon::join(
        || {
            rayon::join(
                || Templates::load(config.layout_path()),
                || I18n::load(&config.i18n_path(), &config.site.language),
            )
        },
        || prepare_deploy_dir(config.deploy_dir(), options.full),
    );
    let templates = templates.context("Failed to load layout")?;
    let i18n = i18n.context("Failed to load translations")?;
    deploy?;

    let site = Arc::new(Site::new(config, templates, i18n));
    let expected = count_stale(&site, options.full);

    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (err_tx, err_rx) = mpsc::channel::<anyhow::Error>();
    let mut rendered = 0;

    for entry in source_entries(site.root(), site.deploy_dir()) {
        let Ok(relative) = entry.path().strip_prefix(site.root()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            let target = site.deploy_dir().join(relative);
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }
        if !is_stale(relative, modified(entry.path()), site.deploy_dir(), options.full) {
            continue;
        }

        if options.verbose {
            log!("+"; "{}", relative.display());
        }

        let site = Arc::clone(&site);
        let source = entry.path().to_path_buf();
        let done = done_tx.clone();
        let errors = err_tx.clone();
        thread::Builder::new()
            .name(format!("render {}", relative.display()))
            .spawn(move || {
                if let Err(err) = render_file(&site, &source) {
                    let _ = errors.send(err);
                }
                let _ = done.send(());
            })
            .context("Failed to spawn render thread")?;
        rendered += 1;
    }

    // Only tasks hold senders now; a closed channel means all have finished.
    drop(done_tx);
    drop(err_tx);

    if let Some(err) = join(expected, &done_rx, &err_rx) {
        return Err(err);
    }

    let reaped = if options.full {
        Vec::new()
    } else {
        let reaped = reap(site.root(), site.deploy_dir())?;
        if options.verbose {
            for path in &reaped {
                log!("-"; "{}", path.display());
            }
        }
        reaped
    };

    Ok(BuildStats { rendered, reaped })
}

// ============================================================================
// Internal
// ============================================================================

/// Create the deploy directory, clearing it first in full mode.
fn prepare_deploy_dir(deploy: &Path, full: bool) -> Result<()> {
    if full && deploy.exists() {
        fs::remove_dir_all(deploy)
            .with_context(|| format!("Failed to clear {}", deploy.display()))?;
    }
    fs::create_dir_all(deploy).with_context(|| format!("Failed to create {}", deploy.display()))
}

/// Modification time, or the epoch when it cannot be read.
fn modified(path: &Path) -> SystemTime {
    path.metadata()
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Count the files the dispatch pass is expected to render.
fn count_stale(site: &Site, full: bool) -> usize {
    source_entries(site.root(), site.deploy_dir())
        .filter(|entry| !entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(site.root())
                .is_ok_and(|relative| is_stale(relative, modified(entry.path()), site.deploy_dir(), full))
        })
        .count()
}

/// Wait for `expected` completions, returning the first error observed.
fn join(
    expected: usize,
    done: &mpsc::Receiver<()>,
    errors: &mpsc::Receiver<anyhow::Error>,
) -> Option<anyhow::Error> {
    let mut completed = 0;
    while completed < expected {
        if let Ok(err) = errors.try_recv() {
            return Some(err);
        }
        match done.recv() {
            Ok(()) => completed += 1,
            Err(_) => break,
        }
    }
    errors.try_recv().ok()
}
