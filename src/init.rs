//! Repository initialization.
//!
//! Creates `.zas/` and writes the default configuration. Running it again
//! on an existing repository resets `.zas/config.toml` to the defaults.

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::config::{CONFIG_FILE, SiteConfig, ZAS_DIR, normalize_path};
use crate::log;

/// Initialize (or reinitialize) a repository at `root`.
pub fn init_repository(root: &Path) -> Result<()> {
    let root = normalize_path(root);
    let zas_dir = root.join(ZAS_DIR);

    if zas_dir.is_dir() {
        log!("init"; "Reinitialized existing Zas repository in {}", zas_dir.display());
    } else {
        fs::create_dir_all(&zas_dir)
            .with_context(|| format!("Failed to create {}", zas_dir.display()))?;
        log!("init"; "Initialized empty Zas repository in {}", zas_dir.display());
    }

    init_default_config(&root)
}

/// Write default configuration file
fn init_default_config(root: &Path) -> Result<()> {
    let path = root.join(CONFIG_FILE);
    let content = toml::to_string_pretty(&SiteConfig::default())?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
