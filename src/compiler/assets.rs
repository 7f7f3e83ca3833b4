use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::compiler::Site;

/// Copy a non-page source file byte for byte into the deploy tree.
pub fn copy_asset(site: &Arc<Site>, source: &Path) -> Result<()> {
    let relative = source
        .strip_prefix(site.root())
        .map_err(|_| anyhow!("File is not in the site root: {}", source.display()))?;
    let output_path = site.deploy_dir().join(relative);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::copy(source, &output_path)
        .with_context(|| format!("Failed to copy {}", relative.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::testing;
    use tempfile::TempDir;

    #[test]
    fn test_copy_asset_preserves_bytes() {
        let tmp = TempDir::new().unwrap();
        let site = testing::site(tmp.path());
        let root = site.root();
        fs::create_dir_all(root.join("img")).unwrap();
        let bytes = [0u8, 159, 146, 150, b'{', b'{'];
        fs::write(root.join("img/logo.png"), bytes).unwrap();

        copy_asset(&site, &root.join("img/logo.png")).unwrap();
        assert_eq!(fs::read(site.deploy_dir().join("img/logo.png")).unwrap(), bytes);
    }

    #[test]
    fn test_copy_asset_overwrites() {
        let tmp = TempDir::new().unwrap();
        let site = testing::site(tmp.path());
        let source = site.root().join("style.css");
        fs::write(&source, "a {}").unwrap();
        copy_asset(&site, &source).unwrap();

        fs::write(&source, "b {}").unwrap();
        copy_asset(&site, &source).unwrap();
        assert_eq!(fs::read_to_string(site.deploy_dir().join("style.css")).unwrap(), "b {}");
    }

    #[test]
    fn test_copy_missing_asset_is_error() {
        let tmp = TempDir::new().unwrap();
        let site = testing::site(tmp.path());
        assert!(copy_asset(&site, &site.root().join("gone.txt")).is_err());
    }
}
