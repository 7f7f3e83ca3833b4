//! Deploy tree reconciliation.
//!
//! Removes deployed files whose source is gone. A deployed `.html` file
//! survives while either `x.html` or `x.md` exists in the source tree.
//! Directories are never pruned, even when left empty.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Delete orphaned files below `deploy_dir`, returning their source-relative paths.
pub fn reap(root: &Path, deploy_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut reaped = Vec::new();

    for entry in WalkDir::new(deploy_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", deploy_dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(deploy_dir) else {
            continue;
        };
        if has_source(&root.join(relative)) {
            continue;
        }

        fs::remove_file(entry.path())
            .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
        reaped.push(relative.to_path_buf());
    }

    Ok(reaped)
}

/// Whether a deployed file still has a source at `source`.
fn has_source(source: &Path) -> bool {
    if source.exists() {
        return true;
    }
    let is_html = source.extension().is_some_and(|ext| ext == "html");
    is_html && source.with_extension("md").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let deploy = root.join(".zas/deploy");
        fs::create_dir_all(deploy.join("docs")).unwrap();
        (tmp, root, deploy)
    }

    #[test]
    fn test_reap_orphaned_markdown_output() {
        let (_tmp, root, deploy) = setup();
        fs::write(deploy.join("a.html"), "x").unwrap();

        let reaped = reap(&root, &deploy).unwrap();
        assert_eq!(reaped, vec![PathBuf::from("a.html")]);
        assert!(!deploy.join("a.html").exists());
    }

    #[test]
    fn test_keep_outputs_with_sources() {
        let (_tmp, root, deploy) = setup();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("a.md"), "x").unwrap();
        fs::write(root.join("docs/b.html"), "x").unwrap();
        fs::write(root.join("style.css"), "x").unwrap();
        for file in ["a.html", "docs/b.html", "style.css"] {
            fs::write(deploy.join(file), "x").unwrap();
        }

        assert!(reap(&root, &deploy).unwrap().is_empty());
        assert!(deploy.join("a.html").exists());
        assert!(deploy.join("docs/b.html").exists());
        assert!(deploy.join("style.css").exists());
    }

    #[test]
    fn test_reap_orphaned_asset_keeps_directories() {
        let (_tmp, root, deploy) = setup();
        fs::write(deploy.join("docs/logo.png"), "x").unwrap();

        let reaped = reap(&root, &deploy).unwrap();
        assert_eq!(reaped, vec![PathBuf::from("docs/logo.png")]);
        // Empty directories stay
        assert!(deploy.join("docs").is_dir());
    }

    #[test]
    fn test_md_sibling_only_protects_html() {
        let (_tmp, root, deploy) = setup();
        fs::write(root.join("notes.md"), "x").unwrap();
        fs::write(deploy.join("notes.txt"), "x").unwrap();

        assert_eq!(reap(&root, &deploy).unwrap(), vec![PathBuf::from("notes.txt")]);
    }
}
