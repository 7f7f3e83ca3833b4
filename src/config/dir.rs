//! Per-directory configuration overrides (`.zas.toml`).
//!
//! A directory's effective override is the nearest `.zas.toml` found by
//! walking from the directory up to (and including) the site root. Results
//! are memoized for the whole build: every directory visited on the way up
//! caches the same answer, including "nothing found".

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use super::{ConfigError, DIR_CONFIG_FILE};

/// Neutral key → value mapping shared by front matter and directory overrides.
pub type Mapping = serde_json::Map<String, serde_json::Value>;

/// Concurrent cache of directory → nearest override mapping.
///
/// Shared by every render task; lookups take the read lock, misses take the
/// write lock once per walked directory chain.
#[derive(Debug)]
pub struct DirConfigCache {
    root: PathBuf,
    entries: RwLock<FxHashMap<PathBuf, Option<Arc<Mapping>>>>,
}

impl DirConfigCache {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Nearest override for `dir` (absolute, or relative to the site root).
    ///
    /// Directories outside the site root never see an override.
    pub fn resolve(&self, dir: &Path) -> Result<Option<Arc<Mapping>>, ConfigError> {
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        };

        if let Some(hit) = self.entries.read().get(&dir) {
            return Ok(hit.clone());
        }

        // Walk upward, remembering every miss so they share the answer.
        let mut visited = Vec::new();
        let mut found = None;
        let mut current = Some(dir.as_path());

        while let Some(path) = current {
            if !path.starts_with(&self.root) {
                break;
            }
            if let Some(hit) = self.entries.read().get(path) {
                found = hit.clone();
                break;
            }
            visited.push(path.to_path_buf());

            let candidate = path.join(DIR_CONFIG_FILE);
            if candidate.is_file() {
                found = Some(Arc::new(read_mapping(&candidate)?));
                break;
            }
            if path == self.root {
                break;
            }
            current = path.parent();
        }

        let mut entries = self.entries.write();
        // Another thread may have finished the same walk first; keep its entry.
        if let Some(existing) = visited.last().and_then(|top| entries.get(top)) {
            found = existing.clone();
        }
        for path in visited {
            entries.entry(path).or_insert_with(|| found.clone());
        }
        Ok(found)
    }

    /// Number of cached directories.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Parse a `.zas.toml` file into a neutral mapping.
fn read_mapping(path: &Path) -> Result<Mapping, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
    let table: toml::Table =
        toml::from_str(&content).map_err(|err| ConfigError::Toml(path.to_path_buf(), err))?;
    match serde_json::to_value(table) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(ConfigError::Validation(format!(
            "`{}` must contain a table of values",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        (tmp, root)
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        let (_tmp, root) = site();
        fs::create_dir_all(root.join("docs/sub/deeper")).unwrap();
        fs::create_dir_all(root.join("other")).unwrap();
        fs::write(root.join("docs/.zas.toml"), "author = \"docs team\"\n").unwrap();

        let cache = DirConfigCache::new(&root);

        let sub = cache.resolve(&root.join("docs/sub")).unwrap().unwrap();
        assert_eq!(sub["author"], "docs team");

        let deeper = cache.resolve(&root.join("docs/sub/deeper")).unwrap().unwrap();
        assert_eq!(deeper["author"], "docs team");

        assert!(cache.resolve(&root.join("other")).unwrap().is_none());
    }

    #[test]
    fn test_closer_override_shadows_parent() {
        let (_tmp, root) = site();
        fs::create_dir_all(root.join("docs/api")).unwrap();
        fs::write(root.join("docs/.zas.toml"), "author = \"docs\"\n").unwrap();
        fs::write(root.join("docs/api/.zas.toml"), "author = \"api\"\n").unwrap();

        let cache = DirConfigCache::new(&root);
        let api = cache.resolve(Path::new("docs/api")).unwrap().unwrap();
        assert_eq!(api["author"], "api");
        let docs = cache.resolve(Path::new("docs")).unwrap().unwrap();
        assert_eq!(docs["author"], "docs");
    }

    #[test]
    fn test_root_override_applies_everywhere() {
        let (_tmp, root) = site();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join(".zas.toml"), "[nav]\nshow = true\n").unwrap();

        let cache = DirConfigCache::new(&root);
        let mapping = cache.resolve(&root.join("a/b")).unwrap().unwrap();
        assert_eq!(mapping["nav"]["show"], true);
    }

    #[test]
    fn test_walk_caches_every_visited_directory() {
        let (_tmp, root) = site();
        fs::create_dir_all(root.join("docs/sub/deeper")).unwrap();
        fs::write(root.join("docs/.zas.toml"), "x = 1\n").unwrap();

        let cache = DirConfigCache::new(&root);
        cache.resolve(&root.join("docs/sub/deeper")).unwrap();
        // deeper, sub, docs
        assert_eq!(cache.len(), 3);

        // Answer is served from cache even after the file disappears
        fs::remove_file(root.join("docs/.zas.toml")).unwrap();
        let sub = cache.resolve(&root.join("docs/sub")).unwrap().unwrap();
        assert_eq!(sub["x"], 1);
    }

    #[test]
    fn test_absence_is_cached() {
        let (_tmp, root) = site();
        fs::create_dir_all(root.join("plain")).unwrap();

        let cache = DirConfigCache::new(&root);
        assert!(cache.resolve(&root.join("plain")).unwrap().is_none());
        // plain, root
        assert_eq!(cache.len(), 2);

        fs::write(root.join("plain/.zas.toml"), "x = 1\n").unwrap();
        assert!(cache.resolve(&root.join("plain")).unwrap().is_none());
    }

    #[test]
    fn test_malformed_override_is_reported() {
        let (_tmp, root) = site();
        fs::create_dir_all(root.join("bad")).unwrap();
        fs::write(root.join("bad/.zas.toml"), "not = [valid").unwrap();

        // The page pipeline downgrades this to a warning
        let cache = DirConfigCache::new(&root);
        let result = cache.resolve(&root.join("bad"));
        assert!(matches!(result, Err(ConfigError::Toml(..))));
    }

    #[test]
    fn test_concurrent_first_resolution() {
        let (_tmp, root) = site();
        fs::create_dir_all(root.join("docs/a/b/c")).unwrap();
        fs::create_dir_all(root.join("docs/x/y")).unwrap();
        fs::create_dir_all(root.join("other")).unwrap();
        fs::write(root.join("docs/.zas.toml"), "author = \"docs\"\n").unwrap();
        fs::write(root.join("docs/x/.zas.toml"), "author = \"x\"\n").unwrap();

        let cache = DirConfigCache::new(&root);
        let dirs = ["docs/a/b/c", "docs/a", "docs/x/y", "other", "docs/a/b", "docs/x"];

        let results: Vec<Vec<Option<String>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        dirs.iter()
                            .map(|dir| {
                                cache
                                    .resolve(&root.join(dir))
                                    .unwrap()
                                    .map(|mapping| mapping["author"].as_str().unwrap().to_owned())
                            })
                            .collect()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let expected: Vec<Option<String>> = ["docs", "docs", "x"]
            .into_iter()
            .map(|author| Some(author.to_owned()))
            .chain([None, Some("docs".to_owned()), Some("x".to_owned())])
            .collect();
        for result in results {
            assert_eq!(result, expected);
        }

        // Every thread ends up reading the same shared entry
        let first = cache.resolve(&root.join("docs/a/b/c")).unwrap().unwrap();
        let second = cache.resolve(&root.join("docs/a")).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
