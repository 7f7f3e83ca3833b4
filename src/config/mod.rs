//! Site configuration management for `.zas/config.toml`.
//!
//! # Sections
//!
//! | Section       | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | `[zas]`       | Layout template and deploy directory             |
//! | `[site]`      | Site metadata (base URL, language, image, ...)   |
//! | `[mimetypes]` | Embed MIME type → plugin name                    |
//! | any other     | User-defined sections, reachable via `extra()`   |
//!
//! # Example
//!
//! ```toml
//! [zas]
//! layout = ".zas/layout.html"
//! deploy = "public"
//!
//! [site]
//! baseurl = "https://example.com"
//! language = "en"
//! image = "/img/card.png"
//!
//! [mimetypes]
//! "text/x-graphviz" = "dot"
//!
//! [social]
//! twitter = "@example"
//! ```
//!
//! Missing keys are filled from the built-in defaults; keys present in the
//! file are never touched. `[mimetypes]` entries are added on top of the
//! built-in table rather than replacing it.

pub mod defaults;
mod dir;
mod error;

pub use dir::{DirConfigCache, Mapping};
pub use error::ConfigError;

use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// Repository metadata directory, relative to the site root.
pub const ZAS_DIR: &str = ".zas";
/// Site configuration file, relative to the site root.
pub const CONFIG_FILE: &str = ".zas/config.toml";
/// Translation table, relative to the site root.
pub const I18N_FILE: &str = ".zas/i18n.toml";
/// Per-directory override file name.
pub const DIR_CONFIG_FILE: &str = ".zas.toml";
/// Prefix of external subcommand executables (`zs<name>`).
pub const SUBCOMMAND_PREFIX: &str = "zs";
/// Prefix of embed plugin executables (`mzs<name>`).
pub const PLUGIN_PREFIX: &str = "mzs";

// ============================================================================
// Sections
// ============================================================================

/// `[zas]` section - where the layout lives and where output goes.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default)]
pub struct ZasConfig {
    /// Layout template applied to every rendered page.
    #[serde(default = "defaults::zas::layout")]
    #[educe(Default = defaults::zas::layout())]
    pub layout: PathBuf,

    /// Deployment tree root.
    #[serde(default = "defaults::zas::deploy")]
    #[educe(Default = defaults::zas::deploy())]
    pub deploy: PathBuf,
}

/// `[site]` section - values exposed to templates as `site.*`.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default)]
pub struct SiteSection {
    /// Base URL prepended to page routes.
    #[serde(default = "defaults::site::baseurl")]
    #[educe(Default = defaults::site::baseurl())]
    pub baseurl: String,

    /// Main language of the site (BCP 47 code).
    #[serde(default = "defaults::site::language")]
    #[educe(Default = defaults::site::language())]
    pub language: String,

    /// Default social/semantic image.
    pub image: String,

    /// Any other site-wide value, the last fallback of `resolve()`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing `.zas/config.toml`.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default)]
pub struct SiteConfig {
    /// Absolute site root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub zas: ZasConfig,

    #[serde(default)]
    pub site: SiteSection,

    /// Embed MIME type → plugin name.
    #[serde(default = "defaults::mimetypes::table")]
    #[educe(Default = defaults::mimetypes::table())]
    pub mimetypes: BTreeMap<String, String>,

    /// User-defined sections.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,

    /// Whole configuration as a JSON tree, built on first key-path lookup.
    #[serde(skip)]
    tree: OnceLock<serde_json::Value>,
}

impl SiteConfig {
    /// Parse configuration from a TOML string, filling in defaults.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: SiteConfig = toml::from_str(content)?;
        config.fill_defaults();
        Ok(config)
    }

    /// Load `.zas/config.toml` from the site root.
    ///
    /// All paths are normalized to absolute paths under `root`.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let root = normalize_path(root);
        let path = root.join(CONFIG_FILE);
        if !path.is_file() {
            return Err(ConfigError::NotARepository(path));
        }

        let content = fs::read_to_string(&path).map_err(|err| ConfigError::Io(path.clone(), err))?;
        let mut config = Self::parse(&content).map_err(|err| ConfigError::Toml(path, err))?;
        config.validate()?;
        config.update_path_with_root(&root);
        config.validate_deploy_dir()?;
        Ok(config)
    }

    /// Add built-in entries missing from user tables.
    fn fill_defaults(&mut self) {
        for (mime, plugin) in defaults::mimetypes::table() {
            self.mimetypes.entry(mime).or_insert(plugin);
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zas.layout.as_os_str().is_empty() {
            return Err(ConfigError::Validation("[zas.layout] must not be empty".into()));
        }
        if self.zas.deploy.as_os_str().is_empty() {
            return Err(ConfigError::Validation("[zas.deploy] must not be empty".into()));
        }
        if let Some((mime, _)) = self.mimetypes.iter().find(|(_, plugin)| plugin.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "[mimetypes] entry `{mime}` has an empty plugin name"
            )));
        }
        Ok(())
    }

    /// Reject a deploy directory containing the site, which `--full` would wipe.
    fn validate_deploy_dir(&self) -> Result<(), ConfigError> {
        if self.root.starts_with(&self.zas.deploy) {
            return Err(ConfigError::Validation(format!(
                "[zas.deploy] `{}` must not be the site root or one of its parents",
                self.zas.deploy.display()
            )));
        }
        Ok(())
    }

    /// Make root, layout and deploy paths absolute.
    fn update_path_with_root(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        self.zas.layout = normalize_path(&root.join(expand_tilde(&self.zas.layout)));
        self.zas.deploy = normalize_path(&root.join(expand_tilde(&self.zas.deploy)));
    }

    /// Get the site root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the deployment tree root
    pub fn deploy_dir(&self) -> &Path {
        &self.zas.deploy
    }

    /// Get the layout template path
    pub fn layout_path(&self) -> &Path {
        &self.zas.layout
    }

    /// Get the translation table path
    pub fn i18n_path(&self) -> PathBuf {
        self.root.join(I18N_FILE)
    }

    /// Plugin name registered for an embed MIME type.
    pub fn plugin_for(&self, mime: &str) -> Option<&str> {
        self.mimetypes.get(mime).map(String::as_str)
    }

    /// Look up any configuration value by `section/key` path.
    ///
    /// A leading `/` is ignored: `/site/baseurl` and `site/baseurl` are the same.
    pub fn lookup(&self, keypath: &str) -> Option<&serde_json::Value> {
        let tree = self
            .tree
            .get_or_init(|| serde_json::to_value(self).unwrap_or_default());
        keypath
            .split('/')
            .filter(|step| !step.is_empty() && *step != ".")
            .try_fold(tree, |node, step| node.get(step))
    }

    /// Look up a scalar configuration value rendered as a string.
    pub fn lookup_str(&self, keypath: &str) -> Option<String> {
        self.lookup(keypath).and_then(scalar_to_string)
    }
}

/// Render a scalar JSON value as a plain string.
///
/// Returns `None` for null, arrays and objects.
pub fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Expand a leading `~` in a path.
fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(root: &Path, content: &str) {
        fs::create_dir_all(root.join(ZAS_DIR)).unwrap();
        fs::write(root.join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = SiteConfig::default();
        assert_eq!(config.zas.layout, PathBuf::from(".zas/layout.html"));
        assert_eq!(config.zas.deploy, PathBuf::from(".zas/deploy"));
        assert_eq!(config.site.baseurl, "http://example.com");
        assert_eq!(config.site.language, "en");
        assert_eq!(config.plugin_for("text/markdown"), Some("markdown"));
        assert_eq!(config.plugin_for("text/plain"), Some("plain"));
        assert_eq!(config.plugin_for("text/html"), Some("html"));
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = SiteConfig::parse("").unwrap();
        assert_eq!(config.site.baseurl, "http://example.com");
        assert_eq!(config.mimetypes.len(), 3);
    }

    #[test]
    fn test_present_keys_untouched() {
        let config = SiteConfig::parse(
            r#"
            [site]
            baseurl = "https://darccio.example"
            "#,
        )
        .unwrap();

        assert_eq!(config.site.baseurl, "https://darccio.example");
        // Missing keys filled
        assert_eq!(config.site.language, "en");
        assert_eq!(config.zas.deploy, PathBuf::from(".zas/deploy"));
    }

    #[test]
    fn test_mimetypes_extend_builtin_table() {
        let config = SiteConfig::parse(
            r#"
            [mimetypes]
            "text/x-graphviz" = "dot"
            "text/plain" = "verbatim"
            "#,
        )
        .unwrap();

        assert_eq!(config.plugin_for("text/x-graphviz"), Some("dot"));
        assert_eq!(config.plugin_for("text/plain"), Some("verbatim"));
        assert_eq!(config.plugin_for("text/markdown"), Some("markdown"));
        assert_eq!(config.plugin_for("application/pdf"), None);
    }

    #[test]
    fn test_lookup_keypath() {
        let config = SiteConfig::parse(
            r#"
            [site]
            image = "/card.png"
            year = 2013

            [social]
            twitter = "@zas"

            [social.links]
            home = "https://example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.lookup_str("site/image").as_deref(), Some("/card.png"));
        assert_eq!(config.lookup_str("/site/year").as_deref(), Some("2013"));
        assert_eq!(config.lookup_str("social/twitter").as_deref(), Some("@zas"));
        assert_eq!(
            config.lookup_str("/social/links/home").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(config.lookup_str("social/missing"), None);
        assert_eq!(config.lookup_str("nowhere/key"), None);
        // Sections are not scalars
        assert!(config.lookup("social").is_some());
        assert_eq!(config.lookup_str("social"), None);
    }

    #[test]
    fn test_load_not_a_repository() {
        let tmp = TempDir::new().unwrap();
        let result = SiteConfig::load(tmp.path());
        assert!(matches!(result, Err(ConfigError::NotARepository(_))));
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "this is not valid toml [[[");
        let result = SiteConfig::load(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(..))));
    }

    #[test]
    fn test_load_rejects_empty_plugin_name() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "[mimetypes]\n\"text/x-empty\" = \"\"\n");
        let result = SiteConfig::load(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_rejects_deploy_over_site() {
        for deploy in [".", "..", "./"] {
            let tmp = TempDir::new().unwrap();
            write_config(tmp.path(), &format!("[zas]\ndeploy = \"{deploy}\"\n"));
            let result = SiteConfig::load(tmp.path());
            assert!(matches!(result, Err(ConfigError::Validation(_))), "deploy = {deploy}");
        }

        // A sibling with a shared name prefix is fine
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "[zas]\ndeploy = \"../site-out\"\n");
        assert!(SiteConfig::load(tmp.path()).is_ok());
    }

    #[test]
    fn test_load_makes_paths_absolute() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "[zas]\ndeploy = \"public\"\n");

        let config = SiteConfig::load(tmp.path()).unwrap();
        let root = tmp.path().canonicalize().unwrap();

        assert_eq!(config.root(), root.as_path());
        assert_eq!(config.deploy_dir(), root.join("public").as_path());
        assert_eq!(config.layout_path(), root.join(".zas/layout.html").as_path());
        assert_eq!(config.i18n_path(), root.join(".zas/i18n.toml"));
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let content = toml::to_string_pretty(&SiteConfig::default()).unwrap();
        let config = SiteConfig::parse(&content).unwrap();
        assert_eq!(config.site.baseurl, "http://example.com");
        assert_eq!(config.mimetypes, defaults::mimetypes::table());
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&serde_json::json!("x")).as_deref(), Some("x"));
        assert_eq!(scalar_to_string(&serde_json::json!(3)).as_deref(), Some("3"));
        assert_eq!(scalar_to_string(&serde_json::json!(true)).as_deref(), Some("true"));
        assert_eq!(scalar_to_string(&serde_json::json!(null)), None);
        assert_eq!(scalar_to_string(&serde_json::json!({"a": 1})), None);
    }
}
