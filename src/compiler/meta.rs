//! Page paths, front matter and the template context.
//!
//! # Lookup Precedence
//!
//! `resolve("id")` in templates (and `language`) searches, in order:
//!
//! | Source               | Origin                                  |
//! |----------------------|-----------------------------------------|
//! | page front matter    | first comment of the page, YAML mapping |
//! | directory config     | nearest `.zas.toml` up to the site root |
//! | `[site]` section     | `.zas/config.toml`                      |
//!
//! # Template Context
//!
//! | Name          | Example                          |
//! |---------------|----------------------------------|
//! | `path`        | `/docs/intro.html`               |
//! | `url`         | `https://example.com/docs/intro.html` |
//! | `title`       | front matter `title`, else first `<h1>` |
//! | `first_title` | first `<h1>` text                |
//! | `body`        | rendered page fragment (safe)    |
//! | `site`        | `baseurl`, `image`, `language`   |
//! | `page`        | front matter mapping             |
//! | `directory`   | directory config mapping         |
//! | `language`    | resolved page language           |
//! | `is_home`     | `/index.html` or `/<lang>/index.html` |
//! | `extra(path)` | any site config value, `section/key` |
//! | `resolve(id)` | precedence lookup above          |
//! | `e(text)`     | translation into `language`      |

use anyhow::{Result, anyhow};
use minijinja::{Value, context};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compiler::{Site, deploy_relative};
use crate::config::{Mapping, SiteConfig, scalar_to_string};
use crate::log;
use crate::utils::xml::Document;

// ============================================================================
// Paths
// ============================================================================

/// Path information for a page.
#[derive(Debug, Clone)]
pub struct PagePaths {
    /// Absolute source path
    pub source: PathBuf,
    /// Source path relative to the site root (for logging)
    pub relative: PathBuf,
    /// Absolute deployed path
    pub deploy: PathBuf,
    /// Route used in URLs, e.g. `/docs/intro.html`
    pub route: String,
}

impl PagePaths {
    pub fn new(source: &Path, config: &SiteConfig) -> Result<Self> {
        let relative = source
            .strip_prefix(config.root())
            .map_err(|_| anyhow!("File is not in the site root: {}", source.display()))?
            .to_path_buf();
        let deployed = deploy_relative(&relative);

        let route = deployed
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .fold(String::new(), |mut route, part| {
                route.push('/');
                route.push_str(&part);
                route
            });

        Ok(Self {
            source: source.to_path_buf(),
            deploy: config.deploy_dir().join(&deployed),
            relative,
            route,
        })
    }

    /// Directory holding the source file.
    pub fn directory(&self) -> &Path {
        self.source.parent().unwrap_or(&self.source)
    }
}

// ============================================================================
// Front Matter
// ============================================================================

/// Extract front matter from the first comment of a document.
///
/// A comment that parses as a YAML mapping is removed from the document.
/// Any other comment is left alone; a YAML syntax error is only a warning.
pub fn take_front_matter(doc: &mut Document, relative: &Path) -> Mapping {
    let Some(comment) = doc.first_comment() else {
        return Mapping::new();
    };

    match serde_yaml::from_str::<serde_json::Value>(comment) {
        Ok(serde_json::Value::Object(mapping)) => {
            doc.remove_first_comment();
            mapping
        }
        Ok(_) => Mapping::new(),
        Err(err) => {
            log!("warn"; "{}: front matter ignored: {}", relative.display(), err);
            Mapping::new()
        }
    }
}

/// Text of the first `<h1>`.
pub fn first_title(doc: &Document) -> String {
    doc.find_element("h1")
        .map(|h1| h1.text_content().trim().to_owned())
        .unwrap_or_default()
}

// ============================================================================
// Page Context
// ============================================================================

/// Per-page values visible to templates.
///
/// Built twice per page: once with only route and directory (source pass),
/// then complete for the layout pass.
#[derive(Debug, Default)]
pub struct PageContext {
    pub route: String,
    pub body: String,
    pub first_title: String,
    pub page: Mapping,
    pub directory: Option<Arc<Mapping>>,
}

impl PageContext {
    pub fn new(route: String, directory: Option<Arc<Mapping>>) -> Self {
        Self {
            route,
            directory,
            ..Self::default()
        }
    }

    /// Front matter `title`, else the first `<h1>`.
    pub fn title(&self) -> String {
        self.page
            .get("title")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| self.first_title.clone())
    }

    /// Look up `id` in front matter, then directory config, then `[site]`.
    pub fn resolve(&self, id: &str, config: &SiteConfig) -> Option<String> {
        self.page
            .get(id)
            .and_then(scalar_to_string)
            .or_else(|| {
                self.directory
                    .as_ref()
                    .and_then(|directory| directory.get(id))
                    .and_then(scalar_to_string)
            })
            .or_else(|| config.lookup_str(&format!("site/{id}")))
    }

    pub fn language(&self, config: &SiteConfig) -> String {
        self.resolve("language", config)
            .unwrap_or_else(|| config.site.language.clone())
    }

    pub fn is_home(&self, config: &SiteConfig) -> bool {
        self.route == "/index.html"
            || self.route == format!("/{}/index.html", self.language(config))
    }

    /// Build the template context for this page.
    pub fn to_value(self: &Arc<Self>, site: &Arc<Site>) -> Value {
        let config = &site.config;
        let language = self.language(config);
        let directory = self.directory.as_deref().cloned().unwrap_or_default();

        let extra = {
            let site = Arc::clone(site);
            move |keypath: String| site.config.lookup(&keypath).map(Value::from_serialize)
        };
        let resolve = {
            let site = Arc::clone(site);
            let page = Arc::clone(self);
            move |id: String| page.resolve(&id, &site.config)
        };
        let translate = {
            let site = Arc::clone(site);
            let language = language.clone();
            move |text: String| site.i18n.translate(&text, &language)
        };

        context! {
            path => self.route,
            url => format!("{}{}", config.site.baseurl, self.route),
            title => self.title(),
            first_title => self.first_title,
            body => Value::from_safe_string(self.body.clone()),
            site => context! {
                baseurl => config.site.baseurl,
                image => config.site.image,
                language => config.site.language,
            },
            page => Value::from_serialize(&self.page),
            directory => Value::from_serialize(&directory),
            language => language,
            is_home => self.is_home(config),
            extra => Value::from_function(extra),
            resolve => Value::from_function(resolve),
            e => Value::from_function(translate),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
