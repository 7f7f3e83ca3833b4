//! `<embed>` expansion.
//!
//! Every `<embed type="MIME" src="path" />` whose MIME type is listed in
//! `[mimetypes]` is replaced in place by the content it points to. Types that
//! are not listed are ordinary HTML embeds and stay untouched.
//!
//! | Plugin name | Replacement                                          |
//! |-------------|------------------------------------------------------|
//! | `markdown`  | converted file, templated, parsed, embeds expanded   |
//! | `html`      | templated file, parsed, embeds expanded              |
//! | `plain`     | templated file as escaped text                       |
//! | other `x`   | stdout of `mzsx <src>`, parsed, embeds expanded      |
//!
//! Expansion is recursive. The chain of files being expanded is tracked so
//! that a file including itself (directly or not) is an error instead of an
//! endless loop.

use minijinja::Value;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;

use crate::compiler::Site;
use crate::config::PLUGIN_PREFIX;
use crate::exec;
use crate::utils::exec::find_program;
use crate::utils::markdown;
use crate::utils::template::TemplateError;
use crate::utils::xml::{Document, DomError, Element, Node};

/// Maximum number of nested embeds below a page.
pub const MAX_EMBED_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("<embed> without `{attr}` attribute")]
    MissingAttribute { attr: &'static str },

    #[error("failed to read embedded `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error in embedded `{}`", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },

    #[error("failed to parse embedded `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: DomError,
    },

    #[error("plugin `{plugin}` failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("plugin `{plugin}` produced malformed markup")]
    MalformedPluginOutput {
        plugin: String,
        #[source]
        source: DomError,
    },

    #[error("plugin `{plugin}` wrote output that is not UTF-8")]
    NonUtf8PluginOutput {
        plugin: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("embed cycle: `{}` includes itself", path.display())]
    Cycle { path: PathBuf },

    #[error("embeds nested deeper than {depth} levels at `{}`", path.display())]
    TooDeep { depth: usize, path: PathBuf },
}

/// How an embed type is expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedHandler {
    Markdown,
    Plain,
    Html,
    /// External `mzs<name>` executable.
    Plugin(String),
}

impl EmbedHandler {
    pub fn from_plugin_name(name: &str) -> Self {
        match name {
            "markdown" => Self::Markdown,
            "plain" => Self::Plain,
            "html" => Self::Html,
            other => Self::Plugin(other.to_owned()),
        }
    }
}

/// Plugin executable name for a plugin: `mzs<name>`.
#[inline]
pub fn plugin_program(name: &str) -> String {
    format!("{PLUGIN_PREFIX}{name}")
}

/// Expands embeds of one document against one template context.
pub struct EmbedResolver<'a> {
    site: &'a Site,
    ctx: &'a Value,
}

impl<'a> EmbedResolver<'a> {
    pub fn new(site: &'a Site, ctx: &'a Value) -> Self {
        Self { site, ctx }
    }

    /// Expand every embed in `doc`, which was produced from `origin`.
    pub fn resolve(&self, doc: &mut Document, origin: &Path) -> Result<(), EmbedError> {
        let mut chain = vec![origin.to_path_buf()];
        self.resolve_nodes(&mut doc.children, &mut chain)
    }

    fn resolve_nodes(&self, nodes: &mut Vec<Node>, chain: &mut Vec<PathBuf>) -> Result<(), EmbedError> {
        let mut i = 0;
        while i < nodes.len() {
            let replacement = match &mut nodes[i] {
                Node::Element(element) if element.is("embed") => self.expand(element, chain)?,
                Node::Element(element) => {
                    self.resolve_nodes(&mut element.children, chain)?;
                    None
                }
                _ => None,
            };

            match replacement {
                // Replacement nodes are already expanded
                Some(content) => {
                    let len = content.len();
                    nodes.splice(i..=i, content);
                    i += len;
                }
                None => i += 1,
            }
        }
        Ok(())
    }

    /// Content replacing one embed, or `None` to keep it.
    fn expand(&self, element: &Element, chain: &mut Vec<PathBuf>) -> Result<Option<Vec<Node>>, EmbedError> {
        let mime = element
            .attr("type")
            .ok_or(EmbedError::MissingAttribute { attr: "type" })?;
        let Some(plugin) = self.site.config.plugin_for(&mime) else {
            return Ok(None);
        };
        let src = element
            .attr("src")
            .ok_or(EmbedError::MissingAttribute { attr: "src" })?;
        let path = source_path(self.site.root(), &src);

        if chain.contains(&path) {
            return Err(EmbedError::Cycle { path });
        }
        if chain.len() > MAX_EMBED_DEPTH {
            return Err(EmbedError::TooDeep {
                depth: MAX_EMBED_DEPTH,
                path,
            });
        }

        chain.push(path.clone());
        let content = match EmbedHandler::from_plugin_name(plugin) {
            EmbedHandler::Markdown => {
                let source = markdown::to_html(&self.read(&path)?);
                self.expand_markup(&source, &path, chain)
            }
            EmbedHandler::Html => {
                let source = self.read(&path)?;
                self.expand_markup(&source, &path, chain)
            }
            EmbedHandler::Plain => {
                let source = self.read(&path)?;
                self.render(&source, &path).map(|text| vec![Node::text(&text)])
            }
            EmbedHandler::Plugin(name) => self.run_plugin(&name, &src, chain),
        };
        chain.pop();

        content.map(Some)
    }

    fn read(&self, path: &Path) -> Result<String, EmbedError> {
        fs::read_to_string(path).map_err(|source| EmbedError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    fn render(&self, source: &str, path: &Path) -> Result<String, EmbedError> {
        self.site
            .templates
            .render_str(source, self.ctx)
            .map_err(|source| EmbedError::Template {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Template, parse and expand a markup file; keep its body fragment.
    fn expand_markup(&self, source: &str, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Vec<Node>, EmbedError> {
        let rendered = self.render(source, path)?;
        let mut doc = Document::parse(&rendered).map_err(|source| EmbedError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.resolve_nodes(&mut doc.children, chain)?;
        Ok(doc.into_body())
    }

    fn run_plugin(&self, name: &str, src: &str, chain: &mut Vec<PathBuf>) -> Result<Vec<Node>, EmbedError> {
        let program = plugin_program(name);
        let plugin_error = |err: anyhow::Error| EmbedError::Plugin {
            plugin: program.clone(),
            message: format!("{err:#}"),
        };

        find_program(&program).map_err(plugin_error)?;
        let output = exec!(self.site.root(); [program.as_str()]; src)
            .map_err(plugin_error)?;

        let stdout = String::from_utf8(output.stdout).map_err(|source| EmbedError::NonUtf8PluginOutput {
            plugin: program.clone(),
            source,
        })?;
        let mut doc = Document::parse(&stdout).map_err(|source| EmbedError::MalformedPluginOutput {
            plugin: program.clone(),
            source,
        })?;
        self.resolve_nodes(&mut doc.children, chain)?;
        Ok(doc.into_body())
    }
}

/// Resolve an embed `src` against the site root.
///
/// A leading `/` still means the site root; `.` and `..` are folded so the
/// same file always yields the same path.
fn source_path(root: &Path, src: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in Path::new(src.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::ParentDir => {
                if path != root {
                    path.pop();
                }
            }
            _ => {}
        }
    }
    path
}
