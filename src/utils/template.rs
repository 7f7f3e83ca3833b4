//! Page and layout templates.
//!
//! The layout is parsed once per build and kept in a shared environment with
//! HTML auto-escaping. Page sources and plain-text includes are rendered as
//! one-off strings without auto-escaping, so their markup passes through.

use minijinja::{Environment, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Name the layout is registered under; the `.html` suffix enables auto-escaping.
pub const LAYOUT_NAME: &str = "layout.html";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read layout `{0}`")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("layout `{0}` is not a valid template")]
    Layout(PathBuf, #[source] minijinja::Error),

    #[error("template rendering failed")]
    Render(#[from] minijinja::Error),
}

pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Read and parse the layout template.
    pub fn load(layout: &Path) -> Result<Self, TemplateError> {
        let source =
            fs::read_to_string(layout).map_err(|err| TemplateError::Read(layout.to_path_buf(), err))?;
        Self::from_layout_source(source)
            .map_err(|err| TemplateError::Layout(layout.to_path_buf(), err))
    }

    /// Build from an in-memory layout.
    pub fn from_layout_source(source: String) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_filter("noescape", noescape);
        env.add_template_owned(LAYOUT_NAME, source)?;
        Ok(Self { env })
    }

    /// Render the layout against a page context.
    pub fn render_layout(&self, ctx: &Value) -> Result<String, TemplateError> {
        Ok(self.env.get_template(LAYOUT_NAME)?.render(ctx)?)
    }

    /// Render a one-off template source.
    pub fn render_str(&self, source: &str, ctx: &Value) -> Result<String, TemplateError> {
        Ok(self.env.render_str(source, ctx)?)
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates").finish_non_exhaustive()
    }
}

/// Mark a string as already-safe markup.
fn noescape(text: String) -> Value {
    Value::from_safe_string(text)
}
