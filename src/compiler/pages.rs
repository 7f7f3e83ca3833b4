use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::compiler::embed::EmbedResolver;
use crate::compiler::meta::{PageContext, PagePaths, first_title, take_front_matter};
use crate::compiler::{Site, SourceKind};
use crate::log;
use crate::utils::markdown;
use crate::utils::xml::Document;

// ============================================================================
// Public API
// ============================================================================

/// Render one Markdown or HTML source into the deploy tree.
///
/// # Stages
///
/// 1. Markdown is converted; HTML is taken as is
/// 2. The result is rendered as a template (route and directory config known)
/// 3. Parsed, embeds expanded, text-less `<p>` unwrapped
/// 4. Front matter, first `<h1>` and body fragment extracted
/// 5. Layout rendered, parsed, embeds expanded again
/// 6. Written to the deploy path
pub fn render_page(site: &Arc<Site>, source: &Path) -> Result<PagePaths> {
    let paths = PagePaths::new(source, &site.config)?;
    let relative = paths.relative.display();

    let raw = fs::read_to_string(source).with_context(|| format!("Failed to read {relative}"))?;
    let markup = match SourceKind::of(source) {
        SourceKind::Markdown => markdown::to_html(&raw),
        _ => raw,
    };

    let directory = site.dir_configs.resolve(paths.directory()).unwrap_or_else(|err| {
        log!("warn"; "{relative}: directory config ignored: {err:#}");
        None
    });

    // Source pass
    let scope = Arc::new(PageContext::new(paths.route.clone(), directory.clone()));
    let ctx = scope.to_value(site);
    let rendered = site
        .templates
        .render_str(&markup, &ctx)
        .with_context(|| format!("Template error in {relative}"))?;
    let mut doc = Document::parse(&rendered).with_context(|| format!("Failed to parse {relative}"))?;
    EmbedResolver::new(site, &ctx)
        .resolve(&mut doc, source)
        .with_context(|| format!("Failed to expand embeds in {relative}"))?;
    doc.unwrap_textless_paragraphs();

    let page = Arc::new(PageContext {
        route: paths.route.clone(),
        page: take_front_matter(&mut doc, &paths.relative),
        first_title: first_title(&doc),
        body: doc.body_html(),
        directory,
    });

    // Layout pass
    let ctx = page.to_value(site);
    let output = site
        .templates
        .render_layout(&ctx)
        .with_context(|| format!("Layout error in {relative}"))?;
    let mut doc = Document::parse(&output)
        .with_context(|| format!("Failed to parse layout output for {relative}"))?;
    EmbedResolver::new(site, &ctx)
        .resolve(&mut doc, source)
        .with_context(|| format!("Failed to expand layout embeds for {relative}"))?;

    write_page(&paths, &doc.to_html())?;
    Ok(paths)
}

// ============================================================================
// Internal
// ============================================================================

/// Write a page's HTML to disk.
fn write_page(paths: &PagePaths, html: &str) -> Result<()> {
    if let Some(parent) = paths.deploy.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&paths.deploy, html)
        .with_context(|| format!("Failed to write {}", paths.deploy.display()))?;
    Ok(())
}
