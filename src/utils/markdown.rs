//! Markdown to HTML conversion.

use pulldown_cmark::{Options, Parser, html::push_html};

/// Extensions enabled for every Markdown source.
const OPTIONS: Options = Options::ENABLE_TABLES
    .union(Options::ENABLE_FOOTNOTES)
    .union(Options::ENABLE_STRIKETHROUGH)
    .union(Options::ENABLE_TASKLISTS);

/// Convert Markdown to an HTML fragment (no `<html>`/`<body>` wrapper).
pub fn to_html(source: &str) -> String {
    let parser = Parser::new_ext(source, OPTIONS);
    let mut html = String::with_capacity(source.len() * 3 / 2);
    push_html(&mut html, parser);
    html
}
