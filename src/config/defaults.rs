//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// [zas] Section Defaults
// ============================================================================

pub mod zas {
    use std::path::PathBuf;

    pub fn layout() -> PathBuf {
        ".zas/layout.html".into()
    }

    pub fn deploy() -> PathBuf {
        ".zas/deploy".into()
    }
}

// ============================================================================
// [site] Section Defaults
// ============================================================================

pub mod site {
    pub fn baseurl() -> String {
        "http://example.com".into()
    }

    pub fn language() -> String {
        "en".into()
    }
}

// ============================================================================
// [mimetypes] Section Defaults
// ============================================================================

pub mod mimetypes {
    use std::collections::BTreeMap;

    /// MIME types handled by the built-in embed handlers.
    pub const BUILTIN: &[(&str, &str)] = &[
        ("text/markdown", "markdown"),
        ("text/plain", "plain"),
        ("text/html", "html"),
    ];

    pub fn table() -> BTreeMap<String, String> {
        BUILTIN
            .iter()
            .map(|(mime, plugin)| ((*mime).to_owned(), (*plugin).to_owned()))
            .collect()
    }
}
