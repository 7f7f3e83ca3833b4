//! Translation table for the `e("text")` template helper.
//!
//! `.zas/i18n.toml` maps a source string to its translations:
//!
//! ```toml
//! ["Read more"]
//! es = "Leer más"
//! ca = "Llegeix més"
//! ```

use rustc_hash::FxHashMap;
use std::{fs, io::ErrorKind, path::Path};

use crate::config::ConfigError;

#[derive(Debug, Default)]
pub struct I18n {
    /// Site main language; translating into it is the identity.
    main_language: String,
    /// Source string → language → translation.
    strings: FxHashMap<String, FxHashMap<String, String>>,
}

impl I18n {
    /// Load the translation table. A missing file gives an empty table.
    pub fn load(path: &Path, main_language: &str) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(Self::empty(main_language));
            }
            Err(err) => return Err(ConfigError::Io(path.to_path_buf(), err)),
        };
        Self::parse(&content, main_language).map_err(|err| ConfigError::Toml(path.to_path_buf(), err))
    }

    pub fn parse(content: &str, main_language: &str) -> Result<Self, toml::de::Error> {
        let strings = toml::from_str(content)?;
        Ok(Self {
            main_language: main_language.to_owned(),
            strings,
        })
    }

    pub fn empty(main_language: &str) -> Self {
        Self {
            main_language: main_language.to_owned(),
            strings: FxHashMap::default(),
        }
    }

    /// Translate `text` into `language`.
    ///
    /// Missing translations are rendered as `**text**` so they stand out.
    pub fn translate(&self, text: &str, language: &str) -> String {
        if language == self.main_language {
            return text.to_owned();
        }
        self.strings
            .get(text)
            .and_then(|translations| translations.get(language))
            .cloned()
            .unwrap_or_else(|| format!("**{text}**"))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.strings.len()
    }
}
