//! Configuration for the template parser

use std::collections::BTreeSet;

use serde::Deserialize;

const STANDARD_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const LEGACY_VOID_ELEMENTS: &[&str] = &[
    "basefont", "bgsound", "frame", "keygen", "param", "command", "image",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

/// Element classification used while parsing markup
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Elements that never have children or a closing tag
    pub void_elements: BTreeSet<String>,

    /// Obsolete void elements still accepted in old markup
    pub legacy_void_elements: BTreeSet<String>,

    /// Elements whose body is captured verbatim up to the closing tag
    pub raw_text_elements: BTreeSet<String>,
}

fn to_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            void_elements: to_set(STANDARD_VOID_ELEMENTS),
            legacy_void_elements: to_set(LEGACY_VOID_ELEMENTS),
            raw_text_elements: to_set(RAW_TEXT_ELEMENTS),
        }
    }
}

impl ParserConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the standard void element set
    pub fn with_void_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.void_elements = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the legacy void element set
    pub fn with_legacy_void_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy_void_elements = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add an element to the raw-text set
    pub fn with_raw_text_element(mut self, name: impl Into<String>) -> Self {
        self.raw_text_elements.insert(name.into());
        self
    }

    /// Check a lowercase tag name against both void sets
    pub fn is_void(&self, name: &str) -> bool {
        self.void_elements.contains(name) || self.legacy_void_elements.contains(name)
    }

    pub fn is_raw_text(&self, name: &str) -> bool {
        self.raw_text_elements.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParserConfig::default();
        assert!(config.is_void("br"));
        assert!(config.is_void("keygen"));
        assert!(!config.is_void("div"));
        assert!(config.is_raw_text("script"));
        assert!(!config.is_raw_text("div"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ParserConfig::new()
            .with_void_elements(["br"])
            .with_legacy_void_elements(Vec::<String>::new())
            .with_raw_text_element("pre");

        assert!(config.is_void("br"));
        assert!(!config.is_void("img"));
        assert!(!config.is_void("keygen"));
        assert!(config.is_raw_text("pre"));
    }
}
