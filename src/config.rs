//! TOML configuration file
//!
//! ```toml
//! [parser]
//! raw_text_elements = ["script", "style", "textarea", "pre"]
//!
//! [compiler]
//! root = "site"
//! max_depth = 32
//!
//! [data]
//! max_attempts = 4
//! retry_delay_ms = 250
//!
//! [cache]
//! capacity = 512
//! ```
//!
//! Every section and key is optional.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::compiler::CompilerConfig;
use crate::parser::ParserConfig;
use crate::resolver::{CacheConfig, RetryPolicy};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parser: ParserConfig,
    pub compiler: CompilerConfig,
    /// Retry policy for data processors
    pub data: RetryPolicy,
    pub cache: CacheConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_parser(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_compiler(mut self, compiler: CompilerConfig) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_data(mut self, data: RetryPolicy) -> Self {
        self.data = data;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(Config::from_str("").expect("empty is valid"), Config::default());
    }

    #[test]
    fn test_sections() {
        let config = Config::from_str(
            r#"
            [parser]
            raw_text_elements = ["pre"]

            [compiler]
            root = "site"

            [data]
            max_attempts = 2

            [cache]
            capacity = 8
            "#,
        )
        .expect("valid config");

        assert!(config.parser.is_raw_text("pre"));
        assert!(!config.parser.is_raw_text("script"));
        assert_eq!(config.compiler.root, PathBuf::from("site"));
        assert_eq!(config.compiler.max_depth, 64);
        assert_eq!(config.data.max_attempts, 2);
        assert_eq!(config.data.retry_delay_ms, 250);
        assert_eq!(config.cache.capacity, 8);
    }

    #[test]
    fn test_data_section_drives_registry() {
        use crate::compiler::Value;
        use crate::resolver::{DataRegistry, DataRequest, DataResolver, Outcome, ResolveError};
        use indexmap::IndexMap;

        let config = Config::from_str("[data]\nmax_attempts = 2\nretry_delay_ms = 0\n")
            .expect("valid config");
        let registry = DataRegistry::new(config.data.clone())
            .with_cache_config(&config.cache)
            .register("flaky", |_: &DataRequest<'_>| Outcome::Retry);

        let attributes: IndexMap<String, Value> = IndexMap::new();
        let request = DataRequest {
            processor: "flaky",
            attributes: &attributes,
            body: "",
            root: Path::new("."),
            file_id: None,
        };
        let err = registry.resolve(&request).unwrap_err();
        assert!(matches!(err, ResolveError::RetriesExhausted { attempts: 2, .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("seed.toml");
        std::fs::write(&path, "[cache]\ncapacity = 3\n").expect("write");
        assert_eq!(Config::from_file(&path).expect("loads").cache.capacity, 3);

        let err = Config::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        let err = Config::from_str("[cache]\ncapacity = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
