//! Configuration for the compiler

use std::path::PathBuf;

use serde::Deserialize;

/// Compile-time settings shared by every render of a [`super::Compiler`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Directory resolvers search for `components/` and `layouts/`
    pub root: PathBuf,

    /// Identifier of the template being rendered, mixed into data fingerprints
    pub file_id: Option<String>,

    /// Maximum nesting of component, element and layout calls
    pub max_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            file_id: None,
            max_depth: 64,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}
