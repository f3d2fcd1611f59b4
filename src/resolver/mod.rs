//! Collaborators that turn directive targets into templates and data
//!
//! The compiler only sees the traits defined here; filesystem, in-memory and
//! null implementations live in the submodules.

mod cache;
mod data;
mod filesystem;
mod fingerprint;
mod memory;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::compiler::Value;
use crate::error::ParseError;
use crate::parser::Root;

pub use cache::{Cache, CacheConfig, MemoryCache};
pub use data::{DataProcessor, DataRegistry, Outcome, RetryPolicy};
pub use filesystem::{Fetch, FileSystemResolver};
pub use fingerprint::Fingerprint;
pub use memory::{MemoryResolver, NullResolver};

/// Errors raised while resolving components, layouts or data
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("component `{name}` not found under {}", root.display())]
    ComponentNotFound { name: String, root: PathBuf },

    #[error("layout `{name}` not found under {}", root.display())]
    LayoutNotFound { name: String, root: PathBuf },

    #[error("no data processor named `{0}`")]
    ProcessorNotFound(String),

    #[error("remote layout `{name}` has a malformed export: {reason}")]
    MalformedExport { name: String, reason: String },

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("data processor `{processor}` failed: {message}")]
    ProcessorFailed { processor: String, message: String },

    #[error("data processor `{processor}` returned a malformed response")]
    MalformedResponse { processor: String },

    #[error("data processor `{processor}` still asked to retry after {attempts} attempts")]
    RetriesExhausted { processor: String, attempts: u32 },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse template `{name}`: {source}")]
    Parse {
        name: String,
        #[source]
        source: ParseError,
    },
}

/// A parsed template handed back by a resolver
#[derive(Debug, Clone)]
pub struct Resolved {
    pub ast: Arc<Root>,
    /// Served from a resolver cache rather than read and parsed
    pub cache_hit: bool,
    /// Source file backing the template, if any
    pub file: Option<PathBuf>,
}

/// Looks up `<:component>` and `<:element>` targets
pub trait ComponentResolver: Send + Sync {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError>;
}

/// Looks up `<:layout>` targets
pub trait LayoutResolver: Send + Sync {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError>;
}

/// Everything a data processor gets to see
#[derive(Debug, Clone, Copy)]
pub struct DataRequest<'a> {
    pub processor: &'a str,
    /// Evaluated directive attributes, `use` and `key` excluded
    pub attributes: &'a IndexMap<String, Value>,
    /// Raw directive body
    pub body: &'a str,
    pub root: &'a Path,
    pub file_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    Success,
    End,
    /// Suppress the content that would consume the data
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataResult {
    pub status: DataStatus,
    pub response: Value,
    /// Retries spent before the final outcome
    pub retries: u32,
    pub cache_hit: bool,
}

/// Runs `<:data>` directives
pub trait DataResolver: Send + Sync {
    fn resolve(&self, request: &DataRequest<'_>) -> Result<DataResult, ResolveError>;
}
