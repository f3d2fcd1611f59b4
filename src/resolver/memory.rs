//! Resolvers that never touch the filesystem

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::parser::{parse_with, ParserConfig, Root};

use super::cache::{Cache, MemoryCache};
use super::fingerprint::Fingerprint;
use super::{
    ComponentResolver, DataRequest, DataResolver, DataResult, LayoutResolver, ResolveError,
    Resolved,
};

/// Templates registered by name, parsed on first use
#[derive(Default)]
pub struct MemoryResolver {
    parser: ParserConfig,
    sources: IndexMap<String, String>,
    cache: MemoryCache<Arc<Root>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser_config(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }

    fn lookup(&self, name: &str) -> Result<Option<Resolved>, ResolveError> {
        let Some(source) = self.sources.get(name) else {
            return Ok(None);
        };
        let key = Fingerprint::new("memory", [name]);
        if let Some(ast) = self.cache.get(&key) {
            return Ok(Some(Resolved {
                ast,
                cache_hit: true,
                file: None,
            }));
        }

        let ast = parse_with(source, &self.parser).map_err(|source| ResolveError::Parse {
            name: name.to_string(),
            source,
        })?;
        let ast = Arc::new(ast);
        self.cache.set(key, Arc::clone(&ast), None);
        Ok(Some(Resolved {
            ast,
            cache_hit: false,
            file: None,
        }))
    }
}

impl ComponentResolver for MemoryResolver {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError> {
        self.lookup(name)?.ok_or_else(|| ResolveError::ComponentNotFound {
            name: name.to_string(),
            root: root.to_path_buf(),
        })
    }
}

impl LayoutResolver for MemoryResolver {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError> {
        self.lookup(name)?.ok_or_else(|| ResolveError::LayoutNotFound {
            name: name.to_string(),
            root: root.to_path_buf(),
        })
    }
}

/// Resolves nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl ComponentResolver for NullResolver {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError> {
        Err(ResolveError::ComponentNotFound {
            name: name.to_string(),
            root: root.to_path_buf(),
        })
    }
}

impl LayoutResolver for NullResolver {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError> {
        Err(ResolveError::LayoutNotFound {
            name: name.to_string(),
            root: root.to_path_buf(),
        })
    }
}

impl DataResolver for NullResolver {
    fn resolve(&self, request: &DataRequest<'_>) -> Result<DataResult, ResolveError> {
        Err(ResolveError::ProcessorNotFound(request.processor.to_string()))
    }
}
