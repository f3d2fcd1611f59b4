//! Components and layouts read from disk
//!
//! ```text
//! {root}/components/{name}.html | {name}.seed
//! {root}/layouts/{name}.html    | {name}.seed
//! {root}/layouts/{name}.toml    remote layout: default = "https://..."
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::parser::{parse_with, ParserConfig, Root};

use super::cache::{Cache, MemoryCache};
use super::fingerprint::Fingerprint;
use super::{ComponentResolver, LayoutResolver, ResolveError, Resolved};

const EXTENSIONS: &[&str] = &["html", "seed"];

/// Retrieves remote layout sources
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, ResolveError>;
}

impl<F> Fetch for F
where
    F: Fn(&str) -> Result<String, ResolveError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<String, ResolveError> {
        self(url)
    }
}

pub struct FileSystemResolver {
    parser: ParserConfig,
    cache: Arc<dyn Cache<Arc<Root>>>,
    fetch: Option<Arc<dyn Fetch>>,
}

impl Default for FileSystemResolver {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

impl FileSystemResolver {
    pub fn new(parser: ParserConfig) -> Self {
        Self {
            parser,
            cache: Arc::new(MemoryCache::default()),
            fetch: None,
        }
    }

    /// Share a cache, e.g. between the component and layout resolvers
    pub fn with_cache(mut self, cache: Arc<dyn Cache<Arc<Root>>>) -> Self {
        self.cache = cache;
        self
    }

    /// Enable remote layouts
    pub fn with_fetch(mut self, fetch: impl Fetch + 'static) -> Self {
        self.fetch = Some(Arc::new(fetch));
        self
    }

    /// Forget cached templates parsed from `file`
    pub fn purge(&self, file: &Path) -> usize {
        self.cache.purge(&file.display().to_string())
    }

    fn lookup(&self, kind: &str, name: &str, root: &Path) -> Result<Option<Resolved>, ResolveError> {
        let dir = root.join(format!("{kind}s"));
        let Some(path) = EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
        else {
            return Ok(None);
        };

        let key = Fingerprint::new(kind, [root.display().to_string(), name.to_string()]);
        if let Some(ast) = self.cache.get(&key) {
            debug!(kind, name, "template cache hit");
            return Ok(Some(Resolved {
                ast,
                cache_hit: true,
                file: Some(path),
            }));
        }

        let source = std::fs::read_to_string(&path).map_err(|source| ResolveError::Io {
            path: path.clone(),
            source,
        })?;
        let ast = Arc::new(self.parse(name, &source)?);
        let file_id = path.display().to_string();
        self.cache.set(key, Arc::clone(&ast), Some(&file_id));
        debug!(kind, name, file = %file_id, "template parsed");

        Ok(Some(Resolved {
            ast,
            cache_hit: false,
            file: Some(path),
        }))
    }

    fn remote_layout(&self, name: &str, root: &Path) -> Result<Option<Resolved>, ResolveError> {
        let manifest = root.join("layouts").join(format!("{name}.toml"));
        if !manifest.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&manifest).map_err(|source| ResolveError::Io {
            path: manifest.clone(),
            source,
        })?;
        let url = remote_url(name, &content)?;

        let key = Fingerprint::new("remote-layout", [url.as_str()]);
        if let Some(ast) = self.cache.get(&key) {
            return Ok(Some(Resolved {
                ast,
                cache_hit: true,
                file: Some(manifest),
            }));
        }

        let fetch = self.fetch.as_ref().ok_or_else(|| ResolveError::Fetch {
            url: url.clone(),
            message: "no fetcher configured for remote layouts".to_string(),
        })?;
        let source = fetch.fetch(&url)?;
        let ast = Arc::new(self.parse(name, &source)?);
        self.cache
            .set(key, Arc::clone(&ast), Some(&manifest.display().to_string()));
        debug!(name, url = %url, "remote layout fetched");

        Ok(Some(Resolved {
            ast,
            cache_hit: false,
            file: Some(manifest),
        }))
    }

    fn parse(&self, name: &str, source: &str) -> Result<Root, ResolveError> {
        parse_with(source, &self.parser).map_err(|source| ResolveError::Parse {
            name: name.to_string(),
            source,
        })
    }
}

/// The `default` string exported by a remote layout manifest
fn remote_url(name: &str, content: &str) -> Result<String, ResolveError> {
    let malformed = |reason: String| ResolveError::MalformedExport {
        name: name.to_string(),
        reason,
    };
    let table: toml::Table = toml::from_str(content).map_err(|e| malformed(e.to_string()))?;
    match table.get("default") {
        Some(toml::Value::String(url)) => Ok(url.clone()),
        Some(other) => Err(malformed(format!(
            "`default` must be a URL string, found {}",
            other.type_str()
        ))),
        None => Err(malformed("missing `default` export".to_string())),
    }
}

impl ComponentResolver for FileSystemResolver {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError> {
        self.lookup("component", name, root)?
            .ok_or_else(|| ResolveError::ComponentNotFound {
                name: name.to_string(),
                root: root.to_path_buf(),
            })
    }
}

impl LayoutResolver for FileSystemResolver {
    fn resolve(&self, name: &str, root: &Path) -> Result<Resolved, ResolveError> {
        if let Some(local) = self.lookup("layout", name, root)? {
            return Ok(local);
        }
        self.remote_layout(name, root)?
            .ok_or_else(|| ResolveError::LayoutNotFound {
                name: name.to_string(),
                root: PathBuf::from(root),
            })
    }
}
