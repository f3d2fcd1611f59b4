//! Named data processors with bounded retries

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::compiler::Value;

use super::cache::{Cache, CacheConfig, MemoryCache};
use super::fingerprint::Fingerprint;
use super::{DataRequest, DataResolver, DataResult, DataStatus, ResolveError};

/// What a processor reports for one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    /// Final data that should not be cached
    End(Value),
    Skip,
    /// Transient failure; invoke again after the retry delay
    Retry,
    Error(String),
}

pub trait DataProcessor: Send + Sync {
    fn process(&self, request: &DataRequest<'_>) -> Outcome;
}

impl<F> DataProcessor for F
where
    F: Fn(&DataRequest<'_>) -> Outcome + Send + Sync,
{
    fn process(&self, request: &DataRequest<'_>) -> Outcome {
        self(request)
    }
}

/// Retry behaviour for `Outcome::Retry`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total invocations allowed, the first one included
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retry_delay_ms: 250,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay: u64) -> Self {
        self.retry_delay_ms = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// [`DataResolver`] dispatching to registered processors by name
pub struct DataRegistry {
    processors: IndexMap<String, Arc<dyn DataProcessor>>,
    policy: RetryPolicy,
    cache: MemoryCache<Value>,
}

impl Default for DataRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl DataRegistry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            processors: IndexMap::new(),
            policy,
            cache: MemoryCache::default(),
        }
    }

    pub fn with_cache_config(mut self, config: &CacheConfig) -> Self {
        self.cache = MemoryCache::from_config(config);
        self
    }

    /// Register `processor` under `name`, replacing any previous one
    pub fn register(mut self, name: impl Into<String>, processor: impl DataProcessor + 'static) -> Self {
        self.processors.insert(name.into(), Arc::new(processor));
        self
    }

    /// Drop cached results produced for `file_id`
    pub fn purge(&self, file_id: &str) -> usize {
        self.cache.purge(file_id)
    }
}

fn fingerprint(request: &DataRequest<'_>) -> Fingerprint {
    let mut args = vec![
        request.root.display().to_string(),
        request.file_id.unwrap_or_default().to_string(),
        request.body.to_string(),
    ];
    // Debug keeps object structure and tells null, "null" and undefined apart
    args.extend(
        request
            .attributes
            .iter()
            .map(|(name, value)| format!("{name}={value:?}")),
    );
    Fingerprint::new(request.processor, args)
}

/// `undefined` is never a valid payload
fn payload(processor: &str, value: Value) -> Result<Value, ResolveError> {
    match value {
        Value::Undefined => Err(ResolveError::MalformedResponse {
            processor: processor.to_string(),
        }),
        value => Ok(value),
    }
}

impl DataResolver for DataRegistry {
    fn resolve(&self, request: &DataRequest<'_>) -> Result<DataResult, ResolveError> {
        let name = request.processor;
        let processor = self
            .processors
            .get(name)
            .ok_or_else(|| ResolveError::ProcessorNotFound(name.to_string()))?;

        let key = fingerprint(request);
        if let Some(response) = self.cache.get(&key) {
            debug!(processor = name, key = %key, "data cache hit");
            return Ok(DataResult {
                status: DataStatus::Success,
                response,
                retries: 0,
                cache_hit: true,
            });
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let (status, response) = match processor.process(request) {
                Outcome::Success(value) => {
                    let value = payload(name, value)?;
                    self.cache.set(key, value.clone(), request.file_id);
                    (DataStatus::Success, value)
                }
                Outcome::End(value) => (DataStatus::End, payload(name, value)?),
                Outcome::Skip => (DataStatus::Skip, Value::Undefined),
                Outcome::Error(message) => {
                    return Err(ResolveError::ProcessorFailed {
                        processor: name.to_string(),
                        message,
                    })
                }
                Outcome::Retry if attempts >= self.policy.max_attempts => {
                    return Err(ResolveError::RetriesExhausted {
                        processor: name.to_string(),
                        attempts,
                    })
                }
                Outcome::Retry => {
                    debug!(processor = name, attempt = attempts, "data processor asked to retry");
                    thread::sleep(self.policy.delay());
                    continue;
                }
            };
            return Ok(DataResult {
                status,
                response,
                retries: attempts - 1,
                cache_hit: false,
            });
        }
    }
}
