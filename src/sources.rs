//! Aggregation source registry
//!
//! Maps each dashboard domain to the upstream computation that produces it.
//! Handlers and warmup look sources up here; the cache layer never constructs
//! sources itself.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::key::AggregationRequest;
use crate::traits::AggregationSource;

/// Domain → source map
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn AggregationSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` for `domain`, replacing any previous one
    pub fn register(&mut self, domain: impl Into<String>, source: Arc<dyn AggregationSource>) -> &mut Self {
        self.sources.insert(domain.into(), source);
        self
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with_source(mut self, domain: impl Into<String>, source: Arc<dyn AggregationSource>) -> Self {
        self.register(domain, source);
        self
    }

    /// Source registered for `domain`
    pub fn get(&self, domain: &str) -> Option<Arc<dyn AggregationSource>> {
        self.sources.get(domain).cloned()
    }

    /// Registered domains, sorted
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        domains.sort_unstable();
        domains
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("domains", &self.domains())
            .finish()
    }
}

/// Source backed by an async closure
///
/// ```rust,ignore
/// let catalog = FnSource::new(|request: AggregationRequest| async move {
///     Ok(serde_json::json!({ "domain": request.domain }))
/// });
/// ```
pub struct FnSource<F> {
    f: F,
}

impl<F> FnSource<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(AggregationRequest) -> Fut,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> AggregationSource for FnSource<F>
where
    F: Fn(AggregationRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
{
    async fn fetch(&self, request: &AggregationRequest) -> Result<serde_json::Value> {
        (self.f)(request.clone()).await
    }
}
