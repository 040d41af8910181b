//! Engine collaborator contracts

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::Backend;
use crate::Result;

/// A live engine connection able to run the plan-analysis form of a query
#[async_trait]
pub trait EngineClient: Send {
    fn backend(&self) -> Backend;

    /// Run `EXPLAIN ANALYZE <query>` and return the raw plan (text or JSON)
    async fn explain_analyze(&mut self, query: &str) -> Result<String>;

    /// False once the connection can no longer serve queries; pools drop it
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Hands out scoped connections; dropping the returned client releases it
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    fn backend(&self) -> Backend;

    /// Suspends while the source is exhausted
    async fn acquire(&self) -> Result<Box<dyn EngineClient>>;
}

/// Connection sources by backend, built once at startup
#[derive(Clone, Default)]
pub struct ConnectionSources {
    sources: HashMap<Backend, Arc<dyn ConnectionSource>>,
}

impl ConnectionSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn ConnectionSource>) {
        self.sources.insert(source.backend(), source);
    }

    pub fn with(mut self, source: Arc<dyn ConnectionSource>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, backend: Backend) -> Option<Arc<dyn ConnectionSource>> {
        self.sources.get(&backend).cloned()
    }

    pub fn backends(&self) -> Vec<Backend> {
        Backend::ALL
            .into_iter()
            .filter(|b| self.sources.contains_key(b))
            .collect()
    }
}
