//! Trace provider capability and the registry that selects one by name.

use std::collections::HashMap;
use std::sync::Arc;

use apfaas_core::{RunManifest, TraceSettings};
use async_trait::async_trait;

use crate::aws::AwsTraceFactory;
use crate::error::{TraceError, TraceResult};
use crate::record::TraceRecord;

/// Source of provider-side execution records for one completed run.
#[async_trait]
pub trait TraceProvider: Send + Sync {
    /// Execution records of the run, queried in windows of `resolution`
    /// seconds. `limit` is the number of requests the run issued.
    async fn get_traces_per_request(
        &self,
        limit: usize,
        resolution: u64,
    ) -> TraceResult<Vec<TraceRecord>>;
}

/// Builds a [`TraceProvider`] for the functions of a run.
#[async_trait]
pub trait TraceProviderFactory: Send + Sync {
    async fn create(
        &self,
        functions: Vec<String>,
        manifest: &RunManifest,
        settings: &TraceSettings,
    ) -> TraceResult<Box<dyn TraceProvider>>;
}

/// Provider factories keyed by provider identifier.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn TraceProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("aws", Arc::new(AwsTraceFactory));
        registry
    }

    pub fn register(&mut self, name: &str, factory: Arc<dyn TraceProviderFactory>) {
        self.factories.insert(name.to_lowercase(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    pub async fn create(
        &self,
        name: &str,
        functions: Vec<String>,
        manifest: &RunManifest,
        settings: &TraceSettings,
    ) -> TraceResult<Box<dyn TraceProvider>> {
        let factory = self
            .factories
            .get(&name.to_lowercase())
            .ok_or_else(|| TraceError::UnknownProvider(name.to_string()))?;
        factory.create(functions, manifest, settings).await
    }
}
