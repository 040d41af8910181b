//! Benchmark service context
//!
//! Owns the result store, the batch runner and the dispatcher for the life of
//! the process. Scheduling expands a job over its sweep and submits the whole
//! sweep as one batch.

use std::sync::Arc;

use tracing::info;

use crate::client::ConnectionSources;
use crate::config::DispatcherConfig;
use crate::dispatcher::{BackendDispatcher, QueueSnapshot};
use crate::expander::expand;
use crate::runner::{BatchRunner, CompletionCallback};
use crate::store::ResultStore;
use crate::types::{BackendTask, BenchmarkJob, JobSpec, ParameterRange};
use crate::Result;

pub struct BenchmarkService {
    store: Arc<ResultStore>,
    dispatcher: BackendDispatcher,
}

impl BenchmarkService {
    pub fn start(config: &DispatcherConfig, sources: ConnectionSources) -> Self {
        Self::build(config, sources, None)
    }

    /// Start with a hook invoked after each batch is stored
    pub fn with_callback(
        config: &DispatcherConfig,
        sources: ConnectionSources,
        callback: CompletionCallback,
    ) -> Self {
        Self::build(config, sources, Some(callback))
    }

    fn build(
        config: &DispatcherConfig,
        sources: ConnectionSources,
        callback: Option<CompletionCallback>,
    ) -> Self {
        let store = Arc::new(ResultStore::new());
        let mut runner = BatchRunner::new(Arc::clone(&store));
        if let Some(callback) = callback {
            runner = runner.with_callback(callback);
        }
        let dispatcher = BackendDispatcher::start(config, sources, Arc::new(runner));
        Self { store, dispatcher }
    }

    /// Expand `job` over `ranges` and queue the batch; returns the number of queries
    pub fn schedule(&self, job: BenchmarkJob, ranges: &[ParameterRange]) -> Result<usize> {
        let batch = expand(&job.query_template, ranges)?;
        let size = batch.len();
        info!(
            backend = %job.backend,
            job = %job.job_name,
            dataset = %job.dataset_name,
            queries = size,
            "Scheduling job"
        );
        self.dispatcher.submit(BackendTask::new(batch, Arc::new(job)))?;
        Ok(size)
    }

    pub fn schedule_spec(&self, spec: JobSpec) -> Result<usize> {
        self.schedule(spec.job, &spec.ranges)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.dispatcher.snapshot()
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    /// Stop accepting jobs and wait for everything queued to finish
    pub async fn shutdown(&self) -> Result<()> {
        self.dispatcher.shutdown().await
    }
}
