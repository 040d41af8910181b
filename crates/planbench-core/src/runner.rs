//! Sequential batch execution
//!
//! Runs every query of a batch one after another on a single connection,
//! normalizes each plan and appends the whole batch to the [`ResultStore`].
//! A query that fails is logged and skipped; the rest of the batch continues.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::client::EngineClient;
use crate::metrics::{BATCHES_TOTAL, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::plans;
use crate::store::ResultStore;
use crate::types::{BackendTask, BenchmarkJob, PlanRecord};

/// Called after a batch is stored, outside the store lock, with the job and batch index
pub type CompletionCallback = Arc<dyn Fn(&BenchmarkJob, usize) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_index: usize,
    pub executed: usize,
    pub skipped: usize,
}

pub struct BatchRunner {
    store: Arc<ResultStore>,
    on_complete: Option<CompletionCallback>,
}

impl BatchRunner {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self {
            store,
            on_complete: None,
        }
    }

    pub fn with_callback(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub async fn run(&self, client: &mut dyn EngineClient, task: BackendTask) -> BatchOutcome {
        let backend = task.backend();
        let job = task.job.as_ref();
        let total = task.batch.len();
        info!(backend = %backend, job = %job.job_name, queries = total, "Starting query batch execution");

        let mut raw_plans = Vec::with_capacity(total);
        let mut records = Vec::with_capacity(total);

        for (i, query) in task.batch.iter().enumerate() {
            let timer = QUERY_DURATION_SECONDS
                .with_label_values(&[backend.name()])
                .start_timer();
            let result = client.explain_analyze(&query.query_text).await;
            timer.observe_duration();

            match result {
                Ok(raw) => {
                    let plan = plans::normalize(backend, &raw, &query.filter_names());
                    records.push(PlanRecord::assemble(job, query, &plan));
                    raw_plans.push(raw);
                    QUERIES_TOTAL.with_label_values(&[backend.name(), "ok"]).inc();
                    debug!(backend = %backend, job = %job.job_name, "Query completed {}/{}", i + 1, total);
                }
                Err(e) => {
                    QUERIES_TOTAL.with_label_values(&[backend.name(), "failed"]).inc();
                    warn!(
                        backend = %backend,
                        job = %job.job_name,
                        query = %query.query_text,
                        "Query analyze failed, skipping: {}", e
                    );
                }
            }
        }

        let executed = records.len();
        let batch_index = self.store.append(job, raw_plans, records);
        BATCHES_TOTAL.with_label_values(&[backend.name()]).inc();
        info!(
            backend = %backend,
            job = %job.job_name,
            batch = batch_index,
            executed,
            skipped = total - executed,
            "Query batch stored"
        );

        if let Some(callback) = &self.on_complete {
            callback(job, batch_index);
        }

        BatchOutcome {
            batch_index,
            executed,
            skipped: total - executed,
        }
    }
}
