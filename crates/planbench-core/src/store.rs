//! Result aggregation
//!
//! Append-only store of finished batches. Indices are assigned in completion
//! order under a single mutex; nothing is ever removed while the process runs.

use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{BenchmarkJob, PlanRecord};
use crate::{BenchError, Result};

/// Raw plans and normalized records of one finished batch
#[derive(Debug, Clone, Serialize)]
pub struct StoredBatch {
    #[serde(rename = "batch")]
    pub index: usize,
    pub job: BenchmarkJob,
    pub records: Vec<PlanRecord>,
    pub raw: Vec<String>,
}

impl StoredBatch {
    /// `<server>_<database>_<query>_<index>.json`
    pub fn export_file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.json",
            self.job.backend, self.job.dataset_name, self.job.job_name, self.index
        )
    }
}

#[derive(Default)]
pub struct ResultStore {
    batches: Mutex<Vec<StoredBatch>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished batch; returns its index (the store length before the append)
    pub fn append(&self, job: &BenchmarkJob, raw: Vec<String>, records: Vec<PlanRecord>) -> usize {
        let mut batches = self.batches.lock();
        let index = batches.len();
        batches.push(StoredBatch {
            index,
            job: job.clone(),
            records,
            raw,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }

    pub fn batch(&self, index: usize) -> Option<StoredBatch> {
        self.batches.lock().get(index).cloned()
    }

    pub fn batches(&self) -> Vec<StoredBatch> {
        self.batches.lock().clone()
    }

    /// Every record of every batch, in completion order
    pub fn records(&self) -> Vec<PlanRecord> {
        self.batches
            .lock()
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect()
    }

    /// JSON array; element `i` is batch `i`
    pub fn export_json(&self) -> Result<String> {
        let batches = self.batches.lock();
        Ok(serde_json::to_string_pretty(&*batches)?)
    }

    pub fn export_batch_json(&self, index: usize) -> Result<String> {
        let batches = self.batches.lock();
        let batch = batches.get(index).ok_or(BenchError::BatchNotFound(index))?;
        Ok(serde_json::to_string_pretty(batch)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.export_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// One file per batch under `dir`; returns the written paths
    pub fn write_batches(&self, dir: &Path) -> Result<Vec<std::path::PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let batches = self.batches();
        let mut written = Vec::with_capacity(batches.len());
        for batch in &batches {
            let path = dir.join(batch.export_file_name());
            std::fs::write(&path, serde_json::to_string_pretty(batch)?)?;
            written.push(path);
        }
        Ok(written)
    }
}
