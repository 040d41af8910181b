//! planbench core pipeline
//!
//! Expands parameterized SQL templates into concrete queries, runs their
//! `EXPLAIN ANALYZE` form against MySQL, Postgres or DuckDB and normalizes the
//! three plan formats into a common record:
//!
//! - **expander**: `{{name:TYPE}}` placeholder discovery and sweep expansion
//! - **plans**: per-engine plan parsers (total runtime, rows scanned per filter)
//! - **dispatcher**: per-backend admission queues over a shared worker pool
//! - **runner** / **store**: sequential batch execution and result aggregation
//!
//! # Usage
//!
//! ```rust,ignore
//! use planbench_core::{BenchmarkService, Config};
//!
//! let config = Config::discover(Path::new("."), None)?;
//! let sources = planbench_core::engines::sources_from_config(&config)?;
//! let service = BenchmarkService::start(&config.dispatcher, sources);
//! service.schedule(job, &ranges)?;
//! service.shutdown().await?;
//! let export = service.store().export_json()?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod engines;
pub mod expander;
pub mod metrics;
pub mod plans;
pub mod pool;
pub mod runner;
pub mod service;
pub mod store;
pub mod types;

pub use client::{ConnectionSource, ConnectionSources, EngineClient};
pub use config::Config;
pub use dispatcher::{BackendDispatcher, QueueSnapshot};
pub use expander::{expand, extract_parameters};
pub use plans::{normalize, PlanParser};
pub use pool::{ConnectionPool, Connector, DirectConnect};
pub use runner::{BatchOutcome, BatchRunner, CompletionCallback};
pub use service::BenchmarkService;
pub use store::{ResultStore, StoredBatch};
pub use types::{
    Backend, BackendTask, BenchmarkJob, Binding, FilterScan, FilterTriple, JobSpec,
    NormalizedPlan, ParamType, ParamValue, ParameterRange, PlanRecord, QueryParameter,
    ReadyQuery, RuntimeUnit,
};

use thiserror::Error;

/// Benchmark pipeline errors
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Missing value for variable '{0}'")]
    MissingBinding(String),

    #[error("Unsupported type '{type_tag}' for variable '{name}'")]
    UnsupportedType { name: String, type_tag: String },

    #[error("Invalid range for '{name}': {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("Template declares {0} parameters, at most 3 are supported")]
    TooManyParameters(usize),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("[{backend}] connection acquisition failed: {reason}")]
    ConnectionAcquisition { backend: Backend, reason: String },

    #[error("[{backend}] query execution failed: {reason}")]
    QueryExecution { backend: Backend, reason: String },

    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(usize),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
