//! Engine drivers
//!
//! Each driver sits behind a cargo feature. MySQL and Postgres connections are
//! pooled; DuckDB opens a connection per batch.

#[cfg(feature = "duckdb")]
pub mod duckdb;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::client::ConnectionSources;
use crate::config::Config;
use crate::types::Backend;
use crate::{BenchError, Result};

/// Plan-analysis form of `query`
pub fn explain_analyze_sql(backend: Backend, query: &str) -> String {
    match backend {
        Backend::Postgres => format!("EXPLAIN (ANALYZE, BUFFERS) {}", query),
        Backend::MySQL | Backend::DuckDB => format!("EXPLAIN ANALYZE {}", query),
    }
}

/// Whether the driver for `backend` was compiled in
pub fn is_compiled(backend: Backend) -> bool {
    match backend {
        Backend::MySQL => cfg!(feature = "mysql"),
        Backend::Postgres => cfg!(feature = "postgres"),
        Backend::DuckDB => cfg!(feature = "duckdb"),
    }
}

/// Connection sources for every engine enabled in `config`
pub fn sources_from_config(config: &Config) -> Result<ConnectionSources> {
    let mut sources = ConnectionSources::new();
    let enabled = [
        (Backend::MySQL, config.mysql.enabled),
        (Backend::Postgres, config.postgres.enabled),
        (Backend::DuckDB, config.duckdb.enabled),
    ];

    for (backend, on) in enabled {
        if !on {
            continue;
        }
        if !is_compiled(backend) {
            return Err(BenchError::Config(format!(
                "{} is enabled but support for it was not compiled in",
                backend
            )));
        }
        register(&mut sources, backend, config);
        tracing::info!(backend = %backend, "Registered connection source");
    }

    if sources.backends().is_empty() {
        tracing::warn!("No engines enabled; every scheduled batch will be aborted");
    }
    Ok(sources)
}

#[allow(unused_variables)]
fn register(sources: &mut ConnectionSources, backend: Backend, config: &Config) {
    match backend {
        #[cfg(feature = "mysql")]
        Backend::MySQL => sources.register(std::sync::Arc::new(crate::pool::ConnectionPool::new(
            self::mysql::MySqlConnector::new(&config.mysql),
            config.mysql.pool_size,
        ))),
        #[cfg(feature = "postgres")]
        Backend::Postgres => sources.register(std::sync::Arc::new(crate::pool::ConnectionPool::new(
            self::postgres::PostgresConnector::new(&config.postgres),
            config.postgres.pool_size,
        ))),
        #[cfg(feature = "duckdb")]
        Backend::DuckDB => sources.register(std::sync::Arc::new(crate::pool::DirectConnect::new(
            self::duckdb::DuckDbConnector::new(&config.duckdb),
        ))),
        #[allow(unreachable_patterns)]
        _ => {}
    }
}
