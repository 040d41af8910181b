//! DuckDB driver
//!
//! The embedded engine is synchronous, so every call runs on the blocking
//! pool. Profiling is switched to JSON when the connection opens, which makes
//! `EXPLAIN ANALYZE` return the profile tree the DuckDB plan parser reads.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::client::EngineClient;
use crate::config::DuckDbConfig;
use crate::pool::Connector;
use crate::types::Backend;
use crate::{BenchError, Result};

pub struct DuckDbConnector {
    path: PathBuf,
}

impl DuckDbConnector {
    pub fn new(config: &DuckDbConfig) -> Self {
        Self {
            path: config.path.clone(),
        }
    }
}

fn acquisition_error(reason: impl ToString) -> BenchError {
    BenchError::ConnectionAcquisition {
        backend: Backend::DuckDB,
        reason: reason.to_string(),
    }
}

fn execution_error(reason: impl ToString) -> BenchError {
    BenchError::QueryExecution {
        backend: Backend::DuckDB,
        reason: reason.to_string(),
    }
}

#[async_trait]
impl Connector for DuckDbConnector {
    type Conn = DuckDbClient;

    fn backend(&self) -> Backend {
        Backend::DuckDB
    }

    async fn connect(&self) -> Result<DuckDbClient> {
        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || -> ::duckdb::Result<::duckdb::Connection> {
            let conn = ::duckdb::Connection::open(&path)?;
            conn.execute_batch("PRAGMA enable_profiling = 'json';")?;
            Ok(conn)
        })
        .await
        .map_err(acquisition_error)?
        .map_err(acquisition_error)?;

        Ok(DuckDbClient { conn: Some(conn) })
    }
}

pub struct DuckDbClient {
    conn: Option<::duckdb::Connection>,
}

fn profile(conn: &::duckdb::Connection, sql: &str) -> ::duckdb::Result<String> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut plan = String::new();
    // Columns are (explain_key, explain_value)
    while let Some(row) = rows.next()? {
        let value: String = row.get(1)?;
        plan.push_str(&value);
    }
    Ok(plan)
}

#[async_trait]
impl EngineClient for DuckDbClient {
    fn backend(&self) -> Backend {
        Backend::DuckDB
    }

    async fn explain_analyze(&mut self, query: &str) -> Result<String> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| execution_error("connection lost by an earlier failure"))?;
        let sql = super::explain_analyze_sql(Backend::DuckDB, query);

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = profile(&conn, &sql);
            (conn, result)
        })
        .await
        .map_err(execution_error)?;

        self.conn = Some(conn);
        result.map_err(execution_error)
    }

    /// A panicked blocking call loses the connection
    fn is_healthy(&self) -> bool {
        self.conn.is_some()
    }
}
