use async_trait::async_trait;
use mysql_async::prelude::*;

use crate::client::EngineClient;
use crate::config::MySqlConfig;
use crate::pool::Connector;
use crate::types::Backend;
use crate::{BenchError, Result};

pub struct MySqlConnector {
    opts: mysql_async::Opts,
}

impl MySqlConnector {
    pub fn new(config: &MySqlConfig) -> Self {
        let builder = mysql_async::OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()));
        Self {
            opts: builder.into(),
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlClient;

    fn backend(&self) -> Backend {
        Backend::MySQL
    }

    async fn connect(&self) -> Result<MySqlClient> {
        let conn = mysql_async::Conn::new(self.opts.clone())
            .await
            .map_err(|e| BenchError::ConnectionAcquisition {
                backend: Backend::MySQL,
                reason: e.to_string(),
            })?;
        Ok(MySqlClient {
            conn,
            broken: false,
        })
    }
}

pub struct MySqlClient {
    conn: mysql_async::Conn,
    /// Set on transport or protocol errors; server errors leave the session usable
    broken: bool,
}

#[async_trait]
impl EngineClient for MySqlClient {
    fn backend(&self) -> Backend {
        Backend::MySQL
    }

    /// The plan is the single `EXPLAIN` column of the first row
    async fn explain_analyze(&mut self, query: &str) -> Result<String> {
        let sql = super::explain_analyze_sql(Backend::MySQL, query);
        let plan = self
            .conn
            .query_first::<String, _>(sql)
            .await
            .map_err(|e| {
                self.broken = !matches!(e, mysql_async::Error::Server(_));
                BenchError::QueryExecution {
                    backend: Backend::MySQL,
                    reason: e.to_string(),
                }
            })?;
        plan.ok_or_else(|| BenchError::QueryExecution {
            backend: Backend::MySQL,
            reason: "EXPLAIN ANALYZE returned no rows".to_string(),
        })
    }

    fn is_healthy(&self) -> bool {
        !self.broken
    }
}
