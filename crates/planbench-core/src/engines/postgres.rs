use async_trait::async_trait;
use tokio_postgres::{NoTls, SimpleQueryMessage};

use crate::client::EngineClient;
use crate::config::PostgresConfig;
use crate::pool::Connector;
use crate::types::Backend;
use crate::{BenchError, Result};

pub struct PostgresConnector {
    connection_string: String,
}

impl PostgresConnector {
    pub fn new(config: &PostgresConfig) -> Self {
        let connection_string = format!(
            "host={} port={} user={} password={} dbname={}",
            config.host, config.port, config.user, config.password, config.database
        );
        Self { connection_string }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    type Conn = PostgresClient;

    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn connect(&self) -> Result<PostgresClient> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls)
            .await
            .map_err(|e| BenchError::ConnectionAcquisition {
                backend: Backend::Postgres,
                reason: e.to_string(),
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(PostgresClient { client })
    }
}

pub struct PostgresClient {
    client: tokio_postgres::Client,
}

#[async_trait]
impl EngineClient for PostgresClient {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    /// One plan line per returned row, joined with newlines
    async fn explain_analyze(&mut self, query: &str) -> Result<String> {
        let sql = super::explain_analyze_sql(Backend::Postgres, query);
        let messages = self
            .client
            .simple_query(&sql)
            .await
            .map_err(|e| BenchError::QueryExecution {
                backend: Backend::Postgres,
                reason: e.to_string(),
            })?;

        let lines: Vec<&str> = messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => row.get(0),
                _ => None,
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn is_healthy(&self) -> bool {
        !self.client.is_closed()
    }
}
