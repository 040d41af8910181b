//! Bounded connection pooling
//!
//! [`ConnectionPool`] keeps up to `max_size` connections. Acquisition waits on
//! a semaphore while every slot is taken; dropping the handed-out client puts
//! a healthy connection back on the idle list and frees the slot. Broken
//! connections are closed instead, so the next acquisition opens a new one.
//! [`DirectConnect`] opens a fresh connection per acquisition.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::client::{ConnectionSource, EngineClient};
use crate::types::Backend;
use crate::{BenchError, Result};

/// Opens new engine connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: EngineClient + 'static;

    fn backend(&self) -> Backend;

    async fn connect(&self) -> Result<Self::Conn>;
}

pub struct ConnectionPool<C: Connector> {
    connector: C,
    idle: Arc<Mutex<Vec<C::Conn>>>,
    slots: Arc<Semaphore>,
    max_size: usize,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            connector,
            idle: Arc::new(Mutex::new(Vec::with_capacity(max_size))),
            slots: Arc::new(Semaphore::new(max_size)),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Connections opened and currently unused
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Slots that can be acquired without waiting
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait]
impl<C: Connector> ConnectionSource for ConnectionPool<C> {
    fn backend(&self) -> Backend {
        self.connector.backend()
    }

    async fn acquire(&self) -> Result<Box<dyn EngineClient>> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| BenchError::ConnectionAcquisition {
                backend: self.backend(),
                reason: e.to_string(),
            })?;

        let reused = self.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                tracing::debug!(backend = %self.backend(), "Opening pooled connection");
                self.connector.connect().await?
            }
        };

        Ok(Box::new(PooledConnection {
            backend: self.backend(),
            conn: Some(conn),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        }))
    }
}

struct PooledConnection<T: EngineClient> {
    backend: Backend,
    conn: Option<T>,
    idle: Arc<Mutex<Vec<T>>>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl<T: EngineClient + 'static> EngineClient for PooledConnection<T> {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn explain_analyze(&mut self, query: &str) -> Result<String> {
        match self.conn.as_mut() {
            Some(conn) => conn.explain_analyze(query).await,
            None => Err(BenchError::QueryExecution {
                backend: self.backend,
                reason: "connection already released".to_string(),
            }),
        }
    }

    fn is_healthy(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| conn.is_healthy())
    }
}

impl<T: EngineClient> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        // Back on the idle list before the slot permit is released
        if let Some(conn) = self.conn.take() {
            if conn.is_healthy() {
                self.idle.lock().push(conn);
            } else {
                tracing::debug!(backend = %self.backend, "Discarding broken pooled connection");
            }
        }
    }
}

/// Connects on every acquisition; the connection closes when dropped
pub struct DirectConnect<C: Connector> {
    connector: C,
}

impl<C: Connector> DirectConnect<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<C: Connector> ConnectionSource for DirectConnect<C> {
    fn backend(&self) -> Backend {
        self.connector.backend()
    }

    async fn acquire(&self) -> Result<Box<dyn EngineClient>> {
        let conn = self.connector.connect().await?;
        Ok(Box::new(conn))
    }
}
