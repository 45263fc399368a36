//! Cache stage: Redis client with a managed connection.
//!
//! The payload-level cache API lives with its consumers; this client
//! only establishes, probes, and releases the connection on behalf of
//! the orchestrator.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::lifecycle::{ManagedService, Stage};

/// Redis-backed cache/session store connection.
pub struct CacheService {
    url: String,
    connection: Mutex<Option<ConnectionManager>>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService").finish_non_exhaustive()
    }
}

impl CacheService {
    /// Builds an unconnected client for the given Redis URL.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            connection: Mutex::new(None),
        }
    }

    /// A clone of the live connection, if the stage has started.
    pub async fn connection(&self) -> Option<ConnectionManager> {
        self.connection.lock().await.clone()
    }

    async fn ping_connection(connection: &mut ConnectionManager) -> Result<(), CoreError> {
        let pong: String = redis::cmd("PING")
            .query_async(connection)
            .await
            .map_err(|e| CoreError::Internal(format!("redis ping failed: {e}")))?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CoreError::Internal(format!("unexpected ping reply: {pong}")))
        }
    }
}

#[async_trait]
impl ManagedService for CacheService {
    fn stage(&self) -> Stage {
        Stage::Cache
    }

    async fn start(&self) -> Result<(), CoreError> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| CoreError::Internal(format!("invalid redis url: {e}")))?;
        let mut connection = client
            .get_connection_manager()
            .await
            .map_err(|e| CoreError::Internal(format!("redis connect failed: {e}")))?;
        Self::ping_connection(&mut connection).await?;
        *self.connection.lock().await = Some(connection);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        // The multiplexed connection closes when the last clone drops.
        self.connection.lock().await.take();
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut guard = self.connection.lock().await;
        match guard.as_mut() {
            Some(connection) => Self::ping_connection(connection).await.is_ok(),
            None => false,
        }
    }
}
