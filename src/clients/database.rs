//! Database stage: owns the [`SessionManager`] on behalf of the
//! orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::db::SessionManager;
use crate::error::CoreError;
use crate::lifecycle::{ManagedService, Stage};

/// Opens the pool and initializes the schema on start; closes the pool
/// on stop. The connected [`SessionManager`] is exposed to the rest of
/// the application once the stage is ready.
pub struct DatabaseService {
    settings: Arc<Settings>,
    manager: RwLock<Option<SessionManager>>,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService").finish_non_exhaustive()
    }
}

impl DatabaseService {
    /// Builds an unconnected stage.
    #[must_use]
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            manager: RwLock::new(None),
        }
    }

    /// The connected session manager, if the stage has started.
    pub async fn manager(&self) -> Option<SessionManager> {
        self.manager.read().await.clone()
    }
}

#[async_trait]
impl ManagedService for DatabaseService {
    fn stage(&self) -> Stage {
        Stage::Database
    }

    async fn start(&self) -> Result<(), CoreError> {
        let manager = SessionManager::connect(Arc::clone(&self.settings)).await?;
        manager.init_schema().await?;
        *self.manager.write().await = Some(manager);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        if let Some(manager) = self.manager.write().await.take() {
            manager.close().await;
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        match self.manager.read().await.as_ref() {
            Some(manager) => manager.health_check().await,
            None => false,
        }
    }
}
