//! Session manager: one connection pool per process, transactional
//! sessions for every unit of database work.
//!
//! All database access goes through [`SessionManager::with_session`];
//! raw connection handles are never handed out, so no collaborator can
//! bypass the commit/rollback contract. Pool tuning differs by backend
//! family: the embedded SQLite backend uses a single shared connection
//! with three pragmas applied on connect, the networked PostgreSQL
//! backend uses true pooling with verify-before-use and hourly recycle.

pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use sqlx::any::{AnyPoolOptions, install_default_drivers};
use sqlx::{AnyConnection, AnyPool};

use crate::config::{BackendFamily, Settings};
use crate::error::CoreError;

/// Recycle networked connections after this long to avoid stale ones.
const CONNECTION_MAX_LIFETIME: Duration = Duration::from_secs(3600);

/// Pool observability snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolInfo {
    /// Connections currently open (idle + checked out).
    pub size: u32,
    /// Connections idle in the pool.
    pub idle: u32,
    /// Connections currently checked out by sessions.
    pub checked_out: u32,
}

/// Owns the process-wide connection pool and mediates all transactional
/// access to it.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pool: AnyPool,
    settings: Arc<Settings>,
    family: BackendFamily,
}

impl SessionManager {
    /// Opens the pool described by the settings snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError`] if the backend cannot be reached.
    pub async fn connect(settings: Arc<Settings>) -> Result<Self, CoreError> {
        install_default_drivers();

        let family = settings.backend_family();
        let url = settings.effective_database_url().to_string();

        let options = AnyPoolOptions::new()
            .acquire_timeout(Duration::from_secs(settings.db_pool_timeout_secs));

        let options = match family {
            BackendFamily::Embedded => {
                // Single shared connection, serialized access.
                options.max_connections(1).after_connect(|conn, _meta| {
                    Box::pin(async move {
                        sqlx::query("PRAGMA foreign_keys = ON")
                            .execute(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA journal_mode = WAL")
                            .fetch_optional(&mut *conn)
                            .await?;
                        sqlx::query("PRAGMA synchronous = NORMAL")
                            .execute(&mut *conn)
                            .await?;
                        Ok(())
                    })
                })
            }
            BackendFamily::Networked => options
                .max_connections(settings.db_pool_size + settings.db_max_overflow)
                .test_before_acquire(true)
                .max_lifetime(CONNECTION_MAX_LIFETIME),
        };

        let pool = options.connect(&url).await.map_err(map_pool_error)?;
        tracing::info!(backend = ?family, "database pool opened");

        Ok(Self {
            pool,
            settings,
            family,
        })
    }

    /// Backend family this manager was opened against.
    #[must_use]
    pub fn family(&self) -> BackendFamily {
        self.family
    }

    /// Runs `op` inside a scoped transactional session.
    ///
    /// Acquires a connection (blocking up to the configured timeout),
    /// opens a transaction and invokes `op`. On `Ok` the transaction is
    /// committed; on `Err` it is rolled back, the error logged with
    /// context, and the original error re-raised unchanged. The
    /// connection returns to the pool on every exit path — including
    /// cancellation, where the dropped transaction rolls back.
    ///
    /// # Errors
    ///
    /// [`CoreError::PoolExhausted`] when acquisition times out,
    /// [`CoreError::Session`] on commit failure, or whatever `op`
    /// returned.
    pub async fn with_session<T, F>(&self, op: F) -> Result<T, CoreError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T, CoreError>> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(map_pool_error)?;
        tracing::debug!("session opened");

        match op(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(CoreError::Session)?;
                tracing::debug!("session committed");
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::warn!(error = %rollback_error, "session rollback failed");
                } else {
                    tracing::debug!("session rolled back");
                }
                tracing::error!(error = %error, "session operation failed");
                Err(error)
            }
        }
    }

    /// Creates all declared tables. Idempotent: safe to call when the
    /// tables already exist.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError`] on a database failure.
    pub async fn init_schema(&self) -> Result<(), CoreError> {
        self.with_session(|conn| {
            Box::pin(async move {
                for statement in schema::CREATE_TABLES {
                    sqlx::query(statement)
                        .execute(&mut *conn)
                        .await
                        .map_err(CoreError::Session)?;
                }
                Ok(())
            })
        })
        .await?;
        tracing::info!("database schema initialized");
        Ok(())
    }

    /// Removes all declared tables. Destructive: intended for test
    /// teardown only.
    ///
    /// # Errors
    ///
    /// [`CoreError::Permission`] outside testing mode, or a
    /// [`CoreError`] on a database failure.
    pub async fn drop_schema(&self) -> Result<(), CoreError> {
        if !self.settings.is_testing() {
            return Err(CoreError::Permission(
                "drop_schema is only available in testing mode".to_string(),
            ));
        }
        self.with_session(|conn| {
            Box::pin(async move {
                for statement in schema::DROP_TABLES {
                    sqlx::query(statement)
                        .execute(&mut *conn)
                        .await
                        .map_err(CoreError::Session)?;
                }
                Ok(())
            })
        })
        .await?;
        tracing::warn!("database schema dropped");
        Ok(())
    }

    /// Runs a trivial round-trip query against the backend.
    ///
    /// Never propagates: an underlying error is logged and reported as
    /// `false`.
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(error) => {
                tracing::error!(error = %error, "database health check failed");
                false
            }
        }
    }

    /// Current pool size and checked-out count for observability.
    #[must_use]
    pub fn pool_info(&self) -> PoolInfo {
        let size = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        PoolInfo {
            size,
            idle,
            checked_out: size.saturating_sub(idle),
        }
    }

    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("database pool closed");
    }
}

fn map_pool_error(error: sqlx::Error) -> CoreError {
    match error {
        sqlx::Error::PoolTimedOut => CoreError::PoolExhausted,
        other => CoreError::Session(other),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    async fn test_manager(pool_timeout_secs: &str) -> SessionManager {
        let timeout = pool_timeout_secs.to_string();
        let Ok(settings) = Settings::from_source(move |key| match key {
            "TESTING" => Some("true".to_string()),
            "DB_POOL_TIMEOUT" => Some(timeout.clone()),
            _ => None,
        }) else {
            panic!("settings must resolve");
        };
        let Ok(manager) = SessionManager::connect(Arc::new(settings)).await else {
            panic!("in-memory pool must open");
        };
        manager
    }

    async fn zone_count(manager: &SessionManager) -> i64 {
        let Ok(count) = manager
            .with_session(|conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM zones")
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(CoreError::Session)
                })
            })
            .await
        else {
            panic!("count query must succeed");
        };
        count
    }

    #[tokio::test]
    async fn committed_write_is_visible_to_next_session() {
        let manager = test_manager("30").await;
        let Ok(()) = manager.init_schema().await else {
            panic!("schema init");
        };

        let result = manager
            .with_session(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO zones (id, name) VALUES ('z1', 'North Field')")
                        .execute(&mut *conn)
                        .await
                        .map_err(CoreError::Session)?;
                    Ok(())
                })
            })
            .await;
        assert!(result.is_ok());

        assert_eq!(zone_count(&manager).await, 1);
    }

    #[tokio::test]
    async fn failed_session_rolls_back_and_releases_connection() {
        let manager = test_manager("30").await;
        let Ok(()) = manager.init_schema().await else {
            panic!("schema init");
        };
        let before = manager.pool_info().checked_out;

        let result: Result<(), CoreError> = manager
            .with_session(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO zones (id, name) VALUES ('z2', 'South Field')")
                        .execute(&mut *conn)
                        .await
                        .map_err(CoreError::Session)?;
                    Err(CoreError::Internal("mid-operation failure".to_string()))
                })
            })
            .await;

        let Err(CoreError::Internal(message)) = result else {
            panic!("original error must be re-raised unchanged");
        };
        assert_eq!(message, "mid-operation failure");
        assert_eq!(zone_count(&manager).await, 0);
        assert_eq!(manager.pool_info().checked_out, before);
    }

    #[tokio::test]
    async fn init_schema_is_idempotent() {
        let manager = test_manager("30").await;
        let Ok(()) = manager.init_schema().await else {
            panic!("first init");
        };
        let Ok(()) = manager.init_schema().await else {
            panic!("second init");
        };
        assert_eq!(zone_count(&manager).await, 0);
    }

    #[tokio::test]
    async fn drop_schema_requires_testing_mode() {
        let Ok(settings) = Settings::from_source(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            _ => None,
        }) else {
            panic!("settings must resolve");
        };
        assert!(!settings.is_testing());
        let Ok(manager) = SessionManager::connect(Arc::new(settings)).await else {
            panic!("pool must open");
        };

        assert!(matches!(
            manager.drop_schema().await,
            Err(CoreError::Permission(_))
        ));
    }

    #[tokio::test]
    async fn drop_schema_removes_tables_in_testing_mode() {
        let manager = test_manager("30").await;
        let Ok(()) = manager.init_schema().await else {
            panic!("schema init");
        };
        let Ok(()) = manager.drop_schema().await else {
            panic!("drop must succeed in testing mode");
        };

        let result: Result<i64, CoreError> = manager
            .with_session(|conn| {
                Box::pin(async move {
                    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM zones")
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(CoreError::Session)
                })
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn exhausted_pool_times_out_with_pool_exhausted() {
        let manager = test_manager("1").await;
        let Ok(()) = manager.init_schema().await else {
            panic!("schema init");
        };

        let inner = manager.clone();
        let result: Result<(), CoreError> = manager
            .with_session(move |_conn| {
                Box::pin(async move {
                    // The single embedded connection is held by the outer
                    // session, so a nested acquisition must time out.
                    inner.with_session(|_| Box::pin(async { Ok(()) })).await
                })
            })
            .await;

        assert!(matches!(result, Err(CoreError::PoolExhausted)));
    }

    #[tokio::test]
    async fn health_check_round_trips() {
        let manager = test_manager("30").await;
        assert!(manager.health_check().await);
    }
}
