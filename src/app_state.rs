//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::Settings;
use crate::db::SessionManager;
use crate::lifecycle::Orchestrator;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Immutable settings snapshot resolved at startup.
    pub settings: Arc<Settings>,
    /// Lifecycle orchestrator, read for health reporting.
    pub orchestrator: Arc<Orchestrator>,
    /// Session manager for request-scoped units of database work.
    pub sessions: SessionManager,
}
