//! HTTP surface: router composition for the system endpoints.
//!
//! Endpoint business logic lives with its collaborators; the core only
//! serves the health surface and service identity.

pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Builds the router with the system endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new().merge(system::routes())
}
