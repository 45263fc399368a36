//! System endpoints: health check and service info.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, extract::State};
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::lifecycle::{ServiceStatus, Stage};

/// External health payload. Per-service statuses are collapsed to an
/// OK/ERROR pair; the richer per-stage records stay internal.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
    services: ServicesSummary,
    timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    not_ready: Vec<&'static str>,
}

/// Collapsed per-dependency statuses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServicesSummary {
    database: &'static str,
    cache: &'static str,
    message_bus: &'static str,
}

fn collapse(status: Option<ServiceStatus>) -> &'static str {
    match status {
        Some(ServiceStatus::Ready) => "OK",
        _ => "ERROR",
    }
}

/// `GET /health` — aggregate dependency health.
///
/// Returns 200 when every dependency is ready, 503 otherwise; the
/// non-ready subset is named explicitly rather than collapsed into a
/// single boolean.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.orchestrator.health().await;
    let status_of = |stage: Stage| report.services.get(&stage).map(|r| r.status);

    let body = HealthResponse {
        status: if report.ok { "OK" } else { "ERROR" },
        version: state.settings.version.clone(),
        services: ServicesSummary {
            database: collapse(status_of(Stage::Database)),
            cache: collapse(status_of(Stage::Cache)),
            message_bus: collapse(status_of(Stage::MessageBus)),
        },
        timestamp: Utc::now().to_rfc3339(),
        not_ready: report.not_ready.iter().map(Stage::as_str).collect(),
    };

    let code = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// Service info returned at the root.
#[derive(Debug, Serialize)]
struct RootResponse {
    message: String,
    version: String,
    status: &'static str,
}

/// `GET /` — basic service identity.
pub async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(RootResponse {
            message: state.settings.app_name.clone(),
            version: state.settings.version.clone(),
            status: "active",
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    use crate::config::Settings;
    use crate::db::SessionManager;
    use crate::error::CoreError;
    use crate::lifecycle::{ManagedService, Orchestrator};

    struct AlwaysUp(Stage);

    #[async_trait]
    impl ManagedService for AlwaysUp {
        fn stage(&self) -> Stage {
            self.0
        }
        async fn start(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), CoreError> {
            Ok(())
        }
        async fn ping(&self) -> bool {
            true
        }
    }

    async fn state_with(orchestrator: Orchestrator) -> AppState {
        let Ok(settings) = Settings::from_source(|key| match key {
            "TESTING" => Some("true".to_string()),
            _ => None,
        }) else {
            panic!("settings must resolve");
        };
        let settings = Arc::new(settings);
        let Ok(sessions) = SessionManager::connect(Arc::clone(&settings)).await else {
            panic!("in-memory pool must open");
        };
        AppState {
            settings,
            orchestrator: Arc::new(orchestrator),
            sessions,
        }
    }

    #[tokio::test]
    async fn health_collapses_to_ok_when_all_ready() {
        let orchestrator = Orchestrator::new(vec![
            Arc::new(AlwaysUp(Stage::Database)),
            Arc::new(AlwaysUp(Stage::Cache)),
            Arc::new(AlwaysUp(Stage::MessageBus)),
            Arc::new(AlwaysUp(Stage::Scheduler)),
        ]);
        let Ok(()) = orchestrator.startup().await else {
            panic!("startup must succeed");
        };
        let app = routes().with_state(state_with(orchestrator).await);

        let Ok(request) = axum::http::Request::builder().uri("/health").body(axum::body::Body::empty())
        else {
            panic!("request");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("handler must respond");
        };
        assert_eq!(response.status(), StatusCode::OK);

        let Ok(collected) = response.into_body().collect().await else {
            panic!("body");
        };
        let Ok(body) = serde_json::from_slice::<serde_json::Value>(&collected.to_bytes())
        else {
            panic!("json body");
        };
        assert_eq!(body.get("status"), Some(&serde_json::json!("OK")));
        let Some(services) = body.get("services") else {
            panic!("services present");
        };
        assert_eq!(services.get("database"), Some(&serde_json::json!("OK")));
        assert_eq!(services.get("cache"), Some(&serde_json::json!("OK")));
        assert_eq!(services.get("messageBus"), Some(&serde_json::json!("OK")));
        assert!(body.get("not_ready").is_none());
    }

    #[tokio::test]
    async fn health_reports_unstarted_dependencies_as_error() {
        let orchestrator = Orchestrator::new(vec![
            Arc::new(AlwaysUp(Stage::Database)),
            Arc::new(AlwaysUp(Stage::Cache)),
            Arc::new(AlwaysUp(Stage::MessageBus)),
            Arc::new(AlwaysUp(Stage::Scheduler)),
        ]);
        // No startup: everything is still NotStarted.
        let app = routes().with_state(state_with(orchestrator).await);

        let Ok(request) = axum::http::Request::builder().uri("/health").body(axum::body::Body::empty())
        else {
            panic!("request");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("handler must respond");
        };
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let Ok(collected) = response.into_body().collect().await else {
            panic!("body");
        };
        let Ok(body) = serde_json::from_slice::<serde_json::Value>(&collected.to_bytes())
        else {
            panic!("json body");
        };
        assert_eq!(body.get("status"), Some(&serde_json::json!("ERROR")));
        let Some(not_ready) = body.get("not_ready").and_then(|v| v.as_array()) else {
            panic!("not_ready listed");
        };
        assert_eq!(not_ready.len(), 4);
    }
}
