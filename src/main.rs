//! irrigation-core server entry point.
//!
//! Resolves configuration, installs the log pipeline, sequences the
//! dependency startup, and serves the health surface until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use irrigation_core::api;
use irrigation_core::app_state::AppState;
use irrigation_core::clients::{
    CacheService, DatabaseService, MqttService, ScheduledJob, SchedulerService,
};
use irrigation_core::config::Settings;
use irrigation_core::lifecycle::{ManagedService, Orchestrator};
use irrigation_core::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::shared().context("configuration resolution failed")?;
    let _guard = logging::init_logging(&settings)?;

    tracing::info!(
        environment = %settings.environment,
        addr = %settings.listen_addr,
        "starting irrigation-core"
    );
    let resolved = logging::mask_sensitive(&serde_json::json!({
        "database_url": settings.effective_database_url(),
        "redis_url": settings.redis_url,
        "mqtt_host": settings.mqtt_host,
        "mqtt_username": settings.mqtt_username,
        "mqtt_password": settings.mqtt_password,
        "secret_key": settings.secret_key,
    }));
    tracing::debug!(config = %resolved, "resolved configuration");

    // Managed dependencies, in startup order.
    let database = Arc::new(DatabaseService::new(Arc::clone(&settings)));
    let cache = Arc::new(CacheService::new(settings.redis_url.clone()));
    let mqtt = Arc::new(MqttService::new(Arc::clone(&settings)));
    let scheduler = Arc::new(SchedulerService::new(maintenance_jobs(&database)));

    let orchestrator = Arc::new(Orchestrator::new(vec![
        Arc::clone(&database) as Arc<dyn ManagedService>,
        Arc::clone(&cache) as Arc<dyn ManagedService>,
        Arc::clone(&mqtt) as Arc<dyn ManagedService>,
        Arc::clone(&scheduler) as Arc<dyn ManagedService>,
    ]));

    if let Err(error) = orchestrator.startup().await {
        tracing::error!(error = %error, "startup failed, tearing down");
        orchestrator.shutdown().await;
        return Err(error.into());
    }

    let sessions = database
        .manager()
        .await
        .context("database stage ready but no session manager")?;

    let app_state = AppState {
        settings: Arc::clone(&settings),
        orchestrator: Arc::clone(&orchestrator),
        sessions,
    };

    let app = api::build_router()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer(&settings))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(settings.listen_addr)
        .await
        .context("failed to bind listen address")?;
    tracing::info!(addr = %settings.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    orchestrator.shutdown().await;
    Ok(())
}

/// CORS restricted to the configured origins. An origin that cannot be
/// parsed as a header value is dropped with a warning; if none survive,
/// the allow-list stays empty rather than widening to permissive.
fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = parse_cors_origins(&settings.cors_origins);
    if origins.is_empty() {
        tracing::warn!("no valid CORS origins configured, cross-origin requests are denied");
    }
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

fn parse_cors_origins(configured: &[String]) -> Vec<HeaderValue> {
    configured
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%origin, %error, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect()
}

/// Periodic maintenance jobs handed to the scheduler stage. Domain job
/// definitions are registered by the irrigation services on top of
/// this.
fn maintenance_jobs(database: &Arc<DatabaseService>) -> Vec<ScheduledJob> {
    let database = Arc::clone(database);
    vec![ScheduledJob::new(
        "database_pool_report",
        Duration::from_secs(300),
        move || {
            let database = Arc::clone(&database);
            async move {
                if let Some(manager) = database.manager().await {
                    let info = manager.pool_info();
                    tracing::info!(
                        size = info.size,
                        checked_out = info.checked_out,
                        "pool status"
                    );
                }
                Ok(())
            }
        },
    )]
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for shutdown signal");
    } else {
        tracing::info!("shutdown signal received");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_cors_origins_are_dropped() {
        let configured = vec![
            "http://ok.example".to_string(),
            "http://bad.example\n".to_string(),
        ];
        let origins = parse_cors_origins(&configured);
        assert_eq!(origins, vec![HeaderValue::from_static("http://ok.example")]);
    }

    #[test]
    fn all_invalid_origins_leave_the_allow_list_empty() {
        let configured = vec!["http://bad\u{0}.example".to_string()];
        assert!(parse_cors_origins(&configured).is_empty());
    }
}
