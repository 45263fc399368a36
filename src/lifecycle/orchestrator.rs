//! Startup/shutdown sequencing across managed dependencies.
//!
//! Startup is strictly ordered (database → cache → message bus →
//! scheduler) and all-or-nothing: the first failure aborts the remaining
//! stages and the process never reports ready with an unstarted
//! dependency. Shutdown walks the attempted stages in reverse,
//! best-effort. Stages run sequentially by design; concurrent startup
//! would break failure attribution.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::instrument::timed;
use crate::lifecycle::status::{ServiceStatus, Stage, StatusBoard, StatusRecord};

/// A dependency the orchestrator can bring up, probe, and tear down.
///
/// Retries, if any, belong to the individual client behind this trait;
/// the orchestrator attempts each stage exactly once.
#[async_trait]
pub trait ManagedService: Send + Sync {
    /// Which stage this service occupies.
    fn stage(&self) -> Stage;

    /// Connects/initializes the dependency.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError`] when the dependency cannot be reached or
    /// initialized; the orchestrator records it against this stage.
    async fn start(&self) -> Result<(), CoreError>;

    /// Tears the dependency down.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError`] on a failed disconnect; shutdown logs it
    /// and continues with the remaining stages.
    async fn stop(&self) -> Result<(), CoreError>;

    /// Live round-trip probe. `true` means healthy.
    async fn ping(&self) -> bool;
}

/// Aggregate health, with the non-ready subset listed explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// True only when every stage is `Ready`.
    pub ok: bool,
    /// Full per-stage records.
    pub services: BTreeMap<Stage, StatusRecord>,
    /// Stages that are not `Ready`, by name.
    pub not_ready: Vec<Stage>,
    /// When the report was taken.
    pub timestamp: DateTime<Utc>,
}

/// Sequences the lifecycle of all managed dependencies and owns their
/// status records.
pub struct Orchestrator {
    services: Vec<Arc<dyn ManagedService>>,
    board: StatusBoard,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stages: Vec<Stage> = self.services.iter().map(|s| s.stage()).collect();
        f.debug_struct("Orchestrator")
            .field("stages", &stages)
            .finish()
    }
}

impl Orchestrator {
    /// Builds an orchestrator over services already in startup order.
    #[must_use]
    pub fn new(services: Vec<Arc<dyn ManagedService>>) -> Self {
        Self {
            services,
            board: StatusBoard::new(),
        }
    }

    /// Starts every stage in order, aborting at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StageStartup`] naming the failed stage; the
    /// stages after it are left `NotStarted`.
    pub async fn startup(&self) -> Result<(), CoreError> {
        for service in &self.services {
            let stage = service.stage();
            self.board.transition(stage, ServiceStatus::Starting, None);
            tracing::info!(%stage, "starting dependency");

            let operation = format!("start_{stage}");
            match timed(&operation, service.start()).await {
                Ok(()) => {
                    self.board.transition(stage, ServiceStatus::Ready, None);
                    tracing::info!(%stage, "dependency ready");
                }
                Err(error) => {
                    let message = error.to_string();
                    self.board
                        .transition(stage, ServiceStatus::Failed, Some(message.clone()));
                    tracing::error!(%stage, error = %message, "startup aborted");
                    return Err(CoreError::StageStartup { stage, message });
                }
            }
        }
        tracing::info!("all dependencies ready");
        Ok(())
    }

    /// Tears down, in reverse order, every stage that reached at least
    /// `Starting`. Best-effort: a failing teardown is logged and the
    /// remaining stages are still attempted.
    pub async fn shutdown(&self) {
        for service in self.services.iter().rev() {
            let stage = service.stage();
            if !self.board.record(stage).status.reached_starting() {
                continue;
            }
            tracing::info!(%stage, "stopping dependency");
            match service.stop().await {
                Ok(()) => {
                    self.board.transition(stage, ServiceStatus::Stopped, None);
                    tracing::info!(%stage, "dependency stopped");
                }
                Err(error) => {
                    let message = error.to_string();
                    self.board
                        .transition(stage, ServiceStatus::Stopped, Some(message.clone()));
                    tracing::error!(%stage, error = %message, "teardown failed, continuing");
                }
            }
        }
        tracing::info!("shutdown complete");
    }

    /// Probes every live stage and updates `Ready`/`Degraded`
    /// accordingly. Terminal stages are left untouched.
    pub async fn refresh(&self) {
        for service in &self.services {
            let stage = service.stage();
            let current = self.board.record(stage).status;
            if !matches!(current, ServiceStatus::Ready | ServiceStatus::Degraded) {
                continue;
            }
            let healthy = service.ping().await;
            match (current, healthy) {
                (ServiceStatus::Ready, false) => {
                    self.board.transition(
                        stage,
                        ServiceStatus::Degraded,
                        Some("health probe failed".to_string()),
                    );
                    tracing::warn!(%stage, "dependency degraded");
                }
                (ServiceStatus::Degraded, true) => {
                    self.board.transition(stage, ServiceStatus::Ready, None);
                    tracing::info!(%stage, "dependency recovered");
                }
                _ => {}
            }
        }
    }

    /// Refreshes live stages, then aggregates. OK only when every stage
    /// is `Ready`; otherwise the non-ready subset is named explicitly.
    pub async fn health(&self) -> HealthReport {
        self.refresh().await;
        let services = self.board.snapshot();
        let not_ready: Vec<Stage> = services
            .iter()
            .filter(|(_, record)| record.status != ServiceStatus::Ready)
            .map(|(stage, _)| *stage)
            .collect();
        HealthReport {
            ok: not_ready.is_empty(),
            services,
            not_ready,
            timestamp: Utc::now(),
        }
    }

    /// Current record for one stage.
    #[must_use]
    pub fn record(&self, stage: Stage) -> StatusRecord {
        self.board.record(stage)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubService {
        stage: Stage,
        fail_start: bool,
        fail_stop: bool,
        healthy: AtomicBool,
        log: Arc<Mutex<Vec<(Stage, &'static str)>>>,
    }

    impl StubService {
        fn new(stage: Stage, log: Arc<Mutex<Vec<(Stage, &'static str)>>>) -> Arc<Self> {
            Arc::new(Self {
                stage,
                fail_start: false,
                fail_stop: false,
                healthy: AtomicBool::new(true),
                log,
            })
        }

        fn failing_start(stage: Stage, log: Arc<Mutex<Vec<(Stage, &'static str)>>>) -> Arc<Self> {
            Arc::new(Self {
                stage,
                fail_start: true,
                fail_stop: false,
                healthy: AtomicBool::new(true),
                log,
            })
        }

        fn failing_stop(stage: Stage, log: Arc<Mutex<Vec<(Stage, &'static str)>>>) -> Arc<Self> {
            Arc::new(Self {
                stage,
                fail_start: false,
                fail_stop: true,
                healthy: AtomicBool::new(true),
                log,
            })
        }

        fn record(&self, action: &'static str) {
            if let Ok(mut log) = self.log.lock() {
                log.push((self.stage, action));
            }
        }
    }

    #[async_trait]
    impl ManagedService for StubService {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn start(&self) -> Result<(), CoreError> {
            self.record("start");
            if self.fail_start {
                return Err(CoreError::Internal("connect refused".to_string()));
            }
            Ok(())
        }

        async fn stop(&self) -> Result<(), CoreError> {
            self.record("stop");
            if self.fail_stop {
                return Err(CoreError::Internal("disconnect failed".to_string()));
            }
            Ok(())
        }

        async fn ping(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    fn four_stage_setup(
        cache_fails_start: bool,
        bus_fails_stop: bool,
    ) -> (Orchestrator, Arc<Mutex<Vec<(Stage, &'static str)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let database = StubService::new(Stage::Database, Arc::clone(&log));
        let cache = if cache_fails_start {
            StubService::failing_start(Stage::Cache, Arc::clone(&log))
        } else {
            StubService::new(Stage::Cache, Arc::clone(&log))
        };
        let bus = if bus_fails_stop {
            StubService::failing_stop(Stage::MessageBus, Arc::clone(&log))
        } else {
            StubService::new(Stage::MessageBus, Arc::clone(&log))
        };
        let scheduler = StubService::new(Stage::Scheduler, Arc::clone(&log));
        let orchestrator = Orchestrator::new(vec![database, cache, bus, scheduler]);
        (orchestrator, log)
    }

    #[tokio::test]
    async fn startup_runs_in_declared_order() {
        let (orchestrator, log) = four_stage_setup(false, false);
        let Ok(()) = orchestrator.startup().await else {
            panic!("startup must succeed");
        };
        let Ok(entries) = log.lock() else {
            panic!("log lock");
        };
        let stages: Vec<Stage> = entries.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            vec![Stage::Database, Stage::Cache, Stage::MessageBus, Stage::Scheduler]
        );
        for stage in Stage::ALL {
            assert_eq!(orchestrator.record(stage).status, ServiceStatus::Ready);
        }
    }

    #[tokio::test]
    async fn cache_failure_aborts_before_scheduler() {
        let (orchestrator, log) = four_stage_setup(true, false);
        let Err(CoreError::StageStartup { stage, .. }) = orchestrator.startup().await else {
            panic!("startup must fail at the cache stage");
        };
        assert_eq!(stage, Stage::Cache);

        assert_eq!(orchestrator.record(Stage::Database).status, ServiceStatus::Ready);
        assert_eq!(orchestrator.record(Stage::Cache).status, ServiceStatus::Failed);
        assert_eq!(
            orchestrator.record(Stage::MessageBus).status,
            ServiceStatus::NotStarted
        );
        assert_eq!(
            orchestrator.record(Stage::Scheduler).status,
            ServiceStatus::NotStarted
        );

        let Ok(entries) = log.lock() else {
            panic!("log lock");
        };
        assert!(!entries.iter().any(|(s, _)| *s == Stage::Scheduler));
    }

    #[tokio::test]
    async fn shutdown_is_reverse_ordered_and_best_effort() {
        let (orchestrator, log) = four_stage_setup(false, true);
        let Ok(()) = orchestrator.startup().await else {
            panic!("startup must succeed");
        };
        orchestrator.shutdown().await;

        let Ok(entries) = log.lock() else {
            panic!("log lock");
        };
        let stops: Vec<Stage> = entries
            .iter()
            .filter(|(_, action)| *action == "stop")
            .map(|(s, _)| *s)
            .collect();
        // The bus disconnect raised, yet cache and database teardown ran.
        assert_eq!(
            stops,
            vec![Stage::Scheduler, Stage::MessageBus, Stage::Cache, Stage::Database]
        );

        for stage in Stage::ALL {
            assert_eq!(orchestrator.record(stage).status, ServiceStatus::Stopped);
        }
        assert!(orchestrator.record(Stage::MessageBus).last_error.is_some());
    }

    #[tokio::test]
    async fn partial_startup_only_tears_down_attempted_stages() {
        let (orchestrator, log) = four_stage_setup(true, false);
        let _ = orchestrator.startup().await;
        orchestrator.shutdown().await;

        let Ok(entries) = log.lock() else {
            panic!("log lock");
        };
        let stops: Vec<Stage> = entries
            .iter()
            .filter(|(_, action)| *action == "stop")
            .map(|(s, _)| *s)
            .collect();
        assert_eq!(stops, vec![Stage::Cache, Stage::Database]);
    }

    #[tokio::test]
    async fn health_reports_the_degraded_subset() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let database = StubService::new(Stage::Database, Arc::clone(&log));
        let cache = StubService::new(Stage::Cache, Arc::clone(&log));
        let bus = StubService::new(Stage::MessageBus, Arc::clone(&log));
        let scheduler = StubService::new(Stage::Scheduler, Arc::clone(&log));
        let cache_handle = Arc::clone(&cache);
        let orchestrator = Orchestrator::new(vec![database, cache, bus, scheduler]);

        let Ok(()) = orchestrator.startup().await else {
            panic!("startup must succeed");
        };
        let report = orchestrator.health().await;
        assert!(report.ok);
        assert!(report.not_ready.is_empty());

        cache_handle.healthy.store(false, Ordering::SeqCst);
        let report = orchestrator.health().await;
        assert!(!report.ok);
        assert_eq!(report.not_ready, vec![Stage::Cache]);
        assert_eq!(orchestrator.record(Stage::Cache).status, ServiceStatus::Degraded);

        cache_handle.healthy.store(true, Ordering::SeqCst);
        let report = orchestrator.health().await;
        assert!(report.ok);
    }
}
