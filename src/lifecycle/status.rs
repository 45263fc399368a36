//! Per-dependency status records and the board that owns them.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A managed dependency, in startup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Relational database pool.
    Database,
    /// Cache / session store client.
    Cache,
    /// IoT message-bus client.
    MessageBus,
    /// Periodic task scheduler.
    Scheduler,
}

impl Stage {
    /// All stages in startup order.
    pub const ALL: [Self; 4] = [Self::Database, Self::Cache, Self::MessageBus, Self::Scheduler];

    /// Stable identifier used in logs and payloads.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Cache => "cache",
            Self::MessageBus => "message_bus",
            Self::Scheduler => "scheduler",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency lifecycle state.
///
/// `NotStarted → Starting → {Ready | Failed}`; `Ready → {Degraded |
/// Stopped}`; `Degraded → {Ready | Failed | Stopped}`. `Failed` and
/// `Stopped` are terminal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Startup has not reached this stage.
    NotStarted,
    /// Connect/init in progress.
    Starting,
    /// Live and healthy.
    Ready,
    /// Live but failing health probes.
    Degraded,
    /// Startup failed; terminal for this run.
    Failed,
    /// Torn down; terminal for this run.
    Stopped,
}

impl ServiceStatus {
    /// Whether the stage was at least attempted and may need teardown.
    #[must_use]
    pub const fn reached_starting(&self) -> bool {
        matches!(self, Self::Starting | Self::Ready | Self::Degraded | Self::Failed)
    }

    /// Whether the transition to `next` is allowed by the state machine.
    ///
    /// `Failed` and `Stopped` are terminal, with one exit: `Failed →
    /// Stopped`, because a failed start may still hold partial resources
    /// that teardown must release.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Starting)
                | (Self::Starting, Self::Ready | Self::Failed)
                | (Self::Ready, Self::Degraded | Self::Stopped)
                | (Self::Degraded, Self::Ready | Self::Failed | Self::Stopped)
                // Best-effort teardown still marks an attempted stage.
                | (Self::Starting | Self::Failed, Self::Stopped)
        )
    }
}

/// Last known status of one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    /// Current lifecycle state.
    pub status: ServiceStatus,
    /// Error text from the last failed transition, if any.
    pub last_error: Option<String>,
    /// When the status last changed.
    pub changed_at: DateTime<Utc>,
}

impl StatusRecord {
    fn new() -> Self {
        Self {
            status: ServiceStatus::NotStarted,
            last_error: None,
            changed_at: Utc::now(),
        }
    }
}

/// Holds one [`StatusRecord`] per stage. Mutated only by the lifecycle
/// orchestrator; read by the health surface.
#[derive(Debug)]
pub struct StatusBoard {
    records: RwLock<BTreeMap<Stage, StatusRecord>>,
}

impl StatusBoard {
    /// A board with every stage at `NotStarted`.
    #[must_use]
    pub fn new() -> Self {
        let records = Stage::ALL.iter().map(|s| (*s, StatusRecord::new())).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Records a status change, keeping the transition timestamp.
    ///
    /// An illegal transition is logged and ignored rather than applied.
    pub(crate) fn transition(
        &self,
        stage: Stage,
        next: ServiceStatus,
        last_error: Option<String>,
    ) {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = guard.entry(stage).or_insert_with(StatusRecord::new);
        if !record.status.can_transition_to(next) {
            tracing::warn!(
                %stage,
                from = ?record.status,
                to = ?next,
                "illegal status transition ignored"
            );
            return;
        }
        record.status = next;
        record.last_error = last_error;
        record.changed_at = Utc::now();
    }

    /// Current record for one stage.
    #[must_use]
    pub fn record(&self, stage: Stage) -> StatusRecord {
        let guard = self.records.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&stage).cloned().unwrap_or_else(StatusRecord::new)
    }

    /// Snapshot of every stage's record.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Stage, StatusRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_follow_the_machine() {
        use ServiceStatus::{Degraded, Failed, NotStarted, Ready, Starting, Stopped};
        assert!(NotStarted.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Ready));
        assert!(Starting.can_transition_to(Failed));
        assert!(Ready.can_transition_to(Degraded));
        assert!(Degraded.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Stopped));

        // Terminal states: only a failed start may still be torn down.
        assert!(Failed.can_transition_to(Stopped));
        assert!(!NotStarted.can_transition_to(Ready));
        assert!(!Stopped.can_transition_to(Starting));
        assert!(!Failed.can_transition_to(Ready));
        assert!(!Stopped.can_transition_to(Stopped));
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let board = StatusBoard::new();
        board.transition(Stage::Cache, ServiceStatus::Ready, None);
        assert_eq!(board.record(Stage::Cache).status, ServiceStatus::NotStarted);
    }

    #[test]
    fn transition_updates_record_and_timestamp() {
        let board = StatusBoard::new();
        let before = board.record(Stage::Database).changed_at;
        board.transition(Stage::Database, ServiceStatus::Starting, None);
        board.transition(
            Stage::Database,
            ServiceStatus::Failed,
            Some("connection refused".to_string()),
        );
        let record = board.record(Stage::Database);
        assert_eq!(record.status, ServiceStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("connection refused"));
        assert!(record.changed_at >= before);
    }
}
