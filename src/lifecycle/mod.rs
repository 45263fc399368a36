//! Lifecycle orchestration: dependency state machine, status board,
//! and the startup/shutdown sequencer.

mod orchestrator;
mod status;

pub use orchestrator::{HealthReport, ManagedService, Orchestrator};
pub use status::{ServiceStatus, Stage, StatusBoard, StatusRecord};
