//! Managed dependency clients, one per lifecycle stage.
//!
//! Each client implements [`crate::lifecycle::ManagedService`]: the
//! orchestrator brings them up in order, probes them, and tears them
//! down in reverse. Their payload-level APIs (cache reads, bus message
//! handling, job bodies) live with their consumers.

mod cache;
mod database;
mod mqtt;
mod scheduler;

pub use cache::CacheService;
pub use database::DatabaseService;
pub use mqtt::MqttService;
pub use scheduler::{ScheduledJob, SchedulerService};
