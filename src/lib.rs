//! # irrigation-core
//!
//! Resource-orchestration and session-management core of the smart
//! irrigation backend. This crate brings up and tears down the stateful
//! external dependencies — database pool, cache store, IoT message bus,
//! task scheduler — in a well-defined order, exposes a health surface
//! reflecting each dependency's live status, and guarantees that every
//! unit of database work runs inside a bounded, rollback-safe session.
//!
//! ## Architecture
//!
//! ```text
//! Settings (config/)
//!     │
//!     ├── Log pipeline (logging/)
//!     │
//!     ├── Orchestrator (lifecycle/)
//!     │       ├── DatabaseService ── SessionManager (db/)
//!     │       ├── CacheService (clients/)
//!     │       ├── MqttService (clients/)
//!     │       └── SchedulerService (clients/)
//!     │
//!     └── Health surface (api/)
//! ```
//!
//! Route business logic, auth, bus payload semantics, and job bodies
//! are external collaborators; the core starts, monitors, and shuts
//! them down.

pub mod api;
pub mod app_state;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod instrument;
pub mod lifecycle;
pub mod logging;
