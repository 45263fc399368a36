//! Declared tables for the irrigation data model.
//!
//! Statements are written in the portable subset accepted by both
//! backend families (SQLite and PostgreSQL).

/// Idempotent table creation, in dependency order.
pub const CREATE_TABLES: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS zones (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS sensor_readings (
        id TEXT PRIMARY KEY,
        zone_id TEXT NOT NULL REFERENCES zones(id),
        kind TEXT NOT NULL,
        value DOUBLE PRECISION NOT NULL,
        recorded_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS irrigation_events (
        id TEXT PRIMARY KEY,
        zone_id TEXT NOT NULL REFERENCES zones(id),
        started_at TEXT NOT NULL,
        duration_secs INTEGER NOT NULL,
        trigger_kind TEXT NOT NULL
    )",
];

/// Destructive table removal, reverse dependency order.
pub const DROP_TABLES: [&str; 3] = [
    "DROP TABLE IF EXISTS irrigation_events",
    "DROP TABLE IF EXISTS sensor_readings",
    "DROP TABLE IF EXISTS zones",
];
