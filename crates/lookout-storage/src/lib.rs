//! Relational state store shared by all engine replicas.
//!
//! Four tables: alert history, rule leases, send-dedup keys, and user
//! sessions (owned by the web collaborator; only the primitives live here).
//! Two dialects are supported, an embedded SQLite file and a networked
//! MySQL server, behind one [`StateStore`] type; see [`dialect::Dialect`]
//! for what actually differs.
//!
//! The lease and dedup operations are the cross-replica coordination
//! primitives: `try_acquire_lease` serializes evaluations of one rule, and
//! `check_and_touch` makes emission of one logical alert at-most-once within
//! its TTL window.

pub mod dialect;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub use error::{Result, StorageError};
pub use store::StateStore;

/// One persisted alert, as read back from `alert_history`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertHistoryRow {
    pub id: i64,
    pub alert_id: String,
    pub rule_name: String,
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// JSON-serialized data snapshot; not decoded on the listing path.
    pub data: String,
    pub count: i64,
    pub matches: i64,
    pub created_at: DateTime<Utc>,
}

/// Single-alert detail with the data snapshot decoded.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertDetail {
    pub id: String,
    pub rule_name: String,
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub count: i64,
    pub matches: i64,
    pub data: Option<serde_json::Value>,
}

/// Aggregates backing the dashboard: totals, a level histogram, a local-time
/// hourly histogram, and the ten most recent alerts.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AlertStats {
    pub total_alerts: i64,
    pub level_stats: HashMap<String, i64>,
    pub hourly_stats: Vec<HourlyStat>,
    pub recent_alerts: Vec<AlertHistoryRow>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HourlyStat {
    pub hour: u32,
    pub count: i64,
}
