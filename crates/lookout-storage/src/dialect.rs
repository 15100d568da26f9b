//! SQL dialect strategy, chosen once at connection time.
//!
//! Timestamps are stored as UTC epoch seconds, so expiry arithmetic is plain
//! integer comparison and identical on both backends. What remains
//! dialect-specific is the insert-or-ignore idiom, the schema DDL, and the
//! local-time hour-bucket expression used by the stats query.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("mysql:") {
            Dialect::MySql
        } else {
            Dialect::Sqlite
        }
    }

    /// Prefix for an insert that is a no-op on primary-key conflict.
    pub fn insert_ignore(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "INSERT OR IGNORE",
            Dialect::MySql => "INSERT IGNORE",
        }
    }

    /// Expression yielding the two-digit local-time hour of an epoch-seconds
    /// column, as text.
    pub fn hour_bucket_expr(&self, column: &str) -> String {
        match self {
            Dialect::Sqlite => {
                format!("strftime('%H', datetime({column}, 'unixepoch', 'localtime'))")
            }
            Dialect::MySql => format!("DATE_FORMAT(FROM_UNIXTIME({column}), '%H')"),
        }
    }

    /// Table DDL, executed in order at startup.
    pub fn schema_statements(&self) -> &'static [&'static str] {
        match self {
            Dialect::Sqlite => &[
                "CREATE TABLE IF NOT EXISTS alert_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    alert_id TEXT NOT NULL,
                    rule_name TEXT NOT NULL,
                    level TEXT NOT NULL,
                    message TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    data TEXT,
                    count INTEGER NOT NULL,
                    matches INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE TABLE IF NOT EXISTS rule_leases (
                    rule_name TEXT PRIMARY KEY,
                    holder TEXT NOT NULL DEFAULT '',
                    acquired_at INTEGER,
                    ttl_seconds INTEGER NOT NULL DEFAULT 30
                )",
                "CREATE TABLE IF NOT EXISTS alert_dedupe (
                    dedupe_key TEXT PRIMARY KEY,
                    rule_name TEXT NOT NULL,
                    level TEXT NOT NULL,
                    message_hash TEXT NOT NULL,
                    last_sent INTEGER NOT NULL,
                    ttl_seconds INTEGER NOT NULL DEFAULT 120
                )",
                "CREATE TABLE IF NOT EXISTS user_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT UNIQUE NOT NULL,
                    username TEXT NOT NULL,
                    role TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                )",
            ],
            Dialect::MySql => &[
                "CREATE TABLE IF NOT EXISTS alert_history (
                    id BIGINT AUTO_INCREMENT PRIMARY KEY,
                    alert_id VARCHAR(191) NOT NULL,
                    rule_name VARCHAR(255) NOT NULL,
                    level VARCHAR(32) NOT NULL,
                    message TEXT NOT NULL,
                    timestamp BIGINT NOT NULL,
                    data TEXT,
                    count BIGINT NOT NULL,
                    matches BIGINT NOT NULL,
                    created_at BIGINT NOT NULL
                )",
                "CREATE TABLE IF NOT EXISTS rule_leases (
                    rule_name VARCHAR(255) PRIMARY KEY,
                    holder VARCHAR(255) NOT NULL DEFAULT '',
                    acquired_at BIGINT NULL,
                    ttl_seconds BIGINT NOT NULL DEFAULT 30
                )",
                "CREATE TABLE IF NOT EXISTS alert_dedupe (
                    dedupe_key VARCHAR(255) PRIMARY KEY,
                    rule_name VARCHAR(255) NOT NULL,
                    level VARCHAR(32) NOT NULL,
                    message_hash VARCHAR(64) NOT NULL,
                    last_sent BIGINT NOT NULL,
                    ttl_seconds BIGINT NOT NULL DEFAULT 120
                )",
                "CREATE TABLE IF NOT EXISTS user_sessions (
                    id BIGINT AUTO_INCREMENT PRIMARY KEY,
                    session_id VARCHAR(191) UNIQUE NOT NULL,
                    username VARCHAR(255) NOT NULL,
                    role VARCHAR(32) NOT NULL,
                    created_at BIGINT NOT NULL,
                    expires_at BIGINT NOT NULL
                )",
            ],
        }
    }

    /// Index DDL. MySQL has no IF NOT EXISTS for indexes, so callers tolerate
    /// duplicate-index errors on re-run.
    pub fn index_statements(&self) -> &'static [&'static str] {
        match self {
            Dialect::Sqlite => &[
                "CREATE INDEX IF NOT EXISTS idx_alert_id ON alert_history(alert_id)",
                "CREATE INDEX IF NOT EXISTS idx_rule_name ON alert_history(rule_name)",
                "CREATE INDEX IF NOT EXISTS idx_level ON alert_history(level)",
                "CREATE INDEX IF NOT EXISTS idx_timestamp ON alert_history(timestamp)",
                "CREATE INDEX IF NOT EXISTS idx_session_id ON user_sessions(session_id)",
            ],
            Dialect::MySql => &[
                "CREATE INDEX idx_alert_id ON alert_history(alert_id)",
                "CREATE INDEX idx_rule_name ON alert_history(rule_name)",
                "CREATE INDEX idx_level ON alert_history(level)",
                "CREATE INDEX idx_timestamp ON alert_history(timestamp)",
                "CREATE INDEX idx_session_id ON user_sessions(session_id)",
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_from_url_scheme() {
        assert_eq!(Dialect::from_url("sqlite://data/lookout.db?mode=rwc"), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("mysql://u:p@db:3306/lookout"), Dialect::MySql);
    }

    #[test]
    fn insert_ignore_idiom_differs() {
        assert_eq!(Dialect::Sqlite.insert_ignore(), "INSERT OR IGNORE");
        assert_eq!(Dialect::MySql.insert_ignore(), "INSERT IGNORE");
    }
}
