use chrono::Utc;
use sha1::{Digest, Sha1};
use std::fmt::Write;

use crate::error::Result;
use crate::store::StateStore;

fn sha1_hex(input: &str) -> String {
    let digest = Sha1::digest(input.as_bytes());
    let mut out = String::with_capacity(40);
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

impl StateStore {
    /// Cross-replica send-time dedup.
    ///
    /// The key is `rule|level|sha1(message)`. A placeholder row is inserted
    /// with `last_sent` already expired so the first attempt always wins;
    /// acquisition itself is a conditional update on the expiry bound, so two
    /// replicas racing the same key within the TTL cannot both get `true`.
    pub async fn check_and_touch(
        &self,
        rule_name: &str,
        level: &str,
        message: &str,
        ttl_secs: u64,
    ) -> Result<bool> {
        let ttl = if ttl_secs == 0 { 120 } else { ttl_secs as i64 };
        let hash = sha1_hex(message);
        let key = format!("{rule_name}|{level}|{hash}");
        let now = Utc::now().timestamp();

        let placeholder = format!(
            "{} INTO alert_dedupe
                 (dedupe_key, rule_name, level, message_hash, last_sent, ttl_seconds)
             VALUES (?, ?, ?, ?, ?, ?)",
            self.dialect().insert_ignore()
        );
        sqlx::query(&placeholder)
            .bind(&key)
            .bind(rule_name)
            .bind(level)
            .bind(&hash)
            .bind(now - ttl)
            .bind(ttl)
            .execute(self.pool())
            .await?;

        let res = sqlx::query(
            "UPDATE alert_dedupe
                SET last_sent = ?, ttl_seconds = ?
              WHERE dedupe_key = ? AND last_sent <= ?",
        )
        .bind(now)
        .bind(ttl)
        .bind(&key)
        .bind(now - ttl)
        .execute(self.pool())
        .await?;

        Ok(res.rows_affected() == 1)
    }
}
