use chrono::Utc;

use crate::error::Result;
use crate::store::StateStore;

impl StateStore {
    /// Tries to take the evaluation lease for one rule.
    ///
    /// Upserts the lease row, then runs a conditional update that succeeds
    /// only when the lease is free, expired, or already held by this same
    /// holder (re-entrance). `rows_affected == 1` is the acquisition signal;
    /// this single statement is the whole mutual-exclusion primitive between
    /// replicas.
    pub async fn try_acquire_lease(
        &self,
        rule_name: &str,
        holder: &str,
        ttl_secs: u64,
    ) -> Result<bool> {
        let now = Utc::now().timestamp();

        let placeholder = format!(
            "{} INTO rule_leases (rule_name, ttl_seconds) VALUES (?, ?)",
            self.dialect().insert_ignore()
        );
        sqlx::query(&placeholder)
            .bind(rule_name)
            .bind(ttl_secs as i64)
            .execute(self.pool())
            .await?;

        let res = sqlx::query(
            "UPDATE rule_leases
                SET holder = ?, acquired_at = ?
              WHERE rule_name = ?
                AND (acquired_at IS NULL
                     OR acquired_at + ttl_seconds <= ?
                     OR holder = ?)",
        )
        .bind(holder)
        .bind(now)
        .bind(rule_name)
        .bind(now)
        .bind(holder)
        .execute(self.pool())
        .await?;

        Ok(res.rows_affected() == 1)
    }

    /// Releases a lease held by `holder`.
    ///
    /// Clears the holder and backdates `acquired_at` past its TTL so the next
    /// acquisition attempt does not have to wait for expiry. A lease owned by
    /// someone else is left untouched.
    pub async fn release_lease(&self, rule_name: &str, holder: &str) -> Result<()> {
        sqlx::query(
            "UPDATE rule_leases
                SET holder = '', acquired_at = acquired_at - ttl_seconds - 1
              WHERE rule_name = ? AND holder = ?",
        )
        .bind(rule_name)
        .bind(holder)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
