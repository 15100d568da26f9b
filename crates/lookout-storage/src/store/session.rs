use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::error::Result;
use crate::store::StateStore;

/// Session primitives for the web collaborator. The engine never touches
/// these; they live here because the table shares the store.
impl StateStore {
    pub async fn save_session(
        &self,
        session_id: &str,
        username: &str,
        role: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        // update-then-insert keeps the upsert portable across dialects
        let updated = sqlx::query(
            "UPDATE user_sessions SET username = ?, role = ?, expires_at = ?
              WHERE session_id = ?",
        )
        .bind(username)
        .bind(role)
        .bind(expires_at.timestamp())
        .bind(session_id)
        .execute(self.pool())
        .await?;

        if updated.rows_affected() == 0 {
            let insert = format!(
                "{} INTO user_sessions (session_id, username, role, created_at, expires_at)
                 VALUES (?, ?, ?, ?, ?)",
                self.dialect().insert_ignore()
            );
            sqlx::query(&insert)
                .bind(session_id)
                .bind(username)
                .bind(role)
                .bind(Utc::now().timestamp())
                .bind(expires_at.timestamp())
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }

    /// Returns `(username, role)` for a live session, `None` when missing or
    /// expired.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<(String, String)>> {
        let row = sqlx::query(
            "SELECT username, role FROM user_sessions
              WHERE session_id = ? AND expires_at > ?",
        )
        .bind(session_id)
        .bind(Utc::now().timestamp())
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(Some((row.try_get("username")?, row.try_get("role")?))),
            None => Ok(None),
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn clean_expired_sessions(&self) -> Result<u64> {
        let res = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected())
    }
}
