use chrono::{DateTime, Duration, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use std::collections::HashMap;

use lookout_common::types::Alert;

use crate::error::Result;
use crate::store::StateStore;
use crate::{AlertDetail, AlertHistoryRow, AlertStats, HourlyStat};

const HISTORY_COLUMNS: &str =
    "id, alert_id, rule_name, level, message, timestamp, data, count, matches, created_at";

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn row_to_history(row: &AnyRow) -> Result<AlertHistoryRow> {
    Ok(AlertHistoryRow {
        id: row.try_get("id")?,
        alert_id: row.try_get("alert_id")?,
        rule_name: row.try_get("rule_name")?,
        level: row.try_get("level")?,
        message: row.try_get("message")?,
        timestamp: ts(row.try_get("timestamp")?),
        data: row.try_get::<Option<String>, _>("data")?.unwrap_or_default(),
        count: row.try_get("count")?,
        matches: row.try_get("matches")?,
        created_at: ts(row.try_get("created_at")?),
    })
}

impl StateStore {
    /// Persists an emitted alert. Called only after the alert passed dedup.
    pub async fn save_alert(&self, alert: &Alert) -> Result<()> {
        let data_json = serde_json::to_string(&alert.data)?;
        sqlx::query(
            "INSERT INTO alert_history
                 (alert_id, rule_name, level, message, timestamp, data, count, matches, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&alert.id)
        .bind(&alert.rule_name)
        .bind(alert.level.to_string())
        .bind(&alert.message)
        .bind(alert.timestamp.timestamp())
        .bind(data_json)
        .bind(alert.count)
        .bind(alert.matches)
        .bind(Utc::now().timestamp())
        .execute(self.pool())
        .await?;

        tracing::debug!(alert_id = %alert.id, "alert history row written");
        Ok(())
    }

    /// Paged history read, optionally restricted to the last `hours`.
    pub async fn get_alerts_paged(
        &self,
        hours: Option<i64>,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<AlertHistoryRow>, i64)> {
        let page = page.max(1);
        let page_size = if page_size == 0 { 10 } else { page_size };
        let offset = i64::from(page - 1) * i64::from(page_size);

        let since = hours.map(|h| (Utc::now() - Duration::hours(h)).timestamp());

        let (total, rows) = match since {
            Some(since) => {
                let total: i64 =
                    sqlx::query("SELECT COUNT(*) AS c FROM alert_history WHERE timestamp >= ?")
                        .bind(since)
                        .fetch_one(self.pool())
                        .await?
                        .try_get("c")?;
                let rows = sqlx::query(&format!(
                    "SELECT {HISTORY_COLUMNS} FROM alert_history
                      WHERE timestamp >= ?
                      ORDER BY timestamp DESC LIMIT ? OFFSET ?"
                ))
                .bind(since)
                .bind(i64::from(page_size))
                .bind(offset)
                .fetch_all(self.pool())
                .await?;
                (total, rows)
            }
            None => {
                let total: i64 = sqlx::query("SELECT COUNT(*) AS c FROM alert_history")
                    .fetch_one(self.pool())
                    .await?
                    .try_get("c")?;
                let rows = sqlx::query(&format!(
                    "SELECT {HISTORY_COLUMNS} FROM alert_history
                      ORDER BY timestamp DESC LIMIT ? OFFSET ?"
                ))
                .bind(i64::from(page_size))
                .bind(offset)
                .fetch_all(self.pool())
                .await?;
                (total, rows)
            }
        };

        let rows = rows.iter().map(row_to_history).collect::<Result<_>>()?;
        Ok((rows, total))
    }

    pub async fn get_alerts_by_rule(
        &self,
        rule_name: &str,
        limit: u32,
    ) -> Result<Vec<AlertHistoryRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM alert_history
              WHERE rule_name = ? ORDER BY timestamp DESC LIMIT ?"
        ))
        .bind(rule_name)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_history).collect()
    }

    pub async fn get_alerts_by_level(
        &self,
        level: &str,
        limit: u32,
    ) -> Result<Vec<AlertHistoryRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM alert_history
              WHERE level = ? ORDER BY timestamp DESC LIMIT ?"
        ))
        .bind(level)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_history).collect()
    }

    /// Single-alert detail by its emitted id, with the data snapshot decoded.
    pub async fn get_alert_by_id(&self, alert_id: &str) -> Result<Option<AlertDetail>> {
        let row = sqlx::query(
            "SELECT alert_id, rule_name, level, message, timestamp, data, count, matches
               FROM alert_history WHERE alert_id = ? LIMIT 1",
        )
        .bind(alert_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data_json: Option<String> = row.try_get("data")?;
        let data = data_json
            .filter(|s| !s.is_empty())
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok());

        Ok(Some(AlertDetail {
            id: row.try_get("alert_id")?,
            rule_name: row.try_get("rule_name")?,
            level: row.try_get("level")?,
            message: row.try_get("message")?,
            timestamp: ts(row.try_get("timestamp")?),
            count: row.try_get("count")?,
            matches: row.try_get("matches")?,
            data,
        }))
    }

    /// Dashboard aggregates over the last `hours`.
    pub async fn get_alert_stats(&self, hours: i64) -> Result<AlertStats> {
        let since = (Utc::now() - Duration::hours(hours)).timestamp();
        let mut stats = AlertStats::default();

        stats.total_alerts =
            sqlx::query("SELECT COUNT(*) AS c FROM alert_history WHERE timestamp >= ?")
                .bind(since)
                .fetch_one(self.pool())
                .await?
                .try_get("c")?;

        let level_rows = sqlx::query(
            "SELECT level, COUNT(*) AS c FROM alert_history
              WHERE timestamp >= ? GROUP BY level",
        )
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        let mut level_stats = HashMap::new();
        for row in &level_rows {
            level_stats.insert(row.try_get("level")?, row.try_get("c")?);
        }
        stats.level_stats = level_stats;

        // hourly histogram in local time; bucket expression is per dialect
        let hour_expr = self.dialect().hour_bucket_expr("timestamp");
        let hour_rows = sqlx::query(&format!(
            "SELECT {hour_expr} AS bucket, COUNT(*) AS c FROM alert_history
              WHERE timestamp >= ? GROUP BY bucket ORDER BY bucket"
        ))
        .bind(since)
        .fetch_all(self.pool())
        .await?;
        for row in &hour_rows {
            let bucket: String = row.try_get("bucket")?;
            stats.hourly_stats.push(HourlyStat {
                hour: bucket.parse().unwrap_or(0),
                count: row.try_get("c")?,
            });
        }

        let recent = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM alert_history ORDER BY timestamp DESC LIMIT 10"
        ))
        .fetch_all(self.pool())
        .await?;
        stats.recent_alerts = recent.iter().map(row_to_history).collect::<Result<_>>()?;

        Ok(stats)
    }
}
