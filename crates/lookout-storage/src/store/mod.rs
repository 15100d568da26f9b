use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::path::Path;

use lookout_common::config::{DatabaseConfig, StoreKind};

use crate::dialect::Dialect;
use crate::error::Result;

mod dedupe;
mod history;
mod lease;
mod session;

/// Handle to the shared relational store.
///
/// Holds a connection pool sized from configuration; every statement acquires
/// a connection for just its own duration, so an evaluation never pins one
/// across its full lifetime.
pub struct StateStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl StateStore {
    /// Connects per the configured store kind and ensures the schema exists.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        sqlx::any::install_default_drivers();

        if config.kind == StoreKind::EmbeddedFile {
            if let Some(dir) = Path::new(&config.path).parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        sqlx::Error::Configuration(
                            format!("cannot create database directory: {e}").into(),
                        )
                    })?;
                }
            }
        }

        let url = config.url();
        let dialect = Dialect::from_url(&url);
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await?;

        let store = Self { pool, dialect };
        store.init_schema().await?;
        tracing::info!(dialect = ?store.dialect, "state store ready");
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn init_schema(&self) -> Result<()> {
        for stmt in self.dialect.schema_statements() {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        for stmt in self.dialect.index_statements() {
            if let Err(e) = sqlx::query(stmt).execute(&self.pool).await {
                // MySQL lacks CREATE INDEX IF NOT EXISTS; re-runs report 1061
                let msg = e.to_string();
                if msg.contains("1061") || msg.to_lowercase().contains("exist") {
                    continue;
                }
                tracing::warn!(error = %e, "index creation failed");
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
