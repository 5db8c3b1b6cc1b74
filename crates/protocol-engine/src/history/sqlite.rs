// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed run history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::RunHistory;
use crate::actions::{Action, ActionLogEntry};
use crate::error::{EngineError, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Action log rows in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRunHistory {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    seq: i64,
    recorded_at: DateTime<Utc>,
    payload: String,
}

impl SqliteRunHistory {
    /// Wrap an existing pool. Migrations must already have run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    ///
    /// In-memory databases are limited to one connection, since every
    /// connection to `sqlite::memory:` opens a separate database.
    pub async fn from_url(url: &str) -> Result<Self> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| EngineError::Persistence {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {url}: {e}"),
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| EngineError::Persistence {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {e}"),
            })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RunHistory for SqliteRunHistory {
    async fn append(&self, run_id: &str, entry: &ActionLogEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry.action)?;
        sqlx::query(
            r#"
            INSERT INTO action_log (run_id, seq, recorded_at, action_type, payload)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(entry.seq as i64)
        .bind(entry.recorded_at)
        .bind(entry.action.name())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Vec<ActionLogEntry>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT seq, recorded_at, payload
            FROM action_log
            WHERE run_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ActionLogEntry> {
                let action: Action = serde_json::from_str(&row.payload)?;
                Ok(ActionLogEntry {
                    seq: row.seq as u64,
                    recorded_at: row.recorded_at,
                    action,
                })
            })
            .collect()
    }
}
