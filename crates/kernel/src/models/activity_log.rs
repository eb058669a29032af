//! Activity log model.
//!
//! Append-mostly audit trail of admin actions. Rows are written through
//! `record` and browsed through the query engine.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Informational log level.
pub const LEVEL_INFO: i16 = 0;
/// Warning log level.
pub const LEVEL_WARNING: i16 = 1;

/// Activity log record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub message: String,
    pub level: i16,
    pub created: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Append an entry.
    pub async fn record(
        pool: &PgPool,
        user_id: Option<Uuid>,
        action: &str,
        message: &str,
    ) -> Result<Self> {
        let id = Uuid::now_v7();

        let entry = sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_log (id, user_id, action, message, level)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(action)
        .bind(message)
        .bind(LEVEL_INFO)
        .fetch_one(pool)
        .await
        .context("failed to record activity")?;

        Ok(entry)
    }

    /// Find an entry by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let entry = sqlx::query_as::<_, ActivityLog>("SELECT * FROM activity_log WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch activity entry by id")?;

        Ok(entry)
    }

    /// Delete entries older than the given instant. Returns the number of
    /// rows removed.
    pub async fn purge_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM activity_log WHERE created < $1")
            .bind(cutoff)
            .execute(pool)
            .await
            .context("failed to purge activity log")?;

        Ok(result.rows_affected())
    }
}
