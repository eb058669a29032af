//! Media (uploaded file) model.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Media record. File bytes live in external object storage; this is the
/// metadata row the admin screens operate on.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub created: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a media row.
#[derive(Debug, Deserialize)]
pub struct CreateMedia {
    pub user_id: Option<Uuid>,
    pub filename: String,
    pub mime: String,
    pub size: i64,
}

impl Media {
    /// Find a media row by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let media = sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch media by id")?;

        Ok(media)
    }

    /// Register a new media row.
    pub async fn create(pool: &PgPool, input: CreateMedia) -> Result<Self> {
        let id = Uuid::now_v7();

        let media = sqlx::query_as::<_, Media>(
            r#"
            INSERT INTO media (id, user_id, filename, mime, size)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.user_id)
        .bind(&input.filename)
        .bind(&input.mime)
        .bind(input.size)
        .fetch_one(pool)
        .await
        .context("failed to create media")?;

        Ok(media)
    }

    /// Delete a media row.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete media")?;

        Ok(result.rows_affected() > 0)
    }
}
