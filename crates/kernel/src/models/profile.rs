//! User profile model.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Profile record, one per user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub avatar_id: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing a profile.
#[derive(Debug, Deserialize)]
pub struct UpsertProfile {
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub avatar_id: Option<Uuid>,
}

impl Profile {
    /// Find a profile by its owning user.
    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch profile by user")?;

        Ok(profile)
    }

    /// Create or replace the profile for a user.
    pub async fn upsert(pool: &PgPool, user_id: Uuid, input: UpsertProfile) -> Result<Self> {
        let id = Uuid::now_v7();

        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, user_id, bio, timezone, avatar_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                bio = EXCLUDED.bio,
                timezone = EXCLUDED.timezone,
                avatar_id = EXCLUDED.avatar_id,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.bio)
        .bind(&input.timezone)
        .bind(input.avatar_id)
        .fetch_one(pool)
        .await
        .context("failed to upsert profile")?;

        Ok(profile)
    }
}
