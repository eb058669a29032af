//! Permission model.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Permission record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a permission.
#[derive(Debug, Deserialize)]
pub struct CreatePermission {
    pub name: String,
    pub description: Option<String>,
}

impl Permission {
    /// Find a permission by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let permission = sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch permission by id")?;

        Ok(permission)
    }

    /// Create a new permission.
    pub async fn create(pool: &PgPool, input: CreatePermission) -> Result<Self> {
        let id = Uuid::now_v7();

        let permission = sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (id, name, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(pool)
        .await
        .context("failed to create permission")?;

        Ok(permission)
    }

    /// Delete a permission.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete permission")?;

        Ok(result.rows_affected() > 0)
    }

    /// Get all permission names granted to a user through their roles.
    pub async fn names_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name
            FROM permissions p
            JOIN role_permissions rp ON p.id = rp.permission_id
            JOIN user_roles ur ON rp.role_id = ur.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to get user permissions")?;

        Ok(names)
    }
}
