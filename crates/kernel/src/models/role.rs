//! Role model and role/user/permission assignment.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Role record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub created: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or renaming a role.
#[derive(Debug, Deserialize)]
pub struct CreateRole {
    pub name: String,
    pub label: String,
}

impl Role {
    /// Find a role by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch role by id")?;

        Ok(role)
    }

    /// Create a new role.
    pub async fn create(pool: &PgPool, input: CreateRole) -> Result<Self> {
        let id = Uuid::now_v7();

        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (id, name, label) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.label)
        .fetch_one(pool)
        .await
        .context("failed to create role")?;

        Ok(role)
    }

    /// Delete a role.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete role")?;

        Ok(result.rows_affected() > 0)
    }

    /// Get all roles for a user.
    pub async fn get_user_roles(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("failed to get user roles")?;

        Ok(roles)
    }

    /// Assign a role to a user.
    pub async fn assign_to_user(pool: &PgPool, user_id: Uuid, role_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await
        .context("failed to assign role to user")?;

        Ok(())
    }

    /// Remove a role from a user.
    pub async fn remove_from_user(pool: &PgPool, user_id: Uuid, role_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(pool)
            .await
            .context("failed to remove role from user")?;

        Ok(())
    }

    /// Grant a permission to this role.
    pub async fn add_permission(pool: &PgPool, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(pool)
        .await
        .context("failed to add permission to role")?;

        Ok(())
    }

    /// Revoke a permission from this role.
    pub async fn remove_permission(
        pool: &PgPool,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<()> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
            .bind(role_id)
            .bind(permission_id)
            .execute(pool)
            .await
            .context("failed to remove permission from role")?;

        Ok(())
    }
}
