//! User model and CRUD operations.

use anyhow::{Context, Result};
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// User record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub pass: String,
    pub mail: String,
    pub is_admin: bool,
    pub status: i16,
    pub created: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub login: Option<DateTime<Utc>>,
}

/// Input for creating a new user.
#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub password: String,
    pub mail: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Input for updating a user. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub mail: Option<String>,
    pub is_admin: Option<bool>,
    pub status: Option<i16>,
}

impl User {
    /// Check if this user is active.
    pub fn is_active(&self) -> bool {
        self.status == 1
    }

    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by id")?;

        Ok(user)
    }

    /// Create a new user.
    pub async fn create(pool: &PgPool, input: CreateUser) -> Result<Self> {
        let id = Uuid::now_v7();
        let pass = hash_password(&input.password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, pass, mail, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&pass)
        .bind(&input.mail)
        .bind(input.is_admin)
        .fetch_one(pool)
        .await
        .context("failed to create user")?;

        Ok(user)
    }

    /// Update a user.
    pub async fn update(pool: &PgPool, id: Uuid, input: UpdateUser) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($1, name),
                mail = COALESCE($2, mail),
                is_admin = COALESCE($3, is_admin),
                status = COALESCE($4, status),
                updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.mail)
        .bind(input.is_admin)
        .bind(input.status)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to update user")?;

        Ok(user)
    }

    /// Delete a user.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }

    /// Verify a password against this user's hash.
    pub fn verify_password(&self, password: &str) -> bool {
        if self.pass.is_empty() {
            return false;
        }

        let Ok(parsed_hash) = PasswordHash::new(&self.pass) else {
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
