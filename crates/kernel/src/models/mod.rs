//! Database models and the entity metadata catalog.

pub mod activity_log;
pub mod media;
pub mod permission;
pub mod profile;
pub mod role;
pub mod user;

pub use activity_log::ActivityLog;
pub use media::{CreateMedia, Media};
pub use permission::{CreatePermission, Permission};
pub use profile::Profile;
pub use role::{CreateRole, Role};
pub use user::{CreateUser, UpdateUser, User};

use crate::query::{EntityRegistry, PivotLink, SemanticType};

/// Build the entity metadata registry for every admin screen.
///
/// Called once at startup; the result is shared immutably across all request
/// handlers. Column names here must match the physical schema — the query
/// engine's whitelist checks and projections resolve against this catalog,
/// not against the database.
pub fn build_registry() -> EntityRegistry {
    EntityRegistry::builder()
        .entity("users", "users", |e| {
            e.column("id", SemanticType::String)
                .column("name", SemanticType::String)
                .column("mail", SemanticType::String)
                .column("is_admin", SemanticType::Boolean)
                .column("status", SemanticType::Number)
                .column("created", SemanticType::Date)
                .column("updated_at", SemanticType::Date)
                .column("login", SemanticType::Date)
                .many_to_many(
                    "roles",
                    "roles",
                    PivotLink {
                        pivot_table: "user_roles".to_string(),
                        local_key: "id".to_string(),
                        pivot_foreign_key: "user_id".to_string(),
                        pivot_related_foreign_key: "role_id".to_string(),
                        related_key: "id".to_string(),
                    },
                )
                .has_one("profile", "profiles", "id", "user_id")
                .has_many("media", "media", "id", "user_id")
                .has_many("activity", "activity_log", "id", "user_id")
        })
        .entity("profiles", "profiles", |e| {
            e.column("id", SemanticType::String)
                .column("user_id", SemanticType::String)
                .column("bio", SemanticType::String)
                .column("timezone", SemanticType::String)
                .column("avatar_id", SemanticType::String)
                .column("created", SemanticType::Date)
                .column("updated_at", SemanticType::Date)
                .belongs_to("user", "users", "user_id", "id")
                .belongs_to("avatar", "media", "avatar_id", "id")
        })
        .entity("roles", "roles", |e| {
            e.column("id", SemanticType::String)
                .column("name", SemanticType::String)
                .column("label", SemanticType::String)
                .column("created", SemanticType::Date)
                .column("updated_at", SemanticType::Date)
                .many_to_many(
                    "permissions",
                    "permissions",
                    PivotLink {
                        pivot_table: "role_permissions".to_string(),
                        local_key: "id".to_string(),
                        pivot_foreign_key: "role_id".to_string(),
                        pivot_related_foreign_key: "permission_id".to_string(),
                        related_key: "id".to_string(),
                    },
                )
                .many_to_many(
                    "users",
                    "users",
                    PivotLink {
                        pivot_table: "user_roles".to_string(),
                        local_key: "id".to_string(),
                        pivot_foreign_key: "role_id".to_string(),
                        pivot_related_foreign_key: "user_id".to_string(),
                        related_key: "id".to_string(),
                    },
                )
        })
        .entity("permissions", "permissions", |e| {
            e.column("id", SemanticType::String)
                .column("name", SemanticType::String)
                .column("description", SemanticType::String)
                .column("created", SemanticType::Date)
                .column("updated_at", SemanticType::Date)
                .many_to_many(
                    "roles",
                    "roles",
                    PivotLink {
                        pivot_table: "role_permissions".to_string(),
                        local_key: "id".to_string(),
                        pivot_foreign_key: "permission_id".to_string(),
                        pivot_related_foreign_key: "role_id".to_string(),
                        related_key: "id".to_string(),
                    },
                )
        })
        .entity("media", "media", |e| {
            e.column("id", SemanticType::String)
                .column("user_id", SemanticType::String)
                .column("filename", SemanticType::String)
                .column("mime", SemanticType::String)
                .column("size", SemanticType::Number)
                .column("created", SemanticType::Date)
                .column("updated_at", SemanticType::Date)
                .belongs_to("owner", "users", "user_id", "id")
        })
        .entity("activity_log", "activity_log", |e| {
            e.column("id", SemanticType::String)
                .column("user_id", SemanticType::String)
                .column("action", SemanticType::String)
                .column("message", SemanticType::String)
                .column("level", SemanticType::Number)
                .column("created", SemanticType::Date)
                .column("updated_at", SemanticType::Date)
                .belongs_to("user", "users", "user_id", "id")
        })
        .build()
}
