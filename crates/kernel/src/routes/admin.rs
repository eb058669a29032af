//! Admin JSON API for users, roles, permissions, media, and activity logs.
//!
//! Every listing endpoint funnels through one shared handler: the client's
//! query string is decoded into `QueryParams`, the entity's `ListingPolicy`
//! merges in the whitelists and relation configuration, and the query engine
//! does the rest. Authentication/authorization middleware is wired in front
//! of this router by the deployment, not here.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ActivityLog, CreateMedia, CreatePermission, CreateRole, CreateUser, Media, Permission,
    Profile, Role, UpdateUser, User,
};
use crate::models::profile::UpsertProfile;
use crate::query::{
    Aggregate, PaginatedResult, QueryParams, RelationSearch, RelationSort,
};
use crate::state::AppState;

/// Hard cap on page size for all listing endpoints.
const MAX_PER_PAGE: u32 = 100;

/// Per-entity listing configuration: which columns client input may search
/// and sort, which relations participate, and what gets preloaded by
/// default.
struct ListingPolicy {
    entity: &'static str,
    searchable: &'static [&'static str],
    sortable: &'static [&'static str],
    search_relations: &'static [(&'static str, &'static [&'static str])],
    sortable_relations: &'static [(&'static str, &'static str, Aggregate)],
    preload: &'static [&'static str],
}

impl ListingPolicy {
    /// Merge this policy into client-decoded params.
    fn apply(&self, mut params: QueryParams) -> QueryParams {
        if params.per_page > MAX_PER_PAGE {
            tracing::warn!(
                requested = params.per_page,
                capped = MAX_PER_PAGE,
                "per_page exceeds maximum, capping"
            );
            params.per_page = MAX_PER_PAGE;
        }

        params.searchable_columns = to_strings(self.searchable);
        params.sortable_columns = to_strings(self.sortable);
        params.search_relations = self
            .search_relations
            .iter()
            .map(|(relation, columns)| RelationSearch {
                relation: (*relation).to_string(),
                columns: to_strings(columns),
            })
            .collect();
        params.sortable_relations = self
            .sortable_relations
            .iter()
            .map(|(relation, column, aggregate)| RelationSort {
                relation: (*relation).to_string(),
                column: (*column).to_string(),
                aggregate: *aggregate,
            })
            .collect();

        for path in self.preload {
            if !params.preload.iter().any(|p| p == path) {
                params.preload.push((*path).to_string());
            }
        }

        params
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

const USERS: ListingPolicy = ListingPolicy {
    entity: "users",
    searchable: &["name", "mail"],
    sortable: &["name", "mail", "status", "created", "updated_at", "login"],
    search_relations: &[("roles", &["name", "label"])],
    sortable_relations: &[("roles", "name", Aggregate::Min)],
    preload: &["roles", "profile"],
};

const ROLES: ListingPolicy = ListingPolicy {
    entity: "roles",
    searchable: &["name", "label"],
    sortable: &["name", "label", "created", "updated_at"],
    search_relations: &[("permissions", &["name"])],
    sortable_relations: &[],
    preload: &["permissions"],
};

const PERMISSIONS: ListingPolicy = ListingPolicy {
    entity: "permissions",
    searchable: &["name", "description"],
    sortable: &["name", "created", "updated_at"],
    search_relations: &[],
    sortable_relations: &[],
    preload: &[],
};

const MEDIA: ListingPolicy = ListingPolicy {
    entity: "media",
    searchable: &["filename", "mime"],
    sortable: &["filename", "size", "created", "updated_at"],
    search_relations: &[("owner", &["name", "mail"])],
    sortable_relations: &[],
    preload: &["owner"],
};

const ACTIVITY: ListingPolicy = ListingPolicy {
    entity: "activity_log",
    searchable: &["action", "message"],
    sortable: &["action", "level", "created", "updated_at"],
    search_relations: &[("user", &["name"])],
    sortable_relations: &[],
    preload: &["user"],
};

/// The shared listing funnel.
async fn run_listing(
    state: &AppState,
    policy: &ListingPolicy,
    pairs: Vec<(String, String)>,
) -> AppResult<Json<PaginatedResult<serde_json::Value>>> {
    let params = policy.apply(QueryParams::from_pairs(pairs));
    let result = state.query().run(policy.entity, params).await?;
    Ok(Json(result))
}

/// Record an admin action, without failing the request if logging does.
async fn record_activity(state: &AppState, action: &str, message: &str) {
    if let Err(e) = ActivityLog::record(state.db(), None, action, message).await {
        tracing::warn!(error = %e, action, "failed to record activity");
    }
}

// =============================================================================
// Users
// =============================================================================

/// GET /admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<PaginatedResult<serde_json::Value>>> {
    run_listing(&state, &USERS, pairs).await
}

/// GET /admin/users/{id}
async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<User>> {
    let user = User::find_by_id(state.db(), id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

/// POST /admin/users
async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<CreateUser>,
) -> AppResult<Json<User>> {
    let user = User::create(state.db(), input).await?;
    record_activity(&state, "user.create", &format!("created user {}", user.name)).await;
    Ok(Json(user))
}

/// PUT /admin/users/{id}
async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    let user = User::update(state.db(), id, input)
        .await?
        .ok_or(AppError::NotFound)?;
    record_activity(&state, "user.update", &format!("updated user {}", user.name)).await;
    Ok(Json(user))
}

/// DELETE /admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    if !User::delete(state.db(), id).await? {
        return Err(AppError::NotFound);
    }
    record_activity(&state, "user.delete", &format!("deleted user {id}")).await;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// GET /admin/users/{id}/roles
async fn get_user_roles(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Role>>> {
    Ok(Json(Role::get_user_roles(state.db(), id).await?))
}

/// POST /admin/users/{id}/roles/{role_id}
async fn assign_user_role(
    State(state): State<AppState>,
    Path((id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<serde_json::Value>> {
    Role::assign_to_user(state.db(), id, role_id).await?;
    record_activity(&state, "user.role_assign", &format!("assigned role {role_id} to user {id}"))
        .await;
    Ok(Json(serde_json::json!({ "assigned": role_id })))
}

/// DELETE /admin/users/{id}/roles/{role_id}
async fn remove_user_role(
    State(state): State<AppState>,
    Path((id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<serde_json::Value>> {
    Role::remove_from_user(state.db(), id, role_id).await?;
    Ok(Json(serde_json::json!({ "removed": role_id })))
}

/// GET /admin/users/{id}/permissions
async fn get_user_permissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<String>>> {
    Ok(Json(Permission::names_for_user(state.db(), id).await?))
}

/// GET /admin/users/{id}/profile
async fn get_user_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    let profile = Profile::find_by_user(state.db(), id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(profile))
}

/// PUT /admin/users/{id}/profile
async fn put_user_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpsertProfile>,
) -> AppResult<Json<Profile>> {
    let profile = Profile::upsert(state.db(), id, input).await?;
    Ok(Json(profile))
}

// =============================================================================
// Roles
// =============================================================================

/// GET /admin/roles
async fn list_roles(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<PaginatedResult<serde_json::Value>>> {
    run_listing(&state, &ROLES, pairs).await
}

/// GET /admin/roles/{id}
async fn get_role(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Role>> {
    let role = Role::find_by_id(state.db(), id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(role))
}

/// POST /admin/roles
async fn create_role(
    State(state): State<AppState>,
    Json(input): Json<CreateRole>,
) -> AppResult<Json<Role>> {
    let role = Role::create(state.db(), input).await?;
    record_activity(&state, "role.create", &format!("created role {}", role.name)).await;
    Ok(Json(role))
}

/// DELETE /admin/roles/{id}
async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    if !Role::delete(state.db(), id).await? {
        return Err(AppError::NotFound);
    }
    record_activity(&state, "role.delete", &format!("deleted role {id}")).await;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// POST /admin/roles/{id}/permissions/{permission_id}
async fn grant_role_permission(
    State(state): State<AppState>,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<serde_json::Value>> {
    Role::add_permission(state.db(), id, permission_id).await?;
    Ok(Json(serde_json::json!({ "granted": permission_id })))
}

/// DELETE /admin/roles/{id}/permissions/{permission_id}
async fn revoke_role_permission(
    State(state): State<AppState>,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<serde_json::Value>> {
    Role::remove_permission(state.db(), id, permission_id).await?;
    Ok(Json(serde_json::json!({ "revoked": permission_id })))
}

// =============================================================================
// Permissions
// =============================================================================

/// GET /admin/permissions
async fn list_permissions(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<PaginatedResult<serde_json::Value>>> {
    run_listing(&state, &PERMISSIONS, pairs).await
}

/// GET /admin/permissions/{id}
async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Permission>> {
    let permission = Permission::find_by_id(state.db(), id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(permission))
}

/// POST /admin/permissions
async fn create_permission(
    State(state): State<AppState>,
    Json(input): Json<CreatePermission>,
) -> AppResult<Json<Permission>> {
    let permission = Permission::create(state.db(), input).await?;
    record_activity(
        &state,
        "permission.create",
        &format!("created permission {}", permission.name),
    )
    .await;
    Ok(Json(permission))
}

/// DELETE /admin/permissions/{id}
async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    if !Permission::delete(state.db(), id).await? {
        return Err(AppError::NotFound);
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// =============================================================================
// Media
// =============================================================================

/// GET /admin/media
async fn list_media(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<PaginatedResult<serde_json::Value>>> {
    run_listing(&state, &MEDIA, pairs).await
}

/// GET /admin/media/{id}
async fn get_media(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Media>> {
    let media = Media::find_by_id(state.db(), id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(media))
}

/// POST /admin/media
async fn create_media(
    State(state): State<AppState>,
    Json(input): Json<CreateMedia>,
) -> AppResult<Json<Media>> {
    let media = Media::create(state.db(), input).await?;
    record_activity(&state, "media.create", &format!("registered media {}", media.filename))
        .await;
    Ok(Json(media))
}

/// DELETE /admin/media/{id}
async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    if !Media::delete(state.db(), id).await? {
        return Err(AppError::NotFound);
    }
    record_activity(&state, "media.delete", &format!("deleted media {id}")).await;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// =============================================================================
// Activity log
// =============================================================================

/// GET /admin/activity
async fn list_activity(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<PaginatedResult<serde_json::Value>>> {
    run_listing(&state, &ACTIVITY, pairs).await
}

/// GET /admin/activity/{id}
async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ActivityLog>> {
    let entry = ActivityLog::find_by_id(state.db(), id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(entry))
}

/// Purge request body.
#[derive(Debug, Deserialize)]
struct PurgeRequest {
    /// Remove entries older than this many days.
    older_than_days: u32,
}

/// POST /admin/activity/purge
async fn purge_activity(
    State(state): State<AppState>,
    Json(input): Json<PurgeRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(input.older_than_days));
    let purged = ActivityLog::purge_before(state.db(), cutoff).await?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

/// Create the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route(
            "/admin/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/admin/users/{id}/roles", get(get_user_roles))
        .route(
            "/admin/users/{id}/roles/{role_id}",
            post(assign_user_role).delete(remove_user_role),
        )
        .route("/admin/users/{id}/permissions", get(get_user_permissions))
        .route(
            "/admin/users/{id}/profile",
            get(get_user_profile).put(put_user_profile),
        )
        .route("/admin/roles", get(list_roles).post(create_role))
        .route("/admin/roles/{id}", get(get_role).delete(delete_role))
        .route(
            "/admin/roles/{id}/permissions/{permission_id}",
            post(grant_role_permission).delete(revoke_role_permission),
        )
        .route(
            "/admin/permissions",
            get(list_permissions).post(create_permission),
        )
        .route(
            "/admin/permissions/{id}",
            get(get_permission).delete(delete_permission),
        )
        .route("/admin/media", get(list_media).post(create_media))
        .route("/admin/media/{id}", get(get_media).delete(delete_media))
        .route("/admin/activity", get(list_activity))
        .route("/admin/activity/{id}", get(get_activity))
        .route("/admin/activity/purge", post(purge_activity))
}
