//! Query service: the caller-facing entry point.
//!
//! `run` compiles a request into a plan, executes count and page fetch
//! through the store boundary, attaches preloaded relations with batched
//! sub-queries, and wraps the page in a [`PaginatedResult`]. The service is
//! stateless per request; the registry it holds is immutable and shared.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::error::{QueryError, QueryResult};
use super::executor::{PreloadQuery, StoreExecutor};
use super::paginate::PaginatedResult;
use super::params::QueryParams;
use super::plan;
use super::registry::{EntityDescriptor, EntityRegistry, RelationLink};
use super::relation_tree::{Projection, RelationNode};
use super::sql::PARENT_KEY_ALIAS;

/// Executes queries for registered entities.
pub struct QueryService {
    registry: Arc<EntityRegistry>,
    store: Arc<dyn StoreExecutor>,
}

impl QueryService {
    pub fn new(registry: Arc<EntityRegistry>, store: Arc<dyn StoreExecutor>) -> Arc<Self> {
        Arc::new(Self { registry, store })
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Compile and execute one request against `entity`.
    pub async fn run(
        &self,
        entity: &str,
        params: QueryParams,
    ) -> QueryResult<PaginatedResult<serde_json::Value>> {
        let plan = plan::assemble(&self.registry, entity, &params)?;

        let total = self.store.count(&plan).await?;
        let mut rows = self.store.fetch_page(&plan).await?;

        if !plan.preload.is_empty() {
            self.attach_nodes(entity, &mut rows, &plan.preload.children)
                .await?;
        }

        Ok(PaginatedResult::new(rows, total.max(0) as u64, plan.window))
    }

    /// Attach every relation node at this level, recursing into children.
    ///
    /// Boxed because the recursion depth follows the preload tree.
    fn attach_nodes<'a>(
        &'a self,
        entity: &'a str,
        rows: &'a mut [serde_json::Value],
        nodes: &'a BTreeMap<String, RelationNode>,
    ) -> Pin<Box<dyn Future<Output = QueryResult<()>> + Send + 'a>> {
        Box::pin(async move {
            for node in nodes.values() {
                self.attach_node(entity, rows, node).await?;
            }
            Ok(())
        })
    }

    /// Fetch one relation's rows in a single batched query and distribute
    /// them into the parent rows.
    async fn attach_node(
        &self,
        entity: &str,
        rows: &mut [serde_json::Value],
        node: &RelationNode,
    ) -> QueryResult<()> {
        let relation = self.registry.relation(entity, &node.relation)?.clone();
        let target = self.registry.entity(&relation.target)?;

        // Key the parent row carries, and the key fetched child rows are
        // matched on.
        let (parent_key, child_key) = match &relation.link {
            RelationLink::BelongsTo {
                foreign_key,
                owner_key,
            } => (foreign_key.as_str(), owner_key.as_str()),
            RelationLink::HasOne {
                local_key,
                foreign_key,
            }
            | RelationLink::HasMany {
                local_key,
                foreign_key,
            } => (local_key.as_str(), foreign_key.as_str()),
            RelationLink::ManyToMany(pivot) => (pivot.local_key.as_str(), PARENT_KEY_ALIAS),
        };

        let keys = collect_keys(rows, parent_key);
        if keys.is_empty() {
            for row in rows.iter_mut() {
                embed(row, &node.relation, Vec::new(), relation.link.is_singular());
            }
            return Ok(());
        }

        let columns = node_columns(target, node, child_key)?;
        let preload = match &relation.link {
            RelationLink::ManyToMany(pivot) => PreloadQuery::Pivot {
                pivot: pivot.clone(),
                table: target.table().to_string(),
                columns,
                keys,
            },
            _ => PreloadQuery::Keyed {
                table: target.table().to_string(),
                columns,
                key_column: child_key.to_string(),
                keys,
            },
        };

        let mut children = self.store.fetch_preload(&preload).await?;

        if !node.children.is_empty() {
            self.attach_nodes(&relation.target, &mut children, &node.children)
                .await?;
        }

        let strip_parent_key = matches!(relation.link, RelationLink::ManyToMany(_));
        for row in rows.iter_mut() {
            let parent_value = row.get(parent_key).cloned().unwrap_or(serde_json::Value::Null);
            let matching: Vec<serde_json::Value> = if parent_value.is_null() {
                Vec::new()
            } else {
                children
                    .iter()
                    .filter(|child| child.get(child_key) == Some(&parent_value))
                    .map(|child| {
                        let mut child = child.clone();
                        if strip_parent_key {
                            if let Some(obj) = child.as_object_mut() {
                                obj.remove(PARENT_KEY_ALIAS);
                            }
                        }
                        child
                    })
                    .collect()
            };
            embed(row, &node.relation, matching, relation.link.is_singular());
        }

        Ok(())
    }
}

/// Deduplicated, non-null key values from the parent rows.
fn collect_keys(rows: &[serde_json::Value], key: &str) -> Vec<serde_json::Value> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.get(key))
        .filter(|value| !value.is_null())
        .filter(|value| seen.insert(value.to_string()))
        .cloned()
        .collect()
}

/// Resolve a node's projection into concrete columns, keeping the key the
/// distribution step matches on. Unknown projection columns are caller bugs
/// and fail loudly.
fn node_columns(
    target: &EntityDescriptor,
    node: &RelationNode,
    child_key: &str,
) -> QueryResult<Vec<String>> {
    let verify = |name: &String| -> QueryResult<()> {
        if target.column(name).is_none() {
            return Err(QueryError::UnknownColumn {
                entity: target.name().to_string(),
                column: name.clone(),
            });
        }
        Ok(())
    };

    // Keys child nodes will need on these rows.
    let mut needed: Vec<&str> = Vec::new();
    if child_key != PARENT_KEY_ALIAS {
        needed.push(child_key);
    }
    for child in node.children.values() {
        if let Some(descriptor) = target.relation(&child.relation) {
            needed.push(match &descriptor.link {
                RelationLink::BelongsTo { foreign_key, .. } => foreign_key.as_str(),
                RelationLink::HasOne { local_key, .. }
                | RelationLink::HasMany { local_key, .. } => local_key.as_str(),
                RelationLink::ManyToMany(pivot) => pivot.local_key.as_str(),
            });
        }
    }

    match &node.projection {
        Projection::All => Ok(Vec::new()),
        Projection::Select(columns) => {
            for column in columns {
                verify(column)?;
            }
            let mut resolved = columns.clone();
            for key in needed {
                if !resolved.iter().any(|c| c == key) {
                    resolved.push(key.to_string());
                }
            }
            Ok(resolved)
        }
        Projection::Exclude(columns) => {
            for column in columns {
                verify(column)?;
            }
            Ok(target
                .columns()
                .iter()
                .map(|c| c.name.clone())
                .filter(|name| !columns.contains(name) || needed.contains(&name.as_str()))
                .collect())
        }
    }
}

fn embed(
    row: &mut serde_json::Value,
    relation: &str,
    matching: Vec<serde_json::Value>,
    singular: bool,
) {
    if let Some(obj) = row.as_object_mut() {
        let value = if singular {
            matching.into_iter().next().unwrap_or(serde_json::Value::Null)
        } else {
            serde_json::Value::Array(matching)
        };
        obj.insert(relation.to_string(), value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::plan::QueryPlan;
    use crate::query::registry::{PivotLink, SemanticType};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn registry() -> Arc<EntityRegistry> {
        Arc::new(
            EntityRegistry::builder()
                .entity("users", "users", |e| {
                    e.column("id", SemanticType::String)
                        .column("name", SemanticType::String)
                        .column("updated_at", SemanticType::Date)
                        .has_one("profile", "profiles", "id", "user_id")
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
                })
                .entity("profiles", "profiles", |e| {
                    e.column("id", SemanticType::String)
                        .column("user_id", SemanticType::String)
                        .column("bio", SemanticType::String)
                        .column("avatar_id", SemanticType::String)
                        .belongs_to("avatar", "media", "avatar_id", "id")
                })
                .entity("media", "media", |e| {
                    e.column("id", SemanticType::String)
                        .column("filename", SemanticType::String)
                })
                .entity("roles", "roles", |e| {
                    e.column("id", SemanticType::String)
                        .column("name", SemanticType::String)
                })
                .build(),
        )
    }

    /// Store double returning a canned page plus queued preload batches, and
    /// recording every preload request it sees.
    struct FakeStore {
        page: Vec<serde_json::Value>,
        total: i64,
        preload_rows: Mutex<Vec<Vec<serde_json::Value>>>,
        seen: Mutex<Vec<PreloadQuery>>,
    }

    impl FakeStore {
        fn new(page: Vec<serde_json::Value>, total: i64) -> Self {
            Self {
                page,
                total,
                preload_rows: Mutex::new(Vec::new()),
                seen: Mutex::new(Vec::new()),
            }
        }

        /// Queue one preload response; responses are consumed in call order.
        fn on_preload(self, rows: Vec<serde_json::Value>) -> Self {
            self.preload_rows.lock().unwrap().push(rows);
            self
        }

        fn seen(&self) -> Vec<PreloadQuery> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StoreExecutor for FakeStore {
        async fn fetch_page(&self, _plan: &QueryPlan) -> QueryResult<Vec<serde_json::Value>> {
            Ok(self.page.clone())
        }

        async fn count(&self, _plan: &QueryPlan) -> QueryResult<i64> {
            Ok(self.total)
        }

        async fn fetch_preload(
            &self,
            preload: &PreloadQuery,
        ) -> QueryResult<Vec<serde_json::Value>> {
            self.seen.lock().unwrap().push(preload.clone());
            let mut queue = self.preload_rows.lock().unwrap();
            if queue.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(queue.remove(0))
            }
        }
    }

    #[tokio::test]
    async fn run_wraps_rows_in_pagination_metadata() {
        let store = Arc::new(FakeStore::new(
            (0..10).map(|i| json!({"id": i.to_string()})).collect(),
            25,
        ));
        let service = QueryService::new(registry(), store);

        let params = QueryParams {
            page: 2,
            per_page: 10,
            ..QueryParams::default()
        };
        let result = service.run("users", params).await.unwrap();

        assert_eq!(result.items.len(), 10);
        assert_eq!(result.total, 25);
        assert_eq!(result.current_page, 2);
        assert_eq!(result.last_page, 3);
        assert_eq!(result.next_page, Some(3));
        assert_eq!(result.prev_page, Some(1));
    }

    #[tokio::test]
    async fn unknown_entity_is_surfaced() {
        let store = Arc::new(FakeStore::new(Vec::new(), 0));
        let service = QueryService::new(registry(), store);

        let err = service.run("widgets", QueryParams::default()).await.unwrap_err();
        assert!(matches!(err, QueryError::UnknownEntity(_)));
    }

    #[tokio::test]
    async fn many_to_many_preload_attaches_arrays_and_strips_parent_key() {
        let store = Arc::new(
            FakeStore::new(
                vec![json!({"id": "u1"}), json!({"id": "u2"})],
                2,
            )
            .on_preload(vec![
                json!({"id": "r1", "name": "admin", "__parent_id": "u1"}),
                json!({"id": "r2", "name": "editor", "__parent_id": "u1"}),
            ]),
        );
        let service = QueryService::new(registry(), store.clone());

        let params = QueryParams {
            preload: vec!["roles".to_string()],
            ..QueryParams::default()
        };
        let result = service.run("users", params).await.unwrap();

        let roles = result.items[0].get("roles").unwrap().as_array().unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].get("name").unwrap(), "admin");
        assert!(roles[0].get("__parent_id").is_none(), "parent key alias must be stripped");
        assert_eq!(
            result.items[1].get("roles").unwrap(),
            &json!([]),
            "parent without matches gets an empty array"
        );

        let seen = store.seen();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            PreloadQuery::Pivot { pivot, table, keys, .. } => {
                assert_eq!(pivot.pivot_table, "user_roles");
                assert_eq!(table, "roles");
                assert_eq!(keys, &vec![json!("u1"), json!("u2")]);
            }
            other => panic!("expected pivot preload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nested_preload_recurses_and_embeds_singular_relations() {
        let store = Arc::new(
            FakeStore::new(vec![json!({"id": "u1"}), json!({"id": "u2"})], 2)
                // profiles for users
                .on_preload(vec![json!({
                    "id": "p1", "user_id": "u1", "bio": "hi", "avatar_id": "m1"
                })])
                // media for profiles
                .on_preload(vec![json!({"id": "m1", "filename": "face.png"})]),
        );
        let service = QueryService::new(registry(), store.clone());

        let params = QueryParams {
            preload: vec!["profile.avatar".to_string()],
            ..QueryParams::default()
        };
        let result = service.run("users", params).await.unwrap();

        let profile = result.items[0].get("profile").unwrap();
        assert_eq!(profile.get("bio").unwrap(), "hi");
        assert_eq!(
            profile.get("avatar").unwrap().get("filename").unwrap(),
            "face.png"
        );
        assert!(
            result.items[1].get("profile").unwrap().is_null(),
            "singular relation without a match embeds null"
        );

        let seen = store.seen();
        assert_eq!(seen.len(), 2);
        match &seen[1] {
            PreloadQuery::Keyed { table, key_column, keys, .. } => {
                assert_eq!(table, "media");
                assert_eq!(key_column, "id");
                assert_eq!(keys, &vec![json!("m1")]);
            }
            other => panic!("expected keyed preload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn select_preload_projection_keeps_matching_key() {
        let store = Arc::new(
            FakeStore::new(vec![json!({"id": "u1"})], 1)
                .on_preload(vec![json!({"id": "p1", "user_id": "u1", "bio": "hi"})]),
        );
        let service = QueryService::new(registry(), store.clone());

        let params = QueryParams {
            preload: vec!["profile".to_string()],
            select_preload: vec!["profile:bio".to_string()],
            ..QueryParams::default()
        };
        service.run("users", params).await.unwrap();

        let seen = store.seen();
        match &seen[0] {
            PreloadQuery::Keyed { columns, .. } => {
                assert_eq!(columns, &vec!["bio".to_string(), "user_id".to_string()]);
            }
            other => panic!("expected keyed preload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_select_preload_column_fails_loudly() {
        let store = Arc::new(
            FakeStore::new(vec![json!({"id": "u1"})], 1).on_preload(Vec::new()),
        );
        let service = QueryService::new(registry(), store);

        let params = QueryParams {
            preload: vec!["profile".to_string()],
            select_preload: vec!["profile:nonexistent".to_string()],
            ..QueryParams::default()
        };
        let err = service.run("users", params).await.unwrap_err();
        match err {
            QueryError::UnknownColumn { entity, column } => {
                assert_eq!(entity, "profiles");
                assert_eq!(column, "nonexistent");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_page_issues_no_preload_queries() {
        let store = Arc::new(FakeStore::new(Vec::new(), 0));
        let service = QueryService::new(registry(), store.clone());

        let params = QueryParams {
            preload: vec!["roles".to_string()],
            ..QueryParams::default()
        };
        let result = service.run("users", params).await.unwrap();

        assert!(result.items.is_empty());
        assert!(store.seen().is_empty());
    }
}
