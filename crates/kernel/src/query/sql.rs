//! SQL rendering for query plans, using SeaQuery.
//!
//! All identifiers go through SeaQuery aliases (quoted) and all values
//! through SeaQuery value escaping, so untrusted input can never splice SQL.
//! LIKE wildcard characters in search terms are escaped so they match
//! literally.

use sea_query::extension::postgres::PgExpr;
use sea_query::{
    Alias, Asterisk, Cond, Expr, ExprTrait, Func, JoinType, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr, Value,
};

use super::params::{Aggregate, FilterValue, SortDirection};
use super::plan::QueryPlan;
use super::predicate::Predicate;
use super::registry::{PivotLink, RelationLink};
use super::sort::OrderSpec;

/// Alias under which pivot preload queries expose the parent's key.
pub const PARENT_KEY_ALIAS: &str = "__parent_id";

/// Build the page-fetch SELECT with joins, grouping, ordering, and
/// limit/offset.
pub fn build_page_sql(plan: &QueryPlan) -> String {
    let mut query = Query::select();

    add_projection(&mut query, &plan.table, &plan.columns);
    query.from(Alias::new(&plan.table));

    for join in &plan.joins {
        query.join(
            JoinType::InnerJoin,
            Alias::new(&join.table),
            Expr::col((Alias::new(&join.left.0), Alias::new(&join.left.1)))
                .equals((Alias::new(&join.right.0), Alias::new(&join.right.1))),
        );
    }

    if let Some(predicate) = &plan.predicate {
        query.and_where(predicate_expr(&plan.table, predicate));
    }

    for column in &plan.group_by {
        query.group_by_col((Alias::new(&plan.table), Alias::new(column)));
    }

    match &plan.order {
        OrderSpec::Column { column, direction } => {
            query.order_by(
                (Alias::new(&plan.table), Alias::new(column)),
                order(*direction),
            );
        }
        OrderSpec::RelationAggregate {
            related_table,
            column,
            aggregate,
            direction,
            ..
        } => {
            let related = Expr::col((Alias::new(related_table), Alias::new(column)));
            let call = match aggregate {
                Aggregate::Min => Func::min(related),
                Aggregate::Max => Func::max(related),
            };
            query.order_by_expr(call.into(), order(*direction));
        }
    }

    query.limit(plan.window.limit());
    query.offset(plan.window.offset());

    query.to_string(PostgresQueryBuilder)
}

/// Build the COUNT query: same predicate set, no joins, grouping, ordering,
/// or pagination.
pub fn build_count_sql(plan: &QueryPlan) -> String {
    let mut query = Query::select();
    query.expr(Expr::col(Asterisk).count());
    query.from(Alias::new(&plan.table));

    if let Some(predicate) = &plan.predicate {
        query.and_where(predicate_expr(&plan.table, predicate));
    }

    query.to_string(PostgresQueryBuilder)
}

/// Build a batched preload SELECT: `key_column IN (keys)` against one table.
pub fn build_keyed_preload_sql(
    table: &str,
    columns: &[String],
    key_column: &str,
    keys: &[serde_json::Value],
) -> String {
    let mut query = Query::select();
    add_projection(&mut query, table, columns);
    query.from(Alias::new(table));
    query.and_where(
        Expr::col((Alias::new(table), Alias::new(key_column))).is_in(keys.iter().map(json_value)),
    );
    query.to_string(PostgresQueryBuilder)
}

/// Build a batched many-to-many preload SELECT through the pivot, exposing
/// the parent key as [`PARENT_KEY_ALIAS`] so rows can be distributed back.
pub fn build_pivot_preload_sql(
    pivot: &PivotLink,
    related_table: &str,
    columns: &[String],
    keys: &[serde_json::Value],
) -> String {
    let mut query = Query::select();
    add_projection(&mut query, related_table, columns);
    query.expr_as(
        Expr::col((
            Alias::new(&pivot.pivot_table),
            Alias::new(&pivot.pivot_foreign_key),
        )),
        Alias::new(PARENT_KEY_ALIAS),
    );
    query.from(Alias::new(&pivot.pivot_table));
    query.join(
        JoinType::InnerJoin,
        Alias::new(related_table),
        Expr::col((Alias::new(related_table), Alias::new(&pivot.related_key))).equals((
            Alias::new(&pivot.pivot_table),
            Alias::new(&pivot.pivot_related_foreign_key),
        )),
    );
    query.and_where(
        Expr::col((
            Alias::new(&pivot.pivot_table),
            Alias::new(&pivot.pivot_foreign_key),
        ))
        .is_in(keys.iter().map(json_value)),
    );
    query.to_string(PostgresQueryBuilder)
}

fn add_projection(query: &mut SelectStatement, table: &str, columns: &[String]) {
    if columns.is_empty() {
        query.column((Alias::new(table), Asterisk));
    } else {
        for column in columns {
            query.column((Alias::new(table), Alias::new(column)));
        }
    }
}

/// Render a predicate tree against `table`.
fn predicate_expr(table: &str, predicate: &Predicate) -> SimpleExpr {
    match predicate {
        Predicate::And(parts) => {
            let mut cond = Cond::all();
            for part in parts {
                cond = cond.add(predicate_expr(table, part));
            }
            cond.into()
        }
        Predicate::Or(parts) => {
            let mut cond = Cond::any();
            for part in parts {
                cond = cond.add(predicate_expr(table, part));
            }
            cond.into()
        }
        Predicate::Contains { column, term, cast } => {
            let col = Expr::col((Alias::new(table), Alias::new(column)));
            let pattern = format!("%{}%", escape_like_wildcards(term));
            if *cast {
                col.cast_as(Alias::new("TEXT")).ilike(pattern)
            } else {
                col.ilike(pattern)
            }
        }
        Predicate::Equals { column, value } => {
            Expr::col((Alias::new(table), Alias::new(column))).eq(filter_value(value))
        }
        Predicate::BoolEquals { column, value } => {
            Expr::col((Alias::new(table), Alias::new(column))).eq(*value)
        }
        Predicate::RelationExists {
            relation,
            target_table,
            link,
            inner,
        } => relation_exists(table, relation, target_table, link, inner),
    }
}

/// Render an EXISTS sub-select for a relation predicate.
///
/// The related table is aliased by relation name so self-referential
/// relations stay unambiguous; the inner condition renders against that
/// alias.
fn relation_exists(
    base: &str,
    relation: &str,
    target_table: &str,
    link: &RelationLink,
    inner: &Predicate,
) -> SimpleExpr {
    let mut sub = Query::select();
    sub.expr(Expr::val(1));

    match link {
        RelationLink::BelongsTo {
            foreign_key,
            owner_key,
        } => {
            sub.from_as(Alias::new(target_table), Alias::new(relation));
            sub.and_where(
                Expr::col((Alias::new(relation), Alias::new(owner_key)))
                    .equals((Alias::new(base), Alias::new(foreign_key))),
            );
        }
        RelationLink::HasOne {
            local_key,
            foreign_key,
        }
        | RelationLink::HasMany {
            local_key,
            foreign_key,
        } => {
            sub.from_as(Alias::new(target_table), Alias::new(relation));
            sub.and_where(
                Expr::col((Alias::new(relation), Alias::new(foreign_key)))
                    .equals((Alias::new(base), Alias::new(local_key))),
            );
        }
        RelationLink::ManyToMany(pivot) => {
            sub.from(Alias::new(&pivot.pivot_table));
            sub.join_as(
                JoinType::InnerJoin,
                Alias::new(target_table),
                Alias::new(relation),
                Expr::col((Alias::new(relation), Alias::new(&pivot.related_key))).equals((
                    Alias::new(&pivot.pivot_table),
                    Alias::new(&pivot.pivot_related_foreign_key),
                )),
            );
            sub.and_where(
                Expr::col((
                    Alias::new(&pivot.pivot_table),
                    Alias::new(&pivot.pivot_foreign_key),
                ))
                .equals((Alias::new(base), Alias::new(&pivot.local_key))),
            );
        }
    }

    sub.and_where(predicate_expr(relation, inner));
    Expr::exists(sub)
}

fn order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

fn filter_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::String(s) => s.clone().into(),
        FilterValue::Integer(i) => (*i).into(),
        FilterValue::Float(f) => (*f).into(),
        FilterValue::Boolean(b) => (*b).into(),
        FilterValue::Uuid(u) => (*u).into(),
    }
}

fn json_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::String(s) => s.clone().into(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or_default().into()
            }
        }
        serde_json::Value::Bool(b) => (*b).into(),
        _ => Value::String(None),
    }
}

/// Escape SQL LIKE wildcard characters (`%`, `_`, `\`) in a value.
fn escape_like_wildcards(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::paginate::PageWindow;
    use crate::query::params::{QueryParams, RelationSearch, RelationSort};
    use crate::query::plan::assemble;
    use crate::query::registry::{EntityRegistry, SemanticType};

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .entity("users", "users", |e| {
                e.column("id", SemanticType::String)
                    .column("name", SemanticType::String)
                    .column("age", SemanticType::Number)
                    .column("is_active", SemanticType::Boolean)
                    .column("updated_at", SemanticType::Date)
                    .has_many("media", "media", "id", "user_id")
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
            .entity("roles", "roles", |e| e.column("name", SemanticType::String))
            .entity("media", "media", |e| {
                e.column("filename", SemanticType::String)
            })
            .build()
    }

    #[test]
    fn global_search_casts_non_string_columns() {
        // columns {String, Number, Boolean}, search "true": one ILIKE per
        // column, casts on age and is_active
        let registry = registry();
        let params = QueryParams {
            search: "true".to_string(),
            searchable_columns: vec![
                "name".to_string(),
                "age".to_string(),
                "is_active".to_string(),
            ],
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        assert!(sql.contains(r#""users"."name" ILIKE"#), "{sql}");
        assert!(sql.contains("%true%"), "{sql}");
        assert!(sql.contains("CAST"), "{sql}");
        assert!(sql.contains(r#""age""#), "{sql}");
        assert!(sql.contains(r#""is_active""#), "{sql}");
        assert_eq!(sql.matches("ILIKE").count(), 3, "{sql}");
        assert_eq!(sql.matches(" OR ").count(), 2, "{sql}");
    }

    #[test]
    fn relation_aggregate_sort_renders_join_group_aggregate() {
        // sort=-roles.name over a many-to-many: users→user_roles→roles,
        // grouped by users.id, ordered by MIN(roles.name) DESC
        let registry = registry();
        let params = QueryParams {
            sort_by: Some("roles.name".to_string()),
            sort_direction: crate::query::params::SortDirection::Desc,
            sortable_relations: vec![RelationSort {
                relation: "roles".to_string(),
                column: "name".to_string(),
                aggregate: Aggregate::Min,
            }],
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        assert!(
            sql.contains(r#"INNER JOIN "user_roles" ON "users"."id" = "user_roles"."user_id""#),
            "{sql}"
        );
        assert!(
            sql.contains(r#"INNER JOIN "roles" ON "roles"."id" = "user_roles"."role_id""#),
            "{sql}"
        );
        assert!(sql.contains(r#"GROUP BY "users"."id""#), "{sql}");
        assert!(sql.contains(r#"MIN("roles"."name") DESC"#), "{sql}");
    }

    #[test]
    fn default_order_is_updated_at_desc() {
        let registry = registry();
        let plan = assemble(&registry, "users", &QueryParams::default()).unwrap();
        let sql = build_page_sql(&plan);
        assert!(sql.contains(r#"ORDER BY "users"."updated_at" DESC"#), "{sql}");
    }

    #[test]
    fn pagination_renders_limit_offset() {
        let registry = registry();
        let params = QueryParams {
            page: 2,
            per_page: 10,
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(sql.contains("OFFSET 10"), "{sql}");
    }

    #[test]
    fn count_ignores_order_limit_and_joins() {
        let registry = registry();
        let params = QueryParams {
            search: "x".to_string(),
            page: 3,
            per_page: 10,
            sort_by: Some("roles.name".to_string()),
            sortable_relations: vec![RelationSort {
                relation: "roles".to_string(),
                column: "name".to_string(),
                aggregate: Aggregate::Max,
            }],
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_count_sql(&plan);

        assert!(sql.contains("COUNT(*)"), "{sql}");
        assert!(sql.contains("ILIKE"), "{sql}");
        assert!(!sql.contains("LIMIT"), "{sql}");
        assert!(!sql.contains("ORDER BY"), "{sql}");
        assert!(!sql.contains("JOIN"), "{sql}");
        assert!(!sql.contains("GROUP BY"), "{sql}");
    }

    #[test]
    fn many_to_many_search_relation_renders_exists_through_pivot() {
        let registry = registry();
        let params = QueryParams {
            search: "editor".to_string(),
            searchable_columns: vec!["name".to_string()],
            search_relations: vec![RelationSearch {
                relation: "roles".to_string(),
                columns: vec!["name".to_string()],
            }],
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        assert!(sql.contains("EXISTS"), "{sql}");
        assert!(sql.contains(r#"FROM "user_roles""#), "{sql}");
        assert!(
            sql.contains(r#""user_roles"."user_id" = "users"."id""#),
            "{sql}"
        );
        assert!(sql.contains(r#""roles"."name" ILIKE"#), "{sql}");
    }

    #[test]
    fn has_many_column_search_renders_correlated_exists() {
        let registry = registry();
        let params = QueryParams {
            search_by: [("media.filename".to_string(), "report".to_string())]
                .into_iter()
                .collect(),
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        assert!(sql.contains("EXISTS"), "{sql}");
        assert!(
            sql.contains(r#""media"."user_id" = "users"."id""#),
            "{sql}"
        );
        assert!(sql.contains("%report%"), "{sql}");
    }

    #[test]
    fn like_wildcards_in_search_match_literally() {
        let registry = registry();
        let params = QueryParams {
            search_by: [("name".to_string(), "100%_done".to_string())]
                .into_iter()
                .collect(),
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        assert!(
            !sql.contains("%100%_done%"),
            "raw wildcard chars should not appear unescaped: {sql}"
        );
    }

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello"), "hello");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("a_b"), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b"), "a\\\\b");
    }

    #[test]
    fn hostile_sort_column_is_quoted_not_spliced() {
        let registry = registry();
        let params = QueryParams {
            sort_by: Some("name; DROP TABLE users--".to_string()),
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        // the whole string becomes one quoted identifier
        assert!(sql.contains(r#""name; DROP TABLE users--""#), "{sql}");
        assert!(!sql.contains(r#"ORDER BY name;"#), "{sql}");
    }

    #[test]
    fn select_projection_renders_named_columns_only() {
        let registry = registry();
        let params = QueryParams {
            select: vec!["id".to_string(), "name".to_string()],
            ..QueryParams::default()
        };
        let plan = assemble(&registry, "users", &params).unwrap();
        let sql = build_page_sql(&plan);

        assert!(sql.starts_with(r#"SELECT "users"."id", "users"."name" FROM"#), "{sql}");
    }

    #[test]
    fn keyed_preload_sql_batches_on_key() {
        let keys = vec![serde_json::json!("a"), serde_json::json!("b")];
        let sql = build_keyed_preload_sql(
            "media",
            &["id".to_string(), "filename".to_string(), "user_id".to_string()],
            "user_id",
            &keys,
        );

        assert!(sql.contains(r#"FROM "media""#), "{sql}");
        assert!(sql.contains(r#""media"."user_id" IN ('a', 'b')"#), "{sql}");
    }

    #[test]
    fn pivot_preload_sql_exposes_parent_key() {
        let pivot = PivotLink {
            pivot_table: "user_roles".to_string(),
            local_key: "id".to_string(),
            pivot_foreign_key: "user_id".to_string(),
            pivot_related_foreign_key: "role_id".to_string(),
            related_key: "id".to_string(),
        };
        let keys = vec![serde_json::json!("u1")];
        let sql = build_pivot_preload_sql(&pivot, "roles", &[], &keys);

        assert!(sql.contains(PARENT_KEY_ALIAS), "{sql}");
        assert!(
            sql.contains(r#"INNER JOIN "roles" ON "roles"."id" = "user_roles"."role_id""#),
            "{sql}"
        );
        assert!(sql.contains(r#""user_roles"."user_id" IN ('u1')"#), "{sql}");
    }

    #[test]
    fn empty_predicate_renders_no_where() {
        let registry = registry();
        let plan = assemble(&registry, "users", &QueryParams::default()).unwrap();
        assert!(!build_page_sql(&plan).contains("WHERE"));
        assert!(!build_count_sql(&plan).contains("WHERE"));
    }

    #[test]
    fn window_is_reflected_exactly() {
        let registry = registry();
        let mut plan = assemble(&registry, "users", &QueryParams::default()).unwrap();
        plan.window = PageWindow::clamped(4, 25);
        let sql = build_page_sql(&plan);
        assert!(sql.contains("LIMIT 25"), "{sql}");
        assert!(sql.contains("OFFSET 75"), "{sql}");
    }
}
