//! Predicate compilation.
//!
//! Turns the free-text `search` term, the per-column `search_by` map, and the
//! caller's exact-match `filters` into one backend-agnostic predicate tree.
//! Compilation is whitelist-constrained and type-aware: string columns get a
//! case-insensitive partial match, boolean columns exact equality, and every
//! other type is cast to text and partial-matched so numeric/date columns
//! stay globally searchable.

use super::error::{QueryError, QueryResult};
use super::params::{FilterValue, QueryParams};
use super::registry::{ColumnDescriptor, EntityRegistry, RelationLink, SemanticType};

/// Backend-agnostic predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    /// Case-insensitive partial match; `cast` wraps the column in a cast to
    /// text first.
    Contains {
        column: String,
        term: String,
        cast: bool,
    },
    /// Exact match.
    Equals { column: String, value: FilterValue },
    /// Exact boolean equality.
    BoolEquals { column: String, value: bool },
    /// EXISTS against a related table; `inner` references the related
    /// entity's columns.
    RelationExists {
        relation: String,
        target_table: String,
        link: RelationLink,
        inner: Box<Predicate>,
    },
}

/// Compile all predicate families for one request.
///
/// Exact-match filters come first, then the global search OR-group, then the
/// per-column AND-group; the families are ANDed together.
pub fn compile(
    registry: &EntityRegistry,
    entity: &str,
    params: &QueryParams,
) -> QueryResult<Option<Predicate>> {
    let mut parts = Vec::new();
    if let Some(p) = exact_filters(registry, entity, params)? {
        parts.push(p);
    }
    if let Some(p) = global_search(registry, entity, params)? {
        parts.push(p);
    }
    if let Some(p) = column_search(registry, entity, params)? {
        parts.push(p);
    }

    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Predicate::And(parts)),
    })
}

/// Caller-supplied exact-match conditions.
///
/// These come from controller code, not user input, so an unknown column is a
/// configuration bug and fails loudly.
pub fn exact_filters(
    registry: &EntityRegistry,
    entity: &str,
    params: &QueryParams,
) -> QueryResult<Option<Predicate>> {
    if params.filters.is_empty() {
        return Ok(None);
    }

    let descriptor = registry.entity(entity)?;
    let mut conditions = Vec::new();
    for (column, value) in &params.filters {
        if descriptor.column(column).is_none() {
            return Err(QueryError::UnknownColumn {
                entity: entity.to_string(),
                column: column.clone(),
            });
        }
        conditions.push(Predicate::Equals {
            column: column.clone(),
            value: value.clone(),
        });
    }

    Ok(Some(Predicate::And(conditions)))
}

/// The free-text search OR-group.
///
/// One branch per searchable column (string columns matched directly, the
/// rest cast to text), plus one relation-existence branch per
/// `search_relations` entry — a hit in any related row counts as a match on
/// the parent, so those branches are ORed in rather than ANDed.
pub fn global_search(
    registry: &EntityRegistry,
    entity: &str,
    params: &QueryParams,
) -> QueryResult<Option<Predicate>> {
    if params.search.is_empty() {
        return Ok(None);
    }

    let descriptor = registry.entity(entity)?;
    let whitelist = &params.searchable_columns;
    let mut branches = Vec::new();

    for column in descriptor.columns() {
        if !whitelist.is_empty() && !whitelist.iter().any(|c| c == &column.name) {
            continue;
        }
        branches.push(contains(column, &params.search));
    }

    for entry in &params.search_relations {
        let relation = registry.relation(entity, &entry.relation)?;
        let target = registry.entity(&relation.target)?;

        let mut inner = Vec::new();
        for name in &entry.columns {
            let column = target.column(name).ok_or_else(|| QueryError::UnknownColumn {
                entity: relation.target.clone(),
                column: name.clone(),
            })?;
            inner.push(contains(column, &params.search));
        }
        if inner.is_empty() {
            continue;
        }

        branches.push(Predicate::RelationExists {
            relation: relation.name.clone(),
            target_table: target.table().to_string(),
            link: relation.link.clone(),
            inner: Box::new(Predicate::Or(inner)),
        });
    }

    Ok(if branches.is_empty() {
        None
    } else {
        Some(Predicate::Or(branches))
    })
}

/// The per-column structured search AND-group.
///
/// Dotted `relation.column` entries become relation-existence predicates
/// whose single inner condition the related row must satisfy on its own.
/// Entries failing the whitelist, naming unknown columns/relations, or
/// carrying empty values contribute nothing — they are user input noise, not
/// configuration errors. An empty value never becomes an IS NULL check.
pub fn column_search(
    registry: &EntityRegistry,
    entity: &str,
    params: &QueryParams,
) -> QueryResult<Option<Predicate>> {
    let descriptor = registry.entity(entity)?;
    let whitelist = &params.searchable_columns;
    let allowed = |name: &str| whitelist.is_empty() || whitelist.iter().any(|c| c == name);

    let mut conditions = Vec::new();
    for (path, value) in &params.search_by {
        if value.is_empty() {
            continue;
        }

        if let Some((relation_name, tail)) = path.split_once('.') {
            if !allowed(tail) {
                continue;
            }
            let Some(relation) = descriptor.relation(relation_name) else {
                continue;
            };
            let target = registry.entity(&relation.target)?;
            let Some(column) = target.column(tail) else {
                continue;
            };
            let Some(inner) = typed_condition(column, value) else {
                continue;
            };
            conditions.push(Predicate::RelationExists {
                relation: relation.name.clone(),
                target_table: target.table().to_string(),
                link: relation.link.clone(),
                inner: Box::new(inner),
            });
        } else {
            if !allowed(path) {
                continue;
            }
            let Some(column) = descriptor.column(path) else {
                continue;
            };
            if let Some(condition) = typed_condition(column, value) {
                conditions.push(condition);
            }
        }
    }

    Ok(if conditions.is_empty() {
        None
    } else {
        Some(Predicate::And(conditions))
    })
}

/// Dispatch one `(column, value)` pair by semantic type.
///
/// A literal `"true"`/`"false"` forces boolean equality regardless of the
/// column's type; any other value on a boolean column has no sensible match
/// and is skipped.
fn typed_condition(column: &ColumnDescriptor, value: &str) -> Option<Predicate> {
    match value {
        "true" | "false" => Some(Predicate::BoolEquals {
            column: column.name.clone(),
            value: value == "true",
        }),
        _ => match column.semantic {
            SemanticType::Boolean => None,
            _ => Some(contains(column, value)),
        },
    }
}

fn contains(column: &ColumnDescriptor, term: &str) -> Predicate {
    Predicate::Contains {
        column: column.name.clone(),
        term: term.to_string(),
        cast: column.semantic != SemanticType::String,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::params::RelationSearch;
    use crate::query::registry::{PivotLink, SemanticType};

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .entity("users", "users", |e| {
                e.column("name", SemanticType::String)
                    .column("age", SemanticType::Number)
                    .column("is_active", SemanticType::Boolean)
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
            .entity("roles", "roles", |e| {
                e.column("name", SemanticType::String)
                    .column("label", SemanticType::String)
            })
            .build()
    }

    fn columns_of(predicate: &Predicate) -> Vec<String> {
        match predicate {
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().flat_map(columns_of).collect()
            }
            Predicate::Contains { column, .. }
            | Predicate::Equals { column, .. }
            | Predicate::BoolEquals { column, .. } => vec![column.clone()],
            Predicate::RelationExists { inner, .. } => columns_of(inner),
        }
    }

    #[test]
    fn global_search_covers_all_columns_with_cast_fallback() {
        // search="true" across {String, Number, Boolean}: every column is
        // matched, non-string columns through a text cast
        let registry = registry();
        let params = QueryParams {
            search: "true".to_string(),
            ..QueryParams::default()
        };

        let predicate = global_search(&registry, "users", &params).unwrap().unwrap();
        let Predicate::Or(branches) = predicate else {
            panic!("expected OR group");
        };
        assert_eq!(branches.len(), 3);
        assert_eq!(
            branches[0],
            Predicate::Contains {
                column: "name".to_string(),
                term: "true".to_string(),
                cast: false,
            }
        );
        assert_eq!(
            branches[1],
            Predicate::Contains {
                column: "age".to_string(),
                term: "true".to_string(),
                cast: true,
            }
        );
        assert_eq!(
            branches[2],
            Predicate::Contains {
                column: "is_active".to_string(),
                term: "true".to_string(),
                cast: true,
            }
        );
    }

    #[test]
    fn global_search_respects_whitelist() {
        let registry = registry();
        let params = QueryParams {
            search: "x".to_string(),
            searchable_columns: vec!["name".to_string()],
            search_relations: vec![RelationSearch {
                relation: "roles".to_string(),
                columns: vec!["name".to_string()],
            }],
            ..QueryParams::default()
        };

        let predicate = global_search(&registry, "users", &params).unwrap().unwrap();
        let referenced = columns_of(&predicate);
        // whitelist ∪ search_relations columns, nothing else
        assert_eq!(referenced, vec!["name".to_string(), "name".to_string()]);
    }

    #[test]
    fn global_search_relation_branch_is_ored_in() {
        let registry = registry();
        let params = QueryParams {
            search: "editor".to_string(),
            search_relations: vec![RelationSearch {
                relation: "roles".to_string(),
                columns: vec!["name".to_string(), "label".to_string()],
            }],
            ..QueryParams::default()
        };

        let predicate = global_search(&registry, "users", &params).unwrap().unwrap();
        let Predicate::Or(branches) = predicate else {
            panic!("expected OR group");
        };
        let Predicate::RelationExists { inner, .. } = branches.last().unwrap() else {
            panic!("expected relation branch last");
        };
        let Predicate::Or(inner) = inner.as_ref() else {
            panic!("inner condition should OR across relation columns");
        };
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn global_search_unknown_relation_fails_loudly() {
        let registry = registry();
        let params = QueryParams {
            search: "x".to_string(),
            search_relations: vec![RelationSearch {
                relation: "groups".to_string(),
                columns: vec!["name".to_string()],
            }],
            ..QueryParams::default()
        };

        let err = global_search(&registry, "users", &params).unwrap_err();
        assert!(matches!(err, QueryError::UnknownRelation { .. }));
    }

    #[test]
    fn global_search_unknown_relation_column_fails_loudly() {
        let registry = registry();
        let params = QueryParams {
            search: "x".to_string(),
            search_relations: vec![RelationSearch {
                relation: "roles".to_string(),
                columns: vec!["missing".to_string()],
            }],
            ..QueryParams::default()
        };

        let err = global_search(&registry, "users", &params).unwrap_err();
        match err {
            QueryError::UnknownColumn { entity, column } => {
                assert_eq!(entity, "roles");
                assert_eq!(column, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn column_search_dispatches_by_type() {
        let registry = registry();
        let params = QueryParams {
            search_by: [
                ("name".to_string(), "alice".to_string()),
                ("age".to_string(), "42".to_string()),
                ("is_active".to_string(), "true".to_string()),
            ]
            .into_iter()
            .collect(),
            ..QueryParams::default()
        };

        let predicate = column_search(&registry, "users", &params).unwrap().unwrap();
        let Predicate::And(conditions) = predicate else {
            panic!("expected AND group");
        };
        assert!(conditions.contains(&Predicate::Contains {
            column: "name".to_string(),
            term: "alice".to_string(),
            cast: false,
        }));
        assert!(conditions.contains(&Predicate::Contains {
            column: "age".to_string(),
            term: "42".to_string(),
            cast: true,
        }));
        assert!(conditions.contains(&Predicate::BoolEquals {
            column: "is_active".to_string(),
            value: true,
        }));
    }

    #[test]
    fn literal_true_on_any_column_is_boolean_equality() {
        let registry = registry();
        let users = registry.entity("users").unwrap();
        let name = users.column("name").unwrap();

        assert_eq!(
            typed_condition(name, "false"),
            Some(Predicate::BoolEquals {
                column: "name".to_string(),
                value: false,
            })
        );
    }

    #[test]
    fn empty_values_are_skipped_not_null_checked() {
        let registry = registry();
        let params = QueryParams {
            search_by: [("name".to_string(), String::new())].into_iter().collect(),
            ..QueryParams::default()
        };

        assert!(column_search(&registry, "users", &params).unwrap().is_none());
    }

    #[test]
    fn dotted_column_search_is_relation_exists_with_single_condition() {
        let registry = registry();
        let params = QueryParams {
            search_by: [("roles.name".to_string(), "editor".to_string())]
                .into_iter()
                .collect(),
            ..QueryParams::default()
        };

        let predicate = column_search(&registry, "users", &params).unwrap().unwrap();
        let Predicate::And(conditions) = predicate else {
            panic!("expected AND group");
        };
        let Predicate::RelationExists { relation, inner, .. } = &conditions[0] else {
            panic!("expected relation predicate");
        };
        assert_eq!(relation, "roles");
        assert_eq!(
            inner.as_ref(),
            &Predicate::Contains {
                column: "name".to_string(),
                term: "editor".to_string(),
                cast: false,
            }
        );
    }

    #[test]
    fn dotted_search_on_unknown_relation_is_skipped() {
        // search_by is user input; unknown names are noise, not config bugs
        let registry = registry();
        let params = QueryParams {
            search_by: [
                ("groups.name".to_string(), "x".to_string()),
                ("roles.missing".to_string(), "x".to_string()),
            ]
            .into_iter()
            .collect(),
            ..QueryParams::default()
        };

        assert!(column_search(&registry, "users", &params).unwrap().is_none());
    }

    #[test]
    fn column_search_respects_whitelist_for_plain_and_dotted() {
        let registry = registry();
        let params = QueryParams {
            search_by: [
                ("age".to_string(), "42".to_string()),
                ("roles.label".to_string(), "x".to_string()),
            ]
            .into_iter()
            .collect(),
            searchable_columns: vec!["name".to_string()],
            ..QueryParams::default()
        };

        assert!(column_search(&registry, "users", &params).unwrap().is_none());
    }

    #[test]
    fn exact_filters_unknown_column_fails_loudly() {
        let registry = registry();
        let params = QueryParams {
            filters: [(
                "nonexistent".to_string(),
                FilterValue::String("x".to_string()),
            )]
            .into_iter()
            .collect(),
            ..QueryParams::default()
        };

        let err = exact_filters(&registry, "users", &params).unwrap_err();
        assert!(matches!(err, QueryError::UnknownColumn { .. }));
    }

    #[test]
    fn compile_ands_families_with_filters_first() {
        let registry = registry();
        let params = QueryParams {
            search: "x".to_string(),
            search_by: [("name".to_string(), "y".to_string())].into_iter().collect(),
            filters: [("is_active".to_string(), FilterValue::Boolean(true))]
                .into_iter()
                .collect(),
            ..QueryParams::default()
        };

        let predicate = compile(&registry, "users", &params).unwrap().unwrap();
        let Predicate::And(families) = predicate else {
            panic!("expected AND of families");
        };
        assert_eq!(families.len(), 3);
        assert!(matches!(&families[0], Predicate::And(f) if matches!(&f[0], Predicate::Equals { .. })));
        assert!(matches!(&families[1], Predicate::Or(_)));
    }

    #[test]
    fn compile_with_no_input_is_none() {
        let registry = registry();
        let params = QueryParams::default();
        assert!(compile(&registry, "users", &params).unwrap().is_none());
    }
}
