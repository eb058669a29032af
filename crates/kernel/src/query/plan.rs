//! Query plan assembly.
//!
//! Pure functions merge the compiled pieces — projection, relation tree,
//! predicate tree, order spec, pagination window — into one immutable
//! [`QueryPlan`]. The plan is backend-agnostic; rendering to SQL happens in
//! `sql`, execution in `executor`.

use super::error::{QueryError, QueryResult};
use super::paginate::PageWindow;
use super::params::QueryParams;
use super::predicate::{self, Predicate};
use super::registry::EntityRegistry;
use super::relation_tree::{self, RelationTree};
use super::sort::{self, OrderSpec};

/// An inner join, `ON left.0.left.1 = right.0.right.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub table: String,
    pub left: (String, String),
    pub right: (String, String),
}

/// The compiled, immutable representation of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub entity: String,
    pub table: String,
    /// Projected base-table columns; empty means all.
    pub columns: Vec<String>,
    pub preload: RelationTree,
    pub predicate: Option<Predicate>,
    /// Joins required by the order spec (relation-aggregate sort only).
    pub joins: Vec<JoinSpec>,
    /// Base-table columns grouped on to deduplicate join fan-out.
    pub group_by: Vec<String>,
    pub order: OrderSpec,
    pub window: PageWindow,
}

/// Compile a request into a plan.
///
/// Pagination is clamped to ≥ 1; the projection resolves `select` over
/// `exclude` when both are given; `filters` are validated and folded into the
/// predicate ahead of the search families.
pub fn assemble(
    registry: &EntityRegistry,
    entity: &str,
    params: &QueryParams,
) -> QueryResult<QueryPlan> {
    let descriptor = registry.entity(entity)?;
    let window = PageWindow::clamped(params.page, params.per_page);
    let columns = resolve_projection(registry, entity, params)?;
    let preload = relation_tree::build(registry, entity, params)?;
    let predicate = predicate::compile(registry, entity, params)?;
    let order = sort::resolve(registry, entity, params);
    let (joins, group_by) = order_support(descriptor.table(), &order);

    Ok(QueryPlan {
        entity: entity.to_string(),
        table: descriptor.table().to_string(),
        columns,
        preload,
        predicate,
        joins,
        group_by,
        order,
        window,
    })
}

/// Resolve `select`/`exclude` into a concrete column list. `select` wins when
/// both are present; an unknown name in either is a configuration error.
fn resolve_projection(
    registry: &EntityRegistry,
    entity: &str,
    params: &QueryParams,
) -> QueryResult<Vec<String>> {
    let descriptor = registry.entity(entity)?;
    let verify = |name: &String| -> QueryResult<()> {
        if descriptor.column(name).is_none() {
            return Err(QueryError::UnknownColumn {
                entity: entity.to_string(),
                column: name.clone(),
            });
        }
        Ok(())
    };

    if !params.select.is_empty() {
        for name in &params.select {
            verify(name)?;
        }
        return Ok(params.select.clone());
    }

    if !params.exclude.is_empty() {
        for name in &params.exclude {
            verify(name)?;
        }
        return Ok(descriptor
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .filter(|name| !params.exclude.contains(name))
            .collect());
    }

    Ok(Vec::new())
}

/// Joins and grouping demanded by the order spec.
fn order_support(base_table: &str, order: &OrderSpec) -> (Vec<JoinSpec>, Vec<String>) {
    match order {
        OrderSpec::Column { .. } => (Vec::new(), Vec::new()),
        OrderSpec::RelationAggregate {
            pivot,
            related_table,
            ..
        } => {
            let joins = vec![
                JoinSpec {
                    table: pivot.pivot_table.clone(),
                    left: (base_table.to_string(), pivot.local_key.clone()),
                    right: (pivot.pivot_table.clone(), pivot.pivot_foreign_key.clone()),
                },
                JoinSpec {
                    table: related_table.clone(),
                    left: (related_table.clone(), pivot.related_key.clone()),
                    right: (
                        pivot.pivot_table.clone(),
                        pivot.pivot_related_foreign_key.clone(),
                    ),
                },
            ];
            (joins, vec![pivot.local_key.clone()])
        }
    }
}
