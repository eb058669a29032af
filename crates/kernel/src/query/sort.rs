//! Sort resolution.
//!
//! Decides between plain column ordering, many-to-many relation-aggregate
//! ordering, and the whitelist fallback. Resolution never fails: requests
//! outside the sortable whitelist, and relation sorts against unsupported
//! relation kinds, silently degrade to the default order.

use super::params::{Aggregate, QueryParams, SortDirection};
use super::registry::{EntityRegistry, PivotLink, RelationLink};

/// Default sort column when the request names none.
pub const DEFAULT_SORT_COLUMN: &str = "updated_at";

/// Resolved ordering for a query plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderSpec {
    /// `ORDER BY column direction` on the base table.
    Column {
        column: String,
        direction: SortDirection,
    },
    /// Join through a pivot, group by the base key, and order by an
    /// aggregate of the related column.
    RelationAggregate {
        pivot: PivotLink,
        related_table: String,
        column: String,
        aggregate: Aggregate,
        direction: SortDirection,
    },
}

impl OrderSpec {
    /// `updated_at DESC`.
    pub fn default_order() -> Self {
        OrderSpec::Column {
            column: DEFAULT_SORT_COLUMN.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

/// Resolve the request's sort into an [`OrderSpec`].
///
/// A `relation.column` request that matches a `sortable_relations` entry on a
/// many-to-many relation takes precedence over the whitelist check. Anything
/// the whitelist rejects falls back to the default order.
pub fn resolve(registry: &EntityRegistry, entity: &str, params: &QueryParams) -> OrderSpec {
    let Some(sort_by) = params.sort_by.as_deref().filter(|s| !s.is_empty()) else {
        return OrderSpec::default_order();
    };

    if let Some(spec) = relation_aggregate(registry, entity, sort_by, params) {
        return spec;
    }

    if !params.sortable_columns.is_empty()
        && !params.sortable_columns.iter().any(|c| c == sort_by)
    {
        tracing::debug!(entity, sort_by, "sort column outside whitelist, using default order");
        return OrderSpec::default_order();
    }

    OrderSpec::Column {
        column: sort_by.to_string(),
        direction: params.sort_direction,
    }
}

/// Match `relation.column` against the configured sortable relations.
///
/// Only many-to-many relations support aggregate ordering; a match on any
/// other kind is treated like no match and falls through to the whitelist
/// path.
fn relation_aggregate(
    registry: &EntityRegistry,
    entity: &str,
    sort_by: &str,
    params: &QueryParams,
) -> Option<OrderSpec> {
    let mut segments = sort_by.split('.');
    let (relation, column) = (segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let entry = params
        .sortable_relations
        .iter()
        .find(|e| e.relation == relation && e.column == column)?;

    let descriptor = registry.entity(entity).ok()?.relation(relation)?;
    let RelationLink::ManyToMany(pivot) = &descriptor.link else {
        tracing::debug!(
            entity,
            relation,
            "relation sort on non-many-to-many relation, using fallback"
        );
        return None;
    };
    let related_table = registry.entity(&descriptor.target).ok()?.table().to_string();

    Some(OrderSpec::RelationAggregate {
        pivot: pivot.clone(),
        related_table,
        column: entry.column.clone(),
        aggregate: entry.aggregate,
        direction: params.sort_direction,
    })
}
