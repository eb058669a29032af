//! Relation preload tree.
//!
//! Dot-delimited preload paths (`"profile.avatar"`) are parsed into an
//! explicit tree, one node per relation, each carrying a column projection.
//! The tree is built per request and consumed once by the executor when it
//! attaches related rows.

use std::collections::BTreeMap;

use super::error::{QueryError, QueryResult};
use super::params::QueryParams;
use super::registry::EntityRegistry;

/// Maximum nesting depth for preloads to prevent unbounded recursion.
const MAX_PRELOAD_DEPTH: u8 = 3;

/// Column projection for an entity or a preloaded relation node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Select(Vec<String>),
    Exclude(Vec<String>),
}

/// One preloaded relation and its nested preloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationNode {
    /// Relation name on the parent entity.
    pub relation: String,
    /// Target entity name.
    pub target: String,
    pub projection: Projection,
    pub children: BTreeMap<String, RelationNode>,
}

/// Root of the preload tree; children hang off the base entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationTree {
    pub children: BTreeMap<String, RelationNode>,
}

impl RelationTree {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Build the preload tree for `entity` from the request's preload paths.
///
/// Each path segment must name a relation on the entity reached so far;
/// an unknown segment is a caller/whitelist bug and fails with
/// `UnknownRelation` rather than being dropped. Projection precedence per
/// node: a `select_preload` entry for the node's dot-path wins, then an
/// `exclude_preload` entry, then `All`.
pub fn build(
    registry: &EntityRegistry,
    entity: &str,
    params: &QueryParams,
) -> QueryResult<RelationTree> {
    let selects = parse_projections(&params.select_preload);
    let excludes = parse_projections(&params.exclude_preload);

    let mut tree = RelationTree::default();
    for path in &params.preload {
        insert_path(
            registry,
            entity,
            &mut tree.children,
            "",
            path,
            &selects,
            &excludes,
            0,
        )?;
    }
    Ok(tree)
}

/// Parse `"path:col1,col2"` entries into `path → columns`.
fn parse_projections(entries: &[String]) -> BTreeMap<&str, Vec<String>> {
    entries
        .iter()
        .filter_map(|entry| {
            let (path, columns) = entry.split_once(':')?;
            let columns = columns
                .split(',')
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
            Some((path, columns))
        })
        .collect()
}

fn insert_path(
    registry: &EntityRegistry,
    entity: &str,
    children: &mut BTreeMap<String, RelationNode>,
    parent_path: &str,
    path: &str,
    selects: &BTreeMap<&str, Vec<String>>,
    excludes: &BTreeMap<&str, Vec<String>>,
    depth: u8,
) -> QueryResult<()> {
    if depth >= MAX_PRELOAD_DEPTH {
        tracing::warn!(
            path,
            limit = MAX_PRELOAD_DEPTH,
            "preload depth limit reached, skipping nested preloads"
        );
        return Ok(());
    }

    let (segment, rest) = match path.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (path, None),
    };
    if segment.is_empty() {
        return Ok(());
    }

    let descriptor = registry.relation(entity, segment)?.clone();
    let full_path = if parent_path.is_empty() {
        segment.to_string()
    } else {
        format!("{parent_path}.{segment}")
    };

    let node = children
        .entry(segment.to_string())
        .or_insert_with(|| RelationNode {
            relation: segment.to_string(),
            target: descriptor.target.clone(),
            projection: projection_for(&full_path, selects, excludes),
            children: BTreeMap::new(),
        });

    if let Some(rest) = rest {
        insert_path(
            registry,
            &descriptor.target,
            &mut node.children,
            &full_path,
            rest,
            selects,
            excludes,
            depth + 1,
        )?;
    }
    Ok(())
}

fn projection_for(
    path: &str,
    selects: &BTreeMap<&str, Vec<String>>,
    excludes: &BTreeMap<&str, Vec<String>>,
) -> Projection {
    if let Some(columns) = selects.get(path) {
        Projection::Select(columns.clone())
    } else if let Some(columns) = excludes.get(path) {
        Projection::Exclude(columns.clone())
    } else {
        Projection::All
    }
}
