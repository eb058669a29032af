//! Normalized request parameters for the query engine.
//!
//! A `QueryParams` is constructed fresh per request — client-supplied fields
//! decoded from the query string, whitelist fields filled in by the listing
//! policy — and is immutable once handed to the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default page size when the client does not send `per_page`.
pub const DEFAULT_PER_PAGE: u32 = 25;

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Aggregate applied when sorting by a to-many relation's column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[default]
    Min,
    Max,
}

/// Exact-match filter value types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
}

impl FilterValue {
    /// String representation, mirroring how the value would appear in a row.
    pub fn as_string(&self) -> String {
        match self {
            FilterValue::String(s) => s.clone(),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Float(f) => f.to_string(),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::Uuid(u) => u.to_string(),
        }
    }
}

/// A relation whose columns participate in global search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationSearch {
    pub relation: String,
    pub columns: Vec<String>,
}

/// A relation column that may be sorted on, with its aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationSort {
    pub relation: String,
    pub column: String,
    #[serde(default)]
    pub aggregate: Aggregate,
}

/// The normalized request the engine compiles.
///
/// `search_by` and `filters` are ordered maps so compiled predicates come out
/// in a deterministic order. Empty whitelist vectors mean "unrestricted".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryParams {
    pub page: u32,
    pub per_page: u32,

    /// Free-text term matched across all searchable columns.
    pub search: String,

    /// Per-column structured search, `column → term`. Columns may be dotted
    /// `relation.column` paths.
    pub search_by: BTreeMap<String, String>,

    pub sort_by: Option<String>,
    pub sort_direction: SortDirection,

    /// Dot-delimited relation preload paths.
    pub preload: Vec<String>,

    /// Exact-match conditions supplied by the caller, applied ahead of all
    /// search predicates.
    pub filters: BTreeMap<String, FilterValue>,

    pub search_relations: Vec<RelationSearch>,

    /// Whitelist of columns client search input may reference.
    pub searchable_columns: Vec<String>,

    /// Whitelist of columns `sort_by` may reference.
    pub sortable_columns: Vec<String>,

    pub sortable_relations: Vec<RelationSort>,

    /// Base-entity projection. `select` wins when both are set.
    pub select: Vec<String>,
    pub exclude: Vec<String>,

    /// Per-relation projections, `"path:col1,col2"`.
    pub select_preload: Vec<String>,
    pub exclude_preload: Vec<String>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            search: String::new(),
            search_by: BTreeMap::new(),
            sort_by: None,
            sort_direction: SortDirection::default(),
            preload: Vec::new(),
            filters: BTreeMap::new(),
            search_relations: Vec::new(),
            searchable_columns: Vec::new(),
            sortable_columns: Vec::new(),
            sortable_relations: Vec::new(),
            select: Vec::new(),
            exclude: Vec::new(),
            select_preload: Vec::new(),
            exclude_preload: Vec::new(),
        }
    }
}

impl QueryParams {
    /// Decode client-controlled fields from query-string pairs.
    ///
    /// Recognized keys: `page`, `per_page`, `search`, `search_by[col]`,
    /// `filter[col]`, `preload` (repeatable, comma-splittable), and `sort`
    /// where a leading `-` selects descending order and is stripped from the
    /// column name. Unparseable numbers fall back to defaults; whitelists and
    /// relation configuration are never read from the client.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::default();

        for (key, value) in pairs {
            match key.as_str() {
                "page" => {
                    params.page = value.parse().unwrap_or(params.page);
                }
                "per_page" => {
                    params.per_page = value.parse().unwrap_or(params.per_page);
                }
                "search" => {
                    params.search = value;
                }
                "sort" => {
                    if let Some(column) = value.strip_prefix('-') {
                        params.sort_by = Some(column.to_string());
                        params.sort_direction = SortDirection::Desc;
                    } else if !value.is_empty() {
                        params.sort_by = Some(value);
                        params.sort_direction = SortDirection::Asc;
                    }
                }
                "preload" => {
                    params
                        .preload
                        .extend(value.split(',').filter(|p| !p.is_empty()).map(String::from));
                }
                _ => {
                    // both spellings are in the wild: search_by[col] and
                    // searchBy[col]
                    if let Some(column) =
                        bracketed(&key, "search_by").or_else(|| bracketed(&key, "searchBy"))
                    {
                        params.search_by.insert(column.to_string(), value);
                    } else if let Some(column) = bracketed(&key, "filter") {
                        params
                            .filters
                            .insert(column.to_string(), FilterValue::String(value));
                    }
                }
            }
        }

        params
    }
}

/// Extract `col` from `prefix[col]`-shaped keys.
fn bracketed<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)?
        .strip_prefix('[')?
        .strip_suffix(']')
        .filter(|inner| !inner.is_empty())
}
