//! Generic query engine.
//!
//! Compiles untrusted, loosely-typed request parameters — free-text search,
//! per-column search, sort, pagination, relation preloading — into
//! parameterized queries against the entity store. This module provides:
//! - EntityRegistry: immutable per-entity column/relation metadata
//! - QueryParams: the normalized request shape plus its query-string adapter
//! - QueryService: compile-and-execute entry point returning paginated rows
//! - StoreExecutor: the store boundary (PostgreSQL implementation included)

pub mod error;
pub mod executor;
pub mod paginate;
pub mod params;
pub mod plan;
pub mod predicate;
pub mod registry;
pub mod relation_tree;
pub mod service;
pub mod sort;
pub mod sql;

pub use error::{QueryError, QueryResult};
pub use executor::{PgStoreExecutor, PreloadQuery, StoreExecutor};
pub use paginate::{PageWindow, PaginatedResult};
pub use params::{
    Aggregate, FilterValue, QueryParams, RelationSearch, RelationSort, SortDirection,
};
pub use plan::{JoinSpec, QueryPlan};
pub use predicate::Predicate;
pub use registry::{
    ColumnDescriptor, EntityDescriptor, EntityRegistry, PivotLink, RelationDescriptor,
    RelationKind, RelationLink, SemanticType,
};
pub use relation_tree::{Projection, RelationNode, RelationTree};
pub use service::QueryService;
pub use sort::OrderSpec;
