//! Entity metadata registry.
//!
//! Every entity the engine can query is described here: its physical table,
//! its columns tagged with a semantic type, and its relations. The registry
//! is built once at process startup and is immutable afterwards, so it can be
//! shared across request handlers without synchronization. All lookups are by
//! name and O(1).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::{QueryError, QueryResult};

/// Semantic type tag for a column.
///
/// Drives predicate compilation: `String` columns get a plain ILIKE partial
/// match, `Boolean` columns get exact equality, everything else is cast to
/// text before matching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    String,
    Boolean,
    Number,
    Date,
}

/// A queryable column on an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic: SemanticType,
}

/// Join keys for a many-to-many relation.
///
/// `base.local_key → pivot.pivot_foreign_key` and
/// `pivot.pivot_related_foreign_key → related.related_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PivotLink {
    pub pivot_table: String,
    pub local_key: String,
    pub pivot_foreign_key: String,
    pub pivot_related_foreign_key: String,
    pub related_key: String,
}

/// Join keys per relation kind.
///
/// Only the `ManyToMany` variant carries pivot fields, which keeps the
/// "pivot fields present iff many-to-many" invariant structural.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationLink {
    /// `base.foreign_key → target.owner_key`.
    BelongsTo { foreign_key: String, owner_key: String },
    /// `base.local_key → target.foreign_key`, at most one row.
    HasOne { local_key: String, foreign_key: String },
    /// `base.local_key → target.foreign_key`, any number of rows.
    HasMany { local_key: String, foreign_key: String },
    /// Through a pivot table.
    ManyToMany(PivotLink),
}

/// Relation kind, without key data. Used for match checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl RelationLink {
    pub fn kind(&self) -> RelationKind {
        match self {
            RelationLink::BelongsTo { .. } => RelationKind::BelongsTo,
            RelationLink::HasOne { .. } => RelationKind::HasOne,
            RelationLink::HasMany { .. } => RelationKind::HasMany,
            RelationLink::ManyToMany(_) => RelationKind::ManyToMany,
        }
    }

    /// Whether the relation resolves to at most one related row.
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            RelationLink::BelongsTo { .. } | RelationLink::HasOne { .. }
        )
    }
}

/// A named relation from one entity to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    /// Target entity name (registry key, not table name).
    pub target: String,
    pub link: RelationLink,
}

/// Full metadata for one entity.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
    column_index: HashMap<String, usize>,
    relations: HashMap<String, RelationDescriptor>,
}

impl EntityDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns, in declaration order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.column_index.get(name).map(|&i| &self.columns[i])
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }
}

/// Column-naming convention applied when entities are registered.
///
/// Injected into the builder rather than read from global state; the default
/// preserves names as declared.
pub type NamingFn = fn(&str) -> String;

fn preserve(name: &str) -> String {
    name.to_string()
}

/// Immutable registry of entity metadata, shared process-wide.
#[derive(Debug)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityDescriptor>,
}

impl EntityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            naming: preserve,
            entities: HashMap::new(),
        }
    }

    /// Look up an entity, failing loudly on an unknown name.
    pub fn entity(&self, name: &str) -> QueryResult<&EntityDescriptor> {
        self.entities
            .get(name)
            .ok_or_else(|| QueryError::UnknownEntity(name.to_string()))
    }

    /// Look up a relation on an entity, failing loudly when absent.
    pub fn relation(&self, entity: &str, name: &str) -> QueryResult<&RelationDescriptor> {
        self.entity(entity)?
            .relation(name)
            .ok_or_else(|| QueryError::UnknownRelation {
                entity: entity.to_string(),
                relation: name.to_string(),
            })
    }
}

/// Builder for [`EntityRegistry`]. Consumed by `build()`; the resulting
/// registry cannot be mutated.
pub struct RegistryBuilder {
    naming: NamingFn,
    entities: HashMap<String, EntityDescriptor>,
}

impl RegistryBuilder {
    /// Set the column-naming convention applied to registered column names.
    pub fn naming(mut self, naming: NamingFn) -> Self {
        self.naming = naming;
        self
    }

    /// Register an entity. The closure configures its columns and relations.
    pub fn entity(
        mut self,
        name: &str,
        table: &str,
        configure: impl FnOnce(EntityBuilder) -> EntityBuilder,
    ) -> Self {
        let entity = configure(EntityBuilder {
            naming: self.naming,
            descriptor: EntityDescriptor {
                name: name.to_string(),
                table: table.to_string(),
                columns: Vec::new(),
                column_index: HashMap::new(),
                relations: HashMap::new(),
            },
        });
        self.entities.insert(name.to_string(), entity.descriptor);
        self
    }

    pub fn build(self) -> EntityRegistry {
        EntityRegistry {
            entities: self.entities,
        }
    }
}

/// Builder for one entity's descriptor set.
pub struct EntityBuilder {
    naming: NamingFn,
    descriptor: EntityDescriptor,
}

impl EntityBuilder {
    pub fn column(mut self, name: &str, semantic: SemanticType) -> Self {
        let name = (self.naming)(name);
        let index = self.descriptor.columns.len();
        self.descriptor.columns.push(ColumnDescriptor {
            name: name.clone(),
            semantic,
        });
        self.descriptor.column_index.insert(name, index);
        self
    }

    pub fn belongs_to(self, name: &str, target: &str, foreign_key: &str, owner_key: &str) -> Self {
        self.relation(
            name,
            target,
            RelationLink::BelongsTo {
                foreign_key: foreign_key.to_string(),
                owner_key: owner_key.to_string(),
            },
        )
    }

    pub fn has_one(self, name: &str, target: &str, local_key: &str, foreign_key: &str) -> Self {
        self.relation(
            name,
            target,
            RelationLink::HasOne {
                local_key: local_key.to_string(),
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    pub fn has_many(self, name: &str, target: &str, local_key: &str, foreign_key: &str) -> Self {
        self.relation(
            name,
            target,
            RelationLink::HasMany {
                local_key: local_key.to_string(),
                foreign_key: foreign_key.to_string(),
            },
        )
    }

    pub fn many_to_many(self, name: &str, target: &str, pivot: PivotLink) -> Self {
        self.relation(name, target, RelationLink::ManyToMany(pivot))
    }

    fn relation(mut self, name: &str, target: &str, link: RelationLink) -> Self {
        self.descriptor.relations.insert(
            name.to_string(),
            RelationDescriptor {
                name: name.to_string(),
                target: target.to_string(),
                link,
            },
        );
        self
    }
}
