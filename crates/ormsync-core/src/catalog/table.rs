//! Table descriptors.

use super::column::{quote_ident, ColumnDescriptor};
use super::relation::{ForeignKeyDescriptor, RelationKind};
use super::types::StorageType;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::any::TypeId;

/// Startup behavior of a cache table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Remove every row when the schema is synchronized.
    DeleteOnLoad,
    /// Remove rows whose expiry timestamp is in the past.
    DeleteExpired {
        /// Column holding the expiry timestamp.
        expiry_column: String,
    },
}

/// A FOREIGN KEY table constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnReference {
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub target_column: String,
}

/// Describes one physical table: entity table, cache table, or junction.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    /// Columns in CREATE TABLE order.
    pub columns: Vec<ColumnDescriptor>,
    /// Declared relationships.
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Owning entity type, when registered through a model.
    pub entity_type: Option<TypeId>,
    /// Cache behavior, for cache tables.
    pub cache: Option<CachePolicy>,
    /// Junction tables this table takes part in (set by the registry).
    pub junctions: Vec<String>,
    references: Vec<ColumnReference>,
}

impl TableDescriptor {
    /// Create an empty table descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            entity_type: None,
            cache: None,
            junctions: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Add multiple columns.
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Add a relationship.
    ///
    /// A one-to-one relation appends its nullable key column to this table.
    pub fn with_foreign_key(mut self, mut fk: ForeignKeyDescriptor) -> Self {
        fk.resolve(&self.name);
        if fk.relation_kind == RelationKind::OneToOne {
            self.columns
                .push(ColumnDescriptor::new(fk.parent_key_name.clone(), fk.parent_key_type));
        }
        self.foreign_keys.push(fk);
        self
    }

    /// Bind to an entity type.
    pub fn with_entity_type<T: 'static>(mut self) -> Self {
        self.entity_type = Some(TypeId::of::<T>());
        self
    }

    /// Make this a cache table.
    pub fn with_cache(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// Add a FOREIGN KEY table constraint that is not backed by a relation.
    pub fn with_reference(mut self, reference: ColumnReference) -> Self {
        self.references.push(reference);
        self
    }

    /// The primary key column, if declared.
    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get a relation by its property name.
    pub fn relation(&self, property: &str) -> Option<&ForeignKeyDescriptor> {
        self.foreign_keys.iter().find(|fk| fk.property == property)
    }

    pub(crate) fn relation_mut(&mut self, property: &str) -> Option<&mut ForeignKeyDescriptor> {
        self.foreign_keys.iter_mut().find(|fk| fk.property == property)
    }

    /// Whether a column is the key column of a one-to-one relation.
    pub fn is_relation_key(&self, column: &str) -> bool {
        self.foreign_keys.iter().any(|fk| {
            fk.relation_kind == RelationKind::OneToOne && fk.parent_key_name == column
        })
    }

    /// Columns mapped to plain entity fields (no primary key, no relation keys).
    pub fn field_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .iter()
            .filter(move |c| !c.primary_key && !self.is_relation_key(&c.name))
    }

    /// Whether the table declares any relationship.
    pub fn has_relations(&self) -> bool {
        !self.foreign_keys.is_empty()
    }

    /// All FOREIGN KEY constraints rendered for this table.
    pub fn references(&self) -> Vec<ColumnReference> {
        let mut refs: Vec<ColumnReference> = self
            .foreign_keys
            .iter()
            .filter(|fk| fk.relation_kind == RelationKind::OneToOne)
            .map(|fk| ColumnReference {
                column: fk.parent_key_name.clone(),
                table: fk.target_table.clone(),
                target_column: fk.target_key_name.clone(),
            })
            .collect();
        refs.extend(self.references.iter().cloned());
        refs
    }

    /// Render the CREATE TABLE statement.
    pub fn create_statement(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            parts.push(column.definition()?);
        }
        for reference in self.references() {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote_ident(&reference.column),
                quote_ident(&reference.table),
                quote_ident(&reference.target_column)
            ));
        }
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            parts.join(", ")
        ))
    }

    /// Key column of a junction: NOT NULL integer.
    pub(crate) fn junction_key(name: &str) -> ColumnDescriptor {
        ColumnDescriptor::required(name, StorageType::Integer)
    }
}
