//! Junction table descriptors for one-to-many and many-to-many relations.

use super::column::ColumnDescriptor;
use super::table::{ColumnReference, TableDescriptor};

/// Name of the surrogate key column of every junction table.
pub const JUNCTION_ID: &str = "id";

/// A synthesized table holding relation edges.
///
/// It has a surrogate integer key plus one NOT NULL key column per side of
/// the edge. It carries no business columns.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionDescriptor {
    /// Physical table descriptor.
    pub table: TableDescriptor,
    /// Tables taking part in the edge (owners and targets).
    pub participants: Vec<String>,
    /// `(owner table, relation property)` of every relation stored here.
    pub relations: Vec<(String, String)>,
}

impl JunctionDescriptor {
    /// Build a junction from its key columns, each given as
    /// `(column, referenced table, referenced primary key)`.
    pub fn new(name: impl Into<String>, keys: &[(String, String, String)]) -> Self {
        let mut table =
            TableDescriptor::new(name).with_column(ColumnDescriptor::primary_key(JUNCTION_ID));
        let mut participants: Vec<String> = Vec::new();

        for (column, target, target_pk) in keys {
            table = table
                .with_column(TableDescriptor::junction_key(column))
                .with_reference(ColumnReference {
                    column: column.clone(),
                    table: target.clone(),
                    target_column: target_pk.clone(),
                });
            if !participants.contains(target) {
                participants.push(target.clone());
            }
        }

        Self {
            table,
            participants,
            relations: Vec::new(),
        }
    }

    /// Junction name.
    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// Key column names (everything but the surrogate id).
    pub fn key_columns(&self) -> Vec<&str> {
        self.table
            .columns
            .iter()
            .filter(|c| !c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Whether a table takes part in this junction.
    pub fn involves(&self, table: &str) -> bool {
        self.participants.iter().any(|p| p == table)
    }
}
