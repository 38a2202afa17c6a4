//! JSON schema manifests: a file-based source of table descriptors.
//!
//! ```json
//! {
//!   "tables": [
//!     {
//!       "name": "user",
//!       "columns": [
//!         { "name": "id", "type": "integer", "primary_key": true },
//!         { "name": "name", "type": "text", "not_null": true },
//!         { "name": "joined", "type": "text", "encoder": "timestamp" }
//!       ],
//!       "relations": [
//!         { "name": "friends", "kind": "many_to_many", "target": "user" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use super::encoder::{encoder_by_name, EnumEncoder};
use super::{
    CachePolicy, ColumnDescriptor, ForeignKeyDescriptor, RelationKind, SchemaRegistry,
    StorageType, TableDescriptor,
};
use crate::error::{ConfigError, Error};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Top-level manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaManifest {
    /// Table declarations, in registration order.
    pub tables: Vec<TableManifest>,
}

/// One table declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableManifest {
    /// Table name.
    pub name: String,
    /// Columns in CREATE TABLE order.
    pub columns: Vec<ColumnManifest>,
    /// Relations owned by this table.
    #[serde(default)]
    pub relations: Vec<RelationManifest>,
    /// Cache behavior.
    #[serde(default)]
    pub cache: Option<CachePolicy>,
}

/// One column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnManifest {
    /// Column name.
    pub name: String,
    /// Storage type.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// NOT NULL.
    #[serde(default)]
    pub not_null: bool,
    /// UNIQUE.
    #[serde(default)]
    pub unique: bool,
    /// Integer autoincrement primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Default value in native form.
    #[serde(default)]
    pub default: Option<Value>,
    /// Encoder name, or an enum variant list.
    #[serde(default)]
    pub encoder: Option<EncoderManifest>,
}

/// Encoder reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncoderManifest {
    /// A built-in encoder by name (`timestamp`, `duration`, `bigint`).
    Named(String),
    /// An enum encoder over the listed variants.
    Enum {
        /// Variants in index order.
        #[serde(rename = "enum")]
        variants: Vec<String>,
    },
}

/// One relation declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationManifest {
    /// Relation name on the owning entity.
    pub name: String,
    /// Relationship kind.
    pub kind: RelationKind,
    /// Target table.
    pub target: String,
    /// Shared junction name.
    #[serde(default)]
    pub junction: Option<String>,
    /// Owner-side key column override.
    #[serde(default)]
    pub parent_key: Option<String>,
    /// Target-side key column override.
    #[serde(default)]
    pub target_key: Option<String>,
    /// Self-reference disambiguation suffix.
    #[serde(default)]
    pub disambiguation: Option<String>,
}

impl SchemaManifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ColumnManifest {
    fn to_descriptor(&self) -> Result<ColumnDescriptor, ConfigError> {
        let mut column = ColumnDescriptor::new(self.name.clone(), self.storage_type);
        column.not_null = self.not_null || self.primary_key;
        column.unique = self.unique;
        column.primary_key = self.primary_key;
        column.default = self.default.clone();
        column.encoder = match &self.encoder {
            None => None,
            Some(EncoderManifest::Named(name)) => Some(
                encoder_by_name(name).ok_or_else(|| ConfigError::UnknownEncoder(name.clone()))?,
            ),
            Some(EncoderManifest::Enum { variants }) => {
                Some(Arc::new(EnumEncoder::new(variants.iter().cloned())))
            }
        };
        Ok(column)
    }
}

impl RelationManifest {
    fn to_descriptor(&self) -> ForeignKeyDescriptor {
        let mut fk = ForeignKeyDescriptor::with_kind(&self.name, &self.target, self.kind);
        if let Some(junction) = &self.junction {
            fk = fk.with_junction(junction);
        }
        if let Some(key) = &self.parent_key {
            fk = fk.with_parent_key(key);
        }
        if let Some(key) = &self.target_key {
            fk = fk.with_target_key(key);
        }
        if let Some(suffix) = &self.disambiguation {
            fk = fk.with_disambiguation(suffix);
        }
        fk
    }
}

impl TableManifest {
    /// Build the table descriptor this manifest entry describes.
    pub fn to_descriptor(&self) -> Result<TableDescriptor, ConfigError> {
        let mut table = TableDescriptor::new(self.name.clone());
        for column in &self.columns {
            table = table.with_column(column.to_descriptor()?);
        }
        for relation in &self.relations {
            table = table.with_foreign_key(relation.to_descriptor());
        }
        if let Some(cache) = &self.cache {
            table = table.with_cache(cache.clone());
        }
        Ok(table)
    }
}

impl SchemaRegistry {
    /// Build a registry (junctions included) from a manifest.
    pub fn from_manifest(manifest: &SchemaManifest) -> Result<Self, ConfigError> {
        let mut registry = SchemaRegistry::new();
        for table in &manifest.tables {
            registry.register(table.to_descriptor()?)?;
        }
        registry.build_junctions()?;
        Ok(registry)
    }

    /// Build a registry from manifest JSON text.
    pub fn from_manifest_json(text: &str) -> Result<Self, Error> {
        let manifest = SchemaManifest::from_json(text)?;
        Ok(Self::from_manifest(&manifest)?)
    }
}
