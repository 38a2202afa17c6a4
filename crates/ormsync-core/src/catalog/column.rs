//! Column descriptors.

use super::encoder::ColumnEncoder;
use super::types::StorageType;
use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Describes one scalar column of a table.
#[derive(Clone)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub storage_type: StorageType,
    /// Whether NULL is rejected.
    pub not_null: bool,
    /// Whether values must be unique.
    pub unique: bool,
    /// Whether this is the integer autoincrement primary key.
    pub primary_key: bool,
    /// Declared default, in native form.
    pub default: Option<Value>,
    /// Optional encoder between native and stored form.
    pub encoder: Option<Arc<dyn ColumnEncoder>>,
}

impl ColumnDescriptor {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, storage_type: StorageType) -> Self {
        Self {
            name: name.into(),
            storage_type,
            not_null: false,
            unique: false,
            primary_key: false,
            default: None,
            encoder: None,
        }
    }

    /// Create the integer autoincrement primary key column.
    pub fn primary_key(name: impl Into<String>) -> Self {
        Self {
            not_null: true,
            primary_key: true,
            ..Self::new(name, StorageType::Integer)
        }
    }

    /// Create a NOT NULL column.
    pub fn required(name: impl Into<String>, storage_type: StorageType) -> Self {
        Self::new(name, storage_type).not_null()
    }

    /// Mark as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Mark as UNIQUE.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value (native form).
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Attach an encoder.
    pub fn with_encoder(mut self, encoder: impl ColumnEncoder + 'static) -> Self {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    /// Attach a shared encoder.
    pub fn with_shared_encoder(mut self, encoder: Arc<dyn ColumnEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Whether an insert must supply this column.
    pub fn is_required(&self) -> bool {
        self.not_null && !self.primary_key && self.default.is_none()
    }

    /// Whether `ALTER TABLE ADD COLUMN` can add this column in place.
    ///
    /// SQLite rejects added columns that are PRIMARY KEY or UNIQUE, and NOT NULL
    /// columns need a non-null default.
    pub fn can_add_in_place(&self) -> bool {
        !self.primary_key && !self.unique && (!self.not_null || self.default.is_some())
    }

    /// Convert a native value to the value bound in statements.
    pub fn to_storage(&self, native: &Value) -> Result<Value> {
        if native.is_null() {
            return Ok(Value::Null);
        }
        match &self.encoder {
            Some(encoder) => encoder.to_storage(native),
            None => Ok(native.clone()),
        }
    }

    /// Convert a value read from SQLite back to native form.
    pub fn from_storage(&self, stored: Value) -> Result<Value> {
        if stored.is_null() {
            return Ok(Value::Null);
        }
        match &self.encoder {
            Some(encoder) => encoder.from_storage(&stored),
            None => Ok(self.storage_type.decode(stored)),
        }
    }

    /// Stored form of the default, or the storage type's zero value.
    pub fn backfill_value(&self) -> Result<Value> {
        match &self.default {
            Some(default) => self.to_storage(default),
            None => Ok(self.storage_type.zero_value()),
        }
    }

    /// Column definition as used in CREATE TABLE and ALTER TABLE ADD COLUMN.
    pub fn definition(&self) -> Result<String> {
        let mut def = format!("{} {}", quote_ident(&self.name), self.storage_type.sql_type());
        if self.primary_key {
            def.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if self.unique {
            def.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(&sql_literal(&self.to_storage(default)?));
        }
        Ok(def)
    }
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("storage_type", &self.storage_type)
            .field("not_null", &self.not_null)
            .field("unique", &self.unique)
            .field("primary_key", &self.primary_key)
            .field("default", &self.default)
            .field("encoder", &self.encoder.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}

impl PartialEq for ColumnDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.storage_type == other.storage_type
            && self.not_null == other.not_null
            && self.unique == other.unique
            && self.primary_key == other.primary_key
            && self.default == other.default
            && self.encoder.as_ref().map(|e| e.name()) == other.encoder.as_ref().map(|e| e.name())
    }
}

/// Quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a literal for DDL, where parameters cannot be bound.
pub(crate) fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => i64::from(*b).to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) if r.is_finite() => format!("{:?}", r),
        Value::Real(_) => "NULL".to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => format!("X'{}'", hex::encode(b)),
    }
}

pub(crate) fn encoding_error(column: &ColumnDescriptor, err: Error) -> Error {
    Error::Encoding(format!("column {}: {}", column.name, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::encoder::{EnumEncoder, TimestampEncoder};

    #[test]
    fn test_primary_key_definition() {
        let col = ColumnDescriptor::primary_key("id");
        assert_eq!(
            col.definition().unwrap(),
            "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"
        );
        assert!(!col.is_required());
        assert!(!col.can_add_in_place());
    }

    #[test]
    fn test_default_literals() {
        let col = ColumnDescriptor::required("nick", StorageType::Text).with_default("o'brien");
        assert_eq!(
            col.definition().unwrap(),
            "\"nick\" TEXT NOT NULL DEFAULT 'o''brien'"
        );
        assert!(col.can_add_in_place());
        assert!(!col.is_required());

        let flag = ColumnDescriptor::new("active", StorageType::Boolean).with_default(true);
        assert_eq!(flag.definition().unwrap(), "\"active\" BOOLEAN DEFAULT 1");
    }

    #[test]
    fn test_encoded_default() {
        let col = ColumnDescriptor::new("status", StorageType::Integer)
            .with_encoder(EnumEncoder::new(["Active", "Banned"]))
            .with_default("Banned");
        assert_eq!(col.definition().unwrap(), "\"status\" INTEGER DEFAULT 1");
    }

    #[test]
    fn test_in_place_rules() {
        assert!(!ColumnDescriptor::new("email", StorageType::Text).unique().can_add_in_place());
        assert!(!ColumnDescriptor::required("password", StorageType::Text).can_add_in_place());
        assert!(ColumnDescriptor::new("email", StorageType::Text).can_add_in_place());
    }

    #[test]
    fn test_storage_conversion() {
        let col = ColumnDescriptor::new("seen", StorageType::Text).with_encoder(TimestampEncoder);
        let stored = col.to_storage(&Value::Integer(0)).unwrap();
        assert_eq!(stored, Value::Text("1970-01-01 00:00:00.000".into()));
        assert_eq!(col.from_storage(stored).unwrap(), Value::Integer(0));
        assert_eq!(col.to_storage(&Value::Null).unwrap(), Value::Null);

        let flag = ColumnDescriptor::new("active", StorageType::Boolean);
        assert_eq!(flag.from_storage(Value::Integer(1)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
