//! Storage types for column descriptors.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Storage types supported by column descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
    /// 64-bit floating point.
    Float,
    /// Boolean, stored as integer 0/1.
    Boolean,
    /// Opaque binary payload.
    Object,
}

impl StorageType {
    /// SQL type name used in CREATE TABLE statements.
    pub fn sql_type(&self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Text => "TEXT",
            StorageType::Float => "REAL",
            StorageType::Boolean => "BOOLEAN",
            StorageType::Object => "BLOB",
        }
    }

    /// Value used to backfill NOT NULL columns that have no declared default.
    pub fn zero_value(&self) -> Value {
        match self {
            StorageType::Integer => Value::Integer(0),
            StorageType::Text => Value::Text(String::new()),
            StorageType::Float => Value::Real(0.0),
            StorageType::Boolean => Value::Bool(false),
            StorageType::Object => Value::Blob(Vec::new()),
        }
    }

    /// Reconstruct the native value from what SQLite handed back.
    ///
    /// SQLite reports booleans as integers and may hand back integral reals as
    /// integers; both are folded back into the declared type here.
    pub fn decode(&self, stored: Value) -> Value {
        match (self, stored) {
            (StorageType::Boolean, Value::Integer(i)) => Value::Bool(i != 0),
            (StorageType::Float, Value::Integer(i)) => Value::Real(i as f64),
            (_, other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_names() {
        assert_eq!(StorageType::Integer.sql_type(), "INTEGER");
        assert_eq!(StorageType::Float.sql_type(), "REAL");
        assert_eq!(StorageType::Object.sql_type(), "BLOB");
    }

    #[test]
    fn test_decode_reconstructs_booleans() {
        assert_eq!(StorageType::Boolean.decode(Value::Integer(1)), Value::Bool(true));
        assert_eq!(StorageType::Boolean.decode(Value::Integer(0)), Value::Bool(false));
        assert_eq!(StorageType::Float.decode(Value::Integer(3)), Value::Real(3.0));
        assert_eq!(StorageType::Integer.decode(Value::Integer(3)), Value::Integer(3));
    }

    #[test]
    fn test_manifest_names() {
        let ty: StorageType = serde_json::from_str("\"boolean\"").unwrap();
        assert_eq!(ty, StorageType::Boolean);
    }
}
