//! Core error types.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Schema configuration errors.
///
/// These are fatal: they surface while the registry is being built (or when a
/// caller uses an entity type the registry cannot serve) and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A table that takes part in a relationship has no primary key.
    #[error("table {table} has no primary key but takes part in relation {relation}")]
    MissingPrimaryKey {
        /// Table without a primary key.
        table: String,
        /// Relation that needs it.
        relation: String,
    },

    /// More than one column was declared as primary key.
    #[error("table {table} declares more than one primary key: {columns:?}")]
    MultiplePrimaryKeys {
        /// Offending table.
        table: String,
        /// Primary key columns.
        columns: Vec<String>,
    },

    /// A primary key column was declared with a non-integer storage type.
    #[error("primary key {table}.{column} must be an integer column")]
    NonIntegerPrimaryKey {
        /// Offending table.
        table: String,
        /// Offending column.
        column: String,
    },

    /// Two tables share a name.
    #[error("table {0} is already registered")]
    DuplicateTable(String),

    /// Two columns in one table share a name.
    #[error("column {table}.{column} is declared twice")]
    DuplicateColumn {
        /// Offending table.
        table: String,
        /// Duplicated column.
        column: String,
    },

    /// A relation points at a table that was never registered.
    #[error("relation {table}.{relation} targets unknown table {target}")]
    UnknownRelationTarget {
        /// Owning table.
        table: String,
        /// Relation name.
        relation: String,
        /// Missing target table.
        target: String,
    },

    /// A junction name collides with a registered entity table.
    #[error("junction {0} collides with a registered table")]
    JunctionNameCollision(String),

    /// Relations sharing a junction disagree on its key columns.
    #[error("junction {junction} must have exactly two key columns, got {columns:?}")]
    InconsistentJunction {
        /// Junction name.
        junction: String,
        /// Key columns collected from every relation that targets it.
        columns: Vec<String>,
    },

    /// `build_junctions` was called a second time.
    #[error("junction tables have already been built")]
    JunctionsAlreadyBuilt,

    /// An operation needed junction tables before `build_junctions` ran.
    #[error("junction tables have not been built yet")]
    JunctionsNotBuilt,

    /// A relation name is not declared on the table.
    #[error("table {table} has no relation named {relation}")]
    UnknownRelation {
        /// Owning table.
        table: String,
        /// Requested relation.
        relation: String,
    },

    /// An entity filled a relation slot of the wrong shape (one vs. many).
    #[error("relation {table}.{relation} does not match its declared kind")]
    RelationShape {
        /// Owning table.
        table: String,
        /// Relation name.
        relation: String,
    },

    /// A manifest names an encoder that does not exist.
    #[error("unknown column encoder: {0}")]
    UnknownEncoder(String),

    /// A model type was used without being registered.
    #[error("model type {0} is not registered")]
    UnregisteredModel(&'static str),

    /// A model's binder hook could not rebuild the value from an entity.
    #[error("model {model} cannot be built from entity: {reason}")]
    ModelHook {
        /// Model type name.
        model: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// Core database errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Fatal schema configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Opening a database connection failed.
    #[error("failed to open database {location}: {source}")]
    Open {
        /// Database location.
        location: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A statement failed to prepare or execute.
    #[error("query failed: {source} (statement: {statement})")]
    Query {
        /// SQL text of the failed statement.
        statement: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// An insert or update omitted (or nulled) NOT NULL columns.
    #[error("missing required columns for {table}: {}", columns.join(", "))]
    MissingRequiredColumns {
        /// Target table.
        table: String,
        /// Required columns that were missing.
        columns: Vec<String>,
    },

    /// A read was issued through a binder with no database attached.
    #[error("binder is not using a database")]
    NotUsingDatabase,

    /// An update statement had no columns to set.
    #[error("update of {table} sets no columns")]
    EmptyUpdate {
        /// Target table.
        table: String,
    },

    /// A rebuild left rows whose foreign keys point nowhere; it was rolled back.
    #[error("rebuild of {table} would leave {violations} foreign key violation(s)")]
    ForeignKeyViolation {
        /// Rebuilt table.
        table: String,
        /// Rows reported by `PRAGMA foreign_key_check`.
        violations: usize,
    },

    /// Table not found in the registry.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Column not found on a table.
    #[error("unknown column {table}.{column}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A value could not be converted by a column encoder.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A schema manifest could not be parsed.
    #[error("invalid schema manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl Error {
    /// Check whether this is a fatal configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    pub(crate) fn query(statement: impl Into<String>, source: rusqlite::Error) -> Self {
        Error::Query {
            statement: statement.into(),
            source,
        }
    }
}
