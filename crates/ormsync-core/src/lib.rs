//! ormsync core: schema-synchronizing ORM over SQLite.
//!
//! Declare tables with [`TableDescriptor`] (or a [`Model`] type, or a JSON
//! [`SchemaManifest`]), register them in a [`SchemaRegistry`], build the
//! junction tables, then let the [`SchemaSynchronizer`] reconcile the live
//! database. At runtime the [`EntityBinder`] moves entity graphs through the
//! [`QueryBuilder`] and [`StatementExecutor`].
//!
//! ```no_run
//! use ormsync_core::{
//!     ColumnDescriptor, Database, Entity, EntityBinder, SchemaRegistry, SchemaSynchronizer,
//!     StorageType, TableDescriptor,
//! };
//!
//! # fn main() -> ormsync_core::Result<()> {
//! let mut registry = SchemaRegistry::new();
//! registry.register(
//!     TableDescriptor::new("user")
//!         .with_column(ColumnDescriptor::primary_key("id"))
//!         .with_column(ColumnDescriptor::required("name", StorageType::Text)),
//! )?;
//! registry.build_junctions()?;
//!
//! let db = Database::open_file("app.db")?;
//! SchemaSynchronizer::new(&registry, &db).synchronize()?;
//!
//! let binder = EntityBinder::new(&registry, &db);
//! let mut user = Entity::new("user").with("name", "Jon Doe");
//! binder.save(&mut user)?;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod catalog;
pub mod database;
pub mod entity;
pub mod error;
pub mod query;
pub mod sync;
pub mod value;

pub use binder::{BinderConfig, EntityBinder, IdAllocation, SaveOutcome};
pub use catalog::{
    CachePolicy, ColumnDescriptor, ColumnEncoder, ForeignKeyDescriptor, JunctionDescriptor,
    RelationKind, SchemaManifest, SchemaRegistry, StorageType, TableDescriptor,
};
pub use database::{Database, DatabaseConfig, DatabaseLocation, DatabaseRegistry};
pub use entity::{Entity, Model, Related};
pub use error::{ConfigError, Error, Result};
pub use query::{
    Batch, Condition, Logic, Projection, QueryBuilder, ResultSet, Row, Statement,
    StatementExecutor,
};
pub use sync::{
    DropPolicy, SchemaInspector, SchemaSynchronizer, SqliteInspector, SyncConfig, SyncPlan,
    SyncReport, TableOutcome,
};
pub use value::Value;
