//! Schema synchronization against a live SQLite database.

mod cache;
mod inspector;
mod rebuild;
mod synchronizer;

pub use cache::CacheCleanup;
pub use inspector::{LiveColumn, SchemaInspector, SqliteInspector};
pub use synchronizer::{
    normalize_ddl, AlwaysDrop, DropPolicy, NeverDrop, RebuildReason, SchemaSynchronizer,
    SyncConfig, SyncPlan, SyncReport, TableAction, TableOutcome, TablePlan, TableReport,
};
