//! Schema catalog for ormsync.
//!
//! Descriptors for columns, tables, relations, and junction tables, plus the
//! registry that owns them.

mod column;
pub mod encoder;
mod junction;
mod manifest;
mod registry;
mod relation;
mod table;
mod types;

pub use column::{quote_ident, ColumnDescriptor};
pub use encoder::{
    format_timestamp, parse_timestamp, BigIntEncoder, ColumnEncoder, DurationEncoder,
    EnumEncoder, TimestampEncoder,
};
pub use junction::{JunctionDescriptor, JUNCTION_ID};
pub use manifest::{
    ColumnManifest, EncoderManifest, RelationManifest, SchemaManifest, TableManifest,
};
pub use registry::SchemaRegistry;
pub use relation::{ForeignKeyDescriptor, RelationKind};
pub use table::{CachePolicy, ColumnReference, TableDescriptor};
pub use types::StorageType;

pub(crate) use column::encoding_error;
