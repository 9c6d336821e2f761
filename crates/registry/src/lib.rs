//! Schema registry for the Loam document engine
//!
//! Owns versioned schema definitions, their validation rules, declared
//! indexed paths, and lifecycle script bindings. Schema upserts validate
//! the schema's own validation document before any document can reference
//! it, and notify the partition/index manager with the symmetric difference
//! of declared index paths.

pub mod registry;
pub mod schema;
pub mod validate;

pub use registry::{CatalogEntry, SchemaObserver, SchemaRegistry};
pub use schema::{SchemaDefinition, SchemaKey};
pub use validate::CompiledSchema;
