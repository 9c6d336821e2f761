//! Storage layer for the Loam document engine
//!
//! Three concerns live here:
//! - The [`ColumnStore`] trait: the narrow interface to the underlying
//!   JSON-capable column store, plus a dashmap-backed reference
//!   implementation used for embedded operation and tests.
//! - The predicate compiler: pure translation of json-paths and typed
//!   filters into native storage predicates. The same compiled path chain
//!   feeds query predicates and expression indexes, so wildcard truncation
//!   semantics always agree.
//! - The partition and index lifecycle manager: time-bounded partition
//!   chains per (tenant, application, schema), and asynchronous,
//!   idempotent reconciliation of secondary indexes against the schema
//!   registry's declared index paths.

pub mod column;
pub mod memory;
pub mod partition;
pub mod predicate;
pub mod reconcile;

pub use column::{ColumnStore, Query, StoredDocument};
pub use memory::MemoryColumnStore;
pub use partition::{table_name, PartitionManager};
pub use predicate::{chain_expr, Condition, Predicate};
pub use reconcile::{index_name, IndexReconciler, PartitionIndexManager};
