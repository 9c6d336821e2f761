//! Core types for the Loam document engine
//!
//! This crate defines the foundational vocabulary shared by every other
//! crate in the workspace:
//! - Tenant/application identity and the per-request context
//! - The error taxonomy and `Result` alias
//! - JSON path parsing and the compiled path chain
//! - Deep-merge semantics for document patching
//! - Typed search filters and pagination
//! - Resource limits for documents and lifecycle scripts

pub mod error;
pub mod filter;
pub mod limits;
pub mod merge;
pub mod path;
pub mod types;

pub use error::{Error, Result};
pub use filter::{Filter, FilterOp, LogicalOp, Page};
pub use limits::Limits;
pub use merge::deep_merge;
pub use path::{PathChain, PathSegment};
pub use types::{
    Application, ApplicationId, DeletionMode, EntityScope, LifecycleEvent, PartitionGranularity,
    RequestContext, Tenant, TenantId,
};
