//! Collaborators the stages call into
//!
//! The engine only sees the traits. The shipped implementations are a
//! statement-generating [`SqlReplicator`], a directory-backed
//! [`DdlDirectoryCatalog`] and [`DisconnectedPools`].

mod catalog;
mod pools;
mod sql;
mod traits;

pub use catalog::DdlDirectoryCatalog;
pub use pools::DisconnectedPools;
pub use sql::SqlReplicator;
pub use traits::{ConnectionPools, DataTransfer, MetastoreCatalog, SchemaReplicator};
