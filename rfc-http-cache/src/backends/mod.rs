//! Reference [`Cache`] implementations: an in-memory map and a filesystem
//! store. Other backends (object stores, Redis, Postgres, ...) are
//! external collaborators that implement the same trait.
//!
//! [`Cache`]: crate::storage::Cache

#[cfg(feature = "manager-fs")]
pub mod fs;
#[cfg(feature = "manager-memory")]
pub mod memory;
