//! Storage and transport wrappers (§4.8–§4.10): compression, encryption,
//! resilience, and instrumentation, each composable around a [`Cache`] or
//! the network fetch closure.
//!
//! [`Cache`]: crate::storage::Cache

#[cfg(feature = "compression")]
pub mod compression;
pub mod metrics;
pub mod resilience;
#[cfg(feature = "secure")]
pub mod secure;
