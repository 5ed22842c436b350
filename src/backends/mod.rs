//! Backend adapters.
//!
//! Each adapter implements the executor seam over one driver and owns the
//! mapping from driver errors onto the toolkit taxonomy. Adapters are
//! feature-gated so a build only pulls in the drivers it uses.

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
