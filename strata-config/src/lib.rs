//! Configuration for the strata catalog.
//!
//! Loads [`CatalogConfig`] from a file, the environment, or defaults, and
//! wires a configured [`strata_core::engine::Catalog`] over a directory on
//! disk for the `strata-scan` binary.

#![allow(missing_docs)]

pub mod error;
pub mod models;
pub mod scan;
pub mod util;

pub use error::ConfigError;
pub use models::catalog::{CatalogConfig, ConfigSource};
pub use models::sources::LibrarySources;
pub use scan::{ScanOptions, ScanReport, run_scan};
