//! Reconciliation and refresh engine.

mod catalog;
pub mod config;
pub mod links;
pub mod offline;
pub mod progress;
mod reconcile;
mod refresh;

pub use catalog::{Catalog, CatalogDeps};
pub use config::{CrawlConfig, RecursionPolicy, RefreshConfig};
pub use links::LinkResolver;
pub use offline::{Absence, OfflineDetector};
pub use progress::Progress;
pub use reconcile::{
    ValidationCandidate, ValidationOutcome, ValidationRequest,
    ValidationSummary,
};
