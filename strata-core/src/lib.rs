//! # Strata Core
//!
//! Tree-maintenance engine for a persistent media catalog mirrored against a
//! filesystem.
//!
//! ## Overview
//!
//! - **Entity model**: identity derived from `(path, kind)`, location kinds,
//!   offline flag, non-owning parent references
//! - **Child cache**: lazily loaded, copy-on-write child lists per folder
//! - **Reconciliation**: diff of cached children against a crawl, with
//!   offline-vs-removed classification of absent entries
//! - **Refresh orchestration**: bounded fan-out metadata refresh that
//!   recurses into changed folders, with cancellation and progress
//! - **Linked children**: manual and shortcut links resolved by id or path
//!
//! Crawling, persistence, metadata providers, and library-root
//! configuration are consumed through the traits in [`ports`]; [`infra`]
//! provides filesystem and in-memory implementations.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use strata_core::domain::{Entity, EntityKind};
//! use strata_core::engine::{
//!     Catalog, CatalogDeps, Progress, RefreshConfig, ValidationRequest,
//! };
//! use strata_core::infra::{
//!     FsCrawler, FsProbe, InMemoryRegistry, InMemoryRepository,
//!     NoopMetadataPipeline, StaticLibraryRoots,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn scan() -> strata_core::error::Result<()> {
//!     let registry = Arc::new(InMemoryRegistry::new());
//!     let root = Entity::new(EntityKind::CollectionFolder, "/media").into_ref();
//!     registry.set_root(Arc::clone(&root));
//!
//!     let catalog = Catalog::new(
//!         CatalogDeps {
//!             crawler: Arc::new(FsCrawler::default()),
//!             repository: Arc::new(InMemoryRepository::new()),
//!             registry,
//!             pipeline: Arc::new(NoopMetadataPipeline),
//!             roots: Arc::new(StaticLibraryRoots::new(vec!["/media".into()])),
//!             probe: Arc::new(FsProbe),
//!         },
//!         RefreshConfig::default(),
//!     );
//!
//!     catalog
//!         .validate_children(
//!             &root,
//!             ValidationRequest::recursive(),
//!             &Progress::silent(),
//!             &CancellationToken::new(),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Entity model, folders, child caches, and link descriptors
pub mod domain;

/// Reconciler, refresh orchestrator, offline detector, and link resolver
pub mod engine;

/// Error types and error handling utilities
pub mod error;

/// Default filesystem and in-memory adapters
pub mod infra;

/// Collaborator traits consumed by the engine
pub mod ports;
