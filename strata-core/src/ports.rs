//! Collaborators the engine consumes. Concrete crawling, persistence,
//! metadata providers, and library-root configuration live behind these
//! traits and are injected into [`crate::engine::Catalog`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::{EntityId, EntityRef, LinkedChild, LocationKind};
use crate::error::Result;

/// Context handed to the crawler for the directory being listed.
#[derive(Debug, Clone, Copy)]
pub struct CrawlContext {
    pub parent: EntityId,
    pub parent_location: LocationKind,
}

/// Produces candidate children for a directory.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Candidate child entities found on disk. May fail with an I/O error,
    /// which reconciliation treats as an empty listing.
    async fn resolve_children(
        &self,
        directory: &Path,
        parent: &CrawlContext,
    ) -> Result<Vec<EntityRef>>;

    /// Targets named by shortcut files inside `directory`, as written in
    /// the files (possibly relative).
    async fn shortcut_targets(&self, directory: &Path) -> Result<Vec<PathBuf>>;
}

/// Persistence of the tree structure.
#[async_trait]
pub trait ChildRepository: Send + Sync {
    async fn child_ids(&self, folder: EntityId) -> Result<Vec<EntityId>>;

    async fn save_children(
        &self,
        folder: EntityId,
        children: &[EntityId],
    ) -> Result<()>;

    async fn create_items(&self, items: &[EntityRef]) -> Result<()>;

    async fn report_removed(&self, item: &EntityRef) -> Result<()>;

    async fn save_linked_children(
        &self,
        folder: EntityId,
        links: &[LinkedChild],
    ) -> Result<()>;
}

/// Process-wide lookup of live entities.
pub trait EntityRegistry: Send + Sync {
    fn resolve_by_id(&self, id: EntityId) -> Option<EntityRef>;

    /// Full-tree search from the catalog root. Expensive; callers cache.
    fn find_by_path(&self, path: &Path) -> Option<EntityRef>;

    fn register(&self, entity: EntityRef);

    fn unregister(&self, id: EntityId);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Persist even if the pipeline finds nothing new.
    pub force_save: bool,
    /// Re-fetch from providers instead of trusting local state.
    pub force_refresh: bool,
}

/// Enriches a single entity with metadata.
#[async_trait]
pub trait MetadataPipeline: Send + Sync {
    /// Returns whether the entity changed.
    async fn refresh(
        &self,
        entity: &EntityRef,
        options: RefreshOptions,
    ) -> Result<bool>;
}

/// Configured library source locations, global and per user.
#[cfg_attr(test, mockall::automock)]
pub trait LibraryRootsProvider: Send + Sync {
    fn library_roots(&self) -> Vec<PathBuf>;
}

/// Reachability probe used to classify absent paths.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PathProbe: Send + Sync {
    /// `false` for both "does not exist" and "could not be checked".
    async fn is_reachable(&self, path: &Path) -> bool;
}
