//! In-process implementations of the persistence and registry ports.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::domain::ids::normalize_path;
use crate::domain::{EntityId, EntityRef, LinkedChild};
use crate::error::Result;
use crate::ports::{
    ChildRepository, EntityRegistry, LibraryRootsProvider, MetadataPipeline,
    RefreshOptions,
};

/// Child lists and link descriptors kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    children: DashMap<EntityId, Vec<EntityId>>,
    links: DashMap<EntityId, Vec<LinkedChild>>,
    items: DashMap<EntityId, PathBuf>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_item(&self, id: EntityId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn stored_links(&self, folder: EntityId) -> Vec<LinkedChild> {
        self.links
            .get(&folder)
            .map(|links| links.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChildRepository for InMemoryRepository {
    async fn child_ids(&self, folder: EntityId) -> Result<Vec<EntityId>> {
        Ok(self
            .children
            .get(&folder)
            .map(|ids| ids.clone())
            .unwrap_or_default())
    }

    async fn save_children(
        &self,
        folder: EntityId,
        children: &[EntityId],
    ) -> Result<()> {
        self.children.insert(folder, children.to_vec());
        Ok(())
    }

    async fn create_items(&self, items: &[EntityRef]) -> Result<()> {
        for item in items {
            self.items.insert(item.id(), item.path().to_path_buf());
        }
        Ok(())
    }

    async fn report_removed(&self, item: &EntityRef) -> Result<()> {
        self.items.remove(&item.id());
        self.children.remove(&item.id());
        self.links.remove(&item.id());
        Ok(())
    }

    async fn save_linked_children(
        &self,
        folder: EntityId,
        links: &[LinkedChild],
    ) -> Result<()> {
        self.links.insert(folder, links.to_vec());
        Ok(())
    }
}

/// Registry of live entities keyed by identifier.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entities: DashMap<EntityId, EntityRef>,
    root: RwLock<Option<EntityId>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `root` and make it the starting point of path searches.
    pub fn set_root(&self, root: EntityRef) {
        *self.root.write() = Some(root.id());
        self.entities.insert(root.id(), root);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Depth-first walk over loaded child snapshots below the root.
    fn search_tree(&self, path: &Path) -> Option<EntityRef> {
        let root_id = (*self.root.read())?;
        let root = self.resolve_by_id(root_id)?;

        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.id()) {
                continue;
            }
            if normalize_path(current.path()) == path {
                return Some(current);
            }
            if let Some(children) =
                current.as_folder().and_then(|f| f.children().loaded())
            {
                stack.extend(children.iter().cloned());
            }
        }
        None
    }
}

impl EntityRegistry for InMemoryRegistry {
    fn resolve_by_id(&self, id: EntityId) -> Option<EntityRef> {
        self.entities.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn find_by_path(&self, path: &Path) -> Option<EntityRef> {
        let path = normalize_path(path);
        self.search_tree(&path).or_else(|| {
            // Entities whose parents never materialized their caches.
            self.entities
                .iter()
                .find(|entry| normalize_path(entry.path()) == path)
                .map(|entry| Arc::clone(entry.value()))
        })
    }

    fn register(&self, entity: EntityRef) {
        self.entities.insert(entity.id(), entity);
    }

    fn unregister(&self, id: EntityId) {
        self.entities.remove(&id);
    }
}

/// Fixed library roots, global and per user.
#[derive(Debug, Clone, Default)]
pub struct StaticLibraryRoots {
    pub global: Vec<PathBuf>,
    pub per_user: HashMap<String, Vec<PathBuf>>,
}

impl StaticLibraryRoots {
    pub fn new(global: Vec<PathBuf>) -> Self {
        Self {
            global,
            per_user: HashMap::new(),
        }
    }
}

impl LibraryRootsProvider for StaticLibraryRoots {
    fn library_roots(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.global
            .iter()
            .chain(self.per_user.values().flatten())
            .filter(|root| seen.insert(normalize_path(root)))
            .cloned()
            .collect()
    }
}

/// Pipeline that leaves entities untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetadataPipeline;

#[async_trait]
impl MetadataPipeline for NoopMetadataPipeline {
    async fn refresh(
        &self,
        _entity: &EntityRef,
        _options: RefreshOptions,
    ) -> Result<bool> {
        Ok(false)
    }
}
