//! Per-folder lazily loaded, copy-on-write child list.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::entity::EntityRef;
use super::ids::EntityId;
use crate::error::{CatalogError, Result};

/// Materialized list of a folder's children. Never mutated in place.
pub type ChildSnapshot = Arc<[EntityRef]>;

/// Source used to materialize an unloaded cache.
#[async_trait]
pub trait ChildLoader: Send + Sync {
    async fn load_children(&self, folder: EntityId) -> Result<Vec<EntityRef>>;
}

#[derive(Default)]
enum CacheState {
    #[default]
    Unloaded,
    Loading,
    Loaded(ChildSnapshot),
}

#[derive(Default)]
struct Slot {
    state: CacheState,
    /// Bumped on every invalidation so an in-flight load that started
    /// before it does not publish a stale snapshot.
    generation: u64,
}

/// Lock-protected child cache. Readers only clone the current snapshot
/// handle and always observe a complete list; writers serialize on the
/// per-folder mutation lock and publish a whole new snapshot.
#[derive(Default)]
pub struct ChildCache {
    slot: RwLock<Slot>,
    load_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl fmt::Debug for ChildCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        let state = match &slot.state {
            CacheState::Unloaded => "unloaded".to_string(),
            CacheState::Loading => "loading".to_string(),
            CacheState::Loaded(children) => {
                format!("loaded({})", children.len())
            }
        };
        f.debug_struct("ChildCache")
            .field("state", &state)
            .field("generation", &slot.generation)
            .finish()
    }
}

impl ChildCache {
    /// Current snapshot without triggering a load.
    pub fn loaded(&self) -> Option<ChildSnapshot> {
        match &self.slot.read().state {
            CacheState::Loaded(children) => Some(Arc::clone(children)),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded().is_some()
    }

    /// Current snapshot, materializing it through `loader` if unloaded.
    /// Concurrent callers share one load.
    pub async fn get(
        &self,
        folder: EntityId,
        loader: &dyn ChildLoader,
    ) -> Result<ChildSnapshot> {
        if let Some(children) = self.loaded() {
            return Ok(children);
        }

        let _load = self.load_lock.lock().await;
        let generation = {
            let mut slot = self.slot.write();
            if let CacheState::Loaded(children) = &slot.state {
                return Ok(Arc::clone(children));
            }
            slot.state = CacheState::Loading;
            slot.generation
        };

        match loader.load_children(folder).await {
            Ok(children) => {
                let snapshot: ChildSnapshot = children.into();
                let mut slot = self.slot.write();
                if slot.generation == generation {
                    slot.state = CacheState::Loaded(Arc::clone(&snapshot));
                }
                tracing::trace!(
                    target: "catalog::children",
                    %folder,
                    count = snapshot.len(),
                    "materialized child cache"
                );
                Ok(snapshot)
            }
            Err(err) => {
                let mut slot = self.slot.write();
                if slot.generation == generation {
                    slot.state = CacheState::Unloaded;
                }
                Err(err)
            }
        }
    }

    /// Append `items`, rejecting any identifier already present in the
    /// folder or repeated within the batch. On conflict nothing changes.
    pub async fn add_many(
        &self,
        folder: EntityId,
        items: Vec<EntityRef>,
        loader: &dyn ChildLoader,
    ) -> Result<ChildSnapshot> {
        let _write = self.write_lock.lock().await;
        let base = self.get(folder, loader).await?;

        let mut seen: HashSet<EntityId> =
            base.iter().map(|child| child.id()).collect();
        for item in &items {
            let id = item.id();
            if !seen.insert(id) {
                return Err(CatalogError::Conflict { folder, child: id });
            }
        }

        let next: ChildSnapshot =
            base.iter().cloned().chain(items).collect::<Vec<_>>().into();
        self.publish(Arc::clone(&next));
        Ok(next)
    }

    pub async fn add(
        &self,
        folder: EntityId,
        item: EntityRef,
        loader: &dyn ChildLoader,
    ) -> Result<ChildSnapshot> {
        self.add_many(folder, vec![item], loader).await
    }

    /// Drop every child whose identifier is in `ids`.
    pub async fn remove_many(
        &self,
        folder: EntityId,
        ids: &HashSet<EntityId>,
        loader: &dyn ChildLoader,
    ) -> Result<ChildSnapshot> {
        let _write = self.write_lock.lock().await;
        let base = self.get(folder, loader).await?;

        let next: ChildSnapshot = base
            .iter()
            .filter(|child| !ids.contains(&child.id()))
            .cloned()
            .collect::<Vec<_>>()
            .into();
        self.publish(Arc::clone(&next));
        Ok(next)
    }

    /// Replace the snapshot with an empty, loaded list.
    pub async fn clear(&self) -> ChildSnapshot {
        let _write = self.write_lock.lock().await;
        let empty: ChildSnapshot = Vec::new().into();
        self.publish(Arc::clone(&empty));
        empty
    }

    /// Reset to unloaded; the next read rebuilds from the repository.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write();
        slot.state = CacheState::Unloaded;
        slot.generation = slot.generation.wrapping_add(1);
    }

    fn publish(&self, snapshot: ChildSnapshot) {
        self.slot.write().state = CacheState::Loaded(snapshot);
    }
}
