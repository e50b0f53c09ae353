//! Resolution of non-owning linked children (manual links and shortcuts).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::ids::normalize_path;
use crate::domain::{EntityId, EntityRef, LinkKind, LinkedChild};
use crate::error::Result;
use crate::ports::{Crawler, EntityRegistry};

/// Resolves link descriptors to live entities, preferring cached target
/// identifiers and falling back to a full-tree path search.
pub struct LinkResolver {
    registry: Arc<dyn EntityRegistry>,
    crawler: Arc<dyn Crawler>,
    by_path: DashMap<PathBuf, EntityId>,
}

impl fmt::Debug for LinkResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkResolver")
            .field("cached_paths", &self.by_path.len())
            .finish_non_exhaustive()
    }
}

impl LinkResolver {
    pub fn new(
        registry: Arc<dyn EntityRegistry>,
        crawler: Arc<dyn Crawler>,
    ) -> Self {
        Self {
            registry,
            crawler,
            by_path: DashMap::new(),
        }
    }

    /// Resolve one link held by `folder`, recording the target identifier
    /// on the folder's descriptor after a tree search.
    pub fn resolve(
        &self,
        folder: &EntityRef,
        link: &LinkedChild,
    ) -> Option<EntityRef> {
        if let Some(id) = link.cached_id
            && let Some(entity) = self.fresh(id, &link.path)
        {
            return Some(entity);
        }

        let found = self.search(&link.path)?;
        if let Some(state) = folder.as_folder() {
            state.cache_link_target(&link.path, link.kind, found.id());
        }
        Some(found)
    }

    /// All resolvable linked children of `folder`, deduplicated. Targets
    /// that cannot be found are skipped.
    pub fn resolve_all(&self, folder: &EntityRef) -> Vec<EntityRef> {
        let Some(state) = folder.as_folder() else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for link in state.linked_children() {
            match self.resolve(folder, &link) {
                Some(entity) if seen.insert(entity.id()) => out.push(entity),
                Some(_) => {}
                None => tracing::debug!(
                    target: "catalog::links",
                    folder = %folder.path().display(),
                    link = %link.path.display(),
                    "linked child target not found"
                ),
            }
        }
        out
    }

    /// Path lookup independent of any folder, cached by path.
    pub fn find_by_path(&self, path: &Path) -> Option<EntityRef> {
        let path = normalize_path(path);
        if let Some(id) = self.by_path.get(&path).map(|entry| *entry)
            && let Some(entity) = self.fresh(id, &path)
        {
            return Some(entity);
        }
        self.search(&path)
    }

    /// Recompute the folder's shortcut links from the crawl. Manual links
    /// are preserved verbatim. Returns whether the effective link set
    /// changed.
    pub async fn refresh_shortcuts(&self, folder: &EntityRef) -> Result<bool> {
        let Some(state) = folder.as_folder() else {
            return Ok(false);
        };
        if !folder.location().is_filesystem() {
            return Ok(false);
        }

        let targets = self.crawler.shortcut_targets(folder.path()).await?;
        let crawled: HashSet<PathBuf> = targets
            .into_iter()
            .map(|target| absolutize(folder.path(), &target))
            .collect();

        let current = state.linked_children();
        let stored: HashSet<PathBuf> = current
            .iter()
            .filter(|link| link.kind == LinkKind::Shortcut)
            .map(|link| link.path.clone())
            .collect();

        if crawled == stored {
            return Ok(false);
        }

        let previous_ids: HashMap<PathBuf, EntityId> = current
            .iter()
            .filter(|link| link.kind == LinkKind::Shortcut)
            .filter_map(|link| link.cached_id.map(|id| (link.path.clone(), id)))
            .collect();

        let mut shortcuts: Vec<PathBuf> = crawled.into_iter().collect();
        shortcuts.sort();

        let mut next: Vec<LinkedChild> = current
            .into_iter()
            .filter(|link| link.kind == LinkKind::Manual)
            .collect();
        next.extend(shortcuts.into_iter().map(|path| LinkedChild {
            cached_id: previous_ids.get(&path).copied(),
            ..LinkedChild::shortcut(path)
        }));

        tracing::debug!(
            target: "catalog::links",
            folder = %folder.path().display(),
            links = next.len(),
            "shortcut links changed"
        );
        state.replace_links(next);
        Ok(true)
    }

    fn fresh(&self, id: EntityId, path: &Path) -> Option<EntityRef> {
        self.registry
            .resolve_by_id(id)
            .filter(|entity| normalize_path(entity.path()) == normalize_path(path))
    }

    fn search(&self, path: &Path) -> Option<EntityRef> {
        let found = self.registry.find_by_path(path)?;
        self.by_path.insert(normalize_path(path), found.id());
        Some(found)
    }
}

fn absolutize(base: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        normalize_path(target)
    } else {
        normalize_path(&base.join(target))
    }
}
