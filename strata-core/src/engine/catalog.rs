use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::config::RefreshConfig;
use super::links::LinkResolver;
use super::offline::OfflineDetector;
use crate::domain::{
    ChildLoader, ChildSnapshot, Entity, EntityId, EntityRef, FolderState,
    LinkKind, LinkedChild,
};
use crate::error::{CatalogError, Result};
use crate::ports::{
    ChildRepository, Crawler, EntityRegistry, LibraryRootsProvider,
    MetadataPipeline, PathProbe,
};

/// Collaborators injected into a [`Catalog`].
#[derive(Clone)]
pub struct CatalogDeps {
    pub crawler: Arc<dyn Crawler>,
    pub repository: Arc<dyn ChildRepository>,
    pub registry: Arc<dyn EntityRegistry>,
    pub pipeline: Arc<dyn MetadataPipeline>,
    pub roots: Arc<dyn LibraryRootsProvider>,
    pub probe: Arc<dyn PathProbe>,
}

impl fmt::Debug for CatalogDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogDeps").finish_non_exhaustive()
    }
}

/// Tree-maintenance engine: reconciles folders against the filesystem and
/// drives metadata refresh over the resulting subtree.
pub struct Catalog {
    pub(super) crawler: Arc<dyn Crawler>,
    pub(super) repository: Arc<dyn ChildRepository>,
    pub(super) registry: Arc<dyn EntityRegistry>,
    pub(super) pipeline: Arc<dyn MetadataPipeline>,
    pub(super) detector: OfflineDetector,
    pub(super) links: LinkResolver,
    pub(super) config: RefreshConfig,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .field("detector", &self.detector)
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChildLoader for Catalog {
    async fn load_children(&self, folder: EntityId) -> Result<Vec<EntityRef>> {
        let ids = self.repository.child_ids(folder).await?;
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.registry.resolve_by_id(id))
            .collect())
    }
}

impl Catalog {
    pub fn new(deps: CatalogDeps, config: RefreshConfig) -> Self {
        Self {
            detector: OfflineDetector::new(deps.roots, deps.probe),
            links: LinkResolver::new(
                Arc::clone(&deps.registry),
                Arc::clone(&deps.crawler),
            ),
            crawler: deps.crawler,
            repository: deps.repository,
            registry: deps.registry,
            pipeline: deps.pipeline,
            config,
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn EntityRegistry> {
        &self.registry
    }

    pub fn link_resolver(&self) -> &LinkResolver {
        &self.links
    }

    /// Current child snapshot of `folder`, loading it if needed.
    pub async fn children(&self, folder: &EntityRef) -> Result<ChildSnapshot> {
        let state = folder_state(folder)?;
        state.children().get(folder.id(), self).await
    }

    /// Depth-first walk of the subtree below `folder`. `filter` selects
    /// which entities are returned; every folder is descended regardless.
    pub async fn recursive_children<F>(
        &self,
        folder: &EntityRef,
        filter: F,
    ) -> Result<Vec<EntityRef>>
    where
        F: Fn(&Entity) -> bool,
    {
        folder_state(folder)?;

        let mut out = Vec::new();
        let mut visited = HashSet::from([folder.id()]);
        let mut stack = vec![Arc::clone(folder)];
        while let Some(current) = stack.pop() {
            let children = self.children(&current).await?;
            for child in children.iter().rev() {
                if child.is_folder() && visited.insert(child.id()) {
                    stack.push(Arc::clone(child));
                }
            }
            out.extend(children.iter().filter(|c| filter(c)).cloned());
        }
        Ok(out)
    }

    /// Resolved linked children of `folder`. Never implies ownership.
    pub fn linked_children(&self, folder: &EntityRef) -> Vec<EntityRef> {
        self.links.resolve_all(folder)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<EntityRef> {
        self.links.find_by_path(path)
    }

    /// Add `child` to `folder` and persist. A child whose identifier is
    /// already present is rejected with [`CatalogError::Conflict`] and the
    /// folder is left unchanged.
    pub async fn add_child(
        &self,
        folder: &EntityRef,
        child: EntityRef,
    ) -> Result<()> {
        let state = folder_state(folder)?;
        let folder_id = folder.id();
        let snapshot = state
            .children()
            .add(folder_id, Arc::clone(&child), self)
            .await?;

        child.set_parent(Some(folder_id));
        let persisted = async {
            self.repository
                .create_items(std::slice::from_ref(&child))
                .await?;
            self.registry.register(Arc::clone(&child));
            self.repository
                .save_children(folder_id, &ids_of(&snapshot))
                .await
        }
        .await;
        if persisted.is_err() {
            state.children().invalidate();
        }
        persisted
    }

    /// Remove the child with `child_id` from `folder` and persist.
    pub async fn remove_child(
        &self,
        folder: &EntityRef,
        child_id: EntityId,
    ) -> Result<()> {
        let state = folder_state(folder)?;
        let folder_id = folder.id();
        let current = state.children().get(folder_id, self).await?;
        let Some(child) = current.iter().find(|c| c.id() == child_id).cloned()
        else {
            return Err(CatalogError::NotFound(child_id.to_string()));
        };

        let snapshot = state
            .children()
            .remove_many(folder_id, &HashSet::from([child_id]), self)
            .await?;

        let persisted = async {
            self.detach(&child).await?;
            self.repository
                .save_children(folder_id, &ids_of(&snapshot))
                .await
        }
        .await;
        if persisted.is_err() {
            state.children().invalidate();
        }
        persisted
    }

    /// Remove every child of `folder` and persist the empty list.
    pub async fn clear_children(&self, folder: &EntityRef) -> Result<()> {
        let state = folder_state(folder)?;
        let folder_id = folder.id();
        let current = state.children().get(folder_id, self).await?;
        state.children().clear().await;

        let persisted = async {
            for child in current.iter() {
                self.detach(child).await?;
            }
            self.repository.save_children(folder_id, &[]).await
        }
        .await;
        if persisted.is_err() {
            state.children().invalidate();
        }
        persisted
    }

    /// Declare `target` a member of a curated group. Returns `false` when
    /// the link already exists.
    pub async fn add_manual_link(
        &self,
        folder: &EntityRef,
        target: &Path,
    ) -> Result<bool> {
        let state = folder_state(folder)?;
        if !folder.kind().supports_manual_links() {
            return Err(CatalogError::Unsupported(format!(
                "{} does not accept manual links",
                folder.kind().tag()
            )));
        }

        let entity = self
            .links
            .find_by_path(target)
            .ok_or_else(|| CatalogError::LinkTargetNotFound(target.into()))?;

        let mut links = state.linked_children();
        if links
            .iter()
            .any(|l| l.kind == LinkKind::Manual && l.path == entity.path())
        {
            return Ok(false);
        }
        links.push(LinkedChild {
            cached_id: Some(entity.id()),
            ..LinkedChild::manual(entity.path())
        });
        self.repository
            .save_linked_children(folder.id(), &links)
            .await?;
        state.replace_links(links);
        Ok(true)
    }

    pub async fn remove_manual_link(
        &self,
        folder: &EntityRef,
        target: &Path,
    ) -> Result<bool> {
        let state = folder_state(folder)?;
        let mut links = state.linked_children();
        let before = links.len();
        links.retain(|l| !(l.kind == LinkKind::Manual && l.path == target));
        if links.len() == before {
            return Ok(false);
        }
        self.repository
            .save_linked_children(folder.id(), &links)
            .await?;
        state.replace_links(links);
        Ok(true)
    }

    /// De-parent `child`, report it removed, and drop it and its cached
    /// descendants from the registry.
    pub(super) async fn detach(&self, child: &EntityRef) -> Result<()> {
        child.set_parent(None);
        self.repository.report_removed(child).await?;

        let mut stack = vec![Arc::clone(child)];
        while let Some(current) = stack.pop() {
            self.registry.unregister(current.id());
            if let Some(children) =
                current.as_folder().and_then(|f| f.children().loaded())
            {
                stack.extend(children.iter().cloned());
            }
        }
        Ok(())
    }
}

pub(super) fn folder_state(folder: &EntityRef) -> Result<&FolderState> {
    folder
        .as_folder()
        .ok_or_else(|| CatalogError::NotAFolder(folder.id()))
}

pub(super) fn ids_of(children: &[EntityRef]) -> Vec<EntityId> {
    children.iter().map(|child| child.id()).collect()
}
