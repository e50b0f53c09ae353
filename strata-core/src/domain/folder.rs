use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::children::ChildCache;
use super::entity::Entity;
use super::ids::EntityId;
use super::links::{LinkKind, LinkedChild};

/// Child-owning capability of a folder entity.
#[derive(Debug, Default)]
pub struct FolderState {
    children: ChildCache,
    links: RwLock<Vec<LinkedChild>>,
    validation: ValidationSlot,
}

impl FolderState {
    pub fn children(&self) -> &ChildCache {
        &self.children
    }

    pub fn linked_children(&self) -> Vec<LinkedChild> {
        self.links.read().clone()
    }

    pub fn replace_links(&self, links: Vec<LinkedChild>) {
        *self.links.write() = links;
    }

    /// Remember the resolved target of a link so the next resolution can
    /// skip the tree search.
    pub fn cache_link_target(&self, path: &Path, kind: LinkKind, id: EntityId) {
        let mut links = self.links.write();
        for link in links
            .iter_mut()
            .filter(|link| link.kind == kind && link.path == path)
        {
            link.cached_id = Some(id);
        }
    }

    pub fn validation(&self) -> &ValidationSlot {
        &self.validation
    }
}

impl Entity {
    /// Seed the linked children of a folder entity. No-op on non-folders.
    pub fn with_linked_children(self, links: Vec<LinkedChild>) -> Self {
        if let Some(folder) = self.as_folder() {
            folder.replace_links(links);
        }
        self
    }
}

/// Single-flight slot: at most one validation runs per folder. Starting a
/// new one cancels the previous one instead of queuing behind it.
#[derive(Debug, Default)]
pub struct ValidationSlot {
    current: Mutex<Option<(u64, CancellationToken)>>,
    tickets: AtomicU64,
}

impl ValidationSlot {
    /// Claim the slot, superseding any validation already in flight. The
    /// returned guard's token fires when either `caller` fires or a later
    /// validation supersedes this one.
    pub fn begin(&self, caller: &CancellationToken) -> ValidationGuard<'_> {
        let scope = caller.child_token();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let previous = self.current.lock().replace((ticket, scope.clone()));
        if let Some((_, previous)) = previous {
            previous.cancel();
        }
        ValidationGuard {
            slot: self,
            ticket,
            caller: caller.clone(),
            scope,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }
}

/// Releases the slot on drop, whatever path the validation exits through.
#[derive(Debug)]
pub struct ValidationGuard<'a> {
    slot: &'a ValidationSlot,
    ticket: u64,
    caller: CancellationToken,
    scope: CancellationToken,
}

impl ValidationGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.scope
    }

    /// Cancelled by a newer validation rather than by the caller.
    pub fn is_superseded(&self) -> bool {
        self.scope.is_cancelled() && !self.caller.is_cancelled()
    }

    pub fn caller_cancelled(&self) -> bool {
        self.caller.is_cancelled()
    }
}

impl Drop for ValidationGuard<'_> {
    fn drop(&mut self) {
        let mut current = self.slot.current.lock();
        if matches!(&*current, Some((ticket, _)) if *ticket == self.ticket) {
            *current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityKind;

    #[test]
    fn newer_validation_supersedes_older() {
        let slot = ValidationSlot::default();
        let caller = CancellationToken::new();

        let first = slot.begin(&caller);
        let second = slot.begin(&caller);

        assert!(first.token().is_cancelled());
        assert!(first.is_superseded());
        assert!(!second.token().is_cancelled());

        drop(first);
        assert!(slot.is_active(), "older guard must not release newer claim");
        drop(second);
        assert!(!slot.is_active());
    }

    #[test]
    fn caller_cancellation_is_not_supersession() {
        let slot = ValidationSlot::default();
        let caller = CancellationToken::new();
        let guard = slot.begin(&caller);

        caller.cancel();
        assert!(guard.token().is_cancelled());
        assert!(!guard.is_superseded());
        assert!(guard.caller_cancelled());
    }

    #[test]
    fn cached_link_target_is_recorded() {
        let folder = FolderState::default();
        folder.replace_links(vec![
            LinkedChild::manual("/m/a"),
            LinkedChild::shortcut("/m/a"),
        ]);
        let id = Entity::new(EntityKind::Video, "/m/a").id();
        folder.cache_link_target(Path::new("/m/a"), LinkKind::Manual, id);

        let links = folder.linked_children();
        assert_eq!(links[0].cached_id, Some(id));
        assert_eq!(links[1].cached_id, None);
    }
}
