use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::folder::FolderState;
use super::ids::EntityId;

/// Closed set of entity kinds. Behaviour that depends on the kind is
/// answered by the capability queries below, never by runtime type tests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Plain directory on disk.
    Folder,
    /// Top-level library folder (one per configured source location).
    CollectionFolder,
    /// Curated group whose members are declared, not contained.
    BoxSet,
    Video,
    Audio,
    Photo,
}

impl EntityKind {
    /// Stable tag mixed into identifier derivation.
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Folder => "folder",
            EntityKind::CollectionFolder => "collection_folder",
            EntityKind::BoxSet => "box_set",
            EntityKind::Video => "video",
            EntityKind::Audio => "audio",
            EntityKind::Photo => "photo",
        }
    }

    pub fn is_folder(self) -> bool {
        matches!(
            self,
            EntityKind::Folder
                | EntityKind::CollectionFolder
                | EntityKind::BoxSet
        )
    }

    /// Kinds whose membership may be declared through manual links.
    pub fn supports_manual_links(self) -> bool {
        matches!(self, EntityKind::BoxSet)
    }
}

/// Storage nature of an entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    #[default]
    FileSystem,
    Remote,
    Virtual,
}

impl LocationKind {
    /// Only filesystem-backed entities can be observed on disk, go offline,
    /// or be removed by reconciliation.
    pub fn is_filesystem(self) -> bool {
        matches!(self, LocationKind::FileSystem)
    }
}

/// Filesystem facts captured by a crawl.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct FileStamp {
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Mutable portion of an entity.
#[derive(Debug, Clone, Default)]
pub struct EntityState {
    pub name: String,
    pub stamp: FileStamp,
    pub offline: bool,
    /// Non-owning back-reference; ownership flows parent to child only.
    pub parent: Option<EntityId>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

pub type EntityRef = Arc<Entity>;

/// Catalog record for a file, folder, or logical grouping.
pub struct Entity {
    id: OnceLock<EntityId>,
    kind: EntityKind,
    location: LocationKind,
    path: PathBuf,
    state: RwLock<EntityState>,
    folder: Option<FolderState>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Entity")
            .field("id", &self.id.get())
            .field("kind", &self.kind)
            .field("location", &self.location)
            .field("path", &self.path)
            .field("name", &state.name)
            .field("offline", &state.offline)
            .field("parent", &state.parent)
            .finish()
    }
}

impl Entity {
    /// A filesystem-backed entity without an assigned identifier. The
    /// identifier is minted from `(path, kind)` on first use.
    pub fn new(kind: EntityKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = default_name(&path, kind);
        Self {
            id: OnceLock::new(),
            kind,
            location: LocationKind::FileSystem,
            path,
            state: RwLock::new(EntityState {
                name,
                ..EntityState::default()
            }),
            folder: kind.is_folder().then(FolderState::default),
        }
    }

    pub fn with_location(mut self, location: LocationKind) -> Self {
        self.location = location;
        if !location.is_filesystem() {
            self.state.get_mut().offline = false;
        }
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.state.get_mut().name = name.into();
        self
    }

    pub fn with_stamp(mut self, stamp: FileStamp) -> Self {
        self.state.get_mut().stamp = stamp;
        self
    }

    /// Attach an identifier loaded from persistence. Replaces any id
    /// already minted on this builder.
    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = OnceLock::from(id);
        self
    }

    pub fn into_ref(self) -> EntityRef {
        Arc::new(self)
    }

    pub fn assigned_id(&self) -> Option<EntityId> {
        self.id.get().copied()
    }

    /// Identifier of this entity, minting it deterministically when none
    /// has been assigned yet.
    pub fn id(&self) -> EntityId {
        *self
            .id
            .get_or_init(|| EntityId::derive(&self.path, self.kind))
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn location(&self) -> LocationKind {
        self.location
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn stamp(&self) -> FileStamp {
        self.state.read().stamp
    }

    pub fn is_offline(&self) -> bool {
        self.state.read().offline
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        self.state.read().parent
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_refreshed
    }

    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn as_folder(&self) -> Option<&FolderState> {
        self.folder.as_ref()
    }

    /// Copy of the mutable state, taken under a single read.
    pub fn state(&self) -> EntityState {
        self.state.read().clone()
    }

    /// Sets the offline flag. Remote and Virtual entities are never marked
    /// offline. Returns whether the flag changed.
    pub fn set_offline(&self, offline: bool) -> bool {
        if offline && !self.location.is_filesystem() {
            return false;
        }
        let mut state = self.state.write();
        let changed = state.offline != offline;
        state.offline = offline;
        changed
    }

    pub fn set_parent(&self, parent: Option<EntityId>) {
        self.state.write().parent = parent;
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.state.write().name = name.into();
    }

    pub fn mark_refreshed(&self, at: DateTime<Utc>) {
        self.state.write().last_refreshed = Some(at);
    }

    /// Merge crawl-derived filesystem state from `candidate` into this
    /// entity. Returns `true` when the structural comparison detected a
    /// difference (stamp, name, or a return from offline).
    pub fn merge_filesystem_state(&self, candidate: &Entity) -> bool {
        let incoming = candidate.state.read().clone();
        let mut state = self.state.write();

        let mut changed = false;
        if state.stamp != incoming.stamp {
            state.stamp = incoming.stamp;
            changed = true;
        }
        if state.name != incoming.name {
            state.name = incoming.name;
            changed = true;
        }
        if state.offline {
            state.offline = false;
            changed = true;
        }
        changed
    }
}

fn default_name(path: &Path, kind: EntityKind) -> String {
    let name = if kind.is_folder() {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
