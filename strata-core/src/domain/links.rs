use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ids::EntityId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Explicitly declared membership, e.g. the members of a box set.
    Manual,
    /// Discovered at crawl time from a shortcut file.
    Shortcut,
}

/// Non-owning reference to an entity elsewhere in the tree. Resolution is
/// a lookup only; the linking folder never owns the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedChild {
    pub path: PathBuf,
    pub kind: LinkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_id: Option<EntityId>,
}

impl LinkedChild {
    pub fn manual(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: LinkKind::Manual,
            cached_id: None,
        }
    }

    pub fn shortcut(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: LinkKind::Shortcut,
            cached_id: None,
        }
    }
}
