use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::EntityKind;

/// Namespace for catalog identifiers. Changing it re-keys every entity.
const ENTITY_NAMESPACE: Uuid =
    Uuid::from_u128(0x6f1c_52d2_8e0b_4a57_9f3e_1d7a_c0b4_e812);

/// Stable identifier of a catalog entity.
///
/// Derived from `(path, kind)` only, so recrawling the same path for the
/// same kind always reproduces the identifier a previous load produced.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn derive(path: &Path, kind: EntityKind) -> Self {
        let normalized = normalize_path(path);
        let key = format!("{}:{}", kind.tag(), normalized.to_string_lossy());
        EntityId(Uuid::new_v5(&ENTITY_NAMESPACE, key.as_bytes()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lexical normalization: drops `.` components, folds `..` where a parent
/// exists, and strips trailing separators. Never touches the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
