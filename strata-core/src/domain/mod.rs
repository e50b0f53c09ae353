//! Catalog entity model: identity, kinds, folders, and their child caches.

pub mod children;
pub mod entity;
pub mod folder;
pub mod ids;
pub mod links;

pub use children::{ChildCache, ChildLoader, ChildSnapshot};
pub use entity::{
    Entity, EntityKind, EntityRef, EntityState, FileStamp, LocationKind,
};
pub use folder::{FolderState, ValidationGuard, ValidationSlot};
pub use ids::EntityId;
pub use links::{LinkKind, LinkedChild};
