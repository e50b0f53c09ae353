use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ids::EntityId;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Child {child} already exists in folder {folder}")]
    Conflict { folder: EntityId, child: EntityId },

    #[error("Entity {0} is not a folder")]
    NotAFolder(EntityId),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Link target not found: {}", .0.display())]
    LinkTargetNotFound(PathBuf),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Metadata error: {0}")]
    Metadata(String),
}

impl CatalogError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CatalogError::Cancelled(_))
    }

    /// Faults the engine absorbs and logs instead of propagating.
    pub fn is_transient_io(&self) -> bool {
        matches!(self, CatalogError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
