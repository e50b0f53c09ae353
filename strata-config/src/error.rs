use std::path::PathBuf;

use thiserror::Error;

/// Guard-rail violations found while validating a loaded configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("refresh.max_concurrent_refreshes must be at least 1")]
    ZeroConcurrency,

    #[error("library root {} must be an absolute path", .0.display())]
    RelativeLibraryRoot(PathBuf),

    #[error("library root {} for user {user} must be an absolute path", .path.display())]
    RelativeUserRoot { user: String, path: PathBuf },

    #[error("shortcut extension {0:?} must be non-empty and without a leading dot")]
    InvalidShortcutExtension(String),
}
