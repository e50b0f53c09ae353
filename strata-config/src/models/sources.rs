use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strata_core::infra::StaticLibraryRoots;

use crate::error::ConfigError;

/// Library source locations. An absent entry whose path falls under one of
/// these roots is kept offline instead of being removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LibrarySources {
    /// Roots shared by every user.
    pub global: Vec<PathBuf>,
    /// Extra roots keyed by user name.
    pub per_user: BTreeMap<String, Vec<PathBuf>>,
}

impl LibrarySources {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.per_user.values().all(Vec::is_empty)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(root) = self.global.iter().find(|p| !p.is_absolute()) {
            return Err(ConfigError::RelativeLibraryRoot(root.clone()));
        }
        for (user, roots) in &self.per_user {
            if let Some(root) = roots.iter().find(|p| !p.is_absolute()) {
                return Err(ConfigError::RelativeUserRoot {
                    user: user.clone(),
                    path: root.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn to_provider(&self) -> StaticLibraryRoots {
        StaticLibraryRoots {
            global: self.global.clone(),
            per_user: self
                .per_user
                .iter()
                .map(|(user, roots)| (user.clone(), roots.clone()))
                .collect(),
        }
    }
}
