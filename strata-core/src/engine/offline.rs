//! Classification of children that disappeared from a crawl.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::ids::normalize_path;
use crate::ports::{LibraryRootsProvider, PathProbe};

/// Outcome for a child whose last-known path did not show up in a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// The entry is gone while its surroundings are reachable.
    Removed,
    /// The storage holding the entry is unreachable but declared as a
    /// library source; keep the entry and flag it offline.
    Offline,
}

/// Decides between removed and offline for absent paths.
///
/// A configured library root wins over a failed probe: a disconnected
/// share must not delete catalog entries.
pub struct OfflineDetector {
    roots: Arc<dyn LibraryRootsProvider>,
    probe: Arc<dyn PathProbe>,
}

impl fmt::Debug for OfflineDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineDetector")
            .field("roots", &self.roots.library_roots())
            .finish_non_exhaustive()
    }
}

impl OfflineDetector {
    pub fn new(
        roots: Arc<dyn LibraryRootsProvider>,
        probe: Arc<dyn PathProbe>,
    ) -> Self {
        Self { roots, probe }
    }

    pub async fn classify(&self, path: &Path) -> Absence {
        let path = normalize_path(path);
        if self.probe.is_reachable(&path).await {
            // Present on disk but no longer produced by the crawl.
            return Absence::Removed;
        }

        let roots: Vec<PathBuf> = self
            .roots
            .library_roots()
            .iter()
            .map(|root| normalize_path(root))
            .collect();

        let mut ancestor = path.parent();
        while let Some(dir) = ancestor {
            if dir.as_os_str().is_empty() {
                break;
            }
            if self.probe.is_reachable(dir).await {
                tracing::debug!(
                    target: "catalog::offline",
                    path = %path.display(),
                    reachable = %dir.display(),
                    "ancestor reachable, entry removed"
                );
                return Absence::Removed;
            }
            if roots.iter().any(|root| root == dir) {
                // Library boundary reached and it is down.
                break;
            }
            ancestor = dir.parent();
        }

        if roots.iter().any(|root| path.starts_with(root)) {
            tracing::info!(
                target: "catalog::offline",
                path = %path.display(),
                "library source unreachable, keeping entry offline"
            );
            Absence::Offline
        } else {
            Absence::Removed
        }
    }
}
