//! Structural reconciliation of a folder against a filesystem crawl.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::catalog::{Catalog, folder_state, ids_of};
use super::config::CRAWL_PROGRESS_SHARE;
use super::offline::Absence;
use super::progress::Progress;
use crate::domain::{EntityId, EntityRef};
use crate::error::{CatalogError, Result};
use crate::ports::CrawlContext;

/// Caller options for one validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationRequest {
    /// `None` leaves descent to change detection; `Some(true)` descends into
    /// every child folder; `Some(false)` asks not to descend.
    pub recursive: Option<bool>,
    pub force_refresh_metadata: bool,
}

impl ValidationRequest {
    pub fn recursive() -> Self {
        Self {
            recursive: Some(true),
            ..Self::default()
        }
    }
}

/// Entity paired with whether this pass saw it change. Lives for one pass.
#[derive(Debug, Clone)]
pub struct ValidationCandidate {
    pub entity: EntityRef,
    pub changed: bool,
}

/// Counters for the folder a validation was started on. Descendant
/// folders reconciled recursively are not included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub added: usize,
    pub removed: usize,
    pub marked_offline: usize,
    pub refreshed: usize,
    pub refresh_failures: usize,
    /// `false` for Remote/Virtual folders and when the crawl failed.
    pub structural_pass: bool,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Completed(ValidationSummary),
    /// A newer validation of the same folder took over.
    Superseded,
}

impl Catalog {
    /// Reconcile `folder` with the filesystem and refresh its subtree.
    ///
    /// Progress is non-decreasing and ends at 100 on completion. Caller
    /// cancellation surfaces as [`CatalogError::Cancelled`]; supersession by
    /// a newer validation of the same folder is reported as
    /// [`ValidationOutcome::Superseded`].
    pub async fn validate_children(
        &self,
        folder: &EntityRef,
        request: ValidationRequest,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome> {
        folder_state(folder)?;
        let progress = progress.clone().monotonic();
        let outcome =
            self.validate_folder(folder, request, &progress, cancel).await?;
        if matches!(outcome, ValidationOutcome::Completed(_)) {
            progress.report(100.0);
        }
        Ok(outcome)
    }

    pub(super) fn validate_folder<'a>(
        &'a self,
        folder: &'a EntityRef,
        request: ValidationRequest,
        progress: &'a Progress,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ValidationOutcome>> {
        Box::pin(async move {
            let state = folder_state(folder)?;
            let guard = state.validation().begin(cancel);
            let scope = guard.token().clone();

            match self.run_validation(folder, request, progress, &scope).await
            {
                Ok(summary) => Ok(ValidationOutcome::Completed(summary)),
                // A superseded validation never reports its own failure.
                Err(err) if guard.is_superseded() => {
                    tracing::debug!(
                        target: "catalog::reconcile",
                        folder = %folder.path().display(),
                        error = %err,
                        "validation superseded by a newer one"
                    );
                    Ok(ValidationOutcome::Superseded)
                }
                Err(err) => Err(err),
            }
        })
    }

    async fn run_validation(
        &self,
        folder: &EntityRef,
        request: ValidationRequest,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<ValidationSummary> {
        ensure_active(cancel, folder)?;

        let mut summary = ValidationSummary::default();
        let candidates = if folder.location().is_filesystem() {
            self.reconcile(folder, &mut summary, cancel).await?
        } else {
            tracing::debug!(
                target: "catalog::reconcile",
                folder = %folder.path().display(),
                location = ?folder.location(),
                "skipping structural pass for non-filesystem folder"
            );
            self.unchanged_candidates(folder).await?
        };
        progress.report(CRAWL_PROGRESS_SHARE);

        ensure_active(cancel, folder)?;
        let stats = self
            .refresh_children(candidates, request, progress, cancel)
            .await?;
        summary.refreshed = stats.refreshed;
        summary.refresh_failures = stats.failed;
        Ok(summary)
    }

    /// Diff cached children against the crawl, classify absences, and
    /// persist structural changes. Returns the validation candidates.
    async fn reconcile(
        &self,
        folder: &EntityRef,
        summary: &mut ValidationSummary,
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidationCandidate>> {
        let state = folder_state(folder)?;
        let folder_id = folder.id();
        let context = CrawlContext {
            parent: folder_id,
            parent_location: folder.location(),
        };

        // A failed crawl reads as an empty listing: absences may still be
        // classified offline, but nothing is removed on its evidence.
        let crawled =
            match self.crawler.resolve_children(folder.path(), &context).await {
                Ok(crawled) => {
                    summary.structural_pass = true;
                    crawled
                }
                Err(err) => {
                    tracing::warn!(
                        target: "catalog::reconcile",
                        folder = %folder.path().display(),
                        error = %err,
                        "crawl failed, no children will be removed"
                    );
                    Vec::new()
                }
            };

        let existing = state.children().get(folder_id, self).await?;
        let by_id: HashMap<EntityId, &EntityRef> =
            existing.iter().map(|child| (child.id(), child)).collect();

        let mut candidates = Vec::with_capacity(crawled.len());
        let mut seen = HashSet::with_capacity(crawled.len());
        let mut added = Vec::new();
        for candidate in crawled {
            let id = candidate.id();
            if !seen.insert(id) {
                tracing::warn!(
                    target: "catalog::reconcile",
                    folder = %folder.path().display(),
                    child = %candidate.path().display(),
                    "crawler reported a child twice, ignoring duplicate"
                );
                continue;
            }
            match by_id.get(&id) {
                Some(current) => {
                    let changed = current.merge_filesystem_state(&candidate);
                    candidates.push(ValidationCandidate {
                        entity: Arc::clone(current),
                        changed,
                    });
                }
                None => {
                    added.push(Arc::clone(&candidate));
                    candidates.push(ValidationCandidate {
                        entity: candidate,
                        changed: true,
                    });
                }
            }
        }

        let mut removed = Vec::new();
        for child in existing.iter().filter(|c| !seen.contains(&c.id())) {
            if !child.location().is_filesystem() {
                candidates.push(ValidationCandidate {
                    entity: Arc::clone(child),
                    changed: false,
                });
                continue;
            }
            match self.detector.classify(child.path()).await {
                Absence::Offline => {
                    if child.set_offline(true) {
                        summary.marked_offline += 1;
                    }
                    candidates.push(ValidationCandidate {
                        entity: Arc::clone(child),
                        changed: false,
                    });
                }
                Absence::Removed if !summary.structural_pass => {
                    candidates.push(ValidationCandidate {
                        entity: Arc::clone(child),
                        changed: false,
                    });
                }
                Absence::Removed => {
                    child.set_offline(false);
                    removed.push(Arc::clone(child));
                }
            }
        }

        summary.added = added.len();
        summary.removed = removed.len();
        if added.is_empty() && removed.is_empty() {
            return Ok(candidates);
        }

        ensure_active(cancel, folder)?;
        let persisted =
            self.persist_changes(folder, &added, &removed, cancel).await;
        if let Err(err) = persisted {
            // Removed children may already be detached; rebuild from storage.
            state.children().invalidate();
            return Err(err);
        }
        summary.persisted = true;

        tracing::info!(
            target: "catalog::reconcile",
            folder = %folder.path().display(),
            added = added.len(),
            removed = removed.len(),
            "folder children changed"
        );
        Ok(candidates)
    }

    async fn persist_changes(
        &self,
        folder: &EntityRef,
        added: &[EntityRef],
        removed: &[EntityRef],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let state = folder_state(folder)?;
        let folder_id = folder.id();

        for child in removed {
            self.detach(child).await?;
            ensure_active(cancel, folder)?;
        }

        for child in added {
            child.set_parent(Some(folder_id));
        }
        if !added.is_empty() {
            self.repository.create_items(added).await?;
            ensure_active(cancel, folder)?;
        }

        let gone: HashSet<EntityId> = ids_of(removed).into_iter().collect();
        if !gone.is_empty() {
            state.children().remove_many(folder_id, &gone, self).await?;
        }
        let snapshot = state
            .children()
            .add_many(folder_id, added.to_vec(), self)
            .await?;
        // Register only what the cache accepted.
        for child in added {
            self.registry.register(Arc::clone(child));
        }

        self.repository
            .save_children(folder_id, &ids_of(&snapshot))
            .await
    }

    async fn unchanged_candidates(
        &self,
        folder: &EntityRef,
    ) -> Result<Vec<ValidationCandidate>> {
        let children = self.children(folder).await?;
        Ok(children
            .iter()
            .map(|child| ValidationCandidate {
                entity: Arc::clone(child),
                changed: false,
            })
            .collect())
    }
}

pub(super) fn ensure_active(
    cancel: &CancellationToken,
    folder: &EntityRef,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(CatalogError::Cancelled(format!(
            "validation of {}",
            folder.path().display()
        )));
    }
    Ok(())
}
