//! Bounded-concurrency recursive metadata refresh over validation
//! candidates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::catalog::Catalog;
use super::config::CRAWL_PROGRESS_SHARE;
use super::progress::Progress;
use super::reconcile::{ValidationCandidate, ValidationRequest, ensure_active};
use crate::domain::EntityRef;
use crate::error::{CatalogError, Result};
use crate::ports::RefreshOptions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct RefreshStats {
    pub refreshed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Refreshed,
    Failed,
    /// Not started because cancellation was observed first.
    Skipped,
}

/// Per-item completion fractions folded into one overall percentage. The
/// first [`CRAWL_PROGRESS_SHARE`] percent belongs to the crawl phase.
struct ProgressTracker {
    fractions: Mutex<HashMap<usize, f64>>,
    total: usize,
    sink: Progress,
}

impl ProgressTracker {
    fn new(total: usize, sink: Progress) -> Self {
        Self {
            fractions: Mutex::new(HashMap::with_capacity(total)),
            total,
            sink,
        }
    }

    fn set(&self, index: usize, fraction: f64) {
        let overall = {
            let mut fractions = self.fractions.lock();
            let slot = fractions.entry(index).or_insert(0.0);
            *slot = slot.max(fraction.clamp(0.0, 1.0));
            let sum: f64 = fractions.values().sum();
            CRAWL_PROGRESS_SHARE
                + (100.0 - CRAWL_PROGRESS_SHARE) * (sum / self.total as f64)
        };
        self.sink.report(overall);
    }

    /// Sink for a nested validation that fills this item's share.
    fn item_sink(self: &Arc<Self>, index: usize) -> Progress {
        let tracker = Arc::clone(self);
        Progress::from_fn(move |percent| tracker.set(index, percent / 100.0))
    }
}

impl Catalog {
    pub(super) async fn refresh_children(
        &self,
        items: Vec<ValidationCandidate>,
        request: ValidationRequest,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<RefreshStats> {
        if items.is_empty() {
            progress.report(100.0);
            return Ok(RefreshStats::default());
        }

        let tracker =
            Arc::new(ProgressTracker::new(items.len(), progress.clone()));
        let tracker = &tracker;
        let outcomes: Vec<ItemOutcome> =
            stream::iter(items.into_iter().enumerate())
                .map(move |(index, item)| {
                    self.refresh_item(index, item, request, tracker, cancel)
                })
                .buffer_unordered(self.config.cap())
                .collect()
                .await;

        let mut stats = RefreshStats::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Refreshed => stats.refreshed += 1,
                ItemOutcome::Failed => stats.failed += 1,
                ItemOutcome::Skipped => stats.skipped += 1,
            }
        }
        tracing::debug!(
            target: "catalog::refresh",
            refreshed = stats.refreshed,
            failed = stats.failed,
            skipped = stats.skipped,
            "refresh batch finished"
        );

        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled("refresh batch".into()));
        }
        Ok(stats)
    }

    async fn refresh_item(
        &self,
        index: usize,
        item: ValidationCandidate,
        request: ValidationRequest,
        tracker: &Arc<ProgressTracker>,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::Skipped;
        }

        let ValidationCandidate { entity, mut changed } = item;
        if entity.is_folder() {
            changed |= self.refresh_links(&entity).await;
        }

        let options = RefreshOptions {
            force_save: changed,
            force_refresh: request.force_refresh_metadata,
        };
        let mut ok = self.refresh_metadata(&entity, options).await;

        if entity.is_folder()
            && !entity.is_offline()
            && self.config.should_recurse(changed, request.recursive)
            && ensure_active(cancel, &entity).is_ok()
        {
            tracker.set(index, 0.0);
            let inner = tracker.item_sink(index);
            match self.validate_folder(&entity, request, &inner, cancel).await {
                Ok(_) => {}
                Err(err) if err.is_cancelled() => {
                    tracing::debug!(
                        target: "catalog::refresh",
                        folder = %entity.path().display(),
                        "nested validation cancelled"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        target: "catalog::refresh",
                        folder = %entity.path().display(),
                        error = %err,
                        "nested validation failed"
                    );
                }
            }
            // Derived folder metadata depends on the finalized children.
            ok &= self.refresh_metadata(&entity, options).await;
        }

        tracker.set(index, 1.0);
        if ok {
            ItemOutcome::Refreshed
        } else {
            ItemOutcome::Failed
        }
    }

    async fn refresh_metadata(
        &self,
        entity: &EntityRef,
        options: RefreshOptions,
    ) -> bool {
        match self.pipeline.refresh(entity, options).await {
            Ok(_) => {
                entity.mark_refreshed(Utc::now());
                true
            }
            Err(err) => {
                tracing::warn!(
                    target: "catalog::refresh",
                    path = %entity.path().display(),
                    error = %err,
                    "metadata refresh failed"
                );
                false
            }
        }
    }

    /// Recompute shortcut links of a folder; persists and reports `true`
    /// when the link set changed.
    async fn refresh_links(&self, folder: &EntityRef) -> bool {
        match self.links.refresh_shortcuts(folder).await {
            Ok(false) => false,
            Ok(true) => {
                let links = folder
                    .as_folder()
                    .map(|state| state.linked_children())
                    .unwrap_or_default();
                if let Err(err) = self
                    .repository
                    .save_linked_children(folder.id(), &links)
                    .await
                {
                    tracing::warn!(
                        target: "catalog::links",
                        folder = %folder.path().display(),
                        error = %err,
                        "failed to persist linked children"
                    );
                }
                true
            }
            Err(err) => {
                tracing::warn!(
                    target: "catalog::links",
                    folder = %folder.path().display(),
                    error = %err,
                    "shortcut scan failed"
                );
                false
            }
        }
    }
}
