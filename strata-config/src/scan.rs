//! One-shot validation of a directory on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use strata_core::domain::{Entity, EntityKind, EntityRef};
use strata_core::engine::{
    Catalog, CatalogDeps, Progress, ValidationOutcome, ValidationRequest,
    ValidationSummary,
};
use strata_core::infra::{
    FsCrawler, FsProbe, InMemoryRegistry, InMemoryRepository,
    NoopMetadataPipeline,
};
use tokio_util::sync::CancellationToken;

use crate::models::catalog::CatalogConfig;

/// What to scan and how.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub request: ValidationRequest,
}

/// Result of a scan: the top-level summary plus subtree totals.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub root: PathBuf,
    pub outcome: ValidationOutcome,
    pub folders: usize,
    pub items: usize,
    pub offline: usize,
}

impl ScanReport {
    pub fn summary(&self) -> Option<&ValidationSummary> {
        match &self.outcome {
            ValidationOutcome::Completed(summary) => Some(summary),
            ValidationOutcome::Superseded => None,
        }
    }
}

/// Build a catalog over the in-memory adapters rooted at `options.root`
/// and run one validation. The scan root counts as a library root when
/// none is configured.
pub async fn run_scan(
    config: &CatalogConfig,
    options: &ScanOptions,
    progress: &Progress,
    cancel: &CancellationToken,
) -> anyhow::Result<ScanReport> {
    let root_path = absolute_root(&options.root)?;

    let mut sources = config.libraries.clone();
    if sources.is_empty() {
        sources.global.push(root_path.clone());
    }

    let registry = Arc::new(InMemoryRegistry::new());
    let root: EntityRef =
        Entity::new(EntityKind::CollectionFolder, root_path.clone()).into_ref();
    registry.set_root(Arc::clone(&root));

    let catalog = Catalog::new(
        CatalogDeps {
            crawler: Arc::new(FsCrawler::new(config.crawl.clone())),
            repository: Arc::new(InMemoryRepository::new()),
            registry: registry.clone(),
            pipeline: Arc::new(NoopMetadataPipeline),
            roots: Arc::new(sources.to_provider()),
            probe: Arc::new(FsProbe),
        },
        config.refresh.clone(),
    );

    tracing::info!(
        target: "catalog::scan",
        root = %root_path.display(),
        cap = catalog.config().cap(),
        recursive = ?options.request.recursive,
        "starting scan"
    );

    let outcome = catalog
        .validate_children(&root, options.request, progress, cancel)
        .await
        .with_context(|| format!("scan of {} failed", root_path.display()))?;

    let everything = catalog
        .recursive_children(&root, |_| true)
        .await
        .context("failed to read scanned tree")?;
    let folders = everything.iter().filter(|e| e.is_folder()).count();
    let offline = everything.iter().filter(|e| e.is_offline()).count();

    Ok(ScanReport {
        root: root_path,
        outcome,
        folders,
        items: everything.len() - folders,
        offline,
    })
}

fn absolute_root(root: &Path) -> anyhow::Result<PathBuf> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }
    std::path::absolute(root).with_context(|| {
        format!("cannot resolve scan root {}", root.display())
    })
}
