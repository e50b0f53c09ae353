#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use strata_core::domain::{
    Entity, EntityId, EntityKind, EntityRef, FileStamp, LinkedChild,
};
use strata_core::engine::{
    Catalog, CatalogDeps, Progress, RefreshConfig, ValidationOutcome,
    ValidationRequest,
};
use strata_core::error::{CatalogError, Result};
use strata_core::infra::{
    InMemoryRegistry, InMemoryRepository, StaticLibraryRoots,
};
use strata_core::ports::{
    ChildRepository, CrawlContext, Crawler, EntityRegistry, MetadataPipeline,
    PathProbe, RefreshOptions,
};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { kind: EntityKind, size: u64 },
    Shortcut(PathBuf),
}

/// Scriptable filesystem standing in for the disk.
#[derive(Debug, Default)]
pub struct FakeFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    unreachable: Mutex<HashSet<PathBuf>>,
    crawls: Mutex<HashMap<PathBuf, usize>>,
}

impl FakeFs {
    pub fn dir(&self, path: &str) {
        let path = PathBuf::from(path);
        let mut nodes = self.nodes.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }

    pub fn file(&self, path: &str, kind: EntityKind, size: u64) {
        if let Some(parent) = Path::new(path).parent() {
            self.dir(&parent.to_string_lossy());
        }
        self.nodes
            .lock()
            .insert(PathBuf::from(path), Node::File { kind, size });
    }

    pub fn shortcut(&self, path: &str, target: &str) {
        if let Some(parent) = Path::new(path).parent() {
            self.dir(&parent.to_string_lossy());
        }
        self.nodes
            .lock()
            .insert(PathBuf::from(path), Node::Shortcut(PathBuf::from(target)));
    }

    /// Delete `path` and everything below it.
    pub fn remove(&self, path: &str) {
        let path = PathBuf::from(path);
        self.nodes.lock().retain(|p, _| !p.starts_with(&path));
    }

    /// Take the storage under `prefix` away without deleting anything.
    pub fn disconnect(&self, prefix: &str) {
        self.unreachable.lock().insert(PathBuf::from(prefix));
    }

    pub fn reconnect(&self, prefix: &str) {
        self.unreachable.lock().remove(Path::new(prefix));
    }

    pub fn crawl_count(&self, path: &str) -> usize {
        self.crawls.lock().get(Path::new(path)).copied().unwrap_or(0)
    }

    fn is_unreachable(&self, path: &Path) -> bool {
        self.unreachable
            .lock()
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    fn listing(&self, directory: &Path) -> Result<Vec<(PathBuf, Node)>> {
        *self
            .crawls
            .lock()
            .entry(directory.to_path_buf())
            .or_default() += 1;

        let nodes = self.nodes.lock();
        if self.is_unreachable(directory)
            || !matches!(nodes.get(directory), Some(Node::Dir))
        {
            return Err(CatalogError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("cannot list {}", directory.display()),
            )));
        }
        Ok(nodes
            .iter()
            .filter(|(path, _)| path.parent() == Some(directory))
            .map(|(path, node)| (path.clone(), node.clone()))
            .collect())
    }
}

#[async_trait]
impl Crawler for FakeFs {
    async fn resolve_children(
        &self,
        directory: &Path,
        parent: &CrawlContext,
    ) -> Result<Vec<EntityRef>> {
        let listing = self.listing(directory)?;
        Ok(listing
            .into_iter()
            .filter_map(|(path, node)| {
                let (kind, size) = match node {
                    Node::Dir => (EntityKind::Folder, 0),
                    Node::File { kind, size } => (kind, size),
                    Node::Shortcut(_) => return None,
                };
                Some(
                    Entity::new(kind, path)
                        .with_location(parent.parent_location)
                        .with_stamp(FileStamp {
                            size,
                            ..FileStamp::default()
                        })
                        .into_ref(),
                )
            })
            .collect())
    }

    async fn shortcut_targets(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let listing = self.listing(directory)?;
        Ok(listing
            .into_iter()
            .filter_map(|(_, node)| match node {
                Node::Shortcut(target) => Some(target),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl PathProbe for FakeFs {
    async fn is_reachable(&self, path: &Path) -> bool {
        !self.is_unreachable(path) && self.nodes.lock().contains_key(path)
    }
}

/// Repository wrapper counting every persistence call. `create_items` can
/// be made to fail, or to park once until the test lets it through.
#[derive(Debug, Default)]
pub struct CountingRepository {
    pub inner: InMemoryRepository,
    pub save_children: AtomicUsize,
    pub create_items: AtomicUsize,
    pub report_removed: AtomicUsize,
    pub save_links: AtomicUsize,
    pub saved_lists: Mutex<Vec<(EntityId, Vec<EntityId>)>>,
    pub fail_creates: AtomicBool,
    pub create_parked: Notify,
    next_create_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl CountingRepository {
    pub fn persistence_calls(&self) -> usize {
        self.save_children.load(Ordering::SeqCst)
            + self.create_items.load(Ordering::SeqCst)
            + self.report_removed.load(Ordering::SeqCst)
            + self.save_links.load(Ordering::SeqCst)
    }

    /// Park the next `create_items` call until a permit is added to the
    /// returned gate. Later calls go straight through.
    pub fn park_next_create(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.next_create_gate.lock() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl ChildRepository for CountingRepository {
    async fn child_ids(&self, folder: EntityId) -> Result<Vec<EntityId>> {
        self.inner.child_ids(folder).await
    }

    async fn save_children(
        &self,
        folder: EntityId,
        children: &[EntityId],
    ) -> Result<()> {
        self.save_children.fetch_add(1, Ordering::SeqCst);
        self.saved_lists.lock().push((folder, children.to_vec()));
        self.inner.save_children(folder, children).await
    }

    async fn create_items(&self, items: &[EntityRef]) -> Result<()> {
        self.create_items.fetch_add(1, Ordering::SeqCst);
        let gate = self.next_create_gate.lock().take();
        if let Some(gate) = gate {
            self.create_parked.notify_one();
            let permit = gate.acquire().await;
            drop(permit);
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(CatalogError::Repository("db down".into()));
        }
        self.inner.create_items(items).await
    }

    async fn report_removed(&self, item: &EntityRef) -> Result<()> {
        self.report_removed.fetch_add(1, Ordering::SeqCst);
        self.inner.report_removed(item).await
    }

    async fn save_linked_children(
        &self,
        folder: EntityId,
        links: &[LinkedChild],
    ) -> Result<()> {
        self.save_links.fetch_add(1, Ordering::SeqCst);
        self.inner.save_linked_children(folder, links).await
    }
}

/// Registry wrapper counting full-tree path searches.
#[derive(Debug, Default)]
pub struct CountingRegistry {
    pub inner: InMemoryRegistry,
    pub path_searches: AtomicUsize,
}

impl EntityRegistry for CountingRegistry {
    fn resolve_by_id(&self, id: EntityId) -> Option<EntityRef> {
        self.inner.resolve_by_id(id)
    }

    fn find_by_path(&self, path: &Path) -> Option<EntityRef> {
        self.path_searches.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_path(path)
    }

    fn register(&self, entity: EntityRef) {
        self.inner.register(entity)
    }

    fn unregister(&self, id: EntityId) {
        self.inner.unregister(id)
    }
}

/// Metadata pipeline that records concurrency, can fail chosen paths, and
/// can hold every call until the gate opens.
#[derive(Debug)]
pub struct InstrumentedPipeline {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Duration,
    pub failing: Mutex<HashSet<PathBuf>>,
    pub refreshed: Mutex<Vec<PathBuf>>,
    gate: Semaphore,
}

impl Default for InstrumentedPipeline {
    fn default() -> Self {
        Self::with_delay(Duration::ZERO)
    }
}

impl InstrumentedPipeline {
    pub fn with_delay(delay: Duration) -> Self {
        Self::with_gate(delay, Semaphore::MAX_PERMITS)
    }

    /// Pipeline whose calls block until [`Self::open_gate`].
    pub fn gated() -> Self {
        Self::with_gate(Duration::ZERO, 0)
    }

    fn with_gate(delay: Duration, permits: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
            failing: Mutex::new(HashSet::new()),
            refreshed: Mutex::new(Vec::new()),
            gate: Semaphore::new(permits),
        }
    }

    pub fn open_gate(&self) {
        self.gate.add_permits(1 << 20);
    }

    pub fn fail_on(&self, path: &str) {
        self.failing.lock().insert(PathBuf::from(path));
    }

    pub fn refresh_count(&self, path: &str) -> usize {
        self.refreshed
            .lock()
            .iter()
            .filter(|p| p.as_path() == Path::new(path))
            .count()
    }
}

#[async_trait]
impl MetadataPipeline for InstrumentedPipeline {
    async fn refresh(
        &self,
        entity: &EntityRef,
        _options: RefreshOptions,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let permit = self.gate.acquire().await;
        drop(permit);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.refreshed.lock().push(entity.path().to_path_buf());
        if self.failing.lock().contains(entity.path()) {
            return Err(CatalogError::Metadata(format!(
                "provider down for {}",
                entity.path().display()
            )));
        }
        Ok(false)
    }
}

/// Fully wired catalog over the fakes.
pub struct Harness {
    pub fs: Arc<FakeFs>,
    pub repository: Arc<CountingRepository>,
    pub registry: Arc<CountingRegistry>,
    pub pipeline: Arc<InstrumentedPipeline>,
    pub catalog: Arc<Catalog>,
    pub root: EntityRef,
}

impl Harness {
    pub fn new(root: &str, library_roots: &[&str]) -> Self {
        Self::build(
            root,
            library_roots,
            RefreshConfig::default().with_cap(4),
            InstrumentedPipeline::default(),
        )
    }

    pub fn build(
        root: &str,
        library_roots: &[&str],
        config: RefreshConfig,
        pipeline: InstrumentedPipeline,
    ) -> Self {
        let fs = Arc::new(FakeFs::default());
        fs.dir(root);

        let repository = Arc::new(CountingRepository::default());
        let registry = Arc::new(CountingRegistry::default());
        let pipeline = Arc::new(pipeline);
        let roots = StaticLibraryRoots::new(
            library_roots.iter().map(PathBuf::from).collect(),
        );

        let root = Entity::new(EntityKind::CollectionFolder, root).into_ref();
        registry.inner.set_root(Arc::clone(&root));

        let catalog = Arc::new(Catalog::new(
            CatalogDeps {
                crawler: fs.clone(),
                repository: repository.clone(),
                registry: registry.clone(),
                pipeline: pipeline.clone(),
                roots: Arc::new(roots),
                probe: fs.clone(),
            },
            config,
        ));

        Self {
            fs,
            repository,
            registry,
            pipeline,
            catalog,
            root,
        }
    }

    pub async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationOutcome> {
        self.validate_folder(&self.root, request).await
    }

    pub async fn validate_folder(
        &self,
        folder: &EntityRef,
        request: ValidationRequest,
    ) -> Result<ValidationOutcome> {
        self.catalog
            .validate_children(
                folder,
                request,
                &Progress::silent(),
                &CancellationToken::new(),
            )
            .await
    }

    pub async fn child_paths(&self, folder: &EntityRef) -> Vec<PathBuf> {
        self.catalog
            .children(folder)
            .await
            .expect("children")
            .iter()
            .map(|c| c.path().to_path_buf())
            .collect()
    }

    pub async fn child(&self, folder: &EntityRef, path: &str) -> EntityRef {
        self.catalog
            .children(folder)
            .await
            .expect("children")
            .iter()
            .find(|c| c.path() == Path::new(path))
            .cloned()
            .unwrap_or_else(|| panic!("no child at {path}"))
    }
}

pub fn completed(outcome: ValidationOutcome) -> strata_core::engine::ValidationSummary {
    match outcome {
        ValidationOutcome::Completed(summary) => summary,
        other => panic!("expected completed validation, got {other:?}"),
    }
}
