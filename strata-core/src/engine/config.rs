use serde::{Deserialize, Serialize};

/// Share of overall progress reserved for the crawl/diff phase that runs
/// before the refresh fan-out starts.
pub const CRAWL_PROGRESS_SHARE: f64 = 10.0;

/// Knobs for the refresh orchestrator.
///
/// All fields carry defaults so a partial configuration payload is enough.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Maximum refresh work items in flight per folder pass. Raise it to
    /// refresh faster, at the cost of more provider and disk pressure.
    pub max_concurrent_refreshes: usize,
    /// Whether changed child folders are descended into when the caller
    /// explicitly asked for a non-recursive validation.
    pub recursion: RecursionPolicy,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_concurrent_refreshes: num_cpus::get().max(1),
            recursion: RecursionPolicy::default(),
        }
    }
}

impl RefreshConfig {
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.max_concurrent_refreshes = cap.max(1);
        self
    }

    pub fn cap(&self) -> usize {
        self.max_concurrent_refreshes.max(1)
    }

    /// Decide whether a child folder is reconciled as part of this pass.
    pub fn should_recurse(&self, changed: bool, recursive: Option<bool>) -> bool {
        match recursive {
            Some(true) => true,
            None => changed,
            Some(false) => {
                changed && self.recursion == RecursionPolicy::FollowChanges
            }
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecursionPolicy {
    /// A changed child folder is always reconciled, even when the caller
    /// passed `recursive = false`.
    #[default]
    FollowChanges,
    /// `recursive = false` stops descent entirely.
    RespectExplicitFalse,
}

/// Filesystem crawl tuning for the default crawler.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Skip entries whose name starts with a dot.
    pub skip_hidden: bool,
    /// Extensions (without dot, case-insensitive) of shortcut files.
    pub shortcut_extensions: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            skip_hidden: true,
            shortcut_extensions: vec!["shortcut".into(), "lnk".into()],
        }
    }
}

impl CrawlConfig {
    pub fn is_shortcut_ext(&self, ext: &str) -> bool {
        self.shortcut_extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext))
    }
}
