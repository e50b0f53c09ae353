use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use strata_core::engine::{CrawlConfig, RefreshConfig};

use super::sources::LibrarySources;
use crate::error::ConfigError;
use crate::util::{parse_bool_var, parse_path_list_var, parse_usize_var};

/// Source that produced the catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
    /// Path passed explicitly, e.g. `--config`.
    Explicit(PathBuf),
}

/// Top-level catalog settings. Every section has defaults, so a file only
/// needs the keys it overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Refresh fan-out and recursion policy. Raise
    /// `max_concurrent_refreshes` to refresh faster on fast disks; lower it
    /// when the metadata providers rate-limit.
    pub refresh: RefreshConfig,
    /// Filesystem crawl tuning: hidden entries and shortcut extensions.
    pub crawl: CrawlConfig,
    /// Library roots consulted before an absent entry is removed.
    pub libraries: LibrarySources,
}

impl CatalogConfig {
    /// Load catalog configuration using environment variables.
    /// Evaluation order:
    /// 1) `$STRATA_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$STRATA_CONFIG_JSON` (inline JSON),
    /// 3) `strata.toml` / `config/strata.toml` in the working directory,
    /// 4) defaults.
    ///
    /// `STRATA_*` overrides are applied on top of whichever source won.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        Self::load_from_env_in(Path::new("."))
    }

    /// As [`Self::load_from_env`], looking for default files under `base`.
    pub fn load_from_env_in(
        base: &Path,
    ) -> anyhow::Result<(Self, ConfigSource)> {
        let (mut config, source) = Self::load_base(base)?;
        config.apply_env_overrides();
        config.validate().with_context(|| {
            format!("invalid catalog configuration from {source:?}")
        })?;
        Ok((config, source))
    }

    fn load_base(base: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        if let Ok(path_str) = env::var("STRATA_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("STRATA_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .context("failed to parse STRATA_CONFIG_JSON")?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(base) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((Self::default(), ConfigSource::Default))
    }

    /// Load an explicitly named file, then apply env overrides and
    /// validate.
    pub fn load_explicit(path: &Path) -> anyhow::Result<(Self, ConfigSource)> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate().with_context(|| {
            format!("invalid catalog configuration in {}", path.display())
        })?;
        Ok((config, ConfigSource::Explicit(path.to_path_buf())))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read catalog config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid catalog config {}", path.display())
            }),
            Some("toml") | Some("tml") => {
                toml::from_str(&contents).map_err(|err| {
                    anyhow!(
                        "invalid catalog config {}: {}",
                        path.display(),
                        err
                    )
                })
            }
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        // Try TOML first, then JSON for convenience.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse catalog config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid catalog config json: {err}"))
    }

    /// `STRATA_MAX_CONCURRENT_REFRESHES`, `STRATA_SKIP_HIDDEN`, and
    /// `STRATA_LIBRARY_ROOTS` (comma separated, appended to the global
    /// roots).
    pub fn apply_env_overrides(&mut self) {
        if let Some(cap) = parse_usize_var("STRATA_MAX_CONCURRENT_REFRESHES") {
            self.refresh.max_concurrent_refreshes = cap;
        }
        if let Some(skip) = parse_bool_var("STRATA_SKIP_HIDDEN") {
            self.crawl.skip_hidden = skip;
        }
        if let Some(roots) = parse_path_list_var("STRATA_LIBRARY_ROOTS") {
            for root in roots {
                if !self.libraries.global.contains(&root) {
                    self.libraries.global.push(root);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.max_concurrent_refreshes == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if let Some(ext) = self
            .crawl
            .shortcut_extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err(ConfigError::InvalidShortcutExtension(ext.clone()));
        }
        self.libraries.validate()
    }

    fn find_default_file(base: &Path) -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "strata.toml",
            "strata.json",
            "config/strata.toml",
            "config/strata.json",
        ];

        CANDIDATES
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::engine::RecursionPolicy;

    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CatalogConfig::parse_from_str(
            r#"
            [refresh]
            max_concurrent_refreshes = 3
            recursion = "respect_explicit_false"

            [libraries]
            global = ["/media"]
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.refresh.max_concurrent_refreshes, 3);
        assert_eq!(
            config.refresh.recursion,
            RecursionPolicy::RespectExplicitFalse
        );
        assert!(config.crawl.skip_hidden);
        assert_eq!(config.crawl.shortcut_extensions, vec!["shortcut", "lnk"]);
        assert_eq!(config.libraries.global, vec![PathBuf::from("/media")]);
    }

    #[test]
    fn json_fallback_for_unknown_extension() {
        let config = CatalogConfig::parse_from_str(
            r#"{"crawl": {"skip_hidden": false}}"#,
            "inline",
        )
        .unwrap();
        assert!(!config.crawl.skip_hidden);
    }

    #[test]
    fn garbage_reports_both_parsers() {
        let err = CatalogConfig::parse_from_str("[[[", "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("toml error"));
        assert!(message.contains("json error"));
    }

    #[test]
    fn zero_cap_is_rejected() {
        let mut config = CatalogConfig::default();
        config.refresh.max_concurrent_refreshes = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn dotted_shortcut_extension_is_rejected() {
        let mut config = CatalogConfig::default();
        config.crawl.shortcut_extensions = vec![".lnk".into()];
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShortcutExtension(".lnk".into()))
        );
    }
}
