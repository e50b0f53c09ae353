use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use crate::domain::{Entity, EntityKind, EntityRef, FileStamp};
use crate::engine::CrawlConfig;
use crate::error::{CatalogError, Result};
use crate::ports::{CrawlContext, Crawler, PathProbe};

pub fn is_video_ext(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "mkv"
            | "mp4"
            | "avi"
            | "mov"
            | "webm"
            | "flv"
            | "wmv"
            | "mpg"
            | "mpeg"
            | "m4v"
            | "3gp"
            | "ts"
    )
}

pub fn is_audio_ext(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "mp3" | "flac" | "ogg" | "opus" | "m4a" | "wav" | "aac" | "wma"
    )
}

pub fn is_photo_ext(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "webp" | "gif" | "heic" | "tiff"
    )
}

/// Kind of a non-directory entry, `None` for files the catalog ignores.
pub fn classify_file(path: &Path) -> Option<EntityKind> {
    let ext = path.extension()?.to_str()?;
    if is_video_ext(ext) {
        Some(EntityKind::Video)
    } else if is_audio_ext(ext) {
        Some(EntityKind::Audio)
    } else if is_photo_ext(ext) {
        Some(EntityKind::Photo)
    } else {
        None
    }
}

struct ListingEntry {
    path: PathBuf,
    is_dir: bool,
    stamp: FileStamp,
}

/// Crawler over the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsCrawler {
    config: CrawlConfig,
}

impl FsCrawler {
    pub fn new(config: CrawlConfig) -> Self {
        Self { config }
    }

    fn is_shortcut(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.config.is_shortcut_ext(ext))
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<ListingEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await.map_err(|e| {
            CatalogError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read directory {}: {}", path.display(), e),
            ))
        })?;

        while let Some(entry_res) = dir.next_entry().await.transpose() {
            let entry = match entry_res {
                Ok(ent) => ent,
                Err(e) => {
                    tracing::warn!(target: "catalog::crawl", path = %path.display(), error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if self.config.skip_hidden && name.starts_with('.') {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(target: "catalog::crawl", entry = %name, path = %path.display(), error = %e, "skipping entry due to metadata error");
                    continue;
                }
            };

            let stamp = FileStamp {
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified_at: metadata.modified().ok().map(to_utc),
                created_at: metadata.created().ok().map(to_utc),
            };
            entries.push(ListingEntry {
                path: entry.path(),
                is_dir: metadata.is_dir(),
                stamp,
            });
        }

        Ok(entries)
    }
}

#[async_trait]
impl Crawler for FsCrawler {
    async fn resolve_children(
        &self,
        directory: &Path,
        parent: &CrawlContext,
    ) -> Result<Vec<EntityRef>> {
        let entries = self.list_directory(directory).await?;

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let kind = if entry.is_dir {
                EntityKind::Folder
            } else if self.is_shortcut(&entry.path) {
                continue;
            } else {
                match classify_file(&entry.path) {
                    Some(kind) => kind,
                    None => {
                        tracing::trace!(
                            target: "catalog::crawl",
                            file = %entry.path.display(),
                            "ignoring non-media file"
                        );
                        continue;
                    }
                }
            };

            children.push(
                Entity::new(kind, entry.path)
                    .with_location(parent.parent_location)
                    .with_stamp(entry.stamp)
                    .into_ref(),
            );
        }
        Ok(children)
    }

    async fn shortcut_targets(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.list_directory(directory).await?;

        let mut targets = Vec::new();
        for entry in entries
            .iter()
            .filter(|e| !e.is_dir && self.is_shortcut(&e.path))
        {
            match fs::read_to_string(&entry.path).await {
                Ok(contents) => {
                    if let Some(line) =
                        contents.lines().map(str::trim).find(|l| !l.is_empty())
                    {
                        targets.push(PathBuf::from(line));
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "catalog::crawl", file = %entry.path.display(), error = %e, "unreadable shortcut file");
                }
            }
        }
        Ok(targets)
    }
}

/// Reachability via `try_exists`; errors count as unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

#[async_trait]
impl PathProbe for FsProbe {
    async fn is_reachable(&self, path: &Path) -> bool {
        match fs::try_exists(path).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::debug!(target: "catalog::offline", path = %path.display(), error = %e, "probe failed");
                false
            }
        }
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}
