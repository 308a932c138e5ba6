use crate::transfer::bitmap::CompletionBitmap;
use crate::transfer::block::Block;
use crate::transfer::errors::CacheError;
use crate::transfer::events::{DecoderEvent, EventSink};
use crate::transfer::params::DecodeParams;
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

pub type Result<T> = std::result::Result<T, CacheError>;

pub const CACHE_MANIFEST_VERSION: u8 = 1;

/// Sidecar record of which units of the cache file are valid, so an interrupted receiver can
/// pick up where it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u8,
    pub params: DecodeParams,
    #[serde(default)]
    pub confirmed: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadedManifestSource {
    Primary,
    Backup,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Random-access cache file: unit `sn` (coefficients then data) lives at `unit_size * sn`.
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
    sync_writes: bool,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_writes: false,
        }
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest_path(&self) -> PathBuf {
        suffixed(&self.path, ".meta.json")
    }

    /// Drops any previous cache contents and leaves an empty cache file behind.
    pub async fn reset(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Reset {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let manifest = self.manifest_path();
        for stale in [backup_path(&manifest), manifest] {
            match tokio::fs::remove_file(&stale).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Reset { path: stale, source }),
            }
        }
        tokio::fs::File::create(&self.path)
            .await
            .map_err(|source| CacheError::Reset {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }

    /// Writes every complete block not yet confirmed in `bitmap`. Each successful write is
    /// confirmed immediately; the first failure stops the call and is returned.
    pub async fn save_cycle_blocks(
        &self,
        params: &DecodeParams,
        blocks: &[Block],
        bitmap: &mut CompletionBitmap,
        events: &EventSink,
    ) -> Result<SaveSummary> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map_err(|source| CacheError::Open {
                path: self.path.clone(),
                source,
            })?;

        let mut summary = SaveSummary::default();
        for block in blocks.iter().filter(|b| b.is_complete()) {
            let sn = params.serial_number(block.cycle(), block.slot());
            if bitmap.contains(sn) {
                summary.skipped += 1;
                continue;
            }
            let offset = params.cache_offset(sn);
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|source| CacheError::Seek {
                    path: self.path.clone(),
                    offset,
                    source,
                })?;
            file.write_all(block.data())
                .await
                .map_err(|source| CacheError::Write {
                    path: self.path.clone(),
                    sn,
                    source,
                })?;
            // A confirmed bit must never cover bytes still sitting in a buffer.
            file.flush().await.map_err(|source| CacheError::Write {
                path: self.path.clone(),
                sn,
                source,
            })?;

            bitmap.mark(sn);
            summary.written += 1;
            tracing::debug!(sn, offset, bytes = block.target_size(), "saved block");
            events.emit(DecoderEvent::Progress {
                percent: bitmap.progress_percent(),
            });
        }

        if self.sync_writes && summary.written > 0 {
            file.sync_data().await.map_err(|source| CacheError::Sync {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(summary)
    }

    pub async fn save_manifest(&self, params: &DecodeParams, bitmap: &CompletionBitmap) -> Result<()> {
        let manifest = CacheManifest {
            version: CACHE_MANIFEST_VERSION,
            params: *params,
            confirmed: bitmap.iter_confirmed().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|source| CacheError::ManifestSerialize { source })?;

        let path = self.manifest_path();
        if path.exists() {
            let bak = backup_path(&path);
            tokio::fs::copy(&path, &bak)
                .await
                .map_err(|source| CacheError::Manifest { path: bak, source })?;
        }
        let tmp = suffixed(&path, ".tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| CacheError::Manifest {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| CacheError::Manifest { path, source })?;
        Ok(())
    }

    pub async fn load_manifest_with_fallback(&self) -> Result<(CacheManifest, LoadedManifestSource)> {
        let path = self.manifest_path();
        match load_manifest(&path).await {
            Ok(m) => Ok((m, LoadedManifestSource::Primary)),
            Err(primary_err) => {
                let bak = backup_path(&path);
                if bak.exists() {
                    match load_manifest(&bak).await {
                        Ok(m) => Ok((m, LoadedManifestSource::Backup)),
                        Err(_) => Err(primary_err),
                    }
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    /// Restores `bitmap` from a manifest written for exactly these parameters. Returns the
    /// number of confirmed units, or `None` when nothing usable was found.
    pub async fn restore(&self, params: &DecodeParams, bitmap: &mut CompletionBitmap) -> Option<u64> {
        if !self.path.exists() {
            return None;
        }
        let (manifest, source) = match self.load_manifest_with_fallback().await {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!(error = %err, "no usable cache manifest");
                return None;
            }
        };
        if manifest.version != CACHE_MANIFEST_VERSION || manifest.params != *params {
            tracing::info!(
                path = %self.manifest_path().display(),
                "cache manifest belongs to another transfer; starting fresh"
            );
            return None;
        }

        let have = tokio::fs::metadata(&self.path).await.map(|m| m.len()).unwrap_or(0);
        bitmap.reset(params.total_blocks);
        let unit = params.unit_size() as u64;
        let mut rejected = 0usize;
        for sn in manifest.confirmed {
            if sn >= params.total_blocks {
                rejected += 1;
                continue;
            }
            // Only units lying entirely inside the file on disk count as cached.
            let end = (sn + 1).checked_mul(unit);
            if end.is_some_and(|end| end <= have) {
                bitmap.mark(sn);
            }
        }
        if rejected > 0 {
            tracing::warn!(
                rejected,
                total_blocks = params.total_blocks,
                "cache manifest lists serial numbers outside the transfer; ignoring them"
            );
        }
        tracing::info!(
            confirmed = bitmap.confirmed(),
            source = ?source,
            "restored cache manifest"
        );
        Some(bitmap.confirmed())
    }
}

async fn load_manifest(path: &Path) -> Result<CacheManifest> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CacheError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| CacheError::ManifestParse {
        path: path.to_path_buf(),
        source,
    })
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn backup_path(path: &Path) -> PathBuf {
    suffixed(path, ".bak")
}
