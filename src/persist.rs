//! Atomic persistence of capture streams
//!
//! Each stream is drained into a hidden temp file next to its destination and
//! renamed into place once complete. Temp files are registered before they
//! are opened so a rollback always sees them.

use crate::batch::{CaptureOutput, CaptureResult};
use crate::capture::CaptureEvent;
use crate::error::{BatchError, Result};
use crate::state::ProcessState;
use dashmap::DashMap;
use futures::future::try_join_all;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

static NEXT_SAVE_ID: AtomicU64 = AtomicU64::new(1);

/// In-flight temp files, each tagged with the save that opened it.
#[derive(Debug, Default)]
pub struct TempRegistry {
    files: DashMap<PathBuf, u64>,
}

impl TempRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, save_id: u64, path: PathBuf) {
        self.files.insert(path, save_id);
    }

    /// Stops tracking a temp file after it has been promoted.
    pub fn release(&self, path: &Path) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn tracked(&self) -> Vec<PathBuf> {
        self.files.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Removes the temp files opened by one save.
    pub async fn cleanup_save(&self, save_id: u64) -> usize {
        let paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|entry| *entry.value() == save_id)
            .map(|entry| entry.key().clone())
            .collect();
        self.remove_all(paths).await
    }

    /// Removes every tracked temp file regardless of owner.
    pub async fn cleanup_all(&self) -> usize {
        self.remove_all(self.tracked()).await
    }

    async fn remove_all(&self, paths: Vec<PathBuf>) -> usize {
        let mut removed = 0;
        for path in paths {
            self.files.remove(&path);
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => debug!("Ignoring cleanup failure for {}: {}", path.display(), e),
            }
        }
        removed
    }
}

/// Hidden sibling path a destination is written to before promotion.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot".to_string());
    dest.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

pub struct AtomicPersister {
    state: Arc<ProcessState>,
    warnings: broadcast::Sender<String>,
}

impl AtomicPersister {
    pub fn new(state: Arc<ProcessState>, warnings: broadcast::Sender<String>) -> Self {
        Self { state, warnings }
    }

    /// Writes every streamed result under `dir`.
    ///
    /// On the first failure all temp files of this save are removed before the
    /// error is returned. Results that are already saved pass through as-is.
    pub async fn save(&self, dir: &Path, results: Vec<CaptureResult>) -> Result<Vec<CaptureResult>> {
        self.state.install_interrupt_handler();

        fs::create_dir_all(dir)
            .await
            .map_err(|e| BatchError::persist(dir, e))?;

        let save_id = NEXT_SAVE_ID.fetch_add(1, Ordering::Relaxed);
        let total = results.len();
        let writes = results
            .into_iter()
            .map(|result| self.persist_one(save_id, dir, result));

        match try_join_all(writes).await {
            Ok(saved) => {
                info!("Saved {} screenshots to {}", total, dir.display());
                Ok(saved)
            }
            Err(err) => {
                let removed = self.state.temp_files.cleanup_save(save_id).await;
                warn!("Save failed, removed {} partial files: {}", removed, err);
                Err(err)
            }
        }
    }

    async fn persist_one(&self, save_id: u64, dir: &Path, result: CaptureResult) -> Result<CaptureResult> {
        let CaptureResult {
            url,
            size,
            filename,
            output,
        } = result;

        let mut stream = match output {
            CaptureOutput::Stream(stream) => stream,
            saved @ CaptureOutput::Saved(_) => {
                return Ok(CaptureResult {
                    url,
                    size,
                    filename,
                    output: saved,
                })
            }
        };

        let dest = dir.join(&filename);
        let tmp = temp_path_for(&dest);
        self.state.temp_files.register(save_id, tmp.clone());

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| BatchError::persist(&tmp, e))?;

        while let Some(event) = stream.next().await {
            match event? {
                CaptureEvent::Data(bytes) => file
                    .write_all(&bytes)
                    .await
                    .map_err(|e| BatchError::persist(&tmp, e))?,
                CaptureEvent::Warning(message) => {
                    debug!("Capture warning for {} at {}: {}", url, size, message);
                    let _ = self.warnings.send(message);
                }
            }
        }

        file.flush().await.map_err(|e| BatchError::persist(&tmp, e))?;
        file.sync_all().await.map_err(|e| BatchError::persist(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &dest)
            .await
            .map_err(|e| BatchError::persist(&dest, e))?;
        self.state.temp_files.release(&tmp);
        debug!("Promoted {} to {}", tmp.display(), dest.display());

        Ok(CaptureResult {
            url,
            size,
            filename,
            output: CaptureOutput::Saved(dest),
        })
    }
}
