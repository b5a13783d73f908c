//! Process-scoped shared state
//!
//! Lookup results are memoized and partially written files are tracked for
//! the lifetime of a [`ProcessState`]. The binary uses one global instance;
//! tests build their own so runs never leak into each other.

use crate::error::{BatchError, Result};
use crate::persist::TempRegistry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

static GLOBAL: Lazy<Arc<ProcessState>> = Lazy::new(|| Arc::new(ProcessState::new()));

/// Keyed memoization of fallible async fetches.
///
/// Concurrent callers for the same key share one in-flight fetch. A failed
/// fetch is not cached, so the next caller tries again.
pub struct MemoCache<K, V> {
    entries: DashMap<K, Arc<OnceCell<V>>>,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let value = cell.get_or_try_init(fetch).await?;
        Ok(value.clone())
    }

    /// Number of keys with a completed fetch.
    pub fn cached_len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<K, V> Default for MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProcessState {
    /// Top resolutions, fetched at most once
    pub resolutions: MemoCache<(), Vec<String>>,
    /// Viewport sizes keyed by the keyword list they were resolved from
    pub viewports: MemoCache<Vec<String>, Vec<String>>,
    /// Temp files that have been opened but not yet promoted
    pub temp_files: TempRegistry,
    interrupt_installed: AtomicBool,
}

impl ProcessState {
    pub fn new() -> Self {
        Self {
            resolutions: MemoCache::new(),
            viewports: MemoCache::new(),
            temp_files: TempRegistry::new(),
            interrupt_installed: AtomicBool::new(false),
        }
    }

    /// State shared by every batch in this process.
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    /// Spawns the Ctrl-C listener that rolls back partial files and exits.
    ///
    /// Only the first call installs anything; later calls return `false`.
    /// Must be called from within a tokio runtime.
    pub fn install_interrupt_handler(self: &Arc<Self>) -> bool {
        if self.interrupt_installed.swap(true, Ordering::SeqCst) {
            return false;
        }

        let state = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let err = BatchError::Interrupted;
                let removed = state.handle_interrupt().await;
                warn!("{}, removed {} partially written screenshots", err, removed);
                std::process::exit(err.exit_code());
            }
        });
        debug!("Interrupt handler installed");
        true
    }

    pub fn interrupt_handler_installed(&self) -> bool {
        self.interrupt_installed.load(Ordering::SeqCst)
    }

    /// Removes every tracked temp file. Returns how many were removed.
    pub async fn handle_interrupt(&self) -> usize {
        self.temp_files.cleanup_all().await
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}
