//! Process-wide snapshot cache.
//!
//! Holds the most recently opened [`Snapshot`] so searches do not reload the
//! data directory on every call. The index builder invalidates the cache
//! after a successful rebuild; searches already holding the old `Arc` finish
//! against it.
//!
//! Loads run on tokio's blocking pool, one at a time. Readers never wait on
//! a load: the slot lock is only held to clone or swap the `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::error::{RagError, Result};
use crate::search::Snapshot;

#[derive(Debug, Default)]
pub struct SnapshotCache {
    slot: RwLock<Option<Arc<Snapshot>>>,
    /// Bumped by every invalidation, under the slot's write lock.
    generation: AtomicU64,
    loading: Mutex<()>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached snapshot, loading it with `load` on a miss.
    ///
    /// A snapshot whose load started before an invalidation is returned to
    /// its caller but not cached.
    pub async fn get_or_load<F>(&self, load: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce() -> Result<Arc<Snapshot>> + Send + 'static,
    {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let _loading = self.loading.lock().await;
        // another caller may have loaded while we waited
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let snapshot = tokio::task::spawn_blocking(load)
            .await
            .map_err(|e| RagError::Task(format!("snapshot load: {}", e)))??;

        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Some(snapshot.clone());
        } else {
            tracing::debug!("snapshot invalidated during load; not caching it");
        }
        Ok(snapshot)
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop the cached snapshot; the next lookup reloads from disk.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::AcqRel);
        if slot.take().is_some() {
            tracing::debug!("snapshot cache invalidated");
        }
    }
}
