//! Deferred one-shot background tasks keyed by tag.
//!
//! Registration only records the request; a runner drains pending tags
//! later. Re-registering a tag that is still pending is a no-op.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{StorageError, SyncError};
use crate::store::KeyValueStore;

/// A facility that accepts deferred sync requests.
#[async_trait]
pub trait BackgroundSync: Send + Sync {
    async fn register(&self, tag: &str) -> Result<(), SyncError>;
}

/// Work performed when a registered tag fires.
#[async_trait]
pub trait SyncTask: Send + Sync {
    async fn run(&self, tag: &str) -> Result<(), SyncError>;
}

/// In-process deferred sync facility.
pub struct DeferredSync {
    pending: Mutex<BTreeSet<String>>,
    wake: Notify,
    task: Arc<dyn SyncTask>,
    completed: AtomicUsize,
}

impl DeferredSync {
    pub fn new(task: Arc<dyn SyncTask>) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(BTreeSet::new()),
            wake: Notify::new(),
            task,
            completed: AtomicUsize::new(0),
        })
    }

    pub fn pending(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Number of task runs that finished successfully.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Run every pending tag once. Failed runs are logged and dropped.
    pub async fn run_pending(&self) -> usize {
        let tags = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        let mut ran = 0;
        for tag in tags {
            match self.task.run(&tag).await {
                Ok(()) => {
                    debug!(tag = %tag, "Background sync completed");
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    ran += 1;
                }
                Err(e) => {
                    warn!(tag = %tag, error = %e, "Background sync failed");
                }
            }
        }
        ran
    }

    /// Spawn the runner that drains pending tags whenever one is registered.
    pub fn spawn_runner(self: &Arc<Self>) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            debug!("Background sync runner started");
            loop {
                sync.wake.notified().await;
                sync.run_pending().await;
            }
        })
    }
}

#[async_trait]
impl BackgroundSync for DeferredSync {
    async fn register(&self, tag: &str) -> Result<(), SyncError> {
        if tag.trim().is_empty() {
            return Err(SyncError::RegistrationFailed {
                tag: tag.to_string(),
                reason: "tag must not be blank".to_string(),
            });
        }
        let inserted = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tag.to_string());
        if inserted {
            debug!(tag, "Background sync registered");
            self.wake.notify_one();
        } else {
            debug!(tag, "Background sync already pending");
        }
        Ok(())
    }
}

/// Facility for hosts without background execution.
#[derive(Debug, Default)]
pub struct UnsupportedSync;

#[async_trait]
impl BackgroundSync for UnsupportedSync {
    async fn register(&self, _tag: &str) -> Result<(), SyncError> {
        Err(SyncError::Unavailable)
    }
}

/// Worker-side sync of the persisted subscription collection.
///
/// There is no server to push to; the task checks the stored collection
/// is readable and reports what it found.
pub struct SubscriptionSync {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl SubscriptionSync {
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }
}

#[async_trait]
impl SyncTask for SubscriptionSync {
    async fn run(&self, tag: &str) -> Result<(), SyncError> {
        let failed = |reason: String| SyncError::TaskFailed {
            tag: tag.to_string(),
            reason,
        };
        let raw = self
            .kv
            .get(&self.key)
            .map_err(|e: StorageError| failed(e.to_string()))?;
        let count = match raw {
            Some(raw) => serde_json::from_str::<Vec<serde_json::Value>>(&raw)
                .map_err(|e| failed(e.to_string()))?
                .len(),
            None => 0,
        };
        info!(tag, count, "Subscriptions synced");
        Ok(())
    }
}
