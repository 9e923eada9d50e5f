//! Page → cache manager control messages.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manager::AssetCacheManager;
use crate::error::CacheError;

/// Messages the page side can send to the cache manager.
#[derive(Debug)]
pub enum ControlMessage {
    /// Activate a waiting generation now.
    SkipWaiting,
    /// Ask for the version of the generation handling messages.
    GetVersion { reply: oneshot::Sender<String> },
    /// Re-fetch the precached assets into the serving generation.
    Refresh,
}

/// Cloneable sender half of the control channel.
#[derive(Debug, Clone)]
pub struct CacheControl {
    tx: mpsc::Sender<ControlMessage>,
}

impl CacheControl {
    pub async fn skip_waiting(&self) -> Result<(), CacheError> {
        self.tx
            .send(ControlMessage::SkipWaiting)
            .await
            .map_err(|_| CacheError::ControlClosed)
    }

    /// Queue a refresh. Returns once the loop has accepted the message.
    pub async fn refresh(&self) -> Result<(), CacheError> {
        self.tx
            .send(ControlMessage::Refresh)
            .await
            .map_err(|_| CacheError::ControlClosed)
    }

    pub async fn version(&self) -> Result<String, CacheError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ControlMessage::GetVersion { reply })
            .await
            .map_err(|_| CacheError::ControlClosed)?;
        rx.await.map_err(|_| CacheError::ControlClosed)
    }
}

/// Spawn the loop that applies control messages to `manager`.
///
/// The loop ends once every `CacheControl` clone is dropped.
pub fn spawn_control_loop(manager: Arc<AssetCacheManager>) -> (CacheControl, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move {
        debug!(version = %manager.version(), "Cache control loop started");
        while let Some(message) = rx.recv().await {
            match message {
                ControlMessage::SkipWaiting => {
                    info!(version = %manager.version(), "Skip waiting requested");
                    if let Err(e) = manager.skip_waiting().await {
                        warn!(error = %e, "Skip waiting failed");
                    }
                }
                ControlMessage::GetVersion { reply } => {
                    let _ = reply.send(manager.version().to_string());
                }
                ControlMessage::Refresh => {
                    manager.refresh().await;
                }
            }
        }
        debug!(version = %manager.version(), "Cache control loop stopped");
    });
    (CacheControl { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetch::ScriptedFetcher;
    use crate::cache::lifecycle::CacheState;
    use crate::cache::storage::CacheStorage;
    use crate::config::CacheConfig;
    use tokio::sync::broadcast;

    fn waiting_manager() -> Arc<AssetCacheManager> {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.serve("/index.html", "shell");
        let (tx, _rx) = broadcast::channel(8);
        AssetCacheManager::new(
            CacheConfig {
                version: "v7".into(),
                precache: vec!["/index.html".into()],
                skip_waiting_on_install: false,
                ..CacheConfig::default()
            },
            Arc::new(CacheStorage::new()),
            fetcher,
            tx,
        )
    }

    #[tokio::test]
    async fn version_round_trip() {
        let (control, _handle) = spawn_control_loop(waiting_manager());
        assert_eq!(control.version().await.unwrap(), "v7");
    }

    #[tokio::test]
    async fn skip_waiting_activates_installed_generation() {
        let manager = waiting_manager();
        manager.start().await.unwrap();
        let (control, handle) = spawn_control_loop(Arc::clone(&manager));

        control.skip_waiting().await.unwrap();
        drop(control);
        handle.await.unwrap();
        assert_eq!(manager.state().await, CacheState::Active);
    }

    #[tokio::test]
    async fn refresh_message_updates_active_generation() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.serve("/index.html", "shell v1");
        let storage = Arc::new(CacheStorage::new());
        let (tx, _rx) = broadcast::channel(8);
        let manager = AssetCacheManager::new(
            CacheConfig {
                version: "v7".into(),
                precache: vec!["/index.html".into()],
                ..CacheConfig::default()
            },
            Arc::clone(&storage),
            fetcher.clone(),
            tx,
        );
        manager.start().await.unwrap();
        let (control, handle) = spawn_control_loop(manager);

        fetcher.serve("/index.html", "shell v1.1");
        control.refresh().await.unwrap();
        drop(control);
        handle.await.unwrap();
        assert_eq!(storage.lookup("v7", "/index.html").await.unwrap().text(), "shell v1.1");
    }

    #[tokio::test]
    async fn closed_loop_reports_error() {
        let (control, handle) = spawn_control_loop(waiting_manager());
        handle.abort();
        let _ = handle.await;
        assert!(matches!(
            control.version().await,
            Err(CacheError::ControlClosed)
        ));
    }
}
