//! Sync coordinator — reacts to connectivity and cache lifecycle changes.
//!
//! - back online: toast, register deferred sync, refresh the asset cache,
//!   rescan reminders
//! - gone offline: toast
//! - new generation installed while another controls the page: signal
//!   that an update is available
//! - controller changed: reload the page

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::background::BackgroundSync;
use crate::cache::{CacheControl, LifecycleEvent};
use crate::config::SyncConfig;
use crate::error::CacheError;
use crate::events::{EventBus, Severity};
use crate::notify::NotificationScheduler;

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

/// Signals for the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinatorSignal {
    /// A newer generation is installed and waiting; call `apply_update`.
    UpdateAvailable { version: String },
}

/// The page hosting the application.
pub trait PageHost: Send + Sync {
    fn reload(&self);
}

/// Page host for a headless run. A reload request is only logged.
#[derive(Debug, Default)]
pub struct LoggingPage;

impl PageHost for LoggingPage {
    fn reload(&self) {
        info!("New cache generation in control, page reload requested");
    }
}

/// Page double that counts reload requests.
#[derive(Debug, Default)]
pub struct RecordingPage {
    reloads: AtomicUsize,
}

impl RecordingPage {
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl PageHost for RecordingPage {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct SyncCoordinator {
    config: SyncConfig,
    events: EventBus,
    background: Arc<dyn BackgroundSync>,
    page: Arc<dyn PageHost>,
    control: Option<CacheControl>,
    scheduler: Option<Arc<NotificationScheduler>>,
    /// Version of the generation controlling the page, if any.
    controller: RwLock<Option<String>>,
    online: AtomicBool,
    signal_tx: broadcast::Sender<CoordinatorSignal>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        events: EventBus,
        background: Arc<dyn BackgroundSync>,
        page: Arc<dyn PageHost>,
    ) -> Self {
        let (signal_tx, _rx) = broadcast::channel(16);
        Self {
            config,
            events,
            background,
            page,
            control: None,
            scheduler: None,
            controller: RwLock::new(None),
            online: AtomicBool::new(true),
            signal_tx,
        }
    }

    pub fn with_cache_control(mut self, control: CacheControl) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<NotificationScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the generation that controlled the page when it loaded.
    pub fn with_controller(mut self, version: impl Into<String>) -> Self {
        self.controller = RwLock::new(Some(version.into()));
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorSignal> {
        self.signal_tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub async fn controller(&self) -> Option<String> {
        self.controller.read().await.clone()
    }

    /// Handle a connectivity report. Repeats of the current state are ignored.
    pub async fn connectivity_changed(&self, connectivity: Connectivity) {
        let online = connectivity == Connectivity::Online;
        if self.online.swap(online, Ordering::SeqCst) == online {
            debug!(?connectivity, "Connectivity unchanged");
            return;
        }

        if !online {
            info!("Connection lost");
            self.events.toast(Severity::Info, "Working offline");
            return;
        }

        info!("Connection restored");
        self.events.toast(Severity::Success, "Connection restored");
        if let Err(e) = self.background.register(&self.config.tag).await {
            warn!(tag = %self.config.tag, error = %e, "Background sync registration failed");
        }
        if let Some(control) = &self.control
            && let Err(e) = control.refresh().await
        {
            warn!(error = %e, "Cache refresh request failed");
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.scan_now().await;
        }
    }

    /// Handle a cache lifecycle notification.
    pub async fn lifecycle_changed(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Installed { version } => {
                let controller = self.controller.read().await.clone();
                match controller {
                    Some(current) if current != version => {
                        info!(current = %current, new = %version, "Update available");
                        let _ = self
                            .signal_tx
                            .send(CoordinatorSignal::UpdateAvailable { version });
                    }
                    _ => debug!(version = %version, "Generation installed"),
                }
            }
            LifecycleEvent::InstallFailed { version } => {
                warn!(version = %version, "Cache install failed, keeping current generation");
            }
            LifecycleEvent::ControllerChanged { version } => {
                info!(version = %version, "Controller changed, reloading");
                *self.controller.write().await = Some(version);
                self.page.reload();
            }
        }
    }

    /// Ask the waiting generation to take over now.
    pub async fn apply_update(&self) -> Result<(), CacheError> {
        let control = self.control.as_ref().ok_or(CacheError::ControlClosed)?;
        control.skip_waiting().await
    }

    /// Spawn the loop feeding connectivity reports and lifecycle events into
    /// the coordinator. Ends when either source closes.
    pub fn spawn(
        self: &Arc<Self>,
        mut connectivity: mpsc::Receiver<Connectivity>,
        mut lifecycle: broadcast::Receiver<LifecycleEvent>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    report = connectivity.recv() => {
                        match report {
                            Some(report) => coordinator.connectivity_changed(report).await,
                            None => break,
                        }
                    }
                    event = lifecycle.recv() => {
                        match event {
                            Ok(event) => coordinator.lifecycle_changed(event).await,
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Coordinator lagged behind lifecycle events");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            }
            debug!("Sync coordinator stopped");
        })
    }
}
