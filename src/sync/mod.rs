//! Connectivity handling and deferred background sync.

pub mod background;
pub mod coordinator;
pub mod reachability;

pub use background::{BackgroundSync, DeferredSync, SubscriptionSync, SyncTask, UnsupportedSync};
pub use coordinator::{
    Connectivity, CoordinatorSignal, LoggingPage, PageHost, RecordingPage, SyncCoordinator,
};
pub use reachability::{check_reachability, spawn_reachability_monitor};
