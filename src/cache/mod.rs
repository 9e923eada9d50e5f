//! Asset cache — versioned generations of precached shell assets and
//! fetch interception.

pub mod control;
pub mod fetch;
pub mod lifecycle;
pub mod manager;
pub mod storage;

pub use control::{spawn_control_loop, CacheControl, ControlMessage};
pub use fetch::{AssetRequest, AssetResponse, Destination, Fetcher, HttpFetcher, ScriptedFetcher};
pub use lifecycle::{CacheState, LifecycleEvent};
pub use manager::{AssetCacheManager, FetchOutcome, ResponseSource, ServedResponse};
pub use storage::CacheStorage;
