//! Asset cache manager — one cache generation's install, activate and
//! fetch interception.
//!
//! Serving policy for intercepted GETs:
//! - cache hit: answer from cache, refresh the entry in the background
//!   (stale-while-revalidate)
//! - cache miss: go to network and store successful responses
//! - network failure: navigations fall back to the cached offline
//!   document, everything else gets a synthetic 503

use std::sync::Arc;

use futures::future::join_all;
use reqwest::Method;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::fetch::{AssetRequest, AssetResponse, Destination, Fetcher};
use super::lifecycle::{CacheState, LifecycleEvent};
use super::storage::CacheStorage;
use crate::config::CacheConfig;
use crate::error::CacheError;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    OfflineDocument,
    Unavailable,
}

/// A response produced by interception.
#[derive(Debug)]
pub struct ServedResponse {
    pub response: AssetResponse,
    pub source: ResponseSource,
    /// Background refresh started for a cache hit. Runs to completion on its
    /// own; awaiting it is optional.
    pub revalidation: Option<JoinHandle<()>>,
}

/// Result of offering a request to the manager.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the caller talks to the network directly.
    Bypass,
    Served(ServedResponse),
}

impl FetchOutcome {
    pub fn served(self) -> Option<ServedResponse> {
        match self {
            Self::Served(served) => Some(served),
            Self::Bypass => None,
        }
    }
}

/// Manager for the cache generation named by `config.version`.
pub struct AssetCacheManager {
    config: CacheConfig,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<CacheState>,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
}

impl AssetCacheManager {
    pub fn new(
        config: CacheConfig,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        lifecycle_tx: broadcast::Sender<LifecycleEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            storage,
            fetcher,
            state: RwLock::new(CacheState::Idle),
            lifecycle_tx,
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub async fn state(&self) -> CacheState {
        *self.state.read().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }

    async fn transition(&self, target: CacheState) -> Result<CacheState, CacheError> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(target) {
            return Err(CacheError::InvalidTransition {
                version: self.config.version.clone(),
                from: state.to_string(),
                to: target.to_string(),
            });
        }
        let from = *state;
        *state = target;
        debug!(version = %self.config.version, %from, to = %target, "Cache state changed");
        Ok(from)
    }

    fn notify(&self, event: LifecycleEvent) {
        // Ok if no page is listening
        let _ = self.lifecycle_tx.send(event);
    }

    /// Fetch and store every precache asset. All or nothing: on any failure
    /// nothing is written and the manager returns to `Idle`.
    pub async fn install(&self) -> Result<usize, CacheError> {
        self.transition(CacheState::Installing).await?;
        let version = self.config.version.clone();
        info!(version = %version, assets = self.config.precache.len(), "Precaching assets");

        let fetches: Vec<_> = self
            .config
            .precache
            .iter()
            .map(|url| {
                let fetcher = Arc::clone(&self.fetcher);
                let request = AssetRequest::get(url.clone());
                async move {
                    let result = fetcher.fetch(&request).await;
                    (request.url, result)
                }
            })
            .collect();

        let mut entries = Vec::with_capacity(fetches.len());
        let mut failed = Vec::new();
        for (url, result) in join_all(fetches).await {
            match result {
                Ok(response) if response.is_ok() => entries.push((url, response)),
                Ok(response) => {
                    warn!(url = %url, status = %response.status, "Precache asset rejected");
                    failed.push(url);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Precache fetch failed");
                    failed.push(url);
                }
            }
        }

        if !failed.is_empty() {
            self.transition(CacheState::Idle).await?;
            error!(version = %version, failed = failed.len(), "Precaching failed");
            self.notify(LifecycleEvent::InstallFailed {
                version: version.clone(),
            });
            return Err(CacheError::InstallFailed { version, failed });
        }

        let count = entries.len();
        self.storage.put_all(&version, entries).await;
        self.transition(CacheState::Installed).await?;
        info!(version = %version, count, "All assets precached");
        self.notify(LifecycleEvent::Installed { version });
        Ok(count)
    }

    /// Delete every other generation, then claim clients.
    pub async fn activate(&self) -> Result<(), CacheError> {
        self.transition(CacheState::Activating).await?;
        let version = self.config.version.clone();

        for name in self.storage.keys().await {
            if name != version {
                info!(generation = %name, "Deleting old cache");
                self.storage.delete(&name).await;
            }
        }

        self.transition(CacheState::Active).await?;
        info!(version = %version, "Cache generation active");
        self.notify(LifecycleEvent::ControllerChanged { version });
        Ok(())
    }

    /// Install, then take over right away when configured to skip waiting.
    pub async fn start(&self) -> Result<(), CacheError> {
        self.install().await?;
        if self.config.skip_waiting_on_install {
            self.activate().await?;
        }
        Ok(())
    }

    /// Activate a waiting generation. A no-op once active.
    pub async fn skip_waiting(&self) -> Result<(), CacheError> {
        match self.state().await {
            CacheState::Active => Ok(()),
            _ => self.activate().await,
        }
    }

    /// Re-fetch the precache list into this generation.
    ///
    /// Only a serving generation refreshes. Assets that fail to fetch keep
    /// their cached copy. Returns the number of entries updated.
    pub async fn refresh(&self) -> usize {
        let version = &self.config.version;
        if !self.state().await.is_serving() {
            debug!(version = %version, "Refresh skipped, generation not serving");
            return 0;
        }

        let fetches = self.config.precache.iter().map(|url| {
            let request = AssetRequest::get(url.clone());
            async move {
                let result = self.fetcher.fetch(&request).await;
                (request.url, result)
            }
        });

        let mut refreshed = 0;
        for (url, result) in join_all(fetches).await {
            match result {
                Ok(response) if response.is_ok() => {
                    if self.storage.put(version, &url, response).await {
                        refreshed += 1;
                    }
                }
                Ok(response) => debug!(url = %url, status = %response.status, "Refresh skipped asset"),
                Err(e) => warn!(url = %url, error = %e, "Refresh fetch failed"),
            }
        }
        info!(version = %version, refreshed, "Cache refreshed");
        refreshed
    }

    /// Mark this generation as superseded. It stops intercepting.
    pub async fn retire(&self) -> Result<(), CacheError> {
        self.transition(CacheState::Redundant).await?;
        info!(version = %self.config.version, "Cache generation retired");
        Ok(())
    }

    /// Offer an outgoing request for interception.
    pub async fn handle_fetch(&self, request: AssetRequest) -> FetchOutcome {
        if request.method != Method::GET || request.is_extension() {
            return FetchOutcome::Bypass;
        }
        if !self.state().await.is_serving() {
            return FetchOutcome::Bypass;
        }

        let version = &self.config.version;
        if let Some(cached) = self.storage.lookup(version, &request.url).await {
            debug!(url = %request.url, "Cache hit");
            let revalidation = self.spawn_revalidation(request);
            return FetchOutcome::Served(ServedResponse {
                response: cached,
                source: ResponseSource::Cache,
                revalidation: Some(revalidation),
            });
        }

        debug!(url = %request.url, "Cache miss, fetching");
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if response.is_ok() {
                    debug!(url = %request.url, "Caching new resource");
                    self.storage.put(version, &request.url, response.clone()).await;
                }
                FetchOutcome::Served(ServedResponse {
                    response,
                    source: ResponseSource::Network,
                    revalidation: None,
                })
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed");
                FetchOutcome::Served(self.offline_fallback(&request).await)
            }
        }
    }

    async fn offline_fallback(&self, request: &AssetRequest) -> ServedResponse {
        if request.destination == Destination::Document
            && let Some(document) = self
                .storage
                .lookup(&self.config.version, &self.config.offline_document)
                .await
        {
            return ServedResponse {
                response: document,
                source: ResponseSource::OfflineDocument,
                revalidation: None,
            };
        }
        ServedResponse {
            response: AssetResponse::unavailable(&self.config.offline_message),
            source: ResponseSource::Unavailable,
            revalidation: None,
        }
    }

    /// Refresh a cached entry from network without holding up the caller.
    fn spawn_revalidation(&self, request: AssetRequest) -> JoinHandle<()> {
        let storage = Arc::clone(&self.storage);
        let fetcher = Arc::clone(&self.fetcher);
        let version = self.config.version.clone();
        tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    if storage.put(&version, &request.url, response).await {
                        debug!(url = %request.url, "Updated cache entry");
                    }
                }
                Ok(response) => {
                    debug!(url = %request.url, status = %response.status, "Background update skipped");
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Background update failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetch::ScriptedFetcher;
    use reqwest::StatusCode;

    const ASSETS: &[&str] = &["/", "/index.html", "/js/app.js"];

    fn config(version: &str) -> CacheConfig {
        CacheConfig {
            version: version.to_string(),
            precache: ASSETS.iter().map(|s| s.to_string()).collect(),
            ..CacheConfig::default()
        }
    }

    fn network() -> Arc<ScriptedFetcher> {
        let fetcher = Arc::new(ScriptedFetcher::new());
        for asset in ASSETS {
            fetcher.serve(*asset, format!("v1 {asset}"));
        }
        fetcher
    }

    fn manager(
        version: &str,
        storage: &Arc<CacheStorage>,
        fetcher: &Arc<ScriptedFetcher>,
    ) -> Arc<AssetCacheManager> {
        let (tx, _rx) = broadcast::channel(16);
        AssetCacheManager::new(config(version), Arc::clone(storage), fetcher.clone(), tx)
    }

    #[tokio::test]
    async fn install_stores_manifest_and_announces() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        let manager = manager("v1", &storage, &fetcher);
        let mut rx = manager.subscribe();

        assert_eq!(manager.install().await.unwrap(), 3);
        assert_eq!(manager.state().await, CacheState::Installed);
        assert_eq!(storage.entry_count("v1").await, 3);
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Installed {
                version: "v1".into()
            }
        );
    }

    #[tokio::test]
    async fn install_is_all_or_nothing() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        fetcher.respond("/js/app.js", AssetResponse::new(StatusCode::INTERNAL_SERVER_ERROR, ""));
        let manager = manager("v1", &storage, &fetcher);

        let err = manager.install().await.unwrap_err();
        match err {
            CacheError::InstallFailed { failed, .. } => assert_eq!(failed, vec!["/js/app.js"]),
            other => panic!("Expected InstallFailed, got {other:?}"),
        }
        assert_eq!(manager.state().await, CacheState::Idle);
        assert!(!storage.has("v1").await);

        fetcher.serve("/js/app.js", "fixed");
        assert_eq!(manager.install().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn activate_requires_install() {
        let storage = Arc::new(CacheStorage::new());
        let manager = manager("v1", &storage, &network());
        assert!(matches!(
            manager.activate().await,
            Err(CacheError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn activate_deletes_other_generations() {
        let storage = Arc::new(CacheStorage::new());
        storage.put_all("old-v0", vec![("/x".into(), AssetResponse::ok("x"))]).await;
        let manager = manager("v1", &storage, &network());
        let mut rx = manager.subscribe();

        manager.start().await.unwrap();
        assert_eq!(manager.state().await, CacheState::Active);
        assert_eq!(storage.keys().await, vec!["v1".to_string()]);

        let _installed = rx.recv().await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::ControllerChanged {
                version: "v1".into()
            }
        );
    }

    #[tokio::test]
    async fn non_get_and_extension_requests_bypass() {
        let storage = Arc::new(CacheStorage::new());
        let manager = manager("v1", &storage, &network());
        manager.start().await.unwrap();

        let post = AssetRequest::get("/api").with_method(Method::POST);
        assert!(matches!(manager.handle_fetch(post).await, FetchOutcome::Bypass));
        let ext = AssetRequest::get("chrome-extension://id/x.js");
        assert!(matches!(manager.handle_fetch(ext).await, FetchOutcome::Bypass));
    }

    #[tokio::test]
    async fn not_active_bypasses() {
        let storage = Arc::new(CacheStorage::new());
        let manager = manager("v1", &storage, &network());
        manager.install().await.unwrap();
        assert!(matches!(
            manager.handle_fetch(AssetRequest::get("/")).await,
            FetchOutcome::Bypass
        ));
    }

    #[tokio::test]
    async fn cache_hit_serves_stale_then_revalidates() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        let manager = manager("v1", &storage, &fetcher);
        manager.start().await.unwrap();

        fetcher.serve("/js/app.js", "fresh");
        let served = manager
            .handle_fetch(AssetRequest::get("/js/app.js"))
            .await
            .served()
            .unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.text(), "v1 /js/app.js");

        served.revalidation.unwrap().await.unwrap();
        assert_eq!(storage.lookup("v1", "/js/app.js").await.unwrap().text(), "fresh");
    }

    #[tokio::test]
    async fn failed_revalidation_keeps_cached_entry() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        let manager = manager("v1", &storage, &fetcher);
        manager.start().await.unwrap();

        fetcher.set_offline(true);
        let served = manager.handle_fetch(AssetRequest::get("/")).await.served().unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        served.revalidation.unwrap().await.unwrap();
        assert_eq!(storage.lookup("v1", "/").await.unwrap().text(), "v1 /");
    }

    #[tokio::test]
    async fn miss_goes_to_network_and_caches_success_only() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        fetcher.serve("/img/logo.png", "png");
        let manager = manager("v1", &storage, &fetcher);
        manager.start().await.unwrap();

        let served = manager
            .handle_fetch(AssetRequest::get("/img/logo.png"))
            .await
            .served()
            .unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        assert!(storage.lookup("v1", "/img/logo.png").await.is_some());

        let missing = manager
            .handle_fetch(AssetRequest::get("/nope"))
            .await
            .served()
            .unwrap();
        assert_eq!(missing.response.status, StatusCode::NOT_FOUND);
        assert!(storage.lookup("v1", "/nope").await.is_none());
    }

    #[tokio::test]
    async fn offline_navigation_falls_back_to_cached_document() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        let manager = manager("v1", &storage, &fetcher);
        manager.start().await.unwrap();
        fetcher.set_offline(true);

        let served = manager
            .handle_fetch(AssetRequest::document("/settings"))
            .await
            .served()
            .unwrap();
        assert_eq!(served.source, ResponseSource::OfflineDocument);
        assert_eq!(served.response.text(), "v1 /index.html");

        let asset = manager
            .handle_fetch(AssetRequest::get("/css/missing.css"))
            .await
            .served()
            .unwrap();
        assert_eq!(asset.source, ResponseSource::Unavailable);
        assert_eq!(asset.response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn skip_waiting_activates_once() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        let (tx, _rx) = broadcast::channel(16);
        let manager = AssetCacheManager::new(
            CacheConfig {
                skip_waiting_on_install: false,
                ..config("v1")
            },
            Arc::clone(&storage),
            fetcher,
            tx,
        );
        manager.start().await.unwrap();
        assert_eq!(manager.state().await, CacheState::Installed);
        manager.skip_waiting().await.unwrap();
        manager.skip_waiting().await.unwrap();
        assert_eq!(manager.state().await, CacheState::Active);

        manager.retire().await.unwrap();
        assert!(matches!(
            manager.handle_fetch(AssetRequest::get("/")).await,
            FetchOutcome::Bypass
        ));
    }

    #[tokio::test]
    async fn refresh_updates_serving_generation_only() {
        let storage = Arc::new(CacheStorage::new());
        let fetcher = network();
        let manager = manager("v1", &storage, &fetcher);
        assert_eq!(manager.refresh().await, 0);
        manager.start().await.unwrap();

        fetcher.serve("/js/app.js", "v2 app");
        fetcher.respond("/", AssetResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"));
        assert_eq!(manager.refresh().await, 2);
        assert_eq!(storage.lookup("v1", "/js/app.js").await.unwrap().text(), "v2 app");
        assert_eq!(storage.lookup("v1", "/").await.unwrap().text(), "v1 /");

        fetcher.set_offline(true);
        assert_eq!(manager.refresh().await, 0);
        assert_eq!(storage.lookup("v1", "/index.html").await.unwrap().text(), "v1 /index.html");
    }
}
