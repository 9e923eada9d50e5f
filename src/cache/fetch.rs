//! Requests, responses and the network seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};

use crate::error::FetchError;

/// What a request is for, as far as offline fallback cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level navigation.
    Document,
    #[default]
    Other,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub url: String,
    pub method: Method,
    pub destination: Destination,
}

impl AssetRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            destination: Destination::Other,
        }
    }

    /// A top-level navigation request.
    pub fn document(url: impl Into<String>) -> Self {
        Self {
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Browser-extension resources are never intercepted.
    pub fn is_extension(&self) -> bool {
        self.url.contains("chrome-extension")
            || self.url.starts_with("moz-extension:")
            || self.url.starts_with("safari-web-extension:")
    }
}

/// A response snapshot as stored in a cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl AssetResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Synthetic 503 returned when neither cache nor network can answer.
    pub fn unavailable(message: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message.as_bytes().to_vec())
            .with_header("Content-Type", "text/plain; charset=utf-8")
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network access used for precaching and cache misses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError>;
}

/// `reqwest`-backed fetcher. Relative asset paths resolve against `origin`.
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Url,
}

impl HttpFetcher {
    pub fn new(origin: &str) -> Result<Self, FetchError> {
        let origin = Url::parse(origin).map_err(|e| FetchError::InvalidUrl {
            url: origin.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            origin,
        })
    }

    fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        self.origin.join(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        let url = self.resolve(&request.url)?;
        let network = |e: reqwest::Error| FetchError::Network {
            url: request.url.clone(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .request(request.method.clone(), url)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network)?.to_vec();

        Ok(AssetResponse {
            status,
            headers,
            body,
        })
    }
}

/// In-memory network with scripted responses and an on/offline switch.
///
/// Unknown URLs answer 404. While offline every fetch fails.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    responses: RwLock<HashMap<String, AssetResponse>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with 200 for `url`.
    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.respond(url, AssetResponse::ok(body));
    }

    pub fn respond(&self, url: impl Into<String>, response: AssetResponse) {
        let mut responses = self.responses.write().unwrap_or_else(|e| e.into_inner());
        responses.insert(url.into(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network {
                url: request.url.clone(),
                reason: "offline".to_string(),
            });
        }
        let responses = self.responses.read().unwrap_or_else(|e| e.into_inner());
        Ok(responses
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| AssetResponse::new(StatusCode::NOT_FOUND, Vec::new())))
    }
}
