//! Error types for subtrack.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by the record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Subscription not found: {id}")]
    NotFound { id: String },

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("Invalid import format: {0}")]
    Format(String),
}

impl StoreError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors from the key-value persistence medium.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable")]
    Unavailable,

    #[error("Quota exceeded writing {key}: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("Stored value under {key} is corrupted: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asset cache lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache {version} cannot transition from {from} to {to}")]
    InvalidTransition {
        version: String,
        from: String,
        to: String,
    },

    #[error("Install of {version} failed for {} asset(s): {}", failed.len(), failed.join(", "))]
    InstallFailed { version: String, failed: Vec<String> },

    #[error("Cache control channel closed")]
    ControlClosed,
}

/// Network fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Deferred synchronization errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Background sync facility unavailable")]
    Unavailable,

    #[error("Failed to register sync {tag}: {reason}")]
    RegistrationFailed { tag: String, reason: String },

    #[error("Sync task {tag} failed: {reason}")]
    TaskFailed { tag: String, reason: String },
}

/// Notification facility errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification permission denied")]
    PermissionDenied,
}
