//! Record store — subscriptions, settings, derived statistics.

pub mod kv;
pub mod model;
pub mod query;
pub mod records;
pub mod stats;
pub mod transfer;

pub use kv::{KeyValueStore, KvWrite, MemoryStore, SqliteStore};
pub use model::{NewSubscription, Settings, SettingsPatch, Subscription, SubscriptionPatch};
pub use query::{QueryFilter, SortField, SortOrder};
pub use records::{RecordStore, StorageSize};
pub use stats::Statistics;
pub use transfer::ExportDocument;
