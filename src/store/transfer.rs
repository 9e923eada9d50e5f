//! Export and import of the whole store as one JSON document.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, warn};

use super::model::{
    self, Category, Period, Settings, SettingsPatch, Subscription, DEFAULT_REMINDER_DAYS,
};
use super::records::{self, RecordStore};
use crate::error::StoreError;
use crate::events::Severity;

/// Version written into every export document.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// The export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub subscriptions: Vec<Subscription>,
    pub settings: Settings,
    pub export_date: DateTime<Utc>,
    pub version: String,
}

/// Loosely-typed incoming record. Only id, name and a numeric price are
/// required; a period outside the known set rejects the record. Any other
/// field that does not parse falls back to its default.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedRecord {
    id: String,
    name: String,
    #[serde(with = "rust_decimal::serde::float")]
    price: Decimal,
    period: Option<Period>,
    #[serde(default, deserialize_with = "lenient")]
    currency: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    next_payment: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient")]
    category: Option<Category>,
    #[serde(default, deserialize_with = "lenient")]
    active: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    reminder_days: Option<u32>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl ImportedRecord {
    fn into_subscription(self, default_currency: &str, now: DateTime<Utc>) -> Subscription {
        let period = self.period.unwrap_or(Period::Monthly);
        let created_at = self.created_at.unwrap_or(now);
        let updated_at = self.updated_at.unwrap_or(created_at).max(created_at);
        Subscription {
            id: self.id,
            name: self.name,
            price: self.price,
            currency: self
                .currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| default_currency.to_string()),
            period,
            next_payment: self
                .next_payment
                .unwrap_or_else(|| model::calculate_next_payment(period, now.date_naive())),
            category: self.category.unwrap_or(Category::Other),
            active: self.active.unwrap_or(true),
            created_at,
            updated_at,
            description: self.description.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            reminder_days: self.reminder_days.unwrap_or(DEFAULT_REMINDER_DAYS),
        }
    }
}

/// Structural pre-check: non-empty string id and name, numeric price.
fn has_required_fields(value: &serde_json::Value) -> bool {
    let non_empty = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| !s.trim().is_empty())
    };
    non_empty("id") && non_empty("name") && value.get("price").is_some_and(|p| p.is_number())
}

impl RecordStore {
    /// Serialize all subscriptions and settings into an export document.
    pub fn export_all(&self) -> Result<String, StoreError> {
        let document = {
            let state = self.read_state();
            ExportDocument {
                subscriptions: state.subscriptions.clone(),
                settings: state.settings.clone(),
                export_date: Utc::now(),
                version: EXPORT_FORMAT_VERSION.to_string(),
            }
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| StoreError::Persistence(e.into()))?;
        info!(subscriptions = document.subscriptions.len(), "Data exported");
        Ok(json)
    }

    /// Replace the collection with the valid records of an export document.
    ///
    /// Records without a non-empty id, a non-empty name and a numeric price
    /// are dropped, as are records breaking a stored-record invariant and
    /// later duplicates of an id. Settings present in the document are
    /// merged over the current ones; an unusable currency code is ignored.
    /// Collection and settings are written together or not at all. Returns
    /// the number of subscriptions imported.
    pub fn import_all(&self, serialized: &str) -> Result<usize, StoreError> {
        let result = self.import_document(serialized);
        match &result {
            Ok(count) => self
                .events()
                .toast(Severity::Success, format!("Imported {count} subscriptions")),
            Err(e) => {
                warn!(error = %e, "Import failed");
                self.events().toast(Severity::Error, "Failed to import data");
            }
        }
        result
    }

    fn import_document(&self, serialized: &str) -> Result<usize, StoreError> {
        let document: serde_json::Value =
            serde_json::from_str(serialized).map_err(|e| StoreError::Format(e.to_string()))?;
        let incoming = document
            .get("subscriptions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| StoreError::Format("missing subscriptions array".to_string()))?;
        let settings_patch = match document.get("settings") {
            Some(value) if value.is_object() => {
                let mut patch = serde_json::from_value::<SettingsPatch>(value.clone())
                    .map_err(|e| StoreError::Format(format!("invalid settings: {e}")))?;
                if let Some(currency) = patch.currency.take_if(|c| !records::is_currency_code(c)) {
                    warn!(currency = %currency, "Ignoring imported currency that is not a 3-letter code");
                }
                Some(patch)
            }
            _ => None,
        };

        let mut state = self.write_state();
        let now = Utc::now();
        let mut merged_settings = state.settings.clone();
        if let Some(patch) = settings_patch.clone() {
            patch.apply(&mut merged_settings);
        }

        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(incoming.len());
        for value in incoming {
            if !has_required_fields(value) {
                continue;
            }
            let record = match serde_json::from_value::<ImportedRecord>(value.clone()) {
                Ok(record) => record.into_subscription(&merged_settings.currency, now),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed imported subscription");
                    continue;
                }
            };
            if let Err(e) = records::check_invariants(&record) {
                warn!(subscription_id = %record.id, error = %e, "Skipping invalid imported subscription");
                continue;
            }
            if !seen.insert(record.id.clone()) {
                warn!(subscription_id = %record.id, "Skipping duplicate imported subscription");
                continue;
            }
            accepted.push(record);
        }

        let skipped = incoming.len() - accepted.len();
        if skipped > 0 {
            warn!(skipped, "Some subscriptions were skipped during import");
        }

        let count = accepted.len();
        if settings_patch.is_some() {
            if let Err(e) = self.persist_both(&accepted, &merged_settings) {
                error!(error = %e, "Failed to save imported data");
                return Err(e.into());
            }
            self.swap_both(&mut state, accepted, merged_settings);
        } else {
            self.commit_subscriptions(&mut state, accepted)?;
        }

        info!(count, skipped, "Data imported");
        Ok(count)
    }
}
