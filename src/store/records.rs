//! Record store — subscription and settings state over a key-value medium.
//!
//! Every mutation builds the new collection on the side, persists it, and
//! only then swaps it into memory and notifies listeners. A failed write
//! leaves both the medium and the in-memory state as they were.

use std::sync::{Arc, LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::kv::{KeyValueStore, KvWrite};
use super::model::{
    self, NewSubscription, Settings, SettingsPatch, Subscription, SubscriptionPatch,
    DEFAULT_REMINDER_DAYS,
};
use super::query::{self, QueryFilter, SortField, SortOrder};
use super::stats::{self, Statistics};
use crate::config::StoreConfig;
use crate::error::{StorageError, StoreError};
use crate::events::{AppEvent, EventBus, Severity};

/// Longest accepted subscription name, in characters.
const MAX_NAME_CHARS: usize = 100;

/// Largest accepted price.
const MAX_PRICE: u32 = 1_000_000;

/// Longest accepted reminder lead time, in days.
const MAX_REMINDER_DAYS: u32 = 365;

static CURRENCY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

/// Byte sizes of the persisted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSize {
    pub subscriptions: usize,
    pub settings: usize,
    pub total: usize,
}

pub(crate) struct StoreState {
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) settings: Settings,
}

/// Owner of the subscription and settings namespaces.
pub struct RecordStore {
    kv: Arc<dyn KeyValueStore>,
    events: EventBus,
    config: StoreConfig,
    state: RwLock<StoreState>,
}

impl RecordStore {
    /// Open the store, loading whatever the medium holds.
    ///
    /// Missing records are initialised with defaults. Unreadable or
    /// unparsable records are logged and treated as empty.
    pub fn open(kv: Arc<dyn KeyValueStore>, events: EventBus, config: StoreConfig) -> Arc<Self> {
        let subscriptions = load_subscriptions(kv.as_ref(), &config.subscriptions_key);
        let settings = load_settings(kv.as_ref(), &config.settings_key);

        info!(
            subscriptions = subscriptions.len(),
            key = %config.subscriptions_key,
            "Record store opened"
        );

        Arc::new(Self {
            kv,
            events,
            config,
            state: RwLock::new(StoreState {
                subscriptions,
                settings,
            }),
        })
    }

    /// Event bus this store broadcasts on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn read(&self, id: &str) -> Option<Subscription> {
        self.read_state()
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Subscription> {
        self.read_state().subscriptions.clone()
    }

    pub fn active(&self) -> Vec<Subscription> {
        self.query("", QueryFilter::active_only())
    }

    pub fn archived(&self) -> Vec<Subscription> {
        self.query(
            "",
            QueryFilter {
                active: Some(false),
                category: None,
            },
        )
    }

    pub fn len(&self) -> usize {
        self.read_state().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text search with optional filters. Order is unspecified.
    pub fn query(&self, text: &str, filter: QueryFilter) -> Vec<Subscription> {
        query::search(&self.read_state().subscriptions, text, filter)
    }

    /// Stable sort of `records`.
    pub fn sort(&self, records: &[Subscription], field: SortField, order: SortOrder) -> Vec<Subscription> {
        query::sort(records, field, order)
    }

    /// Statistics as of today over the configured upcoming horizon.
    pub fn statistics(&self) -> Statistics {
        self.statistics_at(Utc::now().date_naive(), self.config.upcoming_days)
    }

    pub fn statistics_at(&self, today: NaiveDate, upcoming_days: i64) -> Statistics {
        Statistics::compute(&self.read_state().subscriptions, today, upcoming_days)
    }

    /// Active subscriptions due within `days` of `today`, earliest first.
    pub fn upcoming_payments(&self, today: NaiveDate, days: i64) -> Vec<Subscription> {
        let state = self.read_state();
        let active: Vec<&Subscription> = state.subscriptions.iter().filter(|s| s.active).collect();
        stats::upcoming_payments(&active, today, days)
    }

    pub fn settings(&self) -> Settings {
        self.read_state().settings.clone()
    }

    /// Byte sizes of both persisted records as currently stored.
    pub fn storage_size(&self) -> StorageSize {
        let size_of = |key: &str| match self.kv.get(key) {
            Ok(value) => value.map(|v| v.len()).unwrap_or(0),
            Err(e) => {
                warn!(key, error = %e, "Failed to read value for size");
                0
            }
        };
        let subscriptions = size_of(&self.config.subscriptions_key);
        let settings = size_of(&self.config.settings_key);
        StorageSize {
            subscriptions,
            settings,
            total: subscriptions + settings,
        }
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Create a subscription from `input`, filling defaults.
    pub fn create(&self, input: NewSubscription) -> Result<Subscription, StoreError> {
        let mut state = self.write_state();

        let now = Utc::now();
        let period = input.period.unwrap_or(model::Period::Monthly);
        let subscription = Subscription {
            id: unique_id(&state.subscriptions),
            name: input.name.trim().to_string(),
            price: input.price,
            currency: input
                .currency
                .unwrap_or_else(|| state.settings.currency.clone()),
            period,
            next_payment: input
                .next_payment
                .unwrap_or_else(|| model::calculate_next_payment(period, now.date_naive())),
            category: input.category.unwrap_or(model::Category::Other),
            active: true,
            created_at: now,
            updated_at: now,
            description: input.description.unwrap_or_default(),
            url: input.url.unwrap_or_default(),
            reminder_days: input.reminder_days.unwrap_or(DEFAULT_REMINDER_DAYS),
        };
        self.reject_invalid(validate(&subscription))?;

        let mut next = state.subscriptions.clone();
        next.push(subscription.clone());
        self.commit_subscriptions(&mut state, next)?;

        info!(subscription_id = %subscription.id, name = %subscription.name, "Subscription created");
        self.events.toast(Severity::Success, "Subscription added");
        Ok(subscription)
    }

    /// Merge `patch` into the subscription with `id`.
    pub fn update(&self, id: &str, patch: SubscriptionPatch) -> Result<Subscription, StoreError> {
        let mut state = self.write_state();
        let updated = self.apply_patch(&mut state, id, patch)?;
        info!(subscription_id = %id, "Subscription updated");
        self.events.toast(Severity::Success, "Subscription updated");
        Ok(updated)
    }

    /// Flip the active flag. Read and write happen under one lock.
    pub fn toggle_active(&self, id: &str) -> Result<Subscription, StoreError> {
        let mut state = self.write_state();
        let current = state
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.active)
            .ok_or_else(|| self.not_found(id))?;
        let updated = self.apply_patch(&mut state, id, SubscriptionPatch::active(!current))?;
        info!(subscription_id = %id, active = updated.active, "Subscription toggled");
        Ok(updated)
    }

    /// Remove by id. `Ok(false)` when no such subscription exists.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.write_state();
        let next: Vec<Subscription> = state
            .subscriptions
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        if next.len() == state.subscriptions.len() {
            debug!(subscription_id = %id, "Remove of unknown subscription ignored");
            return Ok(false);
        }
        self.commit_subscriptions(&mut state, next)?;
        info!(subscription_id = %id, "Subscription removed");
        self.events.toast(Severity::Success, "Subscription deleted");
        Ok(true)
    }

    /// Merge `patch` into the settings.
    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, StoreError> {
        let mut state = self.write_state();
        let mut next = state.settings.clone();
        patch.apply(&mut next);
        if !is_currency_code(&next.currency) {
            return self.reject_invalid(Err(StoreError::validation(
                "currency",
                format!("'{}' is not a 3-letter currency code", next.currency),
            )));
        }
        self.commit_settings(&mut state, next.clone())?;
        Ok(next)
    }

    /// Drop every record and start over with defaults.
    ///
    /// Both keys are rewritten in one batch: on failure neither changes.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut state = self.write_state();
        let defaults = Settings::default();
        if let Err(e) = self.persist_both(&[], &defaults) {
            error!(error = %e, "Failed to clear stored data");
            self.events.toast(Severity::Error, "Failed to clear data");
            return Err(e.into());
        }
        self.swap_both(&mut state, Vec::new(), defaults);
        self.events.toast(Severity::Success, "All data cleared");
        info!("All stored data cleared");
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn apply_patch(
        &self,
        state: &mut StoreState,
        id: &str,
        patch: SubscriptionPatch,
    ) -> Result<Subscription, StoreError> {
        let index = state
            .subscriptions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| self.not_found(id))?;

        let mut patch = patch;
        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
        }
        let mut updated = state.subscriptions[index].clone();
        patch.apply(&mut updated);
        updated.updated_at = model::next_timestamp(updated.updated_at);
        self.reject_invalid(validate(&updated))?;

        let mut next = state.subscriptions.clone();
        next[index] = updated.clone();
        self.commit_subscriptions(state, next)?;
        Ok(updated)
    }

    /// Persist `next`, then make it the in-memory collection and notify.
    pub(crate) fn commit_subscriptions(
        &self,
        state: &mut StoreState,
        next: Vec<Subscription>,
    ) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&next).map_err(|e| StoreError::Persistence(e.into()))?;
        if let Err(e) = self.kv.set(&self.config.subscriptions_key, &serialized) {
            error!(key = %self.config.subscriptions_key, error = %e, "Failed to save subscriptions");
            self.events.toast(Severity::Error, "Failed to save data");
            return Err(e.into());
        }
        state.subscriptions = next;
        self.events.emit(AppEvent::RecordsChanged {
            subscriptions: state.subscriptions.clone(),
        });
        Ok(())
    }

    pub(crate) fn commit_settings(&self, state: &mut StoreState, next: Settings) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&next).map_err(|e| StoreError::Persistence(e.into()))?;
        if let Err(e) = self.kv.set(&self.config.settings_key, &serialized) {
            error!(key = %self.config.settings_key, error = %e, "Failed to save settings");
            self.events.toast(Severity::Error, "Failed to save settings");
            return Err(e.into());
        }
        state.settings = next;
        self.events.emit(AppEvent::SettingsChanged {
            settings: state.settings.clone(),
        });
        Ok(())
    }

    /// Write both records in one all-or-nothing batch.
    pub(crate) fn persist_both(
        &self,
        subscriptions: &[Subscription],
        settings: &Settings,
    ) -> Result<(), StorageError> {
        let subscriptions = serde_json::to_string(subscriptions)?;
        let settings = serde_json::to_string(settings)?;
        self.kv.write_batch(&[
            KvWrite::Set(&self.config.subscriptions_key, &subscriptions),
            KvWrite::Set(&self.config.settings_key, &settings),
        ])
    }

    /// Install already-persisted records in memory and notify.
    pub(crate) fn swap_both(&self, state: &mut StoreState, subscriptions: Vec<Subscription>, settings: Settings) {
        state.subscriptions = subscriptions;
        state.settings = settings;
        self.events.emit(AppEvent::RecordsChanged {
            subscriptions: state.subscriptions.clone(),
        });
        self.events.emit(AppEvent::SettingsChanged {
            settings: state.settings.clone(),
        });
    }

    fn not_found(&self, id: &str) -> StoreError {
        warn!(subscription_id = %id, "Subscription not found");
        self.events.toast(Severity::Error, "Subscription not found");
        StoreError::NotFound { id: id.to_string() }
    }

    fn reject_invalid<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            warn!(error = %e, "Rejected invalid subscription data");
            self.events.toast(Severity::Error, e.to_string());
        }
        result
    }
}

pub(crate) fn is_currency_code(code: &str) -> bool {
    CURRENCY_CODE.is_match(code)
}

/// Invariants every stored record holds, however it arrived.
pub(crate) fn check_invariants(sub: &Subscription) -> Result<(), StoreError> {
    if sub.id.is_empty() {
        return Err(StoreError::validation("id", "must not be empty"));
    }
    if sub.name.trim().is_empty() {
        return Err(StoreError::validation("name", "must not be empty"));
    }
    if sub.price < Decimal::ZERO {
        return Err(StoreError::validation("price", "must not be negative"));
    }
    if sub.updated_at < sub.created_at {
        return Err(StoreError::validation("updatedAt", "must not precede createdAt"));
    }
    Ok(())
}

/// Field checks shared by create and update.
pub(crate) fn validate(sub: &Subscription) -> Result<(), StoreError> {
    check_invariants(sub)?;
    if sub.name.chars().count() > MAX_NAME_CHARS {
        return Err(StoreError::validation(
            "name",
            format!("must be at most {MAX_NAME_CHARS} characters"),
        ));
    }
    if sub.price > Decimal::from(MAX_PRICE) {
        return Err(StoreError::validation("price", format!("must not exceed {MAX_PRICE}")));
    }
    if !is_currency_code(&sub.currency) {
        return Err(StoreError::validation(
            "currency",
            format!("'{}' is not a 3-letter currency code", sub.currency),
        ));
    }
    if !sub.url.is_empty() {
        reqwest::Url::parse(&sub.url).map_err(|e| StoreError::validation("url", e.to_string()))?;
    }
    if sub.reminder_days > MAX_REMINDER_DAYS {
        return Err(StoreError::validation(
            "reminderDays",
            format!("must be at most {MAX_REMINDER_DAYS}"),
        ));
    }
    Ok(())
}

fn unique_id(existing: &[Subscription]) -> String {
    loop {
        let id = model::generate_id();
        if !existing.iter().any(|s| s.id == id) {
            return id;
        }
    }
}

fn load_subscriptions(kv: &dyn KeyValueStore, key: &str) -> Vec<Subscription> {
    match kv.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!(key, error = %e, "Stored subscriptions are corrupted, starting empty");
                Vec::new()
            }
        },
        Ok(None) => {
            if let Err(e) = kv.set(key, "[]") {
                warn!(key, error = %e, "Failed to initialise subscriptions");
            }
            Vec::new()
        }
        Err(e) => {
            error!(key, error = %e, "Failed to read subscriptions, starting empty");
            Vec::new()
        }
    }
}

fn load_settings(kv: &dyn KeyValueStore, key: &str) -> Settings {
    match kv.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                error!(key, error = %e, "Stored settings are corrupted, using defaults");
                Settings::default()
            }
        },
        Ok(None) => {
            let defaults = Settings::default();
            match serde_json::to_string(&defaults) {
                Ok(serialized) => {
                    if let Err(e) = kv.set(key, &serialized) {
                        warn!(key, error = %e, "Failed to initialise settings");
                    }
                }
                Err(e) => warn!(key, error = %e, "Failed to serialize default settings"),
            }
            defaults
        }
        Err(e) => {
            error!(key, error = %e, "Failed to read settings, using defaults");
            Settings::default()
        }
    }
}
