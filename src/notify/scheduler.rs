//! Payment reminder scheduler.
//!
//! Scans the store once at start, then on every interval tick and after
//! every collection change. Each subscription due within the reminder
//! window gets one reminder tagged `payment-<id>`; the notifier replaces
//! same-tagged reminders, so repeated scans never stack them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reminder::Reminder;
use crate::config::ReminderConfig;
use crate::error::NotifyError;
use crate::events::AppEvent;
use crate::store::RecordStore;

/// Notification permission as reported by the facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    Granted,
    Denied,
    /// Not decided yet.
    #[default]
    Default,
}

/// A facility able to display reminders.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask the user for permission. May return `Default` if they did not answer.
    async fn request_permission(&self) -> Permission;

    /// Display `reminder`, replacing any reminder with the same tag.
    async fn show(&self, reminder: Reminder) -> Result<(), NotifyError>;
}

pub struct NotificationScheduler {
    store: Arc<RecordStore>,
    notifier: Arc<dyn Notifier>,
    config: ReminderConfig,
    permission: RwLock<Permission>,
}

impl NotificationScheduler {
    pub fn new(
        store: Arc<RecordStore>,
        notifier: Arc<dyn Notifier>,
        config: ReminderConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            notifier,
            config,
            permission: RwLock::new(Permission::Default),
        })
    }

    pub async fn permission(&self) -> Permission {
        *self.permission.read().await
    }

    /// Ask the notifier for permission unless the user already decided.
    pub async fn request_permission(&self) -> Permission {
        let mut permission = self.permission.write().await;
        if *permission == Permission::Default {
            *permission = self.notifier.request_permission().await;
            debug!(permission = ?*permission, "Notification permission resolved");
        }
        *permission
    }

    /// Show reminders for every active subscription due within the window
    /// as of `today`. Returns how many reminders were shown.
    pub async fn scan(&self, today: NaiveDate) -> usize {
        if self.permission().await != Permission::Granted {
            debug!("Reminder scan skipped: no permission");
            return 0;
        }
        let settings = self.store.settings();
        if !settings.notifications {
            debug!("Reminder scan skipped: notifications disabled");
            return 0;
        }

        let window = self.config.window_days;
        let mut shown = 0;
        for subscription in self.store.upcoming_payments(today, window) {
            let days = subscription.days_until_payment(today);
            if !(0..=window).contains(&days) {
                continue;
            }
            let Ok(days) = u32::try_from(days) else {
                continue;
            };
            let reminder = Reminder::for_payment(&subscription, days, settings.language);
            match self.notifier.show(reminder).await {
                Ok(()) => {
                    debug!(subscription_id = %subscription.id, days, "Reminder shown");
                    shown += 1;
                }
                Err(e) => {
                    warn!(subscription_id = %subscription.id, error = %e, "Failed to show reminder");
                }
            }
        }
        shown
    }

    pub async fn scan_now(&self) -> usize {
        self.scan(Utc::now().date_naive()).await
    }

    /// Request permission and, if granted, spawn the scan loop.
    ///
    /// Returns `None` when permission is denied or undecided; the scheduler
    /// then stays inert.
    pub async fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        match self.request_permission().await {
            Permission::Granted => {}
            permission => {
                warn!(?permission, "Notifications not permitted, reminders disabled");
                return None;
            }
        }

        let scheduler = Arc::clone(self);
        let mut events = self.store.events().subscribe();
        Some(tokio::spawn(async move {
            info!(
                "Reminder scheduler started (interval: {}s)",
                scheduler.config.interval.as_secs()
            );
            let mut tick = tokio::time::interval(scheduler.config.interval);

            // First tick fires immediately
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        scheduler.scan_now().await;
                    }
                    event = events.recv() => {
                        match event {
                            Ok(AppEvent::RecordsChanged { .. }) => {
                                scheduler.scan_now().await;
                            }
                            Ok(_) => {}
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Reminder scheduler lagged behind events");
                                scheduler.scan_now().await;
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            }
            debug!("Reminder scheduler stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::events::EventBus;
    use crate::notify::tray::ReminderTray;
    use crate::store::model::{Language, NewSubscription, Period};
    use crate::store::{MemoryStore, SettingsPatch, SubscriptionPatch};
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn setup(permission: Permission) -> (Arc<RecordStore>, Arc<ReminderTray>, Arc<NotificationScheduler>) {
        let store = RecordStore::open(
            Arc::new(MemoryStore::new()),
            EventBus::new(),
            StoreConfig::default(),
        );
        let tray = Arc::new(ReminderTray::new(permission));
        let scheduler =
            NotificationScheduler::new(Arc::clone(&store), tray.clone(), ReminderConfig::default());
        (store, tray, scheduler)
    }

    fn due_in(store: &RecordStore, name: &str, today: NaiveDate, days: i64) -> String {
        store
            .create(
                NewSubscription::new(name, dec!(100))
                    .with_period(Period::Monthly)
                    .with_next_payment(today + Duration::days(days)),
            )
            .unwrap()
            .id
    }

    async fn wait_for(tray: &ReminderTray, tag: &str) {
        tokio::time::timeout(StdDuration::from_secs(2), async {
            while tray.get(tag).is_none() {
                tokio::time::sleep(StdDuration::from_millis(10)).await;
            }
        })
        .await
        .expect("reminder never shown");
    }

    #[tokio::test]
    async fn scan_covers_today_through_three_days() {
        let (store, tray, scheduler) = setup(Permission::Granted);
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let ids: Vec<String> = (0..=5)
            .map(|d| due_in(&store, &format!("S{d}"), today, d))
            .collect();
        due_in(&store, "Overdue", today, -1);

        scheduler.request_permission().await;
        assert_eq!(scheduler.scan(today).await, 4);
        for id in &ids[..4] {
            assert!(tray.get(&format!("payment-{id}")).is_some());
        }
        assert!(tray.get(&format!("payment-{}", ids[4])).is_none());
        assert_eq!(
            tray.get(&format!("payment-{}", ids[0])).unwrap().body,
            "Сегодня списание по S0"
        );
    }

    #[tokio::test]
    async fn repeated_scans_replace_rather_than_stack() {
        let (store, tray, scheduler) = setup(Permission::Granted);
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        due_in(&store, "Netflix", today, 2);
        scheduler.request_permission().await;

        scheduler.scan(today).await;
        scheduler.scan(today).await;
        assert_eq!(tray.reminders().len(), 1);
        assert_eq!(tray.deliveries(), 2);
    }

    #[tokio::test]
    async fn archived_and_disabled_are_skipped() {
        let (store, tray, scheduler) = setup(Permission::Granted);
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let id = due_in(&store, "Netflix", today, 1);
        store.update(&id, SubscriptionPatch::active(false)).unwrap();
        scheduler.request_permission().await;
        assert_eq!(scheduler.scan(today).await, 0);

        store.update(&id, SubscriptionPatch::active(true)).unwrap();
        store
            .update_settings(SettingsPatch {
                notifications: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert_eq!(scheduler.scan(today).await, 0);
        assert!(tray.reminders().is_empty());
    }

    #[tokio::test]
    async fn reminder_language_follows_settings() {
        let (store, tray, scheduler) = setup(Permission::Granted);
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let id = due_in(&store, "Spotify", today, 1);
        store
            .update_settings(SettingsPatch {
                language: Some(Language::En),
                ..SettingsPatch::default()
            })
            .unwrap();
        scheduler.request_permission().await;
        scheduler.scan(today).await;
        let reminder = tray.get(&format!("payment-{id}")).unwrap();
        assert_eq!(reminder.title, "Subscription reminder");
        assert_eq!(reminder.body, "Spotify payment is due in 1 day");
    }

    #[tokio::test]
    async fn denied_permission_leaves_scheduler_inert() {
        let (store, tray, scheduler) = setup(Permission::Denied);
        let today = Utc::now().date_naive();
        due_in(&store, "Netflix", today, 1);

        assert!(scheduler.start().await.is_none());
        assert_eq!(scheduler.permission().await, Permission::Denied);
        assert_eq!(scheduler.scan(today).await, 0);
        assert!(tray.reminders().is_empty());
    }

    #[tokio::test]
    async fn loop_scans_at_start_and_on_changes() {
        let (store, tray, scheduler) = setup(Permission::Granted);
        let today = Utc::now().date_naive();
        let existing = due_in(&store, "Netflix", today, 2);

        let handle = scheduler.start().await.unwrap();
        wait_for(&tray, &format!("payment-{existing}")).await;

        let added = due_in(&store, "Spotify", today, 0);
        wait_for(&tray, &format!("payment-{added}")).await;
        handle.abort();
    }
}
