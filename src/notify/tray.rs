//! In-memory notification facility.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use super::reminder::{Reminder, ReminderAction};
use super::scheduler::{Notifier, Permission};
use crate::error::NotifyError;

/// Holds displayed reminders, replacing any reminder that shares a tag.
#[derive(Debug)]
pub struct ReminderTray {
    permission: Permission,
    shown: Mutex<Vec<Reminder>>,
    deliveries: Mutex<usize>,
}

impl ReminderTray {
    /// A tray whose permission prompt answers `permission`.
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            shown: Mutex::new(Vec::new()),
            deliveries: Mutex::new(0),
        }
    }

    /// Reminders currently on display, oldest first.
    pub fn reminders(&self) -> Vec<Reminder> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, tag: &str) -> Option<Reminder> {
        self.reminders().into_iter().find(|r| r.tag == tag)
    }

    /// Total number of `show` calls, including replacements.
    pub fn deliveries(&self) -> usize {
        *self.deliveries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn close(&self, tag: &str) -> bool {
        let mut shown = self.shown.lock().unwrap_or_else(|e| e.into_inner());
        let before = shown.len();
        shown.retain(|r| r.tag != tag);
        shown.len() != before
    }

    /// Handle a click: the reminder closes, and `View` yields the URL to open.
    pub fn click(&self, tag: &str, action: ReminderAction) -> Option<String> {
        let reminder = self.get(tag)?;
        self.close(tag);
        debug!(tag, ?action, "Reminder clicked");
        match action {
            ReminderAction::View => Some(reminder.url),
            ReminderAction::Dismiss => None,
        }
    }
}

impl Default for ReminderTray {
    fn default() -> Self {
        Self::new(Permission::Granted)
    }
}

#[async_trait]
impl Notifier for ReminderTray {
    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn show(&self, reminder: Reminder) -> Result<(), NotifyError> {
        if self.permission != Permission::Granted {
            return Err(NotifyError::PermissionDenied);
        }
        *self.deliveries.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        info!(tag = %reminder.tag, "{}: {}", reminder.title, reminder.body);
        let mut shown = self.shown.lock().unwrap_or_else(|e| e.into_inner());
        match shown.iter_mut().find(|r| r.tag == reminder.tag) {
            Some(existing) => *existing = reminder,
            None => shown.push(reminder),
        }
        Ok(())
    }
}
