//! Payment reminders — localised text, the notification seam and the
//! periodic scheduler.

pub mod plural;
pub mod reminder;
pub mod scheduler;
pub mod tray;

pub use reminder::{Reminder, ReminderAction};
pub use scheduler::{NotificationScheduler, Notifier, Permission};
pub use tray::ReminderTray;
