//! Reminder payloads.

use serde::{Deserialize, Serialize};

use super::plural::{reminder_body, reminder_title};
use crate::store::model::{Language, Subscription};

/// Page opened when a reminder is viewed.
pub const REMINDER_URL: &str = "/";

/// Buttons offered on a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderAction {
    View,
    Dismiss,
}

impl ReminderAction {
    pub fn title(&self, language: Language) -> &'static str {
        match (self, language) {
            (Self::View, Language::Ru) => "Посмотреть",
            (Self::View, Language::Uk) => "Переглянути",
            (Self::View, Language::En) => "View",
            (Self::Dismiss, Language::Ru) => "Закрыть",
            (Self::Dismiss, Language::Uk) => "Закрити",
            (Self::Dismiss, Language::En) => "Dismiss",
        }
    }
}

/// A locally displayed payment reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub title: String,
    pub body: String,
    /// Dedupe key. A new reminder with the same tag replaces the old one.
    pub tag: String,
    pub subscription_id: String,
    pub url: String,
    pub actions: Vec<ReminderAction>,
}

impl Reminder {
    pub fn for_payment(subscription: &Subscription, days: u32, language: Language) -> Self {
        Self {
            title: reminder_title(language).to_string(),
            body: reminder_body(language, &subscription.name, days),
            tag: reminder_tag(&subscription.id),
            subscription_id: subscription.id.clone(),
            url: REMINDER_URL.to_string(),
            actions: vec![ReminderAction::View, ReminderAction::Dismiss],
        }
    }
}

pub fn reminder_tag(subscription_id: &str) -> String {
    format!("payment-{subscription_id}")
}
