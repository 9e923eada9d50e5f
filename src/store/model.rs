//! Subscription and settings data model.

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default reminder lead time in days.
pub const DEFAULT_REMINDER_DAYS: u32 = 3;

/// Billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Monthly,
    Yearly,
}

impl Period {
    /// Price normalised to one month.
    pub fn monthly_amount(self, price: Decimal) -> Decimal {
        match self {
            Self::Monthly => price,
            Self::Yearly => price / Decimal::from(12),
        }
    }

    /// Price normalised to one year.
    pub fn yearly_amount(self, price: Decimal) -> Decimal {
        match self {
            Self::Monthly => price * Decimal::from(12),
            Self::Yearly => price,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        };
        write!(f, "{s}")
    }
}

/// Subscription category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Entertainment,
    Music,
    Video,
    Productivity,
    Cloud,
    News,
    #[serde(other)]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entertainment => "entertainment",
            Self::Music => "music",
            Self::Video => "video",
            Self::Productivity => "productivity",
            Self::Cloud => "cloud",
            Self::News => "news",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked recurring payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Opaque id, assigned at creation and never changed.
    pub id: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub currency: String,
    pub period: Period,
    pub next_payment: NaiveDate,
    pub category: Category,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_reminder_days")]
    pub reminder_days: u32,
}

impl Subscription {
    pub fn monthly_amount(&self) -> Decimal {
        self.period.monthly_amount(self.price)
    }

    pub fn yearly_amount(&self) -> Decimal {
        self.period.yearly_amount(self.price)
    }

    /// Whole calendar days from `today` until the next payment (negative when overdue).
    pub fn days_until_payment(&self, today: NaiveDate) -> i64 {
        (self.next_payment - today).num_days()
    }
}

fn default_reminder_days() -> u32 {
    DEFAULT_REMINDER_DAYS
}

/// Input for creating a subscription. Unset fields get defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub next_payment: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub reminder_days: Option<u32>,
}

impl NewSubscription {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
            ..Self::default()
        }
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_next_payment(mut self, date: NaiveDate) -> Self {
        self.next_payment = Some(date);
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_reminder_days(mut self, days: u32) -> Self {
        self.reminder_days = Some(days);
        self
    }
}

/// Partial update. `None` leaves a field untouched; the id cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPatch {
    pub name: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub period: Option<Period>,
    pub next_payment: Option<NaiveDate>,
    pub category: Option<Category>,
    pub active: Option<bool>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub reminder_days: Option<u32>,
}

impl SubscriptionPatch {
    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    /// Apply the patch onto `target`. Timestamps are the caller's business.
    pub fn apply(self, target: &mut Subscription) {
        if let Some(name) = self.name {
            target.name = name;
        }
        if let Some(price) = self.price {
            target.price = price;
        }
        if let Some(currency) = self.currency {
            target.currency = currency;
        }
        if let Some(period) = self.period {
            target.period = period;
        }
        if let Some(date) = self.next_payment {
            target.next_payment = date;
        }
        if let Some(category) = self.category {
            target.category = category;
        }
        if let Some(active) = self.active {
            target.active = active;
        }
        if let Some(description) = self.description {
            target.description = description;
        }
        if let Some(url) = self.url {
            target.url = url;
        }
        if let Some(days) = self.reminder_days {
            target.reminder_days = days;
        }
    }
}

/// UI colour theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Auto,
}

/// Interface language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Ru,
    En,
    Uk,
}

/// Application settings. Missing fields take their defaults on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: Theme,
    pub language: Language,
    pub currency: String,
    pub notifications: bool,
    pub first_launch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            language: Language::Ru,
            currency: "UAH".to_string(),
            notifications: true,
            first_launch: true,
        }
    }
}

/// Partial settings update, also used to merge imported settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub language: Option<Language>,
    pub currency: Option<String>,
    pub notifications: Option<bool>,
    pub first_launch: Option<bool>,
}

impl SettingsPatch {
    pub fn apply(self, target: &mut Settings) {
        if let Some(theme) = self.theme {
            target.theme = theme;
        }
        if let Some(language) = self.language {
            target.language = language;
        }
        if let Some(currency) = self.currency {
            target.currency = currency;
        }
        if let Some(notifications) = self.notifications {
            target.notifications = notifications;
        }
        if let Some(first_launch) = self.first_launch {
            target.first_launch = first_launch;
        }
    }
}

/// Generate a fresh subscription id.
pub fn generate_id() -> String {
    format!("sub_{}", Uuid::new_v4().simple())
}

/// Next payment one billing period after `from`, clamped to month end.
pub fn calculate_next_payment(period: Period, from: NaiveDate) -> NaiveDate {
    let months = match period {
        Period::Monthly => Months::new(1),
        Period::Yearly => Months::new(12),
    };
    from.checked_add_months(months).unwrap_or(from)
}

/// A timestamp strictly later than `previous`, normally just "now".
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_normalisation() {
        assert_eq!(Period::Monthly.yearly_amount(dec!(10)), dec!(120));
        assert_eq!(Period::Yearly.monthly_amount(dec!(120)), dec!(10));
        assert_eq!(Period::Yearly.yearly_amount(dec!(120)), dec!(120));
    }

    #[test]
    fn next_payment_clamps_to_month_end() {
        assert_eq!(calculate_next_payment(Period::Monthly, date(2026, 1, 31)), date(2026, 2, 28));
        assert_eq!(calculate_next_payment(Period::Yearly, date(2024, 2, 29)), date(2025, 2, 28));
        assert_eq!(calculate_next_payment(Period::Monthly, date(2026, 12, 15)), date(2027, 1, 15));
    }

    #[test]
    fn unknown_category_falls_back_to_other() {
        let parsed: Category = serde_json::from_str("\"gaming\"").unwrap();
        assert_eq!(parsed, Category::Other);
        let parsed: Category = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(parsed, Category::Video);
    }

    #[test]
    fn settings_defaults_fill_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"theme":"dark"}"#).unwrap();
        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.language, Language::Ru);
        assert_eq!(settings.currency, "UAH");
        assert!(settings.notifications);
        assert!(settings.first_launch);
    }

    #[test]
    fn subscription_serializes_camel_case_with_numeric_price() {
        let now = Utc::now();
        let sub = Subscription {
            id: "sub_1".into(),
            name: "Netflix".into(),
            price: dec!(249),
            currency: "UAH".into(),
            period: Period::Monthly,
            next_payment: date(2026, 10, 21),
            category: Category::Video,
            active: true,
            created_at: now,
            updated_at: now,
            description: String::new(),
            url: String::new(),
            reminder_days: 3,
        };
        let json = serde_json::to_value(&sub).unwrap();
        assert!(json["price"].is_number());
        assert_eq!(json["nextPayment"], "2026-10-21");
        assert_eq!(json["reminderDays"], 3);
        let back: Subscription = serde_json::from_value(json).unwrap();
        assert_eq!(back, sub);
    }

    #[test]
    fn patch_leaves_unset_fields() {
        let now = Utc::now();
        let mut sub = Subscription {
            id: "sub_1".into(),
            name: "Spotify".into(),
            price: dec!(99),
            currency: "UAH".into(),
            period: Period::Monthly,
            next_payment: date(2026, 11, 1),
            category: Category::Music,
            active: true,
            created_at: now,
            updated_at: now,
            description: "family".into(),
            url: String::new(),
            reminder_days: 3,
        };
        SubscriptionPatch {
            price: Some(dec!(129)),
            ..Default::default()
        }
        .apply(&mut sub);
        assert_eq!(sub.price, dec!(129));
        assert_eq!(sub.name, "Spotify");
        assert_eq!(sub.description, "family");
    }

    #[test]
    fn next_timestamp_strictly_increases() {
        let future = Utc::now() + chrono::Duration::hours(1);
        let next = next_timestamp(future);
        assert!(next > future);
        let past = Utc::now() - chrono::Duration::hours(1);
        assert!(next_timestamp(past) > past);
    }
}
