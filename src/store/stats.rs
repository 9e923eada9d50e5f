//! Derived statistics. Never persisted, recomputed on every query.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::model::{Category, Subscription};

/// Default horizon for the upcoming-payments list.
pub const DEFAULT_UPCOMING_DAYS: i64 = 30;

/// Longest horizon honoured; larger values are clamped.
pub const MAX_UPCOMING_DAYS: i64 = 3660;

/// Count and monthly-normalised total for one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub count: usize,
    pub total: Decimal,
}

/// Point-in-time statistics over the subscription collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub monthly_total: Decimal,
    pub yearly_total: Decimal,
    pub active_count: usize,
    pub archived_count: usize,
    pub total_count: usize,
    pub average_monthly_price: Decimal,
    pub category_breakdown: BTreeMap<Category, CategoryTotal>,
    /// Active subscriptions due within the horizon, earliest first.
    pub upcoming_payments: Vec<Subscription>,
}

impl Statistics {
    /// The all-zero snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compute statistics for `records` as of `today`.
    pub fn compute(records: &[Subscription], today: NaiveDate, upcoming_days: i64) -> Self {
        let active: Vec<&Subscription> = records.iter().filter(|s| s.active).collect();

        let monthly_total: Decimal = active.iter().map(|s| s.monthly_amount()).sum();
        let yearly_total: Decimal = active.iter().map(|s| s.yearly_amount()).sum();

        let mut category_breakdown: BTreeMap<Category, CategoryTotal> = BTreeMap::new();
        for sub in &active {
            let entry = category_breakdown.entry(sub.category).or_default();
            entry.count += 1;
            entry.total += sub.monthly_amount();
        }

        let average_monthly_price = if active.is_empty() {
            Decimal::ZERO
        } else {
            monthly_total / Decimal::from(active.len())
        };

        Self {
            monthly_total,
            yearly_total,
            active_count: active.len(),
            archived_count: records.len() - active.len(),
            total_count: records.len(),
            average_monthly_price,
            category_breakdown,
            upcoming_payments: upcoming_payments(&active, today, upcoming_days),
        }
    }
}

/// Subscriptions whose next payment falls in `[today, today + days]`, ascending.
///
/// `days` is clamped to `0..=MAX_UPCOMING_DAYS`.
pub fn upcoming_payments(records: &[&Subscription], today: NaiveDate, days: i64) -> Vec<Subscription> {
    let days = days.clamp(0, MAX_UPCOMING_DAYS) as u64;
    let horizon = today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);
    let mut upcoming: Vec<Subscription> = records
        .iter()
        .filter(|s| s.next_payment >= today && s.next_payment <= horizon)
        .map(|s| (*s).clone())
        .collect();
    upcoming.sort_by_key(|s| s.next_payment);
    upcoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::Period;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn sub(id: &str, price: Decimal, period: Period, category: Category, due_in: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: id.into(),
            name: id.into(),
            price,
            currency: "UAH".into(),
            period,
            next_payment: today() + Duration::days(due_in),
            category,
            active: true,
            created_at: now,
            updated_at: now,
            description: String::new(),
            url: String::new(),
            reminder_days: 3,
        }
    }

    #[test]
    fn empty_collection_is_all_zero() {
        let stats = Statistics::compute(&[], today(), DEFAULT_UPCOMING_DAYS);
        assert_eq!(stats, Statistics::empty());
        assert_eq!(stats.monthly_total, Decimal::ZERO);
        assert!(stats.upcoming_payments.is_empty());
    }

    #[test]
    fn all_monthly_yearly_is_twelve_times_monthly() {
        let records = vec![
            sub("a", dec!(249), Period::Monthly, Category::Video, 5),
            sub("b", dec!(99.99), Period::Monthly, Category::Music, 10),
            sub("c", dec!(0), Period::Monthly, Category::Other, 40),
        ];
        let stats = Statistics::compute(&records, today(), DEFAULT_UPCOMING_DAYS);
        assert_eq!(stats.monthly_total * dec!(12), stats.yearly_total);
    }

    #[test]
    fn all_yearly_monthly_is_twelfth_within_tolerance() {
        let records = vec![
            sub("a", dec!(1000), Period::Yearly, Category::Cloud, 5),
            sub("b", dec!(333), Period::Yearly, Category::News, 10),
        ];
        let stats = Statistics::compute(&records, today(), DEFAULT_UPCOMING_DAYS);
        let diff = (stats.monthly_total * dec!(12) - stats.yearly_total).abs();
        assert!(diff < dec!(0.000001), "diff was {diff}");
        assert_eq!(stats.yearly_total, dec!(1333));
    }

    #[test]
    fn archived_records_only_count() {
        let mut archived = sub("x", dec!(500), Period::Monthly, Category::Video, 1);
        archived.active = false;
        let records = vec![sub("a", dec!(100), Period::Monthly, Category::Video, 1), archived];
        let stats = Statistics::compute(&records, today(), DEFAULT_UPCOMING_DAYS);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.archived_count, 1);
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.monthly_total, dec!(100));
        assert_eq!(stats.upcoming_payments.len(), 1);
        assert_eq!(stats.upcoming_payments[0].id, "a");
    }

    #[test]
    fn category_breakdown_groups_monthly_amounts() {
        let records = vec![
            sub("a", dec!(100), Period::Monthly, Category::Video, 1),
            sub("b", dec!(1200), Period::Yearly, Category::Video, 1),
            sub("c", dec!(50), Period::Monthly, Category::Music, 1),
        ];
        let stats = Statistics::compute(&records, today(), DEFAULT_UPCOMING_DAYS);
        let video = &stats.category_breakdown[&Category::Video];
        assert_eq!(video.count, 2);
        assert_eq!(video.total, dec!(200));
        assert_eq!(stats.category_breakdown[&Category::Music].count, 1);
        assert_eq!(stats.average_monthly_price, dec!(250) / dec!(3));
    }

    #[test]
    fn upcoming_respects_horizon_and_orders_by_date() {
        let records = vec![
            sub("later", dec!(1), Period::Monthly, Category::Other, 20),
            sub("overdue", dec!(1), Period::Monthly, Category::Other, -1),
            sub("today", dec!(1), Period::Monthly, Category::Other, 0),
            sub("far", dec!(1), Period::Monthly, Category::Other, 31),
            sub("soon", dec!(1), Period::Monthly, Category::Other, 2),
        ];
        let stats = Statistics::compute(&records, today(), 30);
        let ids: Vec<&str> = stats.upcoming_payments.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["today", "soon", "later"]);

        let short = Statistics::compute(&records, today(), 3);
        assert_eq!(short.upcoming_payments.len(), 2);
    }

    #[test]
    fn oversized_horizon_is_clamped() {
        let records = vec![
            sub("soon", dec!(1), Period::Monthly, Category::Other, 2),
            sub("decade", dec!(1), Period::Yearly, Category::Other, 5000),
        ];
        let stats = Statistics::compute(&records, today(), i64::MAX);
        let ids: Vec<&str> = stats.upcoming_payments.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["soon"]);

        let none = Statistics::compute(&records, today(), i64::MIN);
        assert!(none.upcoming_payments.is_empty());
    }
}
