//! Search, filtering and ordering over subscription lists.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::model::{Category, Subscription};

/// Optional restrictions applied on top of a text search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Only records whose active flag equals this.
    pub active: Option<bool>,
    /// Only records in this category.
    pub category: Option<Category>,
}

impl QueryFilter {
    pub fn active_only() -> Self {
        Self {
            active: Some(true),
            category: None,
        }
    }

    fn accepts(&self, sub: &Subscription) -> bool {
        self.active.is_none_or(|active| sub.active == active)
            && self.category.is_none_or(|category| sub.category == category)
    }
}

/// Field to order subscriptions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Name,
    Price,
    NextPayment,
    CreatedAt,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Case-insensitive substring match over name, description and category.
///
/// An empty query matches everything. Result order follows `records` and
/// carries no meaning; sort explicitly.
pub fn search(records: &[Subscription], text: &str, filter: QueryFilter) -> Vec<Subscription> {
    let needle = text.trim().to_lowercase();
    records
        .iter()
        .filter(|sub| filter.accepts(sub))
        .filter(|sub| {
            needle.is_empty()
                || sub.name.to_lowercase().contains(&needle)
                || sub.description.to_lowercase().contains(&needle)
                || sub.category.as_str().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Stable sort: records comparing equal keep their relative order in both directions.
pub fn sort(records: &[Subscription], field: SortField, order: SortOrder) -> Vec<Subscription> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        let ord = compare(a, b, field);
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    sorted
}

fn compare(a: &Subscription, b: &Subscription, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortField::Price => a.price.cmp(&b.price),
        SortField::NextPayment => a.next_payment.cmp(&b.next_payment),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}
