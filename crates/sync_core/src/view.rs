use std::cmp::Ordering;

use shared::domain::Record;

use crate::{
    lifecycle::{StatusCounts, StatusLifecycle},
    model::{Integration, Order},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(String),
}

impl StatusFilter {
    /// `"all"` (any case) or a blank value selects every status.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Only(raw.to_string())
        }
    }

    pub fn matches(&self, status: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(expected) => expected == status,
        }
    }
}

/// Consumer-owned filter parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub status: StatusFilter,
    pub search: String,
}

impl FilterState {
    pub fn new(status: StatusFilter, search: impl Into<String>) -> Self {
        Self {
            status,
            search: search.into(),
        }
    }
}

/// Filters, searches and sorts cached order records. Pure: same inputs, same output.
pub fn compose_orders<'a, I>(
    records: I,
    lifecycle: &StatusLifecycle,
    filter: &FilterState,
) -> Vec<Order>
where
    I: IntoIterator<Item = &'a Record>,
{
    // Whitespace-only means no search; any other term matches literally, spaces included.
    let needle = if filter.search.trim().is_empty() {
        String::new()
    } else {
        filter.search.to_lowercase()
    };
    let mut orders: Vec<Order> = records
        .into_iter()
        .map(|record| Order::from_record(record, lifecycle))
        .filter(|order| filter.status.matches(&order.status))
        .filter(|order| needle.is_empty() || matches_search(order, &needle))
        .collect();
    orders.sort_by(newest_first);
    orders
}

fn matches_search(order: &Order, needle: &str) -> bool {
    order
        .searchable_fields()
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(needle))
}

/// Most recent first; undated orders last; id breaks ties.
fn newest_first(a: &Order, b: &Order) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

pub fn count_statuses<'a, I>(records: I, lifecycle: &StatusLifecycle) -> StatusCounts
where
    I: IntoIterator<Item = &'a Record>,
{
    lifecycle.count(
        records
            .into_iter()
            .map(|record| record.str_field(shared::domain::field::STATUS).unwrap_or_default()),
    )
}

pub fn list_integrations<'a, I>(records: I) -> Vec<Integration>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut integrations: Vec<Integration> =
        records.into_iter().map(Integration::from_record).collect();
    integrations.sort_by(|a, b| a.label().cmp(b.label()).then_with(|| a.id.cmp(&b.id)));
    integrations
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
