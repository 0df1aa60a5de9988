use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::domain::{field, ActorId, Record, RecordId};

use crate::lifecycle::StatusLifecycle;

/// Typed reading of an order document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: RecordId,
    pub order_id: Option<String>,
    pub customer_name: Option<String>,
    pub item: Option<String>,
    pub amount: Option<f64>,
    pub marketplace: Option<String>,
    /// Always a member of the lifecycle's state set.
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub created_by: Option<ActorId>,
    pub updated_by: Option<ActorId>,
}

impl Order {
    pub fn from_record(record: &Record, lifecycle: &StatusLifecycle) -> Self {
        let text = |key: &str| record.str_field(key).map(str::to_string);
        let actor = |key: &str| record.str_field(key).map(ActorId::new);
        Self {
            id: record.id.clone(),
            order_id: text(field::ORDER_ID),
            customer_name: text(field::CUSTOMER_NAME),
            item: text(field::ITEM),
            amount: record.f64_field(field::AMOUNT),
            marketplace: text(field::MARKETPLACE),
            status: lifecycle
                .normalize(record.str_field(field::STATUS))
                .to_string(),
            created_at: record.created_at(),
            updated_at: record.updated_at(),
            created_by: actor(field::CREATED_BY),
            updated_by: actor(field::UPDATED_BY),
        }
    }

    /// Values consulted by free-text search: order identifier, customer, marketplace.
    pub fn searchable_fields(&self) -> [Option<&str>; 3] {
        [
            self.order_id.as_deref(),
            self.customer_name.as_deref(),
            self.marketplace.as_deref(),
        ]
    }
}

/// A linked marketplace. Read-only for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Integration {
    pub id: RecordId,
    pub name: Option<String>,
    pub platform: Option<String>,
}

impl Integration {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.str_field(field::NAME).map(str::to_string),
            platform: record.str_field(field::PLATFORM).map(str::to_string),
        }
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Caller input for a new order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderDraft {
    pub order_id: Option<String>,
    pub customer_name: String,
    pub item: String,
    pub amount: Option<f64>,
    pub marketplace: Option<String>,
}

impl OrderDraft {
    pub fn new(customer_name: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            customer_name: customer_name.into(),
            item: item.into(),
            ..Self::default()
        }
    }
}

/// A delete the consumer has already confirmed with the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedDelete {
    id: RecordId,
}

impl ConfirmedDelete {
    pub fn new(id: RecordId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }
}
