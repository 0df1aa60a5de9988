use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use shared::domain::{field, ActorId, CollectionPath, Fields, RecordId};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::EngineError,
    lifecycle::StatusLifecycle,
    model::{ConfirmedDelete, OrderDraft},
    RemoteStore,
};

/// Preconditions gathered by the caller at the moment a mutation is requested.
#[derive(Debug, Clone, Default)]
pub struct MutationContext {
    pub session_ready: bool,
    pub actor_id: Option<ActorId>,
    /// Resolved path of the collection owning the record, if any.
    pub path: Option<CollectionPath>,
}

impl MutationContext {
    pub fn require_path(&self) -> Result<&CollectionPath, EngineError> {
        if !self.session_ready {
            return Err(EngineError::unavailable("session is not ready"));
        }
        self.path
            .as_ref()
            .ok_or_else(|| EngineError::unavailable("collection path cannot be resolved"))
    }

    fn actor_value(&self) -> Value {
        self.actor_id
            .as_ref()
            .map(|actor| Value::String(actor.to_string()))
            .unwrap_or(Value::Null)
    }
}

/// Validates and forwards order writes. Never touches the local cache: results are
/// observed through the subscription like any other remote change.
pub struct MutationGateway {
    store: Arc<dyn RemoteStore>,
    lifecycle: Arc<StatusLifecycle>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn RemoteStore>, lifecycle: Arc<StatusLifecycle>) -> Self {
        Self { store, lifecycle }
    }

    pub async fn create(
        &self,
        ctx: &MutationContext,
        draft: OrderDraft,
        integration_count: usize,
    ) -> Result<RecordId, EngineError> {
        let path = ctx.require_path()?;
        if integration_count == 0 {
            return Err(EngineError::rejected(
                "link at least one marketplace integration before creating orders",
            ));
        }
        let fields = self.stamp_new_order(ctx, draft)?;

        match self.store.create(path, fields).await {
            Ok(id) => {
                info!(%path, %id, "gateway: order created");
                Ok(id)
            }
            Err(error) => {
                warn!(%path, %error, "gateway: create rejected by store");
                Err(EngineError::MutationFailed(error))
            }
        }
    }

    /// `current_status` is the order's status as currently cached.
    pub async fn advance_status(
        &self,
        ctx: &MutationContext,
        id: &RecordId,
        current_status: &str,
        target: &str,
    ) -> Result<(), EngineError> {
        let path = ctx.require_path()?;
        self.lifecycle.check_transition(current_status, target)?;

        let mut patch = Fields::new();
        patch.insert(field::STATUS.to_string(), json!(target));
        patch.insert(field::UPDATED_AT.to_string(), json!(Utc::now().to_rfc3339()));
        patch.insert(field::UPDATED_BY.to_string(), ctx.actor_value());

        match self.store.update(path, id, patch).await {
            Ok(()) => {
                info!(%path, %id, from = current_status, to = target, "gateway: status advanced");
                Ok(())
            }
            Err(error) => {
                warn!(%path, %id, %error, "gateway: status update rejected by store");
                Err(EngineError::MutationFailed(error))
            }
        }
    }

    pub async fn remove(
        &self,
        ctx: &MutationContext,
        intent: ConfirmedDelete,
    ) -> Result<(), EngineError> {
        let path = ctx.require_path()?;
        let id = intent.id();
        match self.store.remove(path, id).await {
            Ok(()) => {
                info!(%path, %id, "gateway: order deleted");
                Ok(())
            }
            Err(error) => {
                warn!(%path, %id, %error, "gateway: delete rejected by store");
                Err(EngineError::MutationFailed(error))
            }
        }
    }

    fn stamp_new_order(
        &self,
        ctx: &MutationContext,
        draft: OrderDraft,
    ) -> Result<Fields, EngineError> {
        let customer_name = draft.customer_name.trim();
        if customer_name.is_empty() {
            return Err(EngineError::rejected("customer name is required"));
        }
        let item = draft.item.trim();
        if item.is_empty() {
            return Err(EngineError::rejected("item is required"));
        }
        if let Some(amount) = draft.amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(EngineError::rejected(format!(
                    "amount must be a non-negative number, got {amount}"
                )));
            }
        }

        let order_id = draft
            .order_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_order_id);
        let now = json!(Utc::now().to_rfc3339());
        let actor = ctx.actor_value();

        let mut fields = Fields::new();
        fields.insert(field::ORDER_ID.to_string(), json!(order_id));
        fields.insert(field::CUSTOMER_NAME.to_string(), json!(customer_name));
        fields.insert(field::ITEM.to_string(), json!(item));
        if let Some(amount) = draft.amount {
            fields.insert(field::AMOUNT.to_string(), json!(amount));
        }
        if let Some(marketplace) = draft
            .marketplace
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            fields.insert(field::MARKETPLACE.to_string(), json!(marketplace));
        }
        fields.insert(field::STATUS.to_string(), json!(self.lifecycle.initial()));
        fields.insert(field::CREATED_AT.to_string(), now.clone());
        fields.insert(field::UPDATED_AT.to_string(), now);
        fields.insert(field::CREATED_BY.to_string(), actor.clone());
        fields.insert(field::UPDATED_BY.to_string(), actor);
        Ok(fields)
    }
}

fn generate_order_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", raw[..8].to_ascii_uppercase())
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
