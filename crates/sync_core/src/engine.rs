use std::{sync::Arc, time::Duration};

use shared::domain::{CollectionPath, RecordId};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
    time::{timeout_at, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    config::{CollectionConfig, EngineConfig},
    error::EngineError,
    events::{CollectionKind, EngineEvent},
    gateway::{MutationContext, MutationGateway},
    lifecycle::{StatusCounts, StatusLifecycle},
    model::{ConfirmedDelete, Integration, Order, OrderDraft},
    session::SessionState,
    subscription::{CollectionSubscription, SubscriptionState},
    view::{compose_orders, count_statuses, list_integrations, FilterState},
    RemoteStore,
};

/// Coarse health of synchronization, for a status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Session not ready, nothing subscribable, or every subscription failed before any data.
    Unavailable,
    Synchronizing,
    Synchronized,
    /// At least one subscription is failing; last good data is still served.
    Degraded,
}

/// Current session plus a counter bumped on every transition. Held only long
/// enough to copy out; never across a store call.
#[derive(Debug)]
struct SessionSlot {
    state: SessionState,
    epoch: u64,
}

/// Keeps the order and integration caches in sync with the remote store and
/// exposes the derived view and mutation operations.
pub struct SyncEngine {
    config: EngineConfig,
    deployment_id: String,
    store: Arc<dyn RemoteStore>,
    lifecycle: Arc<StatusLifecycle>,
    gateway: MutationGateway,
    session: Mutex<SessionSlot>,
    orders: CollectionSubscription,
    integrations: CollectionSubscription,
    events: broadcast::Sender<EngineEvent>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn RemoteStore>) -> Result<Arc<Self>, EngineError> {
        let deployment_id = config.resolve_deployment_id()?;
        let lifecycle = StatusLifecycle::from_config(&config.lifecycle)
            .map_err(|err| EngineError::unavailable(format!("invalid status lifecycle: {err}")))?;
        let lifecycle = Arc::new(lifecycle);
        let (events, _) = broadcast::channel(1024);

        info!(
            deployment_id = %deployment_id,
            orders = %config.orders.name,
            integrations = %config.integrations.name,
            "engine: initialized"
        );

        Ok(Arc::new(Self {
            gateway: MutationGateway::new(Arc::clone(&store), Arc::clone(&lifecycle)),
            orders: CollectionSubscription::new(CollectionKind::Orders, events.clone()),
            integrations: CollectionSubscription::new(
                CollectionKind::Integrations,
                events.clone(),
            ),
            session: Mutex::new(SessionSlot {
                state: SessionState::pending(),
                epoch: 0,
            }),
            config,
            deployment_id,
            store,
            lifecycle,
            events,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn lifecycle(&self) -> &StatusLifecycle {
        &self.lifecycle
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Invokes `callback` after every applied snapshot until the engine is dropped.
    pub fn on_cache_changed<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(CollectionKind, u64) + Send + 'static,
    {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(EngineEvent::CacheChanged {
                        collection,
                        version,
                        ..
                    }) => callback(collection, version),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "engine: cache listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Reconciles every collection subscription with `next`. Re-applying the same
    /// session leaves live subscriptions untouched and re-attaches any whose stream
    /// has ended. Collections are reconciled concurrently.
    pub async fn apply_session(&self, next: SessionState) -> Result<(), EngineError> {
        if !next.ready {
            info!("engine: session not ready; synchronization paused");
        }
        let (epoch, orders, integrations) = {
            let mut session = self.session.lock().await;
            session.epoch += 1;
            session.state = next;
            (
                session.epoch,
                self.resolve_path(CollectionKind::Orders, &session.state),
                self.resolve_path(CollectionKind::Integrations, &session.state),
            )
        };
        self.reconcile_all(epoch, orders, integrations).await
    }

    /// Follows a session gate until its sender is dropped.
    pub fn attach_session_gate(
        self: &Arc<Self>,
        mut gate: watch::Receiver<SessionState>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let next = gate.borrow_and_update().clone();
                if let Err(err) = engine.apply_session(next).await {
                    warn!(%err, "engine: session transition left a collection unsynchronized");
                }
                if gate.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub async fn shutdown(&self) {
        let epoch = {
            let mut session = self.session.lock().await;
            session.epoch += 1;
            session.state = SessionState::pending();
            session.epoch
        };
        // Teardown cannot fail.
        let _ = self.reconcile_all(epoch, None, None).await;
        info!("engine: shut down");
    }

    async fn reconcile_all(
        &self,
        epoch: u64,
        orders: Option<CollectionPath>,
        integrations: Option<CollectionPath>,
    ) -> Result<(), EngineError> {
        let (orders, integrations) = tokio::join!(
            self.orders.reconcile(&self.store, orders, epoch),
            self.integrations.reconcile(&self.store, integrations, epoch),
        );
        orders.and(integrations)
    }

    fn slot(&self, kind: CollectionKind) -> &CollectionSubscription {
        match kind {
            CollectionKind::Orders => &self.orders,
            CollectionKind::Integrations => &self.integrations,
        }
    }

    fn collection_config(&self, kind: CollectionKind) -> &CollectionConfig {
        match kind {
            CollectionKind::Orders => &self.config.orders,
            CollectionKind::Integrations => &self.config.integrations,
        }
    }

    fn resolve_path(&self, kind: CollectionKind, session: &SessionState) -> Option<CollectionPath> {
        if !session.ready {
            return None;
        }
        self.collection_config(kind)
            .resolve_path(&self.deployment_id, session.actor_id.as_ref())
    }

    async fn session(&self) -> SessionState {
        self.session.lock().await.state.clone()
    }

    async fn mutation_context(&self, kind: CollectionKind) -> MutationContext {
        let session = self.session().await;
        MutationContext {
            path: self.resolve_path(kind, &session),
            session_ready: session.ready,
            actor_id: session.actor_id,
        }
    }

    pub async fn collection_state(&self, kind: CollectionKind) -> SubscriptionState {
        self.slot(kind).read(|slot| slot.state().clone()).await
    }

    pub async fn cache_version(&self, kind: CollectionKind) -> u64 {
        self.slot(kind).read(|slot| slot.cache().version()).await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        let session = self.session().await;
        let mut relevant = 0;
        let mut failed = 0;
        let mut degraded = false;
        let mut pending = false;

        for kind in CollectionKind::ALL {
            if self.resolve_path(kind, &session).is_none() {
                continue;
            }
            relevant += 1;
            let (state, has_synced) = self
                .slot(kind)
                .read(|slot| (slot.state().clone(), slot.cache().has_synced()))
                .await;
            match state {
                SubscriptionState::Subscribed => {}
                SubscriptionState::Subscribing | SubscriptionState::Unsubscribed => pending = true,
                SubscriptionState::Error(_) if has_synced => degraded = true,
                SubscriptionState::Error(_) => failed += 1,
            }
        }

        if relevant == 0 || failed == relevant {
            SyncStatus::Unavailable
        } else if degraded || failed > 0 {
            SyncStatus::Degraded
        } else if pending {
            SyncStatus::Synchronizing
        } else {
            SyncStatus::Synchronized
        }
    }

    /// Waits until every collection in `kinds` has applied at least one snapshot.
    pub async fn wait_until_synced(
        &self,
        kinds: &[CollectionKind],
        limit: Duration,
    ) -> Result<(), EngineError> {
        let deadline = Instant::now() + limit;
        let mut rx = self.events.subscribe();
        loop {
            let mut all_synced = true;
            for kind in kinds {
                let synced = self
                    .slot(*kind)
                    .read(|slot| slot.cache().has_synced())
                    .await;
                all_synced &= synced;
            }
            if all_synced {
                return Ok(());
            }

            match timeout_at(deadline, rx.recv()).await {
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                    return Err(EngineError::unavailable(format!(
                        "collections did not synchronize within {}ms",
                        limit.as_millis()
                    )));
                }
            }
        }
    }

    /// Derived order view for the given filter. Recomputed from scratch on every call.
    pub async fn get_view(&self, filter: &FilterState) -> Vec<Order> {
        let lifecycle = &self.lifecycle;
        self.orders
            .read(|slot| compose_orders(slot.cache().records(), lifecycle, filter))
            .await
    }

    pub async fn status_counts(&self) -> StatusCounts {
        let lifecycle = &self.lifecycle;
        self.orders
            .read(|slot| count_statuses(slot.cache().records(), lifecycle))
            .await
    }

    pub async fn integrations(&self) -> Vec<Integration> {
        self.integrations
            .read(|slot| list_integrations(slot.cache().records()))
            .await
    }

    pub async fn create_order(&self, draft: OrderDraft) -> Result<RecordId, EngineError> {
        let ctx = self.mutation_context(CollectionKind::Orders).await;
        let integration_count = self
            .integrations
            .read(|slot| slot.cache().len())
            .await;
        self.gateway.create(&ctx, draft, integration_count).await
    }

    pub async fn advance_order_status(
        &self,
        id: &RecordId,
        target: &str,
    ) -> Result<(), EngineError> {
        let ctx = self.mutation_context(CollectionKind::Orders).await;
        ctx.require_path()?;

        let lifecycle = &self.lifecycle;
        let current = self
            .orders
            .read(|slot| {
                slot.cache()
                    .get(id)
                    .map(|record| Order::from_record(record, lifecycle).status)
            })
            .await
            .ok_or_else(|| {
                EngineError::rejected(format!("order {id} is not in the synchronized view"))
            })?;
        self.gateway.advance_status(&ctx, id, &current, target).await
    }

    pub async fn delete_order(&self, intent: ConfirmedDelete) -> Result<(), EngineError> {
        let ctx = self.mutation_context(CollectionKind::Orders).await;
        self.gateway.remove(&ctx, intent).await
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
