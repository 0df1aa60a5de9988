use std::sync::Arc;

use shared::{domain::CollectionPath, error::StoreError};
use tokio::{
    sync::{broadcast, mpsc, Mutex, MutexGuard, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    cache::CollectionCache,
    error::EngineError,
    events::{CollectionKind, EngineEvent},
    AdapterSubscription, Delivery, DeliverySink, RemoteStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    /// Listener attached, first snapshot not yet received.
    Subscribing,
    Subscribed,
    /// The store reported a failure; any cached records are kept.
    Error(StoreError),
}

/// Cache plus lifecycle bookkeeping; written only under the `RwLock`.
#[derive(Debug)]
pub(crate) struct SlotShared {
    generation: u64,
    state: SubscriptionState,
    cache: CollectionCache,
    /// The store closed the delivery stream; the listener must be attached again.
    stale: bool,
}

impl SlotShared {
    pub(crate) fn state(&self) -> &SubscriptionState {
        &self.state
    }

    pub(crate) fn cache(&self) -> &CollectionCache {
        &self.cache
    }

    pub(crate) fn needs_reattach(&self) -> bool {
        self.stale
    }
}

struct ActiveSubscription {
    path: CollectionPath,
    generation: u64,
    /// `None` while the store's subscribe call is still outstanding.
    adapter: Option<AdapterSubscription>,
    task: JoinHandle<()>,
}

struct SlotControl {
    active: Option<ActiveSubscription>,
    /// Latest session epoch reconciled; requests from older epochs are ignored.
    epoch: u64,
}

/// Owns one collection's cache and the listener feeding it.
pub(crate) struct CollectionSubscription {
    kind: CollectionKind,
    shared: Arc<RwLock<SlotShared>>,
    control: Mutex<SlotControl>,
    events: broadcast::Sender<EngineEvent>,
}

impl CollectionSubscription {
    pub(crate) fn new(kind: CollectionKind, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            kind,
            shared: Arc::new(RwLock::new(SlotShared {
                generation: 0,
                state: SubscriptionState::Unsubscribed,
                cache: CollectionCache::default(),
                stale: false,
            })),
            control: Mutex::new(SlotControl {
                active: None,
                epoch: 0,
            }),
            events,
        }
    }

    #[cfg(test)]
    pub(crate) async fn current_path(&self) -> Option<CollectionPath> {
        self.control
            .lock()
            .await
            .active
            .as_ref()
            .map(|active| active.path.clone())
    }

    pub(crate) async fn read<R>(&self, f: impl FnOnce(&SlotShared) -> R) -> R {
        let guard = self.shared.read().await;
        f(&guard)
    }

    /// Brings the slot in line with `desired` for session `epoch`. A live listener on
    /// the same path is left alone; a stale one is attached again.
    pub(crate) async fn reconcile(
        &self,
        store: &Arc<dyn RemoteStore>,
        desired: Option<CollectionPath>,
        epoch: u64,
    ) -> Result<(), EngineError> {
        let mut control = self.control.lock().await;
        if epoch < control.epoch {
            debug!(collection = %self.kind, epoch, latest = control.epoch, "sync: ignoring superseded session transition");
            return Ok(());
        }
        control.epoch = epoch;

        match desired {
            Some(path) => {
                let same_path = control
                    .active
                    .as_ref()
                    .is_some_and(|active| active.path == path);
                if same_path && !self.shared.read().await.needs_reattach() {
                    return Ok(());
                }
                self.attach(control, store, path).await
            }
            None => {
                self.teardown(&mut control.active).await;
                Ok(())
            }
        }
    }

    /// Tears down any existing listener, then attaches a fresh one with an empty cache.
    pub(crate) async fn subscribe(
        &self,
        store: &Arc<dyn RemoteStore>,
        path: CollectionPath,
    ) -> Result<(), EngineError> {
        let control = self.control.lock().await;
        self.attach(control, store, path).await
    }

    /// Detaches the listener and discards the cache. Safe to call repeatedly.
    pub(crate) async fn unsubscribe(&self) {
        let mut control = self.control.lock().await;
        self.teardown(&mut control.active).await;
    }

    /// The control lock is released while the store's subscribe call is outstanding,
    /// so a hanging store never blocks teardown or a later transition.
    async fn attach(
        &self,
        mut control: MutexGuard<'_, SlotControl>,
        store: &Arc<dyn RemoteStore>,
        path: CollectionPath,
    ) -> Result<(), EngineError> {
        // Re-attaching to the same path keeps the last known records until the next snapshot.
        let resume = control
            .active
            .as_ref()
            .is_some_and(|active| active.path == path);
        if resume {
            self.detach(&mut control.active);
        } else {
            self.teardown(&mut control.active).await;
        }

        let generation = {
            let mut shared = self.shared.write().await;
            shared.generation += 1;
            shared.stale = false;
            if !resume {
                shared.cache = CollectionCache::new(path.clone());
                shared.state = SubscriptionState::Subscribing;
            }
            shared.generation
        };
        if !resume {
            self.emit_state(SubscriptionState::Subscribing);
        }
        debug!(collection = %self.kind, %path, generation, resume, "sync: subscribing");

        let (sink, rx) = DeliverySink::channel();
        let task = tokio::spawn(run_delivery_loop(
            self.kind,
            path.clone(),
            generation,
            Arc::clone(&self.shared),
            rx,
            self.events.clone(),
        ));
        control.active = Some(ActiveSubscription {
            path: path.clone(),
            generation,
            adapter: None,
            task,
        });
        drop(control);

        let result = store.subscribe(&path, sink).await;

        let mut control = self.control.lock().await;
        let current = control
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        match result {
            Ok(mut adapter) if !current => {
                adapter.cancel();
                debug!(collection = %self.kind, %path, generation, "sync: discarding listener for superseded subscription");
                Ok(())
            }
            Ok(adapter) => {
                if let Some(active) = control.active.as_mut() {
                    active.adapter = Some(adapter);
                }
                info!(collection = %self.kind, %path, "sync: subscribed");
                Ok(())
            }
            Err(error) if !current => {
                debug!(collection = %self.kind, %path, %error, "sync: superseded subscribe failed");
                Ok(())
            }
            Err(error) => {
                if let Some(active) = control.active.take() {
                    active.task.abort();
                }
                {
                    let mut shared = self.shared.write().await;
                    if shared.generation == generation {
                        shared.state = SubscriptionState::Error(error.clone());
                        shared.cache.record_error(error.clone());
                    }
                }
                warn!(collection = %self.kind, %path, %error, "sync: subscribe failed");
                self.emit_state(SubscriptionState::Error(error.clone()));
                Err(EngineError::unavailable(format!(
                    "cannot subscribe to {path}: {error}"
                )))
            }
        }
    }

    fn detach(&self, active: &mut Option<ActiveSubscription>) {
        if let Some(mut subscription) = active.take() {
            subscription.task.abort();
            if let Some(adapter) = subscription.adapter.as_mut() {
                adapter.cancel();
            }
            info!(collection = %self.kind, path = %subscription.path, "sync: unsubscribed");
        }
    }

    async fn teardown(&self, active: &mut Option<ActiveSubscription>) {
        let previous = {
            let mut shared = self.shared.write().await;
            // Bumped under the write lock so a delivery already in flight sees a stale generation.
            shared.generation += 1;
            shared.stale = false;
            shared.cache = CollectionCache::default();
            std::mem::replace(&mut shared.state, SubscriptionState::Unsubscribed)
        };

        self.detach(active);

        if previous != SubscriptionState::Unsubscribed {
            self.emit_state(SubscriptionState::Unsubscribed);
        }
    }

    fn emit_state(&self, state: SubscriptionState) {
        let _ = self.events.send(EngineEvent::SubscriptionChanged {
            collection: self.kind,
            state,
        });
    }
}

async fn run_delivery_loop(
    kind: CollectionKind,
    path: CollectionPath,
    generation: u64,
    shared: Arc<RwLock<SlotShared>>,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    events: broadcast::Sender<EngineEvent>,
) {
    loop {
        let Some(delivery) = rx.recv().await else {
            mark_stream_ended(kind, &path, generation, &shared, &events).await;
            return;
        };
        let mut guard = shared.write().await;
        if guard.generation != generation {
            debug!(collection = %kind, generation, "sync: dropping delivery for superseded subscription");
            break;
        }

        match delivery {
            Delivery::Snapshot(records) => {
                let delta = guard.cache.apply_snapshot(records);
                let version = guard.cache.version();
                let entered = guard.state != SubscriptionState::Subscribed;
                guard.state = SubscriptionState::Subscribed;
                let size = guard.cache.len();
                drop(guard);

                debug!(
                    collection = %kind,
                    version,
                    size,
                    added = delta.added,
                    updated = delta.updated,
                    removed = delta.removed,
                    "sync: snapshot applied"
                );
                if entered {
                    let _ = events.send(EngineEvent::SubscriptionChanged {
                        collection: kind,
                        state: SubscriptionState::Subscribed,
                    });
                }
                let _ = events.send(EngineEvent::CacheChanged {
                    collection: kind,
                    version,
                    delta,
                });
            }
            Delivery::Error(error) => {
                guard.cache.record_error(error.clone());
                guard.state = SubscriptionState::Error(error.clone());
                let retained = guard.cache.len();
                drop(guard);

                warn!(
                    collection = %kind,
                    %error,
                    retained,
                    "sync: subscription reported error; keeping last known records"
                );
                let _ = events.send(EngineEvent::SyncWarning {
                    collection: kind,
                    error: EngineError::SyncError {
                        path: path.clone(),
                        source: error.clone(),
                    },
                });
                let _ = events.send(EngineEvent::SubscriptionChanged {
                    collection: kind,
                    state: SubscriptionState::Error(error),
                });
            }
        }
    }
}

/// The store dropped its sink. The slot keeps its records and is re-attached on the
/// next session transition.
async fn mark_stream_ended(
    kind: CollectionKind,
    path: &CollectionPath,
    generation: u64,
    shared: &RwLock<SlotShared>,
    events: &broadcast::Sender<EngineEvent>,
) {
    let mut guard = shared.write().await;
    if guard.generation != generation {
        return;
    }
    guard.stale = true;
    if guard.state != SubscriptionState::Subscribed {
        debug!(collection = %kind, %path, state = ?guard.state, "sync: delivery stream closed");
        return;
    }

    let error = StoreError::unavailable("subscription stream ended");
    guard.cache.record_error(error.clone());
    guard.state = SubscriptionState::Error(error.clone());
    let retained = guard.cache.len();
    drop(guard);

    warn!(
        collection = %kind,
        %path,
        retained,
        "sync: subscription stream ended; re-attaching on next session transition"
    );
    let _ = events.send(EngineEvent::SyncWarning {
        collection: kind,
        error: EngineError::SyncError {
            path: path.clone(),
            source: error.clone(),
        },
    });
    let _ = events.send(EngineEvent::SubscriptionChanged {
        collection: kind,
        state: SubscriptionState::Error(error),
    });
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
