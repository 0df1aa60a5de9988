use async_trait::async_trait;
use shared::{
    domain::{CollectionPath, Fields, Record, RecordId},
    error::StoreError,
};
use tokio::sync::mpsc;

/// Polls an async condition until it holds, failing the test after about a second.
#[cfg(test)]
macro_rules! eventually {
    ($cond:expr) => {{
        let mut held = false;
        for _ in 0..200 {
            if $cond {
                held = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(held, "condition never held: {}", stringify!($cond));
    }};
}

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http_store;
pub mod lifecycle;
pub mod memory;
pub mod model;
pub mod session;
mod subscription;
#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
pub mod view;

pub use cache::{CacheDelta, CollectionCache};
pub use config::{CollectionConfig, EngineConfig, StoreConfig, Visibility};
pub use engine::{SyncEngine, SyncStatus};
pub use error::EngineError;
pub use events::{CollectionKind, EngineEvent};
pub use gateway::{MutationContext, MutationGateway};
pub use http_store::HttpRemoteStore;
pub use lifecycle::{LifecycleConfig, LifecycleError, StatusCounts, StatusLifecycle};
pub use memory::{MemoryStore, StoreCall};
pub use model::{ConfirmedDelete, Integration, Order, OrderDraft};
pub use session::SessionState;
pub use subscription::SubscriptionState;
pub use view::{FilterState, StatusFilter};

/// One push from a live collection subscription.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Full current contents of the collection.
    Snapshot(Vec<Record>),
    Error(StoreError),
}

/// Producer half handed to an adapter on subscribe. Deliveries are consumed in send order.
#[derive(Debug, Clone)]
pub struct DeliverySink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl DeliverySink {
    pub fn new(tx: mpsc::UnboundedSender<Delivery>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once the consuming side is gone.
    pub fn snapshot(&self, records: Vec<Record>) -> bool {
        self.tx.send(Delivery::Snapshot(records)).is_ok()
    }

    pub fn error(&self, error: StoreError) -> bool {
        self.tx.send(Delivery::Error(error)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Detaches an adapter listener. Cancelling twice, or dropping after cancel, is a no-op.
pub struct AdapterSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl AdapterSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for AdapterSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for AdapterSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Contract of the remote document store the engine synchronizes against.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn subscribe(
        &self,
        path: &CollectionPath,
        sink: DeliverySink,
    ) -> Result<AdapterSubscription, StoreError>;
    async fn create(&self, path: &CollectionPath, fields: Fields) -> Result<RecordId, StoreError>;
    async fn update(
        &self,
        path: &CollectionPath,
        id: &RecordId,
        patch: Fields,
    ) -> Result<(), StoreError>;
    async fn remove(&self, path: &CollectionPath, id: &RecordId) -> Result<(), StoreError>;
}

/// Stand-in used when no document store is configured.
pub struct MissingRemoteStore;

#[async_trait]
impl RemoteStore for MissingRemoteStore {
    async fn subscribe(
        &self,
        path: &CollectionPath,
        _sink: DeliverySink,
    ) -> Result<AdapterSubscription, StoreError> {
        Err(StoreError::unavailable(format!(
            "document store is not configured; cannot subscribe to {path}"
        )))
    }

    async fn create(&self, path: &CollectionPath, _fields: Fields) -> Result<RecordId, StoreError> {
        Err(StoreError::unavailable(format!(
            "document store is not configured; cannot create in {path}"
        )))
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &RecordId,
        _patch: Fields,
    ) -> Result<(), StoreError> {
        Err(StoreError::unavailable(format!(
            "document store is not configured; cannot update {id} in {path}"
        )))
    }

    async fn remove(&self, path: &CollectionPath, id: &RecordId) -> Result<(), StoreError> {
        Err(StoreError::unavailable(format!(
            "document store is not configured; cannot remove {id} from {path}"
        )))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
