use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use shared::{
    domain::{CollectionPath, Fields, Record, RecordId},
    error::StoreError,
};
use tracing::debug;
use uuid::Uuid;

use crate::{AdapterSubscription, DeliverySink, RemoteStore};

/// Adapter call log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Subscribe(CollectionPath),
    Create {
        path: CollectionPath,
        fields: Fields,
    },
    Update {
        path: CollectionPath,
        id: RecordId,
        patch: Fields,
    },
    Remove {
        path: CollectionPath,
        id: RecordId,
    },
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Subscribe(_))
    }
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<CollectionPath, BTreeMap<RecordId, Fields>>,
    subscribers: HashMap<CollectionPath, Vec<(u64, DeliverySink)>>,
    next_subscriber: u64,
    denied: HashSet<CollectionPath>,
    fail_next_write: Option<StoreError>,
    calls: Vec<StoreCall>,
}

impl MemoryState {
    fn snapshot(&self, path: &CollectionPath) -> Vec<Record> {
        self.collections
            .get(path)
            .map(|records| {
                records
                    .iter()
                    .map(|(id, fields)| Record {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(&mut self, path: &CollectionPath) {
        let records = self.snapshot(path);
        if let Some(subscribers) = self.subscribers.get_mut(path) {
            subscribers.retain(|(_, sink)| sink.snapshot(records.clone()));
        }
    }

    fn check_write(&mut self, path: &CollectionPath) -> Result<(), StoreError> {
        if let Some(error) = self.fail_next_write.take() {
            return Err(error);
        }
        if self.denied.contains(path) {
            return Err(StoreError::permission_denied(format!(
                "missing or insufficient permissions for {path}"
            )));
        }
        Ok(())
    }
}

/// In-process document store. Every write pushes a full snapshot to the path's subscribers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a document directly, as another actor would, and notifies subscribers.
    pub fn put(&self, path: &CollectionPath, id: impl Into<String>, fields: Fields) {
        let mut state = self.lock();
        state
            .collections
            .entry(path.clone())
            .or_default()
            .insert(RecordId::new(id), fields);
        state.notify(path);
    }

    /// Deletes a document directly and notifies subscribers.
    pub fn purge(&self, path: &CollectionPath, id: &RecordId) {
        let mut state = self.lock();
        if let Some(records) = state.collections.get_mut(path) {
            records.remove(id);
        }
        state.notify(path);
    }

    /// Makes subscriptions and writes on `path` fail with a permission error.
    pub fn deny(&self, path: &CollectionPath) {
        self.lock().denied.insert(path.clone());
    }

    pub fn fail_next_write(&self, error: StoreError) {
        self.lock().fail_next_write = Some(error);
    }

    /// Pushes an error to every live subscriber of `path`.
    pub fn push_error(&self, path: &CollectionPath, error: StoreError) {
        let mut state = self.lock();
        if let Some(subscribers) = state.subscribers.get_mut(path) {
            subscribers.retain(|(_, sink)| sink.error(error.clone()));
        }
    }

    /// Sends `error` to every subscriber of `path`, then drops their sinks, as a
    /// server does when it closes the connection.
    pub fn disconnect(&self, path: &CollectionPath, error: StoreError) {
        let mut state = self.lock();
        if let Some(subscribers) = state.subscribers.remove(path) {
            debug!(%path, dropped = subscribers.len(), "memory store: listeners disconnected");
            for (_, sink) in subscribers {
                sink.error(error.clone());
            }
        }
    }

    pub fn records(&self, path: &CollectionPath) -> Vec<Record> {
        self.lock().snapshot(path)
    }

    pub fn subscriber_count(&self, path: &CollectionPath) -> usize {
        self.lock()
            .subscribers
            .get(path)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|(_, sink)| !sink.is_closed())
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn write_calls(&self) -> usize {
        self.lock().calls.iter().filter(|call| call.is_write()).count()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn subscribe(
        &self,
        path: &CollectionPath,
        sink: DeliverySink,
    ) -> Result<AdapterSubscription, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Subscribe(path.clone()));
        if state.denied.contains(path) {
            return Err(StoreError::permission_denied(format!(
                "missing or insufficient permissions for {path}"
            )));
        }

        let subscriber_id = state.next_subscriber;
        state.next_subscriber += 1;
        sink.snapshot(state.snapshot(path));
        state
            .subscribers
            .entry(path.clone())
            .or_default()
            .push((subscriber_id, sink));
        debug!(%path, subscriber_id, "memory store: listener attached");

        let weak = Arc::downgrade(&self.state);
        let path = path.clone();
        Ok(AdapterSubscription::new(move || {
            if let Some(state) = weak.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(subscribers) = state.subscribers.get_mut(&path) {
                    subscribers.retain(|(id, _)| *id != subscriber_id);
                }
            }
        }))
    }

    async fn create(&self, path: &CollectionPath, fields: Fields) -> Result<RecordId, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Create {
            path: path.clone(),
            fields: fields.clone(),
        });
        state.check_write(path)?;

        let id = RecordId(Uuid::new_v4().simple().to_string());
        state
            .collections
            .entry(path.clone())
            .or_default()
            .insert(id.clone(), fields);
        state.notify(path);
        Ok(id)
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &RecordId,
        patch: Fields,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Update {
            path: path.clone(),
            id: id.clone(),
            patch: patch.clone(),
        });
        state.check_write(path)?;

        let fields = state
            .collections
            .get_mut(path)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::not_found(format!("no document {id} in {path}")))?;
        fields.extend(patch);
        state.notify(path);
        Ok(())
    }

    async fn remove(&self, path: &CollectionPath, id: &RecordId) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Remove {
            path: path.clone(),
            id: id.clone(),
        });
        state.check_write(path)?;

        let removed = state
            .collections
            .get_mut(path)
            .and_then(|records| records.remove(id));
        if removed.is_none() {
            return Err(StoreError::not_found(format!("no document {id} in {path}")));
        }
        state.notify(path);
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
