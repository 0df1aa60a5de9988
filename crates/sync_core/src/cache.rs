use std::collections::HashMap;

use shared::{
    domain::{CollectionPath, Record, RecordId},
    error::StoreError,
};

/// Summary of what one snapshot changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDelta {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl CacheDelta {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Local mirror of one subscribed collection. Only adapter deliveries mutate it.
#[derive(Debug, Clone, Default)]
pub struct CollectionCache {
    path: Option<CollectionPath>,
    records: HashMap<RecordId, Record>,
    version: u64,
    last_error: Option<StoreError>,
}

impl CollectionCache {
    pub fn new(path: CollectionPath) -> Self {
        Self {
            path: Some(path),
            ..Self::default()
        }
    }

    pub fn path(&self) -> Option<&CollectionPath> {
        self.path.as_ref()
    }

    /// Incremented on every applied snapshot; zero means nothing was received yet.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_synced(&self) -> bool {
        self.version > 0
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Replaces the contents with exactly the delivered records. Records are overwritten
    /// wholesale; ids missing from the delivery are dropped.
    pub fn apply_snapshot(&mut self, records: Vec<Record>) -> CacheDelta {
        let mut next: HashMap<RecordId, Record> = HashMap::with_capacity(records.len());
        for record in records {
            next.insert(record.id.clone(), record);
        }

        let mut delta = CacheDelta::default();
        for (id, record) in &next {
            match self.records.get(id) {
                None => delta.added += 1,
                Some(previous) if previous != record => delta.updated += 1,
                Some(_) => {}
            }
        }
        delta.removed = self
            .records
            .keys()
            .filter(|id| !next.contains_key(*id))
            .count();

        self.records = next;
        self.version += 1;
        self.last_error = None;
        delta
    }

    /// Keeps the last known records and remembers the failure.
    pub fn record_error(&mut self, error: StoreError) {
        self.last_error = Some(error);
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
