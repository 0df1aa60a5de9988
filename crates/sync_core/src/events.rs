use std::fmt;

use crate::{cache::CacheDelta, error::EngineError, subscription::SubscriptionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    Orders,
    Integrations,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Orders, CollectionKind::Integrations];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Integrations => "integrations",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications broadcast by the engine to consumers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    CacheChanged {
        collection: CollectionKind,
        version: u64,
        delta: CacheDelta,
    },
    SubscriptionChanged {
        collection: CollectionKind,
        state: SubscriptionState,
    },
    /// Always `EngineError::SyncError`; the cache keeps its last records.
    SyncWarning {
        collection: CollectionKind,
        error: EngineError,
    },
}
