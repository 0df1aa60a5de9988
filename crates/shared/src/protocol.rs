use serde::{Deserialize, Serialize};

use crate::{
    domain::{CollectionPath, Fields, Record, RecordId},
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub fields: Fields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordResponse {
    pub id: RecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecordRequest {
    pub patch: Fields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathQuery {
    pub path: CollectionPath,
}

/// Frame pushed over a collection websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreEvent {
    Snapshot {
        path: CollectionPath,
        records: Vec<Record>,
    },
    Error(ApiError),
}
