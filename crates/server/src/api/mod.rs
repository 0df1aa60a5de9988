use axum::http::StatusCode;
use shared::{
    domain::{CollectionPath, Fields, Record, RecordId},
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tracing::{error, info};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub fn records_route() -> &'static str {
    "/records"
}

pub fn record_route() -> &'static str {
    "/records/:id"
}

/// Only the two collection layouts clients resolve are served:
/// `deployments/{deployment}/public/{name}` and `deployments/{deployment}/actors/{actor}/{name}`.
pub fn validate_collection_path(path: &CollectionPath) -> Result<(), ApiError> {
    let segments: Vec<&str> = path.as_str().split('/').collect();
    let valid = matches!(
        segments.as_slice(),
        ["deployments", _, "public", _] | ["deployments", _, "actors", _, _]
    );
    if valid {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::Validation,
            format!("unsupported collection path: {path}"),
        ))
    }
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn internal(context: &str, err: anyhow::Error) -> ApiError {
    error!(error = %err, "{context}");
    ApiError::new(ErrorCode::Internal, format!("{context}: {err}"))
}

pub async fn list_records(ctx: &ApiContext, path: &CollectionPath) -> Result<Vec<Record>, ApiError> {
    validate_collection_path(path)?;
    ctx.storage
        .list_documents(path)
        .await
        .map_err(|err| internal("failed to list documents", err))
}

pub async fn create_record(
    ctx: &ApiContext,
    path: &CollectionPath,
    fields: &Fields,
) -> Result<RecordId, ApiError> {
    validate_collection_path(path)?;
    let id = ctx
        .storage
        .insert_document(path, fields)
        .await
        .map_err(|err| internal("failed to insert document", err))?;
    info!(%path, %id, "document created");
    Ok(id)
}

/// Shallow merge: keys in `patch` replace stored values, others are kept.
pub async fn update_record(
    ctx: &ApiContext,
    path: &CollectionPath,
    id: &RecordId,
    patch: &Fields,
) -> Result<(), ApiError> {
    validate_collection_path(path)?;
    let found = ctx
        .storage
        .patch_document(path, id, patch)
        .await
        .map_err(|err| internal("failed to patch document", err))?;
    if !found {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            format!("no document {id} in {path}"),
        ));
    }
    info!(%path, %id, keys = patch.len(), "document patched");
    Ok(())
}

pub async fn delete_record(
    ctx: &ApiContext,
    path: &CollectionPath,
    id: &RecordId,
) -> Result<(), ApiError> {
    validate_collection_path(path)?;
    let found = ctx
        .storage
        .delete_document(path, id)
        .await
        .map_err(|err| internal("failed to delete document", err))?;
    if !found {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            format!("no document {id} in {path}"),
        ));
    }
    info!(%path, %id, "document deleted");
    Ok(())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
