use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use shared::{
    domain::{CollectionPath, Record, RecordId},
    error::{ApiError, ErrorCode},
    protocol::{CreateRecordRequest, CreateRecordResponse, PathQuery, StoreEvent, UpdateRecordRequest},
};
use storage::Storage;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};

mod api;
mod config;

use api::{
    create_record, delete_record, list_records, record_route, records_route, status_for,
    update_record, validate_collection_path, ApiContext,
};
use config::load_settings;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    /// Paths whose contents changed; every open websocket on that path re-sends a snapshot.
    changes: broadcast::Sender<CollectionPath>,
    access_token: Option<String>,
}

type HttpError = (StatusCode, Json<ApiError>);

fn http_error(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings()?;
    let storage = Storage::new(&settings.database_url).await.map_err(|error| {
        error!(
            database_url = %settings.database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    if settings.access_token.is_none() {
        warn!("no access token configured; every request is accepted");
    }

    let (changes, _) = broadcast::channel(256);
    let state = AppState {
        api: ApiContext { storage },
        changes,
        access_token: settings.access_token.clone(),
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "document server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(records_route(), get(http_list_records).post(http_create_record))
        .route(record_route(), patch(http_update_record).delete(http_delete_record))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|err| {
        http_error(ApiError::new(
            ErrorCode::Unavailable,
            format!("storage unavailable: {err}"),
        ))
    })?;
    Ok("ok")
}

/// Checks the single shared bearer token. A valid token grants access to every
/// collection path; `actors/{actor}` paths are not tied to the caller's identity.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), HttpError> {
    let Some(expected) = state.access_token.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(http_error(ApiError::new(
            ErrorCode::Forbidden,
            "session token rejected",
        ))),
        None => Err(http_error(ApiError::new(
            ErrorCode::Unauthorized,
            "missing bearer token",
        ))),
    }
}

fn collection_path(query: Result<Query<PathQuery>, QueryRejection>) -> Result<CollectionPath, HttpError> {
    let Query(query) = query.map_err(|rejection| {
        http_error(ApiError::new(
            ErrorCode::Validation,
            format!("invalid collection path: {}", rejection.body_text()),
        ))
    })?;
    validate_collection_path(&query.path).map_err(http_error)?;
    Ok(query.path)
}

fn notify_changed(state: &AppState, path: CollectionPath) {
    // No receivers just means no open subscriptions.
    let _ = state.changes.send(path);
}

async fn http_list_records(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<Json<Vec<Record>>, HttpError> {
    authorize(&state, &headers)?;
    let path = collection_path(query)?;
    let records = list_records(&state.api, &path).await.map_err(http_error)?;
    Ok(Json(records))
}

async fn http_create_record(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<PathQuery>, QueryRejection>,
    Json(req): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<CreateRecordResponse>), HttpError> {
    authorize(&state, &headers)?;
    let path = collection_path(query)?;
    let id = create_record(&state.api, &path, &req.fields)
        .await
        .map_err(http_error)?;
    notify_changed(&state, path);
    Ok((StatusCode::CREATED, Json(CreateRecordResponse { id })))
}

async fn http_update_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    query: Result<Query<PathQuery>, QueryRejection>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<StatusCode, HttpError> {
    authorize(&state, &headers)?;
    let path = collection_path(query)?;
    update_record(&state.api, &path, &RecordId(id), &req.patch)
        .await
        .map_err(http_error)?;
    notify_changed(&state, path);
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<StatusCode, HttpError> {
    authorize(&state, &headers)?;
    let path = collection_path(query)?;
    delete_record(&state.api, &path, &RecordId(id))
        .await
        .map_err(http_error)?;
    notify_changed(&state, path);
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> Result<Response, HttpError> {
    authorize(&state, &headers)?;
    let path = collection_path(query)?;
    Ok(ws
        .on_upgrade(move |socket| ws_connection(state, socket, path))
        .into_response())
}

/// Frame carrying the full current contents of `path`, or the error that prevented reading it.
async fn snapshot_frame(api: &ApiContext, path: &CollectionPath) -> Option<String> {
    let event = match list_records(api, path).await {
        Ok(records) => StoreEvent::Snapshot {
            path: path.clone(),
            records,
        },
        Err(err) => StoreEvent::Error(err),
    };
    match serde_json::to_string(&event) {
        Ok(text) => Some(text),
        Err(err) => {
            error!(%path, error = %err, "failed to encode store event");
            None
        }
    }
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, path: CollectionPath) {
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    // Subscribe before the first read so a write racing the initial snapshot still triggers a resend.
    let mut changes_rx = state.changes.subscribe();
    debug!(%path, "websocket subscription opened");

    let send_path = path.clone();
    let send_task = tokio::spawn(async move {
        let mut dirty = true;
        loop {
            if dirty {
                let Some(text) = snapshot_frame(&state.api, &send_path).await else {
                    break;
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            dirty = match changes_rx.recv().await {
                Ok(changed) => changed == send_path,
                Err(broadcast::error::RecvError::Lagged(_)) => true,
                Err(broadcast::error::RecvError::Closed) => break,
            };
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
    debug!(%path, "websocket subscription closed");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
