use super::*;
use crate::{test_support::orders_path, Delivery};
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query},
    http::StatusCode as HttpStatus,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use shared::domain::Record;
use std::sync::Arc;
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

#[derive(Deserialize)]
struct RawPathQuery {
    path: String,
}

async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

#[test]
fn rejects_non_http_base_url() {
    assert!(HttpRemoteStore::new("ftp://example.com", None).is_err());
    assert!(HttpRemoteStore::new("not a url", None).is_err());
    assert!(HttpRemoteStore::from_config(&EngineConfig::default()).is_err());
}

#[test]
fn builds_record_and_websocket_urls() {
    let store = HttpRemoteStore::new("https://store.example.com/api/", None).expect("store");
    let path = orders_path();

    let url = store
        .records_url(Some(&RecordId::new("abc")), &path)
        .expect("url");
    assert_eq!(
        url.as_str(),
        "https://store.example.com/api/records/abc?path=deployments%2Ftest%2Fpublic%2Forders"
    );

    let ws = store.ws_url(&path).expect("ws url");
    assert_eq!(ws.scheme(), "wss");
    assert_eq!(ws.path(), "/api/ws");
}

#[tokio::test]
async fn create_posts_fields_and_returns_server_id() {
    let (tx, rx) = oneshot::channel::<(String, Fields)>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let router = Router::new().route(
        "/records",
        post(
            move |Query(q): Query<RawPathQuery>, Json(body): Json<CreateRecordRequest>| {
                let tx = Arc::clone(&tx);
                async move {
                    if let Some(sender) = tx.lock().await.take() {
                        let _ = sender.send((q.path, body.fields));
                    }
                    Json(CreateRecordResponse {
                        id: RecordId::new("server-id"),
                    })
                }
            },
        ),
    );
    let base_url = spawn_stub(router).await;
    let store = HttpRemoteStore::new(&base_url, Some("token".into())).expect("store");

    let mut fields = Fields::new();
    fields.insert("status".into(), serde_json::json!("new"));
    let id = store
        .create(&orders_path(), fields.clone())
        .await
        .expect("create");

    assert_eq!(id, RecordId::new("server-id"));
    let (path, received) = rx.await.expect("request captured");
    assert_eq!(path, orders_path().as_str());
    assert_eq!(received, fields);
}

#[tokio::test]
async fn api_errors_are_decoded_into_store_errors() {
    let router = Router::new().route(
        "/records/:id",
        patch(|Path(id): Path<String>| async move {
            (
                HttpStatus::FORBIDDEN,
                Json(ApiError::new(ErrorCode::Forbidden, format!("cannot touch {id}"))),
            )
        })
        .delete(|| async { HttpStatus::SERVICE_UNAVAILABLE }),
    );
    let base_url = spawn_stub(router).await;
    let store = HttpRemoteStore::new(&base_url, None).expect("store");

    let err = store
        .update(&orders_path(), &RecordId::new("x"), Fields::new())
        .await
        .expect_err("forbidden");
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert_eq!(err.message, "cannot touch x");

    let err = store
        .remove(&orders_path(), &RecordId::new("x"))
        .await
        .expect_err("unavailable");
    assert_eq!(err.code, ErrorCode::Unavailable);
}

#[tokio::test]
async fn unreachable_server_is_reported_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let store = HttpRemoteStore::new(&format!("http://{addr}"), None).expect("store");
    let err = store
        .create(&orders_path(), Fields::new())
        .await
        .expect_err("connection refused");
    assert_eq!(err.code, ErrorCode::Unavailable);

    let (sink, _rx) = DeliverySink::channel();
    let err = store
        .subscribe(&orders_path(), sink)
        .await
        .expect_err("connection refused");
    assert_eq!(err.code, ErrorCode::Unavailable);
}

#[tokio::test]
async fn websocket_frames_become_deliveries() {
    let router = Router::new().route(
        "/ws",
        get(|ws: WebSocketUpgrade, Query(q): Query<RawPathQuery>| async move {
            ws.on_upgrade(move |mut socket| async move {
                use axum::extract::ws::Message as WsMessage;

                let path = CollectionPath::parse(&q.path).expect("path");
                let snapshot = StoreEvent::Snapshot {
                    path,
                    records: vec![Record::new("a", Fields::new())],
                };
                let error = StoreEvent::Error(ApiError::new(ErrorCode::Forbidden, "revoked"));
                for event in [snapshot, error] {
                    let text = serde_json::to_string(&event).expect("json");
                    if socket.send(WsMessage::Text(text)).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = socket.recv().await {}
            })
            .into_response()
        }),
    );
    let base_url = spawn_stub(router).await;
    let store = HttpRemoteStore::new(&base_url, None).expect("store");

    let (sink, mut rx) = DeliverySink::channel();
    let mut subscription = store
        .subscribe(&orders_path(), sink)
        .await
        .expect("subscribe");

    match rx.recv().await {
        Some(Delivery::Snapshot(records)) => assert_eq!(records[0].id, RecordId::new("a")),
        other => panic!("expected snapshot, got {other:?}"),
    }
    match rx.recv().await {
        Some(Delivery::Error(error)) => assert_eq!(error.code, ErrorCode::Forbidden),
        other => panic!("expected error, got {other:?}"),
    }
    subscription.cancel();
}

#[tokio::test]
async fn silent_server_times_out_subscribe() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    // Accepts the socket but never answers the websocket handshake.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let mut config = EngineConfig::with_deployment("test");
    config.store.base_url = Some(format!("http://{addr}"));
    config.store.connect_timeout_ms = Some(100);
    let store = HttpRemoteStore::from_config(&config).expect("store");

    let (sink, _rx) = DeliverySink::channel();
    let err = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        store.subscribe(&orders_path(), sink),
    )
    .await
    .expect("subscribe gave up on its own")
    .expect_err("handshake never completes");
    assert_eq!(err.code, ErrorCode::Unavailable);
    assert!(err.message.contains("did not open"), "{}", err.message);
}
