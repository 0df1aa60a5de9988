use super::*;
use crate::test_support::orders_path;
use shared::error::ErrorCode;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[test]
fn adapter_subscription_cancels_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut subscription = AdapterSubscription::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(subscription.is_active());
    subscription.cancel();
    subscription.cancel();
    assert!(!subscription.is_active());
    drop(subscription);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_adapter_subscription_detaches_listener() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    drop(AdapterSubscription::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut noop = AdapterSubscription::noop();
    noop.cancel();
    assert!(!noop.is_active());
}

#[tokio::test]
async fn delivery_sink_reports_dropped_consumer() {
    let (sink, mut rx) = DeliverySink::channel();
    assert!(sink.snapshot(Vec::new()));
    assert!(matches!(rx.recv().await, Some(Delivery::Snapshot(records)) if records.is_empty()));

    drop(rx);
    assert!(sink.is_closed());
    assert!(!sink.error(StoreError::unavailable("gone")));
}

#[tokio::test]
async fn missing_store_rejects_every_operation_as_unavailable() {
    let store = MissingRemoteStore;
    let path = orders_path();
    let (sink, _rx) = DeliverySink::channel();

    let err = store.subscribe(&path, sink).await.expect_err("subscribe");
    assert_eq!(err.code, ErrorCode::Unavailable);
    let err = store
        .create(&path, Fields::new())
        .await
        .expect_err("create");
    assert_eq!(err.code, ErrorCode::Unavailable);
    let err = store
        .update(&path, &RecordId::new("a"), Fields::new())
        .await
        .expect_err("update");
    assert_eq!(err.code, ErrorCode::Unavailable);
    let err = store
        .remove(&path, &RecordId::new("a"))
        .await
        .expect_err("remove");
    assert_eq!(err.code, ErrorCode::Unavailable);
}
