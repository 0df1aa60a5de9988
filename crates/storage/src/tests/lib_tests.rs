use super::*;
use serde_json::json;

fn orders_path() -> CollectionPath {
    CollectionPath::parse("deployments/test/public/orders").expect("path")
}

fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("documents.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn inserted_documents_are_listed_per_path() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let other = CollectionPath::parse("deployments/test/public/integrations").expect("path");

    let id = storage
        .insert_document(&orders_path(), &fields(&[("status", json!("new"))]))
        .await
        .expect("insert");
    storage
        .insert_document(&other, &fields(&[("name", json!("Etsy"))]))
        .await
        .expect("insert other");

    let records = storage.list_documents(&orders_path()).await.expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].str_field("status"), Some("new"));
}

#[tokio::test]
async fn patch_merges_fields_without_dropping_others() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let id = storage
        .insert_document(
            &orders_path(),
            &fields(&[("status", json!("new")), ("customerName", json!("Ada"))]),
        )
        .await
        .expect("insert");

    let found = storage
        .patch_document(&orders_path(), &id, &fields(&[("status", json!("preparing"))]))
        .await
        .expect("patch");
    assert!(found);

    let records = storage.list_documents(&orders_path()).await.expect("list");
    assert_eq!(records[0].str_field("status"), Some("preparing"));
    assert_eq!(records[0].str_field("customerName"), Some("Ada"));
}

#[tokio::test]
async fn patch_and_delete_report_missing_documents() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let missing = RecordId::new("missing");

    let patched = storage
        .patch_document(&orders_path(), &missing, &Fields::new())
        .await
        .expect("patch");
    assert!(!patched);

    let deleted = storage
        .delete_document(&orders_path(), &missing)
        .await
        .expect("delete");
    assert!(!deleted);
}

#[tokio::test]
async fn delete_removes_document() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let id = storage
        .insert_document(&orders_path(), &Fields::new())
        .await
        .expect("insert");

    assert!(storage
        .delete_document(&orders_path(), &id)
        .await
        .expect("delete"));
    assert!(storage
        .list_documents(&orders_path())
        .await
        .expect("list")
        .is_empty());
}
