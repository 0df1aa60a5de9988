use serde_json::{json, Value};
use shared::domain::{field, CollectionPath, Fields, Record};

pub(crate) fn path(raw: &str) -> CollectionPath {
    CollectionPath::parse(raw).expect("collection path")
}

pub(crate) fn orders_path() -> CollectionPath {
    path("deployments/test/public/orders")
}

pub(crate) fn integrations_path() -> CollectionPath {
    path("deployments/test/public/integrations")
}

pub(crate) fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub(crate) fn order_fields(status: &str) -> Fields {
    fields(&[(field::STATUS, json!(status))])
}

pub(crate) fn order(id: &str, status: &str) -> Record {
    Record::new(id, order_fields(status))
}

pub(crate) fn dated_order(id: &str, status: &str, created_at: &str) -> Record {
    Record::new(
        id,
        fields(&[
            (field::STATUS, json!(status)),
            (field::CREATED_AT, json!(created_at)),
        ]),
    )
}

pub(crate) fn integration_fields(name: &str) -> Fields {
    fields(&[(field::NAME, json!(name)), (field::PLATFORM, json!("shop"))])
}
