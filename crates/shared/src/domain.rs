use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id_newtype!(RecordId);
string_id_newtype!(ActorId);

/// Field payload of a remote document.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Well-known field names written and read by the dashboard.
pub mod field {
    pub const ORDER_ID: &str = "orderId";
    pub const CUSTOMER_NAME: &str = "customerName";
    pub const ITEM: &str = "item";
    pub const AMOUNT: &str = "amount";
    pub const MARKETPLACE: &str = "marketplace";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const CREATED_BY: &str = "createdBy";
    pub const UPDATED_BY: &str = "updatedBy";
    pub const NAME: &str = "name";
    pub const PLATFORM: &str = "platform";
}

/// Hierarchical, slash-separated location of a collection in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn from_segments<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|segment| segment.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("/");
        Self::parse(&joined)
    }

    /// Accepts `a/b/c` style paths; rejects empty segments and surrounding slashes.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.split('/').any(|segment| segment.trim().is_empty()) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid collection path: {value:?}"))
    }
}

impl From<CollectionPath> for String {
    fn from(value: CollectionPath) -> Self {
        value.0
    }
}

/// A document as delivered by the store: identity plus opaque fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: RecordId::new(id),
            fields,
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn timestamp_field(&self, key: &str) -> Option<DateTime<Utc>> {
        self.str_field(key)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_field(field::CREATED_AT)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_field(field::UPDATED_AT)
    }
}
