//! In-memory [`RecordStore`] implementation for testing and offline runs.
//!
//! Rows live in a `HashMap` keyed by collection behind `std::sync::RwLock`.
//! Owner and time filtering mirror what the hosted backend does in SQL.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::{Collection, Record, RecordSet};

use super::RecordStore;

pub struct InMemoryRecordStore {
    rows: RwLock<HashMap<Collection, Vec<Record>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Seed every collection from a [`RecordSet`].
    pub fn from_record_set(set: RecordSet) -> Self {
        let store = Self::new();
        if let Ok(mut rows) = store.rows.write() {
            for collection in Collection::ALL {
                rows.insert(collection, set.collection(collection).to_vec());
            }
        }
        store
    }

    /// Append rows to `collection`.
    pub fn insert(&self, collection: Collection, records: impl IntoIterator<Item = Record>) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow!("record store lock poisoned"))?;
        rows.entry(collection).or_default().extend(records);
        Ok(())
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses RFC 3339 and Postgres-style `YYYY-MM-DD HH:MM:SS` timestamps.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn owned_by(record: &Record, column: &str, owner: &str) -> bool {
    match record.get(column) {
        Some(Value::String(s)) => s == owner,
        Some(Value::Number(n)) => n.to_string() == owner,
        _ => false,
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn fetch(
        &self,
        collection: Collection,
        owner: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| anyhow!("record store lock poisoned"))?;
        let Some(records) = rows.get(&collection) else {
            return Ok(Vec::new());
        };

        let time_column = since.and(collection.time_column());
        Ok(records
            .iter()
            .filter(|r| owned_by(r, collection.owner_column(), owner))
            .filter(|r| match (time_column, since) {
                (Some(column), Some(cutoff)) => r
                    .get(column)
                    .and_then(parse_timestamp)
                    .is_some_and(|ts| ts >= cutoff),
                _ => true,
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::store::load_record_set;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store
            .insert(
                Collection::Products,
                vec![
                    record(json!({"id": "p1", "user_id": "u1", "price": 10})),
                    record(json!({"id": "p2", "user_id": "u2", "price": 20})),
                ],
            )
            .unwrap();
        store
            .insert(
                Collection::Orders,
                vec![
                    record(json!({"id": "o1", "user_id": "u1", "created_at": "2026-10-01T12:00:00Z"})),
                    record(json!({"id": "o2", "user_id": "u1", "created_at": "2026-08-01 09:30:00"})),
                    record(json!({"id": "o3", "user_id": "u1"})),
                ],
            )
            .unwrap();
        store
            .insert(Collection::Profile, vec![record(json!({"id": "u1", "store_name": "Acme"}))])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_fetch_filters_by_owner() {
        let store = seeded();
        let products = store.fetch(Collection::Products, "u1", None).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0]["id"], "p1");

        let profile = store.fetch(Collection::Profile, "u1", None).await.unwrap();
        assert_eq!(profile.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_applies_time_window_to_timed_collections() {
        let store = seeded();
        let since = Utc.with_ymd_and_hms(2026, 9, 18, 0, 0, 0).unwrap();

        let orders = store.fetch(Collection::Orders, "u1", Some(since)).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["id"], "o1");

        // products have no time column
        let products = store.fetch(Collection::Products, "u1", Some(since)).await.unwrap();
        assert_eq!(products.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = seeded();
        let events = store.fetch(Collection::CartEvents, "u1", None).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_load_record_set_collects_everything() {
        let store = seeded();
        let set = load_record_set(&store, "u1", None).await.unwrap();
        assert_eq!(set.products.len(), 1);
        assert_eq!(set.orders.len(), 3);
        assert_eq!(set.profile.len(), 1);
        assert!(set.rules.is_empty());
    }

    #[tokio::test]
    async fn test_from_record_set_round_trips_owner_rows() {
        let set = RecordSet {
            rules: vec![record(json!({"user_id": "u9", "name": "Free gift"}))],
            ..Default::default()
        };
        let store = InMemoryRecordStore::from_record_set(set);
        let rules = store.fetch(Collection::Rules, "u9", None).await.unwrap();
        assert_eq!(rules.len(), 1);
    }

    struct FailingStore;

    #[async_trait]
    impl RecordStore for FailingStore {
        fn backend(&self) -> &str {
            "failing"
        }

        async fn fetch(&self, _: Collection, _: &str, _: Option<DateTime<Utc>>) -> Result<Vec<Record>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_data_store_error() {
        let err = load_record_set(&FailingStore, "u1", None).await.unwrap_err();
        match err {
            AnalysisError::DataStore(message) => assert!(message.contains("connection refused")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
