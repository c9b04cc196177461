//! Record-store abstraction.
//!
//! The [`RecordStore`] trait is the read side of the store's database:
//! one owner-scoped query per [`Collection`]. The HTTP crate provides a
//! Supabase implementation; [`memory::InMemoryRecordStore`] serves tests
//! and offline runs.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::AnalysisError;
use crate::models::{Collection, Record, RecordSet};

/// Owner-scoped, read-only access to store records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs and `/health` (e.g. `"supabase"`).
    fn backend(&self) -> &str;

    /// Rows of `collection` whose owner column equals `owner`.
    ///
    /// When `since` is set, collections with a time column only return
    /// rows created at or after it. A collection that does not exist in
    /// the backend yields an empty list.
    async fn fetch(
        &self,
        collection: Collection,
        owner: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>>;
}

/// Fetch every collection for `owner` into a [`RecordSet`].
///
/// Any backend failure becomes [`AnalysisError::DataStore`].
pub async fn load_record_set(
    store: &dyn RecordStore,
    owner: &str,
    since: Option<DateTime<Utc>>,
) -> Result<RecordSet, AnalysisError> {
    let mut set = RecordSet::default();
    for collection in Collection::ALL {
        let rows = store
            .fetch(collection, owner, since)
            .await
            .map_err(|e| AnalysisError::DataStore(format!("{}: {:#}", collection, e)))?;
        debug!(backend = store.backend(), %collection, rows = rows.len(), "fetched collection");
        *set.collection_mut(collection) = rows;
    }
    Ok(set)
}
