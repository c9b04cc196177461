//! Supabase (PostgREST) record store.
//!
//! Each [`Collection`] maps to one table queried through the REST API:
//!
//! ```text
//! GET {url}/rest/v1/{table}?select=*&{owner_column}=eq.{owner}[&created_at=gte.{since}]
//! apikey: {key}
//! Authorization: Bearer {key}
//! ```
//!
//! A table that does not exist in the project (HTTP 404, or PostgREST
//! error codes `42P01` / `PGRST205`) reads as empty; stores created from
//! older schemas lack some of the optional tables.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use upsell_advisor_core::models::{Collaborator, Collection, Record};
use upsell_advisor_core::store::RecordStore;

use crate::config::StoreConfig;

/// PostgREST error codes meaning "relation does not exist".
const MISSING_RELATION_CODES: [&str; 2] = ["42P01", "PGRST205"];

pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

impl SupabaseStore {
    pub fn new(url: &str, key: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            key,
        })
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection.table_name())
    }
}

/// Query parameters for one collection fetch.
fn query_params(
    collection: Collection,
    owner: &str,
    since: Option<DateTime<Utc>>,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        (collection.owner_column().to_string(), format!("eq.{}", owner)),
    ];
    if let (Some(column), Some(since)) = (collection.time_column(), since) {
        params.push((
            column.to_string(),
            format!("gte.{}", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ));
    }
    params
}

fn is_missing_relation(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(Value::as_str).map(str::to_string))
        .is_some_and(|code| MISSING_RELATION_CODES.contains(&code.as_str()))
}

#[async_trait]
impl RecordStore for SupabaseStore {
    fn backend(&self) -> &str {
        "supabase"
    }

    async fn fetch(
        &self,
        collection: Collection,
        owner: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>> {
        let response = self
            .http
            .get(self.table_url(collection))
            .query(&query_params(collection, owner, since))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .send()
            .await
            .with_context(|| format!("request for table {} failed", collection.table_name()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_missing_relation(status, &body) {
                warn!(table = collection.table_name(), "table not found, treating as empty");
                return Ok(Vec::new());
            }
            bail!(
                "Supabase returned {} for table {}: {}",
                status,
                collection.table_name(),
                body
            );
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .with_context(|| format!("invalid JSON from table {}", collection.table_name()))?;
        let records: Vec<Record> = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        debug!(table = collection.table_name(), rows = records.len(), "supabase fetch");
        Ok(records)
    }
}

/// Build the store collaborator from `[store]`.
///
/// Without a URL or key the store is [`Collaborator::Unavailable`];
/// requests that carry inline `data` still succeed.
pub fn create_record_store<F>(
    config: &StoreConfig,
    lookup: F,
) -> Result<Collaborator<dyn RecordStore>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(url) = config.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return Ok(Collaborator::Unavailable(
            "store.url / SUPABASE_URL not configured".to_string(),
        ));
    };
    let Some(key) = lookup(&config.key_env).filter(|k| !k.trim().is_empty()) else {
        return Ok(Collaborator::Unavailable(format!(
            "{} environment variable not set",
            config.key_env
        )));
    };

    let store: Arc<dyn RecordStore> = Arc::new(SupabaseStore::new(url, key, config.timeout_secs)?);
    Ok(Collaborator::Available(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_params_scope_owner_and_time() {
        let since = Utc.with_ymd_and_hms(2026, 9, 18, 0, 0, 0).unwrap();

        let orders = query_params(Collection::Orders, "u1", Some(since));
        assert_eq!(
            orders,
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                ("created_at".to_string(), "gte.2026-09-18T00:00:00Z".to_string()),
            ]
        );

        let profile = query_params(Collection::Profile, "u1", Some(since));
        assert_eq!(profile.len(), 2);
        assert_eq!(profile[1], ("id".to_string(), "eq.u1".to_string()));
    }

    #[test]
    fn test_missing_relation_detection() {
        assert!(is_missing_relation(StatusCode::NOT_FOUND, ""));
        assert!(is_missing_relation(
            StatusCode::BAD_REQUEST,
            r#"{"code":"42P01","message":"relation \"public.campaigns\" does not exist"}"#
        ));
        assert!(is_missing_relation(
            StatusCode::BAD_REQUEST,
            r#"{"code":"PGRST205","message":"Could not find the table"}"#
        ));
        assert!(!is_missing_relation(StatusCode::UNAUTHORIZED, r#"{"code":"PGRST301"}"#));
    }

    #[test]
    fn test_table_url_trims_slash() {
        let store = SupabaseStore::new("https://demo.supabase.co/", "key".into(), 5).unwrap();
        assert_eq!(
            store.table_url(Collection::Rules),
            "https://demo.supabase.co/rest/v1/upsell_rules"
        );
    }

    #[test]
    fn test_unconfigured_store_is_unavailable() {
        let store = create_record_store(&StoreConfig::default(), |_| None).unwrap();
        assert!(!store.is_available());

        let config = StoreConfig {
            url: Some("https://demo.supabase.co".to_string()),
            ..Default::default()
        };
        let store = create_record_store(&config, |_| None).unwrap();
        assert_eq!(store.status(), "unavailable (SUPABASE_KEY environment variable not set)");

        let store = create_record_store(&config, |_| Some("service-key".to_string())).unwrap();
        assert!(store.is_available());
    }
}
