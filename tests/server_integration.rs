//! Integration tests for the HTTP surface.
//!
//! Each test starts the real axum server on a free port with in-memory
//! collaborators injected through `AppContext`, then drives it with
//! `reqwest`.

use std::sync::Arc;

use serde_json::{json, Value};
use upsell_advisor::config::Config;
use upsell_advisor::context::AppContext;
use upsell_advisor::server::run_server_with_context;
use upsell_advisor_core::completion::{CompletionClient, CompletionError, ScriptedCompletion};
use upsell_advisor_core::models::{Collaborator, Collection, Record};
use upsell_advisor_core::store::memory::InMemoryRecordStore;
use upsell_advisor_core::store::RecordStore;

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if client.get(&url).send().await.is_ok() {
            return;
        }
    }
    panic!("Server did not start within 5 seconds");
}

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn seeded_store() -> Arc<dyn RecordStore> {
    let store = InMemoryRecordStore::new();
    store
        .insert(
            Collection::Products,
            vec![
                record(json!({"id": "p1", "user_id": "owner-1", "price": 15, "category": "socks"})),
                record(json!({"id": "p2", "user_id": "owner-1", "price": 60, "category": "shoes"})),
                record(json!({"id": "p3", "user_id": "owner-1", "price": 135, "category": "jackets"})),
                record(json!({"id": "px", "user_id": "someone-else", "price": 999})),
            ],
        )
        .unwrap();
    store
        .insert(
            Collection::Orders,
            vec![record(json!({
                "id": "o1",
                "user_id": "owner-1",
                "total_amount": 75,
                "status": "completed",
                "created_at": chrono::Utc::now().to_rfc3339(),
            }))],
        )
        .unwrap();
    Arc::new(store)
}

/// Start a server and return its base URL plus the server task.
async fn spawn_server(
    store: Collaborator<dyn RecordStore>,
    completion: Collaborator<dyn CompletionClient>,
) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_free_port();
    let ctx = AppContext::new(Config::minimal(), store, completion).into_shared();
    let bind = format!("127.0.0.1:{}", port);
    let handle = tokio::spawn(async move {
        run_server_with_context(&bind, ctx).await.unwrap();
    });
    wait_for_server(port).await;
    (format!("http://127.0.0.1:{}", port), handle)
}

const RULES_RESPONSE: &str = "```json\n[{\"name\":\"A\",\"trigger_type\":\"cart_value\",\"trigger_conditions\":{\"cart_value_operator\":\"greater_than\",\"cart_value\":100},}]\n```";

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_root_and_health() {
    let (base, handle) = spawn_server(
        Collaborator::Available(seeded_store()),
        Collaborator::Unavailable("GROQ_API_KEY environment variable not set".to_string()),
    )
    .await;
    let client = reqwest::Client::new();

    let root: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(root["service"], "upsell-advisor");
    assert_eq!(root["endpoints"]["analyze"], "POST /analyze");

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["store"], "available");
    assert!(health["completion"]
        .as_str()
        .unwrap()
        .starts_with("unavailable"));

    handle.abort();
}

#[tokio::test]
async fn test_analyze_rules_from_store() {
    let completion = Arc::new(ScriptedCompletion::from_texts([RULES_RESPONSE]));
    let (base, handle) = spawn_server(
        Collaborator::Available(seeded_store()),
        Collaborator::Available(completion.clone()),
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .json(&json!({"user_id": "owner-1", "analysis_type": "rules", "time_range_days": 7}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["user_id"], "owner-1");
    assert!(body["analysis_timestamp"].is_string());
    assert_eq!(body["data_summary"]["counts"]["products"], 3);
    assert_eq!(body["data_summary"]["counts"]["orders"], 1);

    let rule = &body["rule_suggestions"][0];
    assert_eq!(rule["name"], "A");
    assert_eq!(rule["priority"], 5);
    assert_eq!(rule["status"], "draft");
    assert_eq!(rule["display_type"], "popup");
    assert_eq!(rule["use_ai"], true);
    assert!(rule["ai_copy_id"].is_null());
    assert_eq!(rule["trigger_conditions"]["cart_value"], 100);
    // mean price 70, threshold 100 is premium territory
    assert_eq!(rule["target_products"], json!(["p3"]));

    assert!(body["insights"].as_array().unwrap().is_empty());
    assert_eq!(completion.calls(), 1);

    handle.abort();
}

#[tokio::test]
async fn test_inline_data_skips_store() {
    let completion = Arc::new(ScriptedCompletion::from_texts([
        r#"[{"name": "Bundle", "campaign_type": "bundle"}]"#,
    ]));
    let (base, handle) = spawn_server(
        Collaborator::Unavailable("store.url / SUPABASE_URL not configured".to_string()),
        Collaborator::Available(completion),
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .json(&json!({
            "user_id": "demo",
            "analysis_type": "campaigns",
            "data": {"products": []}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["campaign_suggestions"][0]["campaign_type"], "bundle");
    assert_eq!(body["campaign_suggestions"][0]["target_products"], json!([]));

    handle.abort();
}

#[tokio::test]
async fn test_unrecoverable_output_is_server_error() {
    let completion = Arc::new(ScriptedCompletion::from_texts([
        "Sure! Here are some great ideas for your store.",
    ]));
    let (base, handle) = spawn_server(
        Collaborator::Available(seeded_store()),
        Collaborator::Available(completion.clone()),
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .json(&json!({"user_id": "owner-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "recovery_exhausted");
    assert_eq!(completion.calls(), 3);

    handle.abort();
}

#[tokio::test]
async fn test_rejected_completion_is_server_error() {
    let completion = Arc::new(ScriptedCompletion::new(vec![Err(CompletionError::Provider {
        status: 401,
        message: "invalid api key".to_string(),
    })]));
    let (base, handle) = spawn_server(
        Collaborator::Available(seeded_store()),
        Collaborator::Available(completion.clone()),
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .json(&json!({"user_id": "owner-1", "analysis_type": "insights"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "completion_failed");
    assert_eq!(completion.calls(), 1);

    handle.abort();
}

#[tokio::test]
async fn test_missing_collaborators_are_server_errors() {
    let completion = Arc::new(ScriptedCompletion::from_texts(["[]"]));
    let (base, handle) = spawn_server(
        Collaborator::Unavailable("store.url / SUPABASE_URL not configured".to_string()),
        Collaborator::Available(completion),
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{}/analyze", base))
        .json(&json!({"user_id": "owner-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "collaborator_unavailable");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("SUPABASE_URL"));

    handle.abort();
}

#[tokio::test]
async fn test_bad_requests() {
    let (base, handle) = spawn_server(
        Collaborator::Available(seeded_store()),
        Collaborator::Available(Arc::new(ScriptedCompletion::from_texts(["[]"]))),
    )
    .await;
    let client = reqwest::Client::new();

    for body in [
        json!({"user_id": ""}),
        json!({"user_id": "owner-1", "analysis_type": "everything"}),
        json!({"user_id": "owner-1", "time_range_days": 0}),
        json!({"analysis_type": "rules"}),
    ] {
        let resp = client
            .post(format!("{}/analyze", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body: {}", body);
        let err: Value = resp.json().await.unwrap();
        assert_eq!(err["error"]["code"], "bad_request");
    }

    handle.abort();
}

#[tokio::test]
async fn test_unreadable_bodies_use_error_contract() {
    let (base, handle) = spawn_server(
        Collaborator::Available(seeded_store()),
        Collaborator::Available(Arc::new(ScriptedCompletion::from_texts(["[]"]))),
    )
    .await;
    let client = reqwest::Client::new();

    let malformed = client
        .post(format!("{}/analyze", base))
        .header("content-type", "application/json")
        .body("{\"user_id\": ")
        .send()
        .await
        .unwrap();
    let no_content_type = client
        .post(format!("{}/analyze", base))
        .body("{\"user_id\": \"owner-1\"}")
        .send()
        .await
        .unwrap();

    for resp in [malformed, no_content_type] {
        assert_eq!(resp.status(), 400);
        let err: Value = resp.json().await.unwrap();
        assert_eq!(err["error"]["code"], "bad_request");
        assert!(err["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid analyze request"));
    }

    handle.abort();
}
