use cart_agent::AgentConfig;
use cart_agent::config::OracleConfig;
use cart_agent::face::{self, AppState};
use cart_agent::hands::BrowserOptions;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

async fn start(oracle: Option<OracleConfig>) -> String {
    start_with(state(oracle)).await
}

fn state(oracle: Option<OracleConfig>) -> Arc<AppState> {
    Arc::new(AppState::new(
        AgentConfig::default(),
        oracle,
        BrowserOptions::default(),
        Duration::from_secs(300),
    ))
}

async fn start_with(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(face::serve(listener, state));
    format!("http://{addr}")
}

#[tokio::test]
async fn empty_shopping_list_is_rejected() {
    let base = start(Some(OracleConfig::new("test-key"))).await;
    let client = reqwest::Client::new();

    for body in [json!({"items": []}), json!({"items": ["  ", ""]}), json!({})] {
        let response = client
            .post(format!("{base}/agent"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "no items to buy");
    }
}

#[tokio::test]
async fn missing_api_key_refuses_the_run() {
    let base = start(None).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/agent"))
        .json(&json!({"items": ["leche"]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "OPENAI_API_KEY is not configured");
}

#[tokio::test]
async fn index_page_is_served() {
    let base = start(None).await;
    let html = reqwest::get(format!("{base}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("EventSource('/events')"));
}

#[tokio::test]
async fn second_run_while_one_is_in_flight_conflicts() {
    let state = state(Some(OracleConfig::new("test-key")));
    let base = start_with(state.clone()).await;
    let _running = state.try_begin_run().unwrap();

    let response = reqwest::Client::new()
        .post(format!("{base}/agent"))
        .json(&json!({"items": ["leche"]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "a run is already in progress");
}
