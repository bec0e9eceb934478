use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use replenish_api::app::{AppServices, build_app};
use replenish_core::{CompanyId, ProductId};
use replenish_infra::{EngineConfig, ProviderRegistry, providers::DryRunProvider};
use replenish_workflow::CapabilityAction;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let providers = ProviderRegistry::new()
            .with(Arc::new(DryRunProvider::new("sheet", CapabilityAction::LogRow)))
            .with(Arc::new(DryRunProvider::new(
                "chat",
                CapabilityAction::SendNotification,
            )));
        let services = Arc::new(AppServices::in_memory(EngineConfig::default(), providers));

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn observe(&self, client: &reqwest::Client, c: CompanyId, p: ProductId, qty: i64) {
        let res = client
            .post(self.url("/observations"))
            .json(&json!({
                "company_id": c,
                "product_id": p,
                "available_quantity": qty,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Observations are processed in the background; poll until `pred` holds.
async fn get_eventually(
    client: &reqwest::Client,
    url: &str,
    pred: impl Fn(&Value) -> bool,
) -> Value {
    for _ in 0..100 {
        let res = client.get(url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        if pred(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition on {url} not reached within timeout");
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn stock_drop_creates_alert_and_completed_execution() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (c, p) = (CompanyId::new(), ProductId::new());

    srv.observe(&client, c, p, 50).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    srv.observe(&client, c, p, 8).await;

    let alerts = get_eventually(
        &client,
        &srv.url(&format!("/alerts?company_id={c}&product_id={p}")),
        |b| b["total"] == 1,
    )
    .await;
    let alert = &alerts["items"][0];
    assert_eq!(alert["priority"], "critical");
    assert_eq!(alert["current_inventory"], 8);

    let executions = get_eventually(&client, &srv.url(&format!("/executions?company_id={c}")), |b| {
        b["total"] == 1 && b["items"][0]["status"] != "running"
    })
    .await;
    let execution = &executions["items"][0];
    assert_eq!(execution["status"], "completed");
    assert_eq!(execution["alert_id"], alert["id"]);

    let id = execution["id"].as_str().unwrap();
    let res = client.get(srv.url(&format!("/executions/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: Value = res.json().await.unwrap();
    // Diagnosis, plan, and one step per provider.
    assert_eq!(detail["steps"].as_array().unwrap().len(), 4);

    // A repeat low reading does not raise a second alert.
    srv.observe(&client, c, p, 7).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let res = client
        .get(srv.url(&format!("/alerts?product_id={p}")))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn manual_check_and_conflicts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (c, p) = (CompanyId::new(), ProductId::new());
    let check_url = srv.url(&format!("/companies/{c}/products/{p}/check"));

    // Unknown product.
    let res = client.post(&check_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unknown_product");

    // The reading is stored before the 202 is returned.
    srv.observe(&client, c, p, 40).await;
    let res = client.post(&check_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["breach"], false);

    srv.observe(&client, c, p, 3).await;
    let alerts = get_eventually(
        &client,
        &srv.url(&format!("/alerts?product_id={p}")),
        |b| b["total"] == 1,
    )
    .await;
    assert_eq!(alerts["items"][0]["priority"], "critical");

    let res = client.post(&check_url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "active_alert_exists");
}

#[tokio::test]
async fn bad_ids_and_missing_records() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/executions/not-a-uuid")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url(&format!("/executions/{}", replenish_core::ExecutionId::new())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url(&format!("/alerts/{}/ignore", replenish_core::AlertId::new())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn negative_quantities_are_rejected_and_store_stays_usable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (c, p) = (CompanyId::new(), ProductId::new());

    srv.observe(&client, c, p, i64::MAX).await;

    for body in [
        json!({ "company_id": c, "product_id": p, "available_quantity": -1 }),
        json!({ "company_id": c, "product_id": p, "available_quantity": 5, "pending_replenishment": -3 }),
    ] {
        let res = client
            .post(srv.url("/observations"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation_error");
    }

    // The product keeps its last valid reading.
    let res = client
        .post(srv.url(&format!("/companies/{c}/products/{p}/check")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["breach"], false);
}

#[tokio::test]
async fn engine_status_counts_activity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let status = get_eventually(&client, &srv.url("/engine/status"), |_| true).await;
    assert_eq!(status["total_alerts"], 0);
    assert!(status["success_rate"].is_null());

    let (c, p) = (CompanyId::new(), ProductId::new());
    srv.observe(&client, c, p, 5).await;

    let status = get_eventually(&client, &srv.url("/engine/status"), |b| {
        b["completed_executions"] == 1
    })
    .await;
    assert_eq!(status["total_alerts"], 1);
    assert_eq!(status["success_rate"], 1.0);
}
