use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use stockhold_api::app::{AppServices, build_app};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory store, bound to an ephemeral port.
        let app = build_app(Arc::new(AppServices::in_memory()));
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
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const USER_ID: &str = "0190f1a2-7c3d-7e4f-8a9b-0c1d2e3f4a5b";

fn as_user(req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.header("x-user-id", USER_ID)
        .header("x-user-email", "buyer@example.com")
}

async fn create_product(client: &reqwest::Client, srv: &TestServer, stock: u32, price: &str) -> String {
    let res = client
        .post(srv.url("/products"))
        .json(&json!({ "name": "Chair", "price": price, "total_stock": stock }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public_and_tagged() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let header = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["request_id"], header.as_str());
}

#[tokio::test]
async fn product_defaults_and_validation() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_product(&client, &srv, 8, "12.5").await;

    let body: Value = client
        .get(srv.url(&format!("/products/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["available_stock"], 8);
    assert_eq!(body["reserved_stock"], 0);
    assert_eq!(body["price"], "12.50");

    let res = client
        .patch(srv.url(&format!("/products/{id}")))
        .json(&json!({ "total_stock": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .post(srv.url("/products"))
        .json(&json!({ "name": "Yacht", "price": "100000000000000000000", "total_stock": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn purchase_then_oversell_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, 3, "10.00").await;

    let res = as_user(client.post(srv.url("/reservations")))
        .json(&json!({ "product": product, "quantity": 2, "expires_at": "2000-01-01T00:00:00Z" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let reservation: Value = res.json().await.unwrap();
    assert_eq!(reservation["quantity"], 2);
    assert_eq!(reservation["user"], USER_ID);
    assert_ne!(reservation["expires_at"], "2000-01-01T00:00:00Z");

    let res = as_user(client.post(srv.url("/reservations")))
        .json(&json!({ "product": product, "quantity": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");

    let audit: Value = client
        .get(srv.url("/audit?object_type=Reservation"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = audit["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["actor"], "buyer@example.com");
    assert_eq!(items[0]["action"], "reservation_created");
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .post(srv.url("/reservations"))
        .json(&json!({ "product": USER_ID, "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_lifecycle_and_total_recomputation() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, 10, "10.00").await;

    let res = client
        .post(srv.url("/orders"))
        .json(&json!({ "product": product, "quantity": 3, "total": "1.00", "status": "delivered" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let order: Value = res.json().await.unwrap();
    assert_eq!(order["total"], "30.00");
    assert_eq!(order["status"], "pending");
    let id = order["id"].as_str().unwrap().to_string();

    let res = client
        .patch(srv.url(&format!("/orders/{id}")))
        .json(&json!({ "status": "shipped" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transition");

    let res = client
        .patch(srv.url(&format!("/orders/{id}")))
        .json(&json!({ "status": "Confirmed", "quantity": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let order: Value = res.json().await.unwrap();
    assert_eq!(order["status"], "confirmed");
    assert_eq!(order["total"], "40.00");

    let listed: Value = client
        .get(srv.url("/orders?status=CONFIRMED&min_total=40&sort=newest"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["items"].as_array().unwrap().len(), 1);
    assert!(listed["next_cursor"].is_null());

    let res = client
        .get(srv.url("/orders?status=lost"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_pages_are_stable_and_cursor_bound() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, 10, "1.00").await;
    for quantity in 1..=11 {
        let res = client
            .post(srv.url("/orders"))
            .json(&json!({ "product": product, "quantity": quantity }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let first: Value = client
        .get(srv.url("/orders?sort=highest_value"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = first["items"].as_array().unwrap();
    assert_eq!(items.len(), 10);
    assert_eq!(items[0]["total"], "11.00");
    let cursor = first["next_cursor"].as_str().unwrap().to_string();

    let second: Value = client
        .get(srv.url(&format!("/orders?sort=highest_value&cursor={cursor}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = second["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["total"], "1.00");

    let res = client
        .get(srv.url(&format!("/orders?sort=newest&cursor={cursor}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn maintenance_reclaim_is_idempotent() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    for _ in 0..2 {
        let res = client
            .post(srv.url("/maintenance/reclaim-expired"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let report: Value = res.json().await.unwrap();
        assert_eq!(report["reclaimed"], 0);
        assert_eq!(report["failed"], 0);
    }
}
