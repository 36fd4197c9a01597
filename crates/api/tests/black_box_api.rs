use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use posledger_api::app::{build_app, AppServices};
use posledger_api::config::{AppConfig, DashboardSettings};
use posledger_auth::{JwtClaims, Role};
use posledger_core::{BranchId, UserId};
use posledger_infra::seed::{apply_seed, CatalogSeed};

const SECRET: &str = "test-secret";

// Ids follow creation order: Downtown = 1, Airport = 2; Burger = 1, Tea = 2, Noodles = 3.
const SEED: &str = r#"{
    "branches": [
        {"name": "Downtown", "categories": [
            {"name": "Food", "products": [{"name": "Burger", "price": 100}]},
            {"name": "Drinks", "products": [{"name": "Tea", "price": 10}]}
        ]},
        {"name": "Airport", "categories": [
            {"name": "Food", "products": [{"name": "Noodles", "price": 50}]}
        ]}
    ],
    "staff": [
        {"id": 1, "username": "admin", "role": "ADMIN"},
        {"id": 2, "username": "manager", "role": "BRANCH_MANAGER", "branch": "Downtown"},
        {"id": 3, "username": "counter", "role": "COUNTER", "branch": "Downtown"},
        {"id": 4, "username": "kitchen", "role": "KITCHEN", "branch": "Downtown"}
    ]
}"#;

const DOWNTOWN: i64 = 1;
const AIRPORT: i64 = 2;
const BURGER: i64 = 1;
const TEA: i64 = 2;

struct TestServer {
    base_url: String,
    ws_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig {
            jwt_secret: SECRET.to_string(),
            dashboard: DashboardSettings {
                poll_interval: Duration::from_millis(50),
                heartbeat_interval: Duration::from_millis(200),
                snapshot_timeout: Duration::from_secs(2),
            },
            ..AppConfig::default()
        };
        let services = AppServices::in_memory(&config);
        let seed = CatalogSeed::from_json(SEED).expect("seed parses");
        apply_seed(services.store.as_ref(), &seed)
            .await
            .expect("seed applies");

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}"),
            handle,
        }
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

fn mint_jwt(user: i64, role: Role, branch: Option<i64>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(user),
        role,
        branch_id: branch.map(BranchId::new),
        is_superuser: false,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin() -> String {
    mint_jwt(1, Role::Admin, None)
}

fn manager() -> String {
    mint_jwt(2, Role::BranchManager, Some(DOWNTOWN))
}

fn counter() -> String {
    mint_jwt(3, Role::Counter, Some(DOWNTOWN))
}

async fn create_burger_invoice(client: &reqwest::Client, srv: &TestServer, token: &str) -> i64 {
    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(token)
        .json(&json!({"items": [{"product_id": BURGER, "quantity": 1}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["data"]["id"].as_i64().unwrap()
}

async fn pay(client: &reqwest::Client, srv: &TestServer, token: &str, id: i64, amount: f64) -> reqwest::Response {
    client
        .post(srv.url(&format!("/invoices/{id}/payments")))
        .bearer_auth(token)
        .json(&json!({"amount": amount, "payment_method": "CASH"}))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn ledger_routes_require_a_valid_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/invoices")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn whoami_explains_the_callers_access() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(counter())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["user_id"], 3);
    assert_eq!(body["data"]["access"]["role"], "COUNTER");
    assert_eq!(body["data"]["access"]["branch_id"], DOWNTOWN);
}

#[tokio::test]
async fn invoice_payment_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = counter();

    let id = create_burger_invoice(&client, &srv, &token).await;

    let res = pay(&client, &srv, &token, id, 60.0).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["invoice"]["payment_status"], "PARTIAL");
    assert_eq!(body["data"]["invoice"]["paid_amount"].as_f64(), Some(60.0));
    assert_eq!(body["data"]["payment"]["received_by"], 3);

    let res = pay(&client, &srv, &token, id, 50.0).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "state_conflict");

    let res = pay(&client, &srv, &token, id, 40.0).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["invoice"]["payment_status"], "PAID");

    let res = pay(&client, &srv, &token, id, 0.0).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["field"], "amount");

    let res = client
        .get(srv.url(&format!("/invoices/{id}/payments")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Paid invoices stay.
    let res = client
        .delete(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(admin())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn branch_scope_is_enforced_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_burger_invoice(&client, &srv, &counter()).await;

    let airport_manager = mint_jwt(5, Role::BranchManager, Some(AIRPORT));
    let res = client
        .get(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(&airport_manager)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(&airport_manager)
        .json(&json!({"branch_id": DOWNTOWN, "items": [{"product_id": BURGER, "quantity": 1}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let kitchen = mint_jwt(4, Role::Kitchen, Some(DOWNTOWN));
    let res = client
        .get(srv.url("/invoices"))
        .bearer_auth(&kitchen)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/invoices"))
        .bearer_auth(admin())
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn items_and_patches_reprice_the_invoice() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let id = create_burger_invoice(&client, &srv, &counter()).await;

    let res = client
        .post(srv.url(&format!("/invoices/{id}/items")))
        .bearer_auth(counter())
        .json(&json!({"items": [{"product_id": TEA, "quantity": 2}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total_amount"].as_f64(), Some(120.0));
    let tea_line = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["product_id"] == TEA)
        .unwrap()["id"]
        .as_i64()
        .unwrap();

    let res = client
        .patch(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(manager())
        .json(&json!({"discount": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .patch(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(admin())
        .json(&json!({"discount": 20, "notes": "staff meal"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total_amount"].as_f64(), Some(100.0));
    assert_eq!(body["data"]["notes"], "staff meal");

    let res = client
        .patch(srv.url(&format!("/invoices/{id}")))
        .bearer_auth(admin())
        .json(&json!({"paid_amount": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .delete(srv.url(&format!("/invoices/{id}/items/{tea_line}")))
        .bearer_auth(manager())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total_amount"].as_f64(), Some(80.0));

    let res = client
        .post(srv.url(&format!("/invoices/{id}/cancel")))
        .bearer_auth(manager())
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["payment_status"], "CANCELLED");
}

#[tokio::test]
async fn malformed_requests_get_the_error_envelope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/invoices/abc"))
        .bearer_auth(admin())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .post(srv.url("/invoices"))
        .bearer_auth(counter())
        .json(&json!({"items": "burger"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/invoices?date_from=2024-03-10&date_to=2024-03-01"))
        .bearer_auth(admin())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

/// Wait until the hub reports `expected` push sessions.
async fn wait_for_push_sessions(client: &reqwest::Client, srv: &TestServer, expected: u64) {
    for _ in 0..100 {
        let body: Value = client
            .get(srv.url("/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["data"]["hub"]["push_sessions"].as_u64() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("push sessions did not reach {expected}");
}

async fn next_text<S>(socket: &mut S) -> Value
where
    S: futures::Stream<Item = Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("no push message within timeout")
            .expect("socket closed")
            .expect("socket error");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

#[tokio::test]
async fn push_feed_delivers_committed_changes_to_the_branch() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let kitchen = mint_jwt(4, Role::Kitchen, Some(DOWNTOWN));
    let (mut downtown, _) = tokio_tungstenite::connect_async(format!(
        "{}/ws/kitchen/?token={kitchen}",
        srv.ws_url
    ))
    .await
    .expect("websocket handshake");
    let airport_kitchen = mint_jwt(6, Role::Kitchen, Some(AIRPORT));
    let (mut airport, _) = tokio_tungstenite::connect_async(format!(
        "{}/ws/kitchen/?token={airport_kitchen}",
        srv.ws_url
    ))
    .await
    .expect("websocket handshake");
    wait_for_push_sessions(&client, &srv, 2).await;

    let id = create_burger_invoice(&client, &srv, &counter()).await;
    let created = next_text(&mut downtown).await;
    assert_eq!(created, json!({"type": "invoice_created", "invoice_id": id}));

    pay(&client, &srv, &counter(), id, 100.0).await;
    let updated = next_text(&mut downtown).await;
    assert_eq!(
        updated,
        json!({"type": "invoice_updated", "invoice_id": id, "status": "PAID"})
    );

    let nothing = tokio::time::timeout(Duration::from_millis(200), airport.next()).await;
    assert!(nothing.is_err(), "other branch must not see this invoice");
}

#[tokio::test]
async fn anonymous_push_sockets_stay_open_but_receive_nothing() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("{}/ws/orders/", srv.ws_url))
        .await
        .expect("websocket handshake");
    wait_for_push_sessions(&client, &srv, 1).await;

    create_burger_invoice(&client, &srv, &counter()).await;
    let nothing = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(nothing.is_err(), "anonymous socket must stay silent and open");

    drop(socket);
    wait_for_push_sessions(&client, &srv, 0).await;
}

/// Read SSE frames until `predicate` matches the accumulated text.
async fn read_sse_until(res: &mut reqwest::Response, predicate: impl Fn(&str) -> bool) -> String {
    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !predicate(&seen) {
        let chunk = tokio::time::timeout_at(deadline, res.chunk())
            .await
            .expect("dashboard stream stalled")
            .unwrap()
            .expect("dashboard stream ended");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    seen
}

#[tokio::test]
async fn dashboard_stream_pushes_snapshots_on_change() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut res = client
        .get(srv.url(&format!("/dashboard/stream?token={}", manager())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let opening = read_sse_until(&mut res, |s| s.contains("event: dashboard_update")).await;
    assert!(opening.contains("event: connected"));
    assert!(opening.contains("\"update_type\":\"branch_update\""));
    assert!(opening.contains("\"today_sales\":0.0"));

    let id = create_burger_invoice(&client, &srv, &counter()).await;
    pay(&client, &srv, &counter(), id, 100.0).await;

    let refreshed = read_sse_until(&mut res, |s| s.contains("\"today_collected\":100.0")).await;
    assert!(refreshed.contains("\"today_sales\":100.0"));

    let heartbeat = read_sse_until(&mut res, |s| s.contains(": heartbeat")).await;
    assert!(heartbeat.contains("heartbeat"));
}

#[tokio::test]
async fn dashboard_is_refused_to_floor_staff() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/dashboard/stream"))
        .bearer_auth(counter())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url(&format!("/dashboard/stream?branch_id={AIRPORT}")))
        .bearer_auth(manager())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_dashboard_defaults_to_the_global_view() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut res = client
        .get(srv.url("/dashboard/stream"))
        .bearer_auth(admin())
        .send()
        .await
        .unwrap();
    let opening = read_sse_until(&mut res, |s| s.contains("event: dashboard_update")).await;
    assert!(opening.contains("\"update_type\":\"initial\""));
    assert!(opening.contains("\"total_branch\":2"));
    assert!(opening.contains("\"total_user\":4"));
}
