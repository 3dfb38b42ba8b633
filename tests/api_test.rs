use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use drop_access::config::AppConfig;
use drop_access::email::LogMailer;
use drop_access::objects::LocalObjectStore;
use drop_access::payments::{sign, WebhookLedger};
use drop_access::server::{create_server, AppState};
use drop_access::storage::InMemoryStorage;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_integration";

struct TestApp {
    router: Router,
    _data: TempDir,
}

fn test_app() -> TestApp {
    let data = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.data_dir = data.path().to_path_buf();
    config.payments.webhook_secret = Some(WEBHOOK_SECRET.to_string());

    let storage = Arc::new(InMemoryStorage::new());
    let objects = Arc::new(LocalObjectStore::new(config.objects_root()).unwrap());
    let ledger = WebhookLedger::open(config.ledger_path()).unwrap();
    let state = AppState::new(config, storage, objects, Arc::new(LogMailer), ledger);

    TestApp {
        router: create_server(state),
        _data: data,
    }
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(req).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn signup(&self, email: &str) -> String {
        let (status, body) = self
            .json(post_json("/api/auth/signup", None, json!({ "email": email })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["api_token"].as_str().unwrap().to_string()
    }

    async fn create_drop(&self, token: &str, body: Value) -> (StatusCode, Value) {
        self.json(post_json("/api/drops/create", Some(token), body))
            .await
    }
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn with_session(uri: &str, session: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-drop-session", session)
        .body(Body::empty())
        .unwrap()
}

fn shared_file_drop(name: &str, recipients: &[&str]) -> Value {
    json!({
        "name": name,
        "kind": "file",
        "expiry_mode": "shared",
        "expires_at": (Utc::now() + Duration::days(1)).to_rfc3339(),
        "recipients": recipients,
    })
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = app.json(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_signup_and_me() {
    let app = test_app();
    let token = app.signup("Owner@Example.com").await;

    let (status, me) = app.json(get("/api/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["email"], "owner@example.com");
    assert_eq!(me["tier"], "free");
    assert!(me["user"].get("api_token").is_none());

    let (status, body) = app.json(get("/api/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = app.json(get("/api/me", Some("da_bogus"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_free_tier_fourth_drop_is_denied_with_upgrade_prompt() {
    let app = test_app();
    let token = app.signup("free@example.com").await;

    for i in 0..3 {
        let (status, body) = app
            .create_drop(&token, shared_file_drop(&format!("drop {i}"), &[]))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let (status, body) = app.create_drop(&token, shared_file_drop("drop 4", &[])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "limit_exceeded");
    let upgrade = &body["error"]["details"]["upgrade"];
    assert_eq!(upgrade["level"], "hard");
    assert_eq!(upgrade["suggested_tier"], "individual");

    let (status, usage) = app.json(get("/api/usage", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["usage"]["drops_this_month"], 3);
    assert_eq!(usage["prompts"][0]["level"], "hard");
}

#[tokio::test]
async fn test_file_drop_verify_and_download() {
    let app = test_app();
    let token = app.signup("sender@example.com").await;
    let (_, created) = app
        .create_drop(&token, shared_file_drop("Contract", &["Reader@Example.com"]))
        .await;
    let drop_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["recipients"][0]["email"], "reader@example.com");

    // Nothing uploaded yet
    let (status, public) = app.json(get(&format!("/api/drops/{drop_id}/public"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["has_content"], false);

    let upload = Request::builder()
        .method("PUT")
        .uri(format!("/api/drops/{drop_id}/file"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/pdf")
        .header("x-file-name", "contract.pdf")
        .body(Body::from("%PDF-1.7 test"))
        .unwrap();
    let (status, uploaded) = app.json(upload).await;
    assert_eq!(status, StatusCode::OK, "{uploaded}");
    assert_eq!(uploaded["file"]["size_bytes"], 13);

    let (status, denied) = app
        .json(post_json(
            &format!("/api/drops/{drop_id}/verify"),
            None,
            json!({ "email": "stranger@example.com" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(denied["error"]["details"]["reason"], "not_recipient");

    let (status, session) = app
        .json(post_json(
            &format!("/api/drops/{drop_id}/verify"),
            None,
            json!({ "email": " reader@example.com " }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{session}");
    let session_token = session["token"].as_str().unwrap().to_string();

    let (status, resumed) = app
        .json(with_session(&format!("/api/drops/{drop_id}/session"), &session_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["email"], "reader@example.com");

    let (status, headers, bytes) = app
        .send(with_session(&format!("/api/drops/{drop_id}/content"), &session_token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"%PDF-1.7 test");
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("contract.pdf"));

    // A session is bound to its drop
    let (_, other) = app.create_drop(&token, shared_file_drop("Other", &[])).await;
    let other_id = other["id"].as_str().unwrap();
    let (status, _) = app
        .json(with_session(&format!("/api/drops/{other_id}/content"), &session_token))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_url_drop_returns_masked_url_only_after_verification() {
    let app = test_app();
    let token = app.signup("linker@example.com").await;
    let (status, created) = app
        .create_drop(
            &token,
            json!({
                "name": "Board deck",
                "kind": "url",
                "masked_url": "https://docs.example.com/deck",
                "expires_at": (Utc::now() + Duration::hours(2)).to_rfc3339(),
                "recipients": ["board@example.com"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let drop_id = created["id"].as_str().unwrap().to_string();

    let (_, _, public) = app
        .send(get(&format!("/api/drops/{drop_id}/public"), None))
        .await;
    assert!(!String::from_utf8_lossy(&public).contains("docs.example.com"));

    let (status, _) = app
        .json(with_session(&format!("/api/drops/{drop_id}/content"), "not-a-session"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, session) = app
        .json(post_json(
            &format!("/api/drops/{drop_id}/verify"),
            None,
            json!({ "email": "board@example.com" }),
        ))
        .await;
    let (status, content) = app
        .json(with_session(
            &format!("/api/drops/{drop_id}/content"),
            session["token"].as_str().unwrap(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content["url"], "https://docs.example.com/deck");
}

#[tokio::test]
async fn test_deleting_drop_revokes_sessions() {
    let app = test_app();
    let token = app.signup("cleanup@example.com").await;
    let (_, created) = app
        .create_drop(&token, shared_file_drop("Temp", &["r@example.com"]))
        .await;
    let drop_id = created["id"].as_str().unwrap().to_string();

    let (_, session) = app
        .json(post_json(
            &format!("/api/drops/{drop_id}/verify"),
            None,
            json!({ "email": "r@example.com" }),
        ))
        .await;

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/drops/{drop_id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .json(with_session(
            &format!("/api/drops/{drop_id}/session"),
            session["token"].as_str().unwrap(),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(get(&format!("/api/drops/{drop_id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analytics_is_a_paid_feature() {
    let app = test_app();
    let token = app.signup("stats@example.com").await;
    let (_, created) = app.create_drop(&token, shared_file_drop("Stats", &[])).await;
    let drop_id = created["id"].as_str().unwrap();

    let (status, body) = app
        .json(get(&format!("/api/drops/{drop_id}/analytics"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "feature_unavailable");
}

fn signed_webhook(body: &Value) -> Request<Body> {
    let raw = body.to_string();
    let signature = sign(WEBHOOK_SECRET, Utc::now().timestamp(), raw.as_bytes()).unwrap();
    Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("x-payment-signature", signature)
        .body(Body::from(raw))
        .unwrap()
}

#[tokio::test]
async fn test_webhooks_drive_subscription_tier() {
    let app = test_app();
    let token = app.signup("payer@example.com").await;
    let (_, me) = app.json(get("/api/me", Some(&token))).await;
    let user_id = me["user"]["id"].as_str().unwrap().to_string();

    // Unsigned and forged deliveries are rejected
    let forged = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header("x-payment-signature", "t=1,v1=00")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = app.json(forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_signature");

    let completed = json!({
        "id": "evt_checkout_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "client_reference_id": user_id,
            "customer": "cus_123",
            "subscription": "sub_123",
            "metadata": { "tier": "individual" }
        }}
    });
    let (status, receipt) = app.json(signed_webhook(&completed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["outcome"], "applied");
    let (_, me) = app.json(get("/api/me", Some(&token))).await;
    assert_eq!(me["tier"], "individual");

    // Same event id again is acknowledged but not re-applied
    let (status, replay) = app.json(signed_webhook(&completed)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["duplicate"], true);

    let deleted = json!({
        "id": "evt_sub_deleted_1",
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_123", "status": "canceled" } }
    });
    let (status, _) = app.json(signed_webhook(&deleted)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, me) = app.json(get("/api/me", Some(&token))).await;
    assert_eq!(me["tier"], "free");
    assert_eq!(me["subscription"]["status"], "canceled");
}

#[tokio::test]
async fn test_per_recipient_drop_needs_paid_tier() {
    let app = test_app();
    let token = app.signup("timer@example.com").await;
    let (status, body) = app
        .create_drop(
            &token,
            json!({
                "name": "Timed",
                "kind": "file",
                "expiry_mode": "per_recipient",
                "access_window_minutes": 30,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["details"]["feature"], "per_recipient_timers");
}
