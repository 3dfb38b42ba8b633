use crate::access::{AccessService, SessionStore};
use crate::api;
use crate::config::AppConfig;
use crate::drops::DropService;
use crate::email::Mailer;
use crate::objects::ObjectStore;
use crate::payments::{PaymentsClient, WebhookLedger, WebhookProcessor};
use crate::storage::Storage;
use crate::usage::UsageTracker;
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    response::{IntoResponse, Json},
    routing::{delete, get, post, put},
    Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Everything a request handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn Storage>,
    pub drops: DropService,
    pub access: AccessService,
    pub usage: UsageTracker,
    pub payments: Option<Arc<PaymentsClient>>,
    pub webhooks: Arc<WebhookProcessor>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        objects: Arc<dyn ObjectStore>,
        mailer: Arc<dyn Mailer>,
        ledger: WebhookLedger,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let usage = UsageTracker::new(storage.clone());
        let access = AccessService::new(
            storage.clone(),
            sessions.clone(),
            chrono::Duration::minutes(config.access.session_ttl_minutes.max(1)),
        );
        let drops = DropService::new(
            storage.clone(),
            objects,
            mailer,
            usage.clone(),
            sessions,
            &config.server.base_url,
        );
        let payments = PaymentsClient::from_config(&config.payments, &config.server.base_url)
            .map(Arc::new);
        let webhooks = Arc::new(WebhookProcessor::new(storage.clone(), ledger, &config.payments));

        Self {
            config: Arc::new(config),
            storage,
            drops,
            access,
            usage,
            payments,
            webhooks,
        }
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "drop-access",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let upload_limit = usize::try_from(state.config.server.max_upload_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        // Accounts
        .route("/api/auth/signup", post(api::account::signup))
        .route("/api/me", get(api::account::me))
        .route("/api/usage", get(api::account::usage))
        // Owner drop management
        .route("/api/drops", get(api::drops::list_drops))
        .route("/api/drops/create", post(api::drops::create_drop))
        .route(
            "/api/drops/:id",
            get(api::drops::get_drop).delete(api::drops::delete_drop),
        )
        .route(
            "/api/drops/:id/file",
            put(api::drops::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/drops/:id/recipients", post(api::drops::add_recipients))
        .route(
            "/api/drops/:id/recipients/:email",
            delete(api::drops::remove_recipient),
        )
        .route("/api/drops/:id/analytics", get(api::drops::analytics))
        // Recipient access
        .route("/api/drops/:id/public", get(api::access::public_info))
        .route("/api/drops/:id/verify", post(api::access::verify))
        .route("/api/drops/:id/session", get(api::access::session))
        .route("/api/drops/:id/content", get(api::access::content))
        // Billing
        .route("/api/payments/checkout", post(api::payments::checkout))
        .route("/api/payments/webhook", post(api::payments::webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Serve the API on `addr` until Ctrl-C
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_server(state);

    info!("HTTP server running on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
