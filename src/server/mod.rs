//! HTTP/WebSocket mailbox server
//!
//! Producers POST results to `/callback`; clients poll `/latest-data` (or a
//! specific job) until the result shows up, and may follow `/ws/events` for
//! push notifications instead.

mod events;
pub mod routes;
pub mod state;

pub use events::ws_handler;
pub use state::ServerAppState;

use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue,
    },
    routing::{get, post},
    Json, Router,
};
use crate::utils::ResultExt;
use routes::mailbox_routes;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Version information for the server
#[derive(serde::Serialize)]
struct VersionInfo {
    name: String,
    version: String,
}

fn cors_layer(cors_origins: &[String]) -> CorsLayer {
    if cors_origins.is_empty() {
        // Permissive CORS: allow any origin (default for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers([CONTENT_TYPE, ACCEPT])
    } else {
        let allowed_origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods(Any)
            .allow_headers([CONTENT_TYPE, ACCEPT])
    }
}

/// Build the application router
pub fn build_router(state: ServerAppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/callback", post(mailbox_routes::callback_handler))
        .route(
            "/latest-data",
            get(mailbox_routes::latest_data_handler).delete(mailbox_routes::clear_latest_handler),
        )
        .route(
            "/reset",
            get(mailbox_routes::reset_handler).post(mailbox_routes::reset_handler),
        )
        .route(
            "/jobs/:job_id",
            get(mailbox_routes::get_job_handler).delete(mailbox_routes::take_job_handler),
        )
        .route("/ws/events", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Serve on an already bound listener until shutdown is requested
pub async fn serve(
    listener: TcpListener,
    state: ServerAppState,
    cors_origins: &[String],
) -> Result<(), String> {
    let app = build_router(state.clone(), cors_origins);

    let shutdown_state = state.shutdown_state.clone();
    let shutdown_signal = async move {
        shutdown_state.wait().await;
        log::info!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .with_context("Server error")
}

/// Run the HTTP/WebSocket server
pub async fn run_server(
    port: u16,
    bind: &str,
    state: ServerAppState,
    cors_origins: &[String],
) -> Result<(), String> {
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context("Invalid address")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(&format!("Failed to bind to {}", addr))?;

    let cors_display = if cors_origins.is_empty() {
        "*".to_string()
    } else {
        cors_origins.join(", ")
    };

    println!("\nOpsis mailbox server");
    println!("  URL:           http://{}:{}", bind, port);
    println!("  CORS origins:  {}", cors_display);
    println!("  Unread policy: {:?}", state.mailbox.policy());
    println!("  Endpoints:");
    println!("    POST       /callback       - Producer result delivery");
    println!("    GET        /latest-data    - Latest result (?jobId= for one job)");
    println!("    DELETE     /latest-data    - Clear the latest slot only");
    println!("    GET|POST   /reset          - Clear the mailbox");
    println!("    GET|DELETE /jobs/:job_id   - Peek or consume one job's result");
    println!("    GET        /ws/events      - WebSocket events");
    println!("    GET        /health         - Health check\n");

    log::info!("Server listening on http://{}", addr);

    serve(listener, state, cors_origins).await
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

async fn version_handler() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
