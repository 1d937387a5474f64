//! Axum-based API gateway for post-call triage. Config-driven via CoreConfig.

mod handlers;

use axum::http::Method;
use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use calltriage_core::{CallPipeline, CallStore, CoreConfig, RecordStore, RULES};
use std::path::Path as StdPath;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STORE_DIR: &str = "calltriage";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) store: Arc<CallStore>,
    pub(crate) pipeline: Arc<CallPipeline>,
}

impl AppState {
    /// Wires the pipeline to the collaborators selected by config.
    fn new(config: Arc<CoreConfig>, store: Arc<CallStore>) -> Self {
        let completion = calltriage_skills::completion_from_config(&config);
        let backends = calltriage_skills::backends_from_config(&config);
        let shared: Arc<dyn RecordStore> = store.clone();
        let pipeline = Arc::new(CallPipeline::new(&config, shared, Some(completion), backends));
        Self {
            config,
            store,
            pipeline,
        }
    }
}

/// Pre-flight check: config loads, the record store opens, and the port is free.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    let store_path = StdPath::new(&config.storage_path).join(STORE_DIR);

    print!("Checking record store at {}... ", store_path.display());
    let store = CallStore::open_path(&store_path).map_err(|e| format!("record store LOCKED or inaccessible: {}", e))?;
    let (calls, tickets) = store.counts().map_err(|e| format!("record store unreadable: {}", e))?;
    drop(store);
    println!("OK ({} calls, {} tickets)", calls, tickets);

    match config.ticket_backend_url() {
        Some(url) => println!("Ticket backend: {}", url),
        None => println!("Ticket backend: mock (no ticket_backend_url configured)"),
    }
    println!("Completion service: {}", config.llm_mode);

    let port = config.port;
    print!("Checking port {}... ", port);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => {
            return Err(format!("Port {} BLOCKED: {}", port, e));
        }
    }

    println!("\nSUCCESS: All systems GO. Ready to start gateway.");
    Ok(())
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[calltriage-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("[calltriage-gateway] config load failed: {}", e);
            std::process::exit(1);
        }
    };
    let store_path = StdPath::new(&config.storage_path).join(STORE_DIR);
    let store = match CallStore::open_path(&store_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(path = %store_path.display(), error = %e, "could not open record store");
            std::process::exit(1);
        }
    };

    let app = build_app(AppState::new(Arc::clone(&config), Arc::clone(&store)));

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "could not bind gateway port");
            std::process::exit(1);
        }
    };
    tracing::info!(
        llm_mode = %config.llm_mode,
        ticket_backend = config.ticket_backend_url().unwrap_or("mock"),
        "{} listening on {}",
        config.app_name,
        addr
    );
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(error = %e, "gateway server stopped");
    }
    if let Err(e) = store.flush() {
        tracing::warn!(target: "calltriage::store", error = %e, "record store flush failed");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

fn build_app(state: AppState) -> Router {
    // CORS: allow dashboard (3001-3099) and sibling services (8001-8099).
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &axum::http::HeaderValue, _| {
            let s = origin.to_str().unwrap_or("");
            let port = s
                .split(':')
                .last()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            (3001..=3099).contains(&port) || (8001..=8099).contains(&port)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/calls", post(handlers::calls::ingest_call))
        .route("/v1/calls/:call_id", get(handlers::calls::get_call))
        .route(
            "/v1/calls/by-conversation/:conversation_id",
            get(handlers::calls::get_call_by_conversation),
        )
        .route("/v1/calls/:call_id/process", post(handlers::calls::process_call))
        .route("/v1/tickets/:ticket_id", get(handlers::calls::get_ticket))
        .with_state(state)
        .layer(cors)
}

/// GET /api/v1/health – liveness check for dashboards and scripts.
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// GET /v1/status – app identity, collaborator modes, and record counts.
async fn status(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let (calls, tickets, store_status) = match state.store.counts() {
        Ok((calls, tickets)) => (calls, tickets, "ok"),
        Err(e) => {
            tracing::warn!(target: "calltriage::store", error = %e, "record counts unavailable");
            (0, 0, "degraded")
        }
    };
    axum::Json(serde_json::json!({
        "app_name": state.config.app_name,
        "port": state.config.port,
        "llm_mode": state.config.llm_mode,
        "ticket_backend": if state.config.ticket_backend_url().is_some() { "http" } else { "mock" },
        "store": store_status,
        "calls": calls,
        "tickets": tickets,
        "heuristic_rules": RULES.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestGateway {
        _dir: tempfile::TempDir,
        app: Router,
    }

    fn test_config() -> CoreConfig {
        CoreConfig {
            app_name: "Test Gateway".to_string(),
            port: 8011,
            llm_mode: "mock".to_string(),
            ticket_backend_url: None,
            ..CoreConfig::default()
        }
    }

    fn gateway() -> TestGateway {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CallStore::open_path(dir.path()).unwrap());
        let app = build_app(AppState::new(Arc::new(test_config()), store));
        TestGateway { _dir: dir, app }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn duplicate_card_call(call_id: &str) -> Value {
        json!({
            "call_id": call_id,
            "conversation_id": "conv-42",
            "caller_phone": "+34600111222",
            "client_id": "CLI-7",
            "transcript": [
                {"sequence": 1, "speaker": "user", "message": "I lost my health card, can I get a duplicate?"},
                {"sequence": 0, "speaker": "agent", "message": "Hello, how can I help you?"},
                {"sequence": 2, "speaker": "agent", "message": "Sure, we'll post it to the address on file."}
            ]
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let gw = gateway();
        let (status, json) = send(&gw.app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_identity_and_counts() {
        let gw = gateway();
        send(&gw.app, "POST", "/v1/calls", Some(duplicate_card_call("call-1"))).await;
        let (status, json) = send(&gw.app, "GET", "/v1/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["app_name"], "Test Gateway");
        assert_eq!(json["llm_mode"], "mock");
        assert_eq!(json["ticket_backend"], "mock");
        assert_eq!(json["calls"], 1);
        assert_eq!(json["tickets"], 0);
        assert_eq!(json["heuristic_rules"], RULES.len());
    }

    #[tokio::test]
    async fn ingested_call_can_be_read_back() {
        let gw = gateway();
        let (status, json) = send(&gw.app, "POST", "/v1/calls", Some(duplicate_card_call("call-2"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["status"], "received");

        let (status, json) = send(&gw.app, "GET", "/v1/calls/call-2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["transcript"][0]["sequence"], 0);
        assert_eq!(json["client_id"], "CLI-7");

        let (status, json) = send(&gw.app, "GET", "/v1/calls/by-conversation/conv-42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["call_id"], "call-2");

        let (status, _) = send(&gw.app, "POST", "/v1/calls", Some(duplicate_card_call("call-2"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_call_id_is_generated() {
        let gw = gateway();
        let (status, json) = send(&gw.app, "POST", "/v1/calls", Some(json!({"transcript": []}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(!json["call_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_call_and_ticket_are_404() {
        let gw = gateway();
        let (status, _) = send(&gw.app, "GET", "/v1/calls/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&gw.app, "POST", "/v1/calls/ghost/process", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&gw.app, "GET", "/v1/tickets/TKT-20261016-001", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn processing_creates_ticket_through_fallback() {
        let gw = gateway();
        send(&gw.app, "POST", "/v1/calls", Some(duplicate_card_call("call-3"))).await;

        let (status, result) = send(&gw.app, "POST", "/v1/calls/call-3/process", Some(json!({"use_llm": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["success"], true, "{}", result);
        assert_eq!(result["tickets_created"][0]["ok"], true);
        assert_eq!(result["tickets_created"][0]["reason"], "Duplicate card request");
        let ticket_id = result["tickets_created"][0]["id"].as_str().unwrap().to_string();

        let (status, ticket) = send(&gw.app, "GET", &format!("/v1/tickets/{}", ticket_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ticket["client_id"], "CLI-7");

        let (_, call) = send(&gw.app, "GET", "/v1/calls/call-3", None).await;
        assert_eq!(call["status"], "processed");
        assert_eq!(call["analysis"]["classifier_path"], "heuristic");
        assert!(call["analysis"]["decision"]["confidence"].as_f64().unwrap() <= 0.5);
    }

    #[tokio::test]
    async fn process_without_body_uses_defaults() {
        let gw = gateway();
        send(&gw.app, "POST", "/v1/calls", Some(duplicate_card_call("call-4"))).await;
        let (status, result) = send(&gw.app, "POST", "/v1/calls/call-4/process", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["call_id"], "call-4");
    }

    #[tokio::test]
    async fn malformed_process_options_are_rejected() {
        let gw = gateway();
        send(&gw.app, "POST", "/v1/calls", Some(duplicate_card_call("call-5"))).await;
        let (status, json) = send(&gw.app, "POST", "/v1/calls/call-5/process", Some(json!({"use_llm": "maybe"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("invalid process options"));
    }
}
