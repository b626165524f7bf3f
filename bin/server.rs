// CEAP Analytics - Web Server
// REST API over the conversation orchestrator, with Axum.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use ceap_analytics::{
    setup_database, Answer, DetailedAnswer, HttpChatClient, InMemorySessionStore, Orchestrator,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    fn err(message: String) -> Self {
        Self { success: false, data: None, error: Some(message) }
    }
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct AskDetailedRequest {
    question: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/ai/ask - Answer a question, optionally continuing a session
async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> impl IntoResponse {
    if request.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<Answer>::err("question must not be empty".into())),
        )
            .into_response();
    }

    match state
        .orchestrator
        .answer(&request.question, request.session_id)
        .await
    {
        Ok(answer) => (StatusCode::OK, Json(ApiResponse::ok(answer))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ask failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::<Answer>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// POST /api/ai/ask-detailed - One-shot answer with the tool trace
async fn ask_detailed(
    State(state): State<AppState>,
    Json(request): Json<AskDetailedRequest>,
) -> impl IntoResponse {
    if request.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<DetailedAnswer>::err("question must not be empty".into())),
        )
            .into_response();
    }

    match state.orchestrator.answer_detailed(&request.question).await {
        Ok(answer) => (StatusCode::OK, Json(ApiResponse::ok(answer))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ask-detailed failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::<DetailedAnswer>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// DELETE /api/ai/session/:id - Forget a conversation
async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if state.orchestrator.clear_session(&session_id) {
        (StatusCode::OK, Json(ApiResponse::ok("cleared"))).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<&str>::err(format!("unknown session {}", session_id))),
        )
            .into_response()
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("🌐 CEAP Analytics - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("CEAP_DB").unwrap_or_else(|_| "ceap.db".to_string());
    let conn = Connection::open(&db_path).expect("Failed to open database");
    setup_database(&conn).expect("Failed to initialize database");
    println!("✓ Database opened: {}", db_path);

    let client = HttpChatClient::from_env().expect("Failed to build model client");
    println!("✓ Model: {}", client.model_name());

    let orchestrator = Orchestrator::new(
        Arc::new(client),
        Arc::new(Mutex::new(conn)),
        Arc::new(InMemorySessionStore::new()),
    );

    let state = AppState { orchestrator: Arc::new(orchestrator) };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ai/ask", post(ask))
        .route("/ai/ask-detailed", post(ask_detailed))
        .route("/ai/session/:id", delete(clear_session))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("CEAP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://{}", addr);
    println!("   POST /api/ai/ask            {{\"question\": \"...\", \"session_id\": null}}");
    println!("   POST /api/ai/ask-detailed   {{\"question\": \"...\"}}");
    println!("   DELETE /api/ai/session/:id");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
