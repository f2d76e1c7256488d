//! HTTP transport glue: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the control thread
//! runs on a plain `std::thread`. Communication is via `std::sync::mpsc`,
//! with a tokio oneshot carrying each reply back, so every request gets
//! the resolved device status the command produced.

use crate::controller::{ColorBody, Command, ControlRequest, StatusReport};
use crate::state::Power;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use std::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State`
/// extractor. Just the channel into the control thread.
#[derive(Clone)]
pub struct AppState {
    pub control_tx: Sender<ControlRequest>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(get_status, post_command),
    components(schemas(Command, StatusReport, ColorBody, Power)),
    tags(
        (name = "control", description = "Strip control endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "LED Strip API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for driving effects on an APA102 LED strip"
    )
)]
pub struct ApiDoc;

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/command", post(post_command))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — the resolved device state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current device status", body = StatusReport)
    )
)]
async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusReport>, (StatusCode, String)> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .control_tx
        .send(ControlRequest::Query { reply: reply_tx })
        .map_err(control_thread_gone)?;

    let status = reply_rx.await.map_err(control_thread_gone)?;
    Ok(Json(status))
}

/// POST /api/v1/command — apply one command and return the resolved state
///
/// Absent fields are left unchanged; numeric fields are clamped rather
/// than rejected; unknown effect names are ignored.
#[utoipa::path(
    post,
    path = "/api/v1/command",
    tag = "control",
    request_body = Command,
    responses(
        (status = 200, description = "Command applied; resolved device status", body = StatusReport)
    )
)]
async fn post_command(
    State(state): State<AppState>,
    Json(command): Json<Command>,
) -> Result<Json<StatusReport>, (StatusCode, String)> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .control_tx
        .send(ControlRequest::Apply {
            command,
            reply: reply_tx,
        })
        .map_err(control_thread_gone)?;

    let status = reply_rx.await.map_err(control_thread_gone)?;
    Ok(Json(status))
}

fn control_thread_gone<E>(_: E) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Control thread gone".to_string(),
    )
}
