//! The chat endpoint in front of the query resolver.

use std::sync::Arc;

use argo_core::QueryResolver;
use argo_types::QueryRequest;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub const NO_MESSAGE: &str = "No message provided";

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<QueryResolver>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub selected_float: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/chat", post(chat))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorBody>)> {
    let bad_request = || {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: NO_MESSAGE.to_string(),
            }),
        )
    };

    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable chat body");
            return Err(bad_request());
        }
    };
    let Some(message) = req.message.filter(|m| !m.trim().is_empty()) else {
        return Err(bad_request());
    };

    let resolution = state
        .resolver
        .resolve(&QueryRequest::new(message, req.selected_float))
        .await;
    info!(outcome = ?resolution.outcome, "chat answered");
    Ok(Json(ChatResponse {
        response: resolution.response,
    }))
}

async fn healthz() -> &'static str {
    "ok"
}
