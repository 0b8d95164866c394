use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use live_core::{Channel, Edge};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ChannelsResponse {
    pub channels: Vec<Channel>,
    pub live: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct TriggerParams {
    pub channel_name: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/channels", get(list_channels))
        .route("/channels/{name}", get(get_channel))
        .route("/webhook", post(trigger_webhook))
}

fn parse_status(status: &str) -> Result<Edge, ApiError> {
    match status.trim().to_ascii_lowercase().as_str() {
        "live" => Ok(Edge::BecameLive),
        "offline" => Ok(Edge::BecameOffline),
        other => Err(ApiError::BadRequest(format!(
            "Invalid status '{}', expected 'live' or 'offline'",
            other
        ))),
    }
}

/// GET /api/v1/channels
async fn list_channels(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let channels = state.load_channels().await?;
    let live = channels.iter().filter(|c| c.is_live()).count();
    Ok(Json(ChannelsResponse {
        total: channels.len(),
        live,
        channels,
    }))
}

/// GET /api/v1/channels/{name}
async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .load_channels()
        .await?
        .into_iter()
        .find(|c| c.matches(&name))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Channel {} not found", name)))
}

/// POST /api/v1/webhook?channel_name=..&status=live|offline
///
/// Sends one notification as if the poller had seen the transition. The
/// snapshot is not touched.
async fn trigger_webhook(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<impl IntoResponse, ApiError> {
    let name = params.channel_name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("channel_name must not be empty".into()));
    }
    let edge = parse_status(&params.status)?;
    let sink = state
        .sink
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("No notification sink configured".into()))?;

    sink.notify(name, edge, Utc::now()).await.map_err(|e| {
        tracing::warn!(channel = name, %edge, error = %e, "Manual webhook failed");
        ApiError::Internal(e.to_string())
    })?;

    tracing::info!(channel = name, %edge, "Manual webhook sent");
    Ok(Json(MessageResponse {
        message: format!(
            "Webhook sent for {} with status {}",
            name,
            edge.status_word()
        ),
    }))
}
