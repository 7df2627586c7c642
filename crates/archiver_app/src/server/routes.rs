use std::convert::Infallible;

use archiver_core::{JobId, JobUpdate};
use archiver_engine::UpdateReceiver;
use archiver_logging::{archiver_debug, archiver_info};
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartExportBody {
    token: String,
    #[serde(default)]
    guild_id: Option<String>,
    channel_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartExportResponse {
    job_id: JobId,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/start-export", post(start_export))
        .route("/export-status/{job_id}", get(export_status))
        .route("/guilds", get(guilds))
        .route("/guilds/{guild_id}/channels", get(guild_channels))
        .route("/guilds/{guild_id}/threads", get(guild_threads))
        .route("/channels/{channel_id}/threads", get(channel_threads))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /start-export: look the channel up and start a background export.
async fn start_export(
    State(state): State<AppState>,
    Json(body): Json<StartExportBody>,
) -> AppResult<(StatusCode, Json<StartExportResponse>)> {
    let token = body.token.trim();
    let channel_id = body.channel_id.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("token is required".into()));
    }
    if channel_id.is_empty() || !channel_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(
            "channelId must be a numeric channel id".into(),
        ));
    }
    let guild_id = body.guild_id.filter(|g| !g.trim().is_empty());

    let job_id = state.service.start(token, guild_id, channel_id).await?;
    archiver_info!("Started export job_id={} channel={}", job_id, channel_id);
    Ok((StatusCode::ACCEPTED, Json(StartExportResponse { job_id })))
}

/// GET /export-status/{job_id}: server-sent events for one job.
async fn export_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let job_id = JobId::from(job_id);
    archiver_debug!("Status stream opened job_id={}", job_id);
    let updates = state.service.registry().subscribe(&job_id).await;
    Sse::new(update_events(updates)).keep_alive(KeepAlive::default())
}

/// Events until the first terminal update, or until the job is dropped.
fn update_events(updates: UpdateReceiver) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((updates, false), |(mut updates, done)| async move {
        if done {
            return None;
        }
        let update = updates.recv().await?;
        let terminal = update.status.is_terminal();
        Some((Ok(to_event(&update)), (updates, terminal)))
    })
}

fn to_event(update: &JobUpdate) -> Event {
    let data = serde_json::to_string(update).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(update.status.event_name()).data(data)
}

fn bearer(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
        .ok_or(AppError::MissingToken)
}

async fn guilds(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let token = bearer(&headers)?;
    Ok(Json(state.service.client().list_guilds(&token).await?))
}

async fn guild_channels(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let token = bearer(&headers)?;
    let channels = state
        .service
        .client()
        .list_guild_channels(&token, &guild_id)
        .await?;
    Ok(Json(channels))
}

async fn guild_threads(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let token = bearer(&headers)?;
    let threads = state
        .service
        .client()
        .list_active_threads(&token, &guild_id)
        .await?;
    Ok(Json(threads))
}

async fn channel_threads(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let token = bearer(&headers)?;
    let threads = state
        .service
        .client()
        .list_archived_threads(&token, &channel_id)
        .await?;
    Ok(Json(threads))
}
