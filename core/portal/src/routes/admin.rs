use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use portal_protocol::{PresenceRecord, SiteSettings, SongRequestStatusInput};
use std::sync::Arc;

use super::{body, path_id, IdPath};
use crate::auth::AdminUser;
use crate::content::{Contact, InterviewRequest, News, ProgramProposal, Rsvp, SongRequest, Subscriber};
use crate::error::ApiResult;
use crate::metrics::{ContentMetrics, EngagementMetrics};
use crate::state::{blocking, AppState};

pub(super) async fn active_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<PresenceRecord>>> {
    let presence = Arc::clone(&state.presence);
    blocking(move || presence.live_viewers(None)).await.map(Json)
}

pub(super) async fn engagement_metrics(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<EngagementMetrics>> {
    let metrics = Arc::clone(&state.metrics);
    blocking(move || metrics.engagement()).await.map(Json)
}

pub(super) async fn content_metrics(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<ContentMetrics>> {
    let metrics = Arc::clone(&state.metrics);
    blocking(move || metrics.content()).await.map(Json)
}

pub(super) async fn all_news(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<News>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.all_news()).await.map(Json)
}

pub(super) async fn event_rsvps(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
) -> ApiResult<Json<Vec<Rsvp>>> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.rsvps(id)).await.map(Json)
}

pub(super) async fn contacts(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<Contact>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.contacts()).await.map(Json)
}

pub(super) async fn subscribers(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<Subscriber>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.subscribers()).await.map(Json)
}

pub(super) async fn interview_requests(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<InterviewRequest>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.interview_requests()).await.map(Json)
}

pub(super) async fn program_proposals(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<ProgramProposal>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.program_proposals()).await.map(Json)
}

pub(super) async fn song_requests(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<SongRequest>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.song_requests()).await.map(Json)
}

pub(super) async fn update_song_request(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
    payload: Result<Json<SongRequestStatusInput>, JsonRejection>,
) -> ApiResult<Json<SongRequest>> {
    let id = path_id(path)?;
    let status = body(payload)?.validate()?;
    let content = Arc::clone(&state.content);
    blocking(move || content.set_song_request_status(id, status))
        .await
        .map(Json)
}

pub(super) async fn update_settings(
    State(state): State<AppState>,
    admin: AdminUser,
    payload: Result<Json<SiteSettings>, JsonRejection>,
) -> ApiResult<Json<SiteSettings>> {
    let settings = body(payload)?;
    tracing::info!(username = %admin.0.username, "Admin updating site settings");
    let content = Arc::clone(&state.content);
    blocking(move || content.update_settings(settings)).await.map(Json)
}
