//! Public content routes plus the admin-only writes that share their paths.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};
use portal_protocol::{
    CommentInput, ContactInput, EventInput, InterviewRequestInput, LiveCommentInput,
    LiveReactionInput, NewsInput, ProgramInput, ProgramProposalInput, RsvpInput, SiteSettings,
    SongRequestInput, SubscribeInput,
};
use std::sync::Arc;

use super::{body, path_id, path_stream_kind, IdPath};
use crate::auth::AdminUser;
use crate::content::{
    Comment, Contact, Event, InterviewRequest, LiveComment, LiveReaction, News, Program,
    ProgramProposal, ReactionCount, Rsvp, SongRequest, Subscriber,
};
use crate::error::ApiResult;
use crate::state::{blocking, AppState};

type Created<T> = ApiResult<(StatusCode, Json<T>)>;

// ─────────────────────────────────────────────────────────────────────────────
// News
// ─────────────────────────────────────────────────────────────────────────────

pub(super) async fn list_news(State(state): State<AppState>) -> ApiResult<Json<Vec<News>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.published_news()).await.map(Json)
}

pub(super) async fn get_news(State(state): State<AppState>, path: IdPath) -> ApiResult<Json<News>> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.view_news(id)).await.map(Json)
}

pub(super) async fn create_news(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<NewsInput>, JsonRejection>,
) -> Created<News> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let news = blocking(move || content.create_news(input)).await?;
    Ok((StatusCode::CREATED, Json(news)))
}

pub(super) async fn update_news(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
    payload: Result<Json<NewsInput>, JsonRejection>,
) -> ApiResult<Json<News>> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.update_news(id, input)).await.map(Json)
}

pub(super) async fn delete_news(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
) -> ApiResult<StatusCode> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.delete_news(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn list_comments(
    State(state): State<AppState>,
    path: IdPath,
) -> ApiResult<Json<Vec<Comment>>> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.comments(id)).await.map(Json)
}

pub(super) async fn create_comment(
    State(state): State<AppState>,
    path: IdPath,
    payload: Result<Json<CommentInput>, JsonRejection>,
) -> Created<Comment> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let comment = blocking(move || content.add_comment(id, input)).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Programs
// ─────────────────────────────────────────────────────────────────────────────

pub(super) async fn list_programs(State(state): State<AppState>) -> ApiResult<Json<Vec<Program>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.programs()).await.map(Json)
}

pub(super) async fn get_program(
    State(state): State<AppState>,
    path: IdPath,
) -> ApiResult<Json<Program>> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.program(id)).await.map(Json)
}

pub(super) async fn create_program(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<ProgramInput>, JsonRejection>,
) -> Created<Program> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let program = blocking(move || content.create_program(input)).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

pub(super) async fn update_program(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
    payload: Result<Json<ProgramInput>, JsonRejection>,
) -> ApiResult<Json<Program>> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.update_program(id, input)).await.map(Json)
}

pub(super) async fn delete_program(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
) -> ApiResult<StatusCode> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.delete_program(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

pub(super) async fn list_events(State(state): State<AppState>) -> ApiResult<Json<Vec<Event>>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.events()).await.map(Json)
}

pub(super) async fn get_event(State(state): State<AppState>, path: IdPath) -> ApiResult<Json<Event>> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.event(id)).await.map(Json)
}

pub(super) async fn create_event(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<EventInput>, JsonRejection>,
) -> Created<Event> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let event = blocking(move || content.create_event(input)).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub(super) async fn update_event(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
    payload: Result<Json<EventInput>, JsonRejection>,
) -> ApiResult<Json<Event>> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.update_event(id, input)).await.map(Json)
}

pub(super) async fn delete_event(
    State(state): State<AppState>,
    _admin: AdminUser,
    path: IdPath,
) -> ApiResult<StatusCode> {
    let id = path_id(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.delete_event(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn rsvp(
    State(state): State<AppState>,
    path: IdPath,
    payload: Result<Json<RsvpInput>, JsonRejection>,
) -> Created<Rsvp> {
    let id = path_id(path)?;
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let rsvp = blocking(move || content.rsvp(id, input)).await?;
    Ok((StatusCode::CREATED, Json(rsvp)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Visitor submissions
// ─────────────────────────────────────────────────────────────────────────────

pub(super) async fn contact(
    State(state): State<AppState>,
    payload: Result<Json<ContactInput>, JsonRejection>,
) -> Created<Contact> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let contact = blocking(move || content.contact(input)).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub(super) async fn subscribe(
    State(state): State<AppState>,
    payload: Result<Json<SubscribeInput>, JsonRejection>,
) -> Created<Subscriber> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let (subscriber, created) = blocking(move || content.subscribe(input)).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(subscriber)))
}

pub(super) async fn request_interview(
    State(state): State<AppState>,
    payload: Result<Json<InterviewRequestInput>, JsonRejection>,
) -> Created<InterviewRequest> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let request = blocking(move || content.request_interview(input)).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub(super) async fn propose_program(
    State(state): State<AppState>,
    payload: Result<Json<ProgramProposalInput>, JsonRejection>,
) -> Created<ProgramProposal> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let proposal = blocking(move || content.propose_program(input)).await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

pub(super) async fn request_song(
    State(state): State<AppState>,
    payload: Result<Json<SongRequestInput>, JsonRejection>,
) -> Created<SongRequest> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let request = blocking(move || content.request_song(input)).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Live interaction
// ─────────────────────────────────────────────────────────────────────────────

pub(super) async fn create_live_comment(
    State(state): State<AppState>,
    payload: Result<Json<LiveCommentInput>, JsonRejection>,
) -> Created<LiveComment> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let comment = blocking(move || content.add_live_comment(input)).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub(super) async fn list_live_comments(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Vec<LiveComment>>> {
    let kind = path_stream_kind(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.live_comments(kind)).await.map(Json)
}

pub(super) async fn create_live_reaction(
    State(state): State<AppState>,
    payload: Result<Json<LiveReactionInput>, JsonRejection>,
) -> Created<LiveReaction> {
    let input = body(payload)?;
    let content = Arc::clone(&state.content);
    let reaction = blocking(move || content.add_live_reaction(input)).await?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

pub(super) async fn list_live_reactions(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Vec<ReactionCount>>> {
    let kind = path_stream_kind(path)?;
    let content = Arc::clone(&state.content);
    blocking(move || content.live_reactions(kind)).await.map(Json)
}

pub(super) async fn settings(State(state): State<AppState>) -> ApiResult<Json<SiteSettings>> {
    let content = Arc::clone(&state.content);
    blocking(move || content.settings()).await.map(Json)
}
