//! HTTP surface. Everything is mounted under `/api`.

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post, put},
    Json, Router,
};
use portal_protocol::{FieldErrors, StreamKind, API_PREFIX, MAX_REQUEST_BYTES};
use serde::Serialize;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::sweep::SweepSnapshot;

mod admin;
mod auth;
mod content;
mod presence;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest(API_PREFIX, api_routes())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Presence
        .route("/active-users/join", post(presence::join))
        .route("/active-users/heartbeat", post(presence::heartbeat))
        .route("/active-users/leave", post(presence::leave))
        .route("/active-users/count/:stream_type", get(presence::count))
        // Auth
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::current_user))
        // News + comments
        .route("/news", get(content::list_news).post(content::create_news))
        .route(
            "/news/:id",
            get(content::get_news)
                .put(content::update_news)
                .delete(content::delete_news),
        )
        .route(
            "/news/:id/comments",
            get(content::list_comments).post(content::create_comment),
        )
        // Programs
        .route(
            "/programs",
            get(content::list_programs).post(content::create_program),
        )
        .route(
            "/programs/:id",
            get(content::get_program)
                .put(content::update_program)
                .delete(content::delete_program),
        )
        // Events
        .route("/events", get(content::list_events).post(content::create_event))
        .route(
            "/events/:id",
            get(content::get_event)
                .put(content::update_event)
                .delete(content::delete_event),
        )
        .route("/events/:id/rsvp", post(content::rsvp))
        // Visitor submissions + live interaction
        .route("/contact", post(content::contact))
        .route("/subscribe", post(content::subscribe))
        .route("/interview-requests", post(content::request_interview))
        .route("/program-proposals", post(content::propose_program))
        .route("/song-requests", post(content::request_song))
        .route("/live-comments", post(content::create_live_comment))
        .route("/live-comments/:stream_type", get(content::list_live_comments))
        .route("/live-reactions", post(content::create_live_reaction))
        .route("/live-reactions/:stream_type", get(content::list_live_reactions))
        .route("/settings", get(content::settings))
        // Admin
        .route("/admin/active-users", get(admin::active_users))
        .route("/admin/engagement-metrics", get(admin::engagement_metrics))
        .route("/admin/content-metrics", get(admin::content_metrics))
        .route("/admin/news", get(admin::all_news))
        .route("/admin/events/:id/rsvps", get(admin::event_rsvps))
        .route("/admin/contacts", get(admin::contacts))
        .route("/admin/subscribers", get(admin::subscribers))
        .route("/admin/interview-requests", get(admin::interview_requests))
        .route("/admin/program-proposals", get(admin::program_proposals))
        .route("/admin/song-requests", get(admin::song_requests))
        .route("/admin/song-requests/:id", put(admin::update_song_request))
        .route("/admin/settings", put(admin::update_settings))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    started_at: String,
    sweep: SweepSnapshot,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at.clone(),
        sweep: state.sweep.snapshot(),
    })
}

/// Unwraps a JSON body, reporting malformed input as `invalid_json`.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    let Json(value) = payload?;
    Ok(value)
}

type IdPath = Result<Path<i64>, PathRejection>;

fn path_id(path: IdPath) -> ApiResult<i64> {
    let Path(id) = path?;
    Ok(id)
}

fn path_stream_kind(path: Result<Path<String>, PathRejection>) -> ApiResult<StreamKind> {
    let Path(raw) = path?;
    let mut errors = FieldErrors::default();
    match errors.stream_kind("streamType", &raw) {
        Some(kind) => Ok(kind),
        None => Err(errors.into_error().into()),
    }
}
