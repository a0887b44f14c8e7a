use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use portal_protocol::LoginInput;
use std::sync::Arc;

use super::body;
use crate::auth::{clear_cookie, cookie_value, set_cookie, PublicUser, SESSION_COOKIE};
use crate::error::{ApiError, ApiResult};
use crate::state::{blocking, AppState};

pub(super) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<PublicUser>)> {
    let input = body(payload)?;
    input.validate()?;

    let auth = Arc::clone(&state.auth);
    let ttl = auth.session_ttl();
    let (user, cookie) = blocking(move || auth.login(&input.username, &input.password))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie_header(&set_cookie(SESSION_COOKIE, &cookie, ttl))?);
    Ok((headers, Json(user)))
}

pub(super) async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, HeaderMap)> {
    if let Some(cookie) = cookie_value(&headers, SESSION_COOKIE) {
        let auth = Arc::clone(&state.auth);
        blocking(move || auth.logout(&cookie)).await?;
    }

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie_header(&clear_cookie(SESSION_COOKIE))?);
    Ok((StatusCode::NO_CONTENT, response_headers))
}

pub(super) async fn current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PublicUser>> {
    let cookie = cookie_value(&headers, SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
    let auth = Arc::clone(&state.auth);
    blocking(move || auth.current_user(&cookie))
        .await?
        .map(Json)
        .ok_or(ApiError::Unauthorized)
}

fn cookie_header(value: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| ApiError::Internal(format!("Invalid session cookie: {}", err)))
}
