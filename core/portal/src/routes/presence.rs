use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::{
        header::{SET_COOKIE, USER_AGENT},
        HeaderMap, HeaderValue,
    },
    Json,
};
use chrono::Duration;
use portal_protocol::{
    validate_session_id, CountResponse, FieldErrors, HeartbeatResponse, LeaveResponse,
    PresenceRecord, PresenceRequest, StreamKind,
};
use std::sync::Arc;

use super::{body, path_stream_kind};
use crate::auth::{cookie_value, random_token, set_cookie, VISITOR_COOKIE};
use crate::error::{ApiError, ApiResult};
use crate::state::{blocking, AppState};

const VISITOR_COOKIE_DAYS: i64 = 365;

pub(super) async fn join(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PresenceRequest>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<PresenceRecord>)> {
    let request = body(payload)?;
    let kind = request.validate()?;

    let mut response_headers = HeaderMap::new();
    let session_id = match resolve_session_id(&request, &headers)? {
        Some(session_id) => session_id,
        None => {
            let minted = random_token();
            let cookie = set_cookie(VISITOR_COOKIE, &minted, Duration::days(VISITOR_COOKIE_DAYS));
            response_headers.insert(
                SET_COOKIE,
                HeaderValue::from_str(&cookie)
                    .map_err(|err| ApiError::Internal(format!("Invalid visitor cookie: {}", err)))?,
            );
            minted
        }
    };

    let ip_address = request
        .ip_address
        .clone()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| forwarded_for(&headers));
    let user_agent = request
        .user_agent
        .clone()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| header_text(&headers, USER_AGENT.as_str()));

    let presence = Arc::clone(&state.presence);
    let record = blocking(move || {
        presence.join(&session_id, kind, ip_address.as_deref(), user_agent.as_deref())
    })
    .await?;
    Ok((response_headers, Json(record)))
}

pub(super) async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PresenceRequest>, JsonRejection>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let request = body(payload)?;
    let kind = request.validate()?;
    let session_id = required_session_id(&request, &headers)?;

    let presence = Arc::clone(&state.presence);
    let refreshed = blocking(move || presence.heartbeat(&session_id, kind)).await?;
    Ok(Json(HeartbeatResponse { refreshed }))
}

pub(super) async fn leave(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PresenceRequest>, JsonRejection>,
) -> ApiResult<Json<LeaveResponse>> {
    let request = body(payload)?;
    let kind = request.validate()?;
    let session_id = required_session_id(&request, &headers)?;

    let presence = Arc::clone(&state.presence);
    let left = blocking(move || presence.leave(&session_id, kind)).await?;
    Ok(Json(LeaveResponse { left }))
}

pub(super) async fn count(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<CountResponse>> {
    let kind: StreamKind = path_stream_kind(path)?;
    let presence = Arc::clone(&state.presence);
    let count = blocking(move || presence.count(kind)).await?;
    Ok(Json(CountResponse {
        stream_type: kind,
        count,
    }))
}

/// Body `sessionId` wins; otherwise the visitor cookie.
fn resolve_session_id(request: &PresenceRequest, headers: &HeaderMap) -> ApiResult<Option<String>> {
    if let Some(session_id) = &request.session_id {
        return Ok(Some(session_id.trim().to_string()));
    }
    match cookie_value(headers, VISITOR_COOKIE) {
        Some(cookie) => {
            let mut errors = FieldErrors::default();
            validate_session_id(&mut errors, &cookie);
            errors.finish()?;
            Ok(Some(cookie))
        }
        None => Ok(None),
    }
}

fn required_session_id(request: &PresenceRequest, headers: &HeaderMap) -> ApiResult<String> {
    resolve_session_id(request, headers)?.ok_or_else(|| {
        portal_protocol::ErrorInfo::field("sessionId", "is required").into()
    })
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_text(headers, "x-forwarded-for").and_then(|value| {
        value
            .split(',')
            .map(str::trim)
            .find(|entry| !entry.is_empty())
            .map(str::to_string)
    })
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.7, 10.0.0.1"),
        );
        assert_eq!(forwarded_for(&headers).as_deref(), Some("198.51.100.7"));
        assert!(forwarded_for(&HeaderMap::new()).is_none());
    }

    #[test]
    fn body_session_id_beats_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("portal_visitor=from-cookie"),
        );
        let mut request = PresenceRequest {
            session_id: Some("from-body".to_string()),
            stream_type: "tv".to_string(),
            ..Default::default()
        };
        assert_eq!(
            resolve_session_id(&request, &headers).unwrap().as_deref(),
            Some("from-body")
        );

        request.session_id = None;
        assert_eq!(
            resolve_session_id(&request, &headers).unwrap().as_deref(),
            Some("from-cookie")
        );
        assert!(required_session_id(&request, &HeaderMap::new()).is_err());
    }
}
