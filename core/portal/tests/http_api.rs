//! In-process HTTP tests: the full router against a temp SQLite file.

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use portal_server::clock::{parse_timestamp, ManualClock};
use portal_server::config::PortalConfig;
use portal_server::db::Db;
use portal_server::presence::PresenceService;
use portal_server::sweep::SweepStatus;
use portal_server::{router, AppState};

const ADMIN_USER: &str = "admin";
const ADMIN_PASSWORD: &str = "changeme";

struct Harness {
    _dir: tempfile::TempDir,
    app: Router,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = Db::new(dir.path().join("portal.db")).expect("db init");
    let clock = Arc::new(ManualClock::new(
        parse_timestamp("2026-04-18T19:00:00Z").expect("start time"),
    ));

    let mut config = PortalConfig::default();
    config.auth.session_secret = Some("test-secret".to_string());

    let presence = Arc::new(PresenceService::new(
        db.clone(),
        clock.clone(),
        config.presence,
    ));
    let state = AppState::new(
        db,
        clock.clone(),
        &config,
        presence,
        Arc::new(SweepStatus::default()),
    );
    state
        .auth
        .ensure_admin(ADMIN_USER, ADMIN_PASSWORD)
        .expect("bootstrap admin");

    Harness {
        _dir: dir,
        app: router(state),
        clock,
    }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, cookie: Option<&str>) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    Reply {
        status,
        headers,
        body,
    }
}

async fn login(app: &Router) -> String {
    let reply = send(
        app,
        "POST",
        "/api/login",
        Some(json!({"username": ADMIN_USER, "password": ADMIN_PASSWORD})),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.cookie().expect("session cookie")
}

#[tokio::test]
async fn presence_join_heartbeat_leave() {
    let h = harness();

    let joined = send(
        &h.app,
        "POST",
        "/api/active-users/join",
        Some(json!({"sessionId": "viewer-1", "streamType": "tv"})),
        None,
    )
    .await;
    assert_eq!(joined.status, StatusCode::OK);
    assert_eq!(joined.body["sessionId"], "viewer-1");
    assert_eq!(joined.body["streamType"], "tv");
    assert_eq!(joined.body["isWatching"], true);

    let count = send(&h.app, "GET", "/api/active-users/count/tv", None, None).await;
    assert_eq!(count.body, json!({"streamType": "tv", "count": 1}));

    let beat = send(
        &h.app,
        "POST",
        "/api/active-users/heartbeat",
        Some(json!({"sessionId": "viewer-1", "streamType": "tv"})),
        None,
    )
    .await;
    assert_eq!(beat.body, json!({"refreshed": true}));

    let left = send(
        &h.app,
        "POST",
        "/api/active-users/leave",
        Some(json!({"sessionId": "viewer-1", "streamType": "tv"})),
        None,
    )
    .await;
    assert_eq!(left.body, json!({"left": true}));

    let count = send(&h.app, "GET", "/api/active-users/count/tv", None, None).await;
    assert_eq!(count.body["count"], 0);

    let beat = send(
        &h.app,
        "POST",
        "/api/active-users/heartbeat",
        Some(json!({"sessionId": "viewer-1", "streamType": "tv"})),
        None,
    )
    .await;
    assert_eq!(beat.status, StatusCode::OK);
    assert_eq!(beat.body, json!({"refreshed": false}));
}

#[tokio::test]
async fn count_drops_viewers_outside_live_window() {
    let h = harness();
    send(
        &h.app,
        "POST",
        "/api/active-users/join",
        Some(json!({"sessionId": "viewer-1", "streamType": "radio"})),
        None,
    )
    .await;

    h.clock.advance(Duration::seconds(90));
    let count = send(&h.app, "GET", "/api/active-users/count/radio", None, None).await;
    assert_eq!(count.body["count"], 1);

    h.clock.advance(Duration::seconds(60));
    let count = send(&h.app, "GET", "/api/active-users/count/radio", None, None).await;
    assert_eq!(count.body["count"], 0);
}

#[tokio::test]
async fn unknown_stream_type_is_rejected() {
    let h = harness();

    let joined = send(
        &h.app,
        "POST",
        "/api/active-users/join",
        Some(json!({"sessionId": "viewer-1", "streamType": "podcast"})),
        None,
    )
    .await;
    assert_eq!(joined.status, StatusCode::BAD_REQUEST);
    assert_eq!(joined.body["code"], "validation_failed");
    assert_eq!(joined.body["fields"][0]["field"], "streamType");

    let count = send(&h.app, "GET", "/api/active-users/count/podcast", None, None).await;
    assert_eq!(count.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blank_session_id_and_bad_json_are_rejected() {
    let h = harness();

    let blank = send(
        &h.app,
        "POST",
        "/api/active-users/heartbeat",
        Some(json!({"sessionId": "  ", "streamType": "tv"})),
        None,
    )
    .await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
    assert_eq!(blank.body["fields"][0]["field"], "sessionId");

    let request = Request::builder()
        .method("POST")
        .uri("/api/active-users/join")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = h.app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn join_without_session_id_mints_visitor_cookie() {
    let h = harness();

    let joined = send(
        &h.app,
        "POST",
        "/api/active-users/join",
        Some(json!({"streamType": "radio"})),
        None,
    )
    .await;
    assert_eq!(joined.status, StatusCode::OK);
    let cookie = joined.cookie().expect("visitor cookie");
    assert!(cookie.starts_with("portal_visitor="));
    let visitor = cookie.trim_start_matches("portal_visitor=").to_string();
    assert_eq!(joined.body["sessionId"], visitor.as_str());

    let beat = send(
        &h.app,
        "POST",
        "/api/active-users/heartbeat",
        Some(json!({"streamType": "radio"})),
        Some(&cookie),
    )
    .await;
    assert_eq!(beat.body, json!({"refreshed": true}));
}

#[tokio::test]
async fn join_records_forwarded_ip_and_user_agent() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/api/active-users/join")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.4, 10.0.0.2")
        .header(header::USER_AGENT, "PortalTest/1.0")
        .body(Body::from(
            json!({"sessionId": "viewer-9", "streamType": "tv"}).to_string(),
        ))
        .expect("request");
    let response = h.app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let record: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(record["ipAddress"], "203.0.113.4");
    assert_eq!(record["userAgent"], "PortalTest/1.0");
}

#[tokio::test]
async fn admin_routes_require_login() {
    let h = harness();

    for uri in [
        "/api/admin/active-users",
        "/api/admin/engagement-metrics",
        "/api/admin/content-metrics",
        "/api/admin/news",
    ] {
        let reply = send(&h.app, "GET", uri, None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{uri}");
    }

    let forged = send(
        &h.app,
        "GET",
        "/api/admin/active-users",
        None,
        Some("portal_session=abc.def"),
    )
    .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);

    let rejected = send(
        &h.app,
        "POST",
        "/api/login",
        Some(json!({"username": ADMIN_USER, "password": "wrong"})),
        None,
    )
    .await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_session_unlocks_admin_until_logout() {
    let h = harness();
    let cookie = login(&h.app).await;

    let user = send(&h.app, "GET", "/api/user", None, Some(&cookie)).await;
    assert_eq!(user.status, StatusCode::OK);
    assert_eq!(user.body["username"], ADMIN_USER);
    assert_eq!(user.body["isAdmin"], true);
    assert!(user.body.get("passwordHash").is_none());

    send(
        &h.app,
        "POST",
        "/api/active-users/join",
        Some(json!({"sessionId": "viewer-1", "streamType": "tv"})),
        None,
    )
    .await;
    let viewers = send(&h.app, "GET", "/api/admin/active-users", None, Some(&cookie)).await;
    assert_eq!(viewers.status, StatusCode::OK);
    assert_eq!(viewers.body.as_array().map(Vec::len), Some(1));

    let logout = send(&h.app, "POST", "/api/logout", None, Some(&cookie)).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);

    let after = send(&h.app, "GET", "/api/admin/active-users", None, Some(&cookie)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn news_lifecycle() {
    let h = harness();
    let cookie = login(&h.app).await;

    let anonymous = send(
        &h.app,
        "POST",
        "/api/news",
        Some(json!({"title": "Nope", "content": "Body"})),
        None,
    )
    .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let invalid = send(
        &h.app,
        "POST",
        "/api/news",
        Some(json!({"title": "", "content": ""})),
        Some(&cookie),
    )
    .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body["fields"].as_array().map(Vec::len), Some(2));

    let created = send(
        &h.app,
        "POST",
        "/api/news",
        Some(json!({"title": "Election night", "content": "Live coverage", "published": true})),
        Some(&cookie),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_i64().expect("news id");

    let listed = send(&h.app, "GET", "/api/news", None, None).await;
    assert_eq!(listed.body[0]["title"], "Election night");

    let viewed = send(&h.app, "GET", &format!("/api/news/{id}"), None, None).await;
    assert_eq!(viewed.body["views"], 1);

    let comment = send(
        &h.app,
        "POST",
        &format!("/api/news/{id}/comments"),
        Some(json!({"authorName": "Adjoa", "content": "Thanks!"})),
        None,
    )
    .await;
    assert_eq!(comment.status, StatusCode::CREATED);

    let updated = send(
        &h.app,
        "PUT",
        &format!("/api/news/{id}"),
        Some(json!({"title": "Election results", "content": "Final tally", "published": true})),
        Some(&cookie),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["title"], "Election results");

    let deleted = send(&h.app, "DELETE", &format!("/api/news/{id}"), None, Some(&cookie)).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let missing = send(&h.app, "GET", &format!("/api/news/{id}"), None, None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["code"], "not_found");

    let bad_id = send(&h.app, "GET", "/api/news/abc", None, None).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn song_requests_and_settings() {
    let h = harness();
    let cookie = login(&h.app).await;

    let requested = send(
        &h.app,
        "POST",
        "/api/song-requests",
        Some(json!({"requesterName": "Nana", "songTitle": "Kokrokoo"})),
        None,
    )
    .await;
    assert_eq!(requested.status, StatusCode::CREATED);
    assert_eq!(requested.body["status"], "pending");
    let id = requested.body["id"].as_i64().expect("request id");

    let bad_status = send(
        &h.app,
        "PUT",
        &format!("/api/admin/song-requests/{id}"),
        Some(json!({"status": "skipped"})),
        Some(&cookie),
    )
    .await;
    assert_eq!(bad_status.status, StatusCode::BAD_REQUEST);

    let played = send(
        &h.app,
        "PUT",
        &format!("/api/admin/song-requests/{id}"),
        Some(json!({"status": "played"})),
        Some(&cookie),
    )
    .await;
    assert_eq!(played.body["status"], "played");

    let saved = send(
        &h.app,
        "PUT",
        "/api/admin/settings",
        Some(json!({"siteName": "Portal FM"})),
        Some(&cookie),
    )
    .await;
    assert_eq!(saved.status, StatusCode::OK);

    let settings = send(&h.app, "GET", "/api/settings", None, None).await;
    assert_eq!(settings.body, json!({"siteName": "Portal FM"}));
}

#[tokio::test]
async fn engagement_metrics_reflect_live_viewers() {
    let h = harness();
    let cookie = login(&h.app).await;

    for (session, stream) in [("a", "tv"), ("b", "tv"), ("c", "radio")] {
        send(
            &h.app,
            "POST",
            "/api/active-users/join",
            Some(json!({"sessionId": session, "streamType": stream})),
            None,
        )
        .await;
    }
    send(
        &h.app,
        "POST",
        "/api/live-reactions",
        Some(json!({"streamType": "tv", "emoji": "👏"})),
        None,
    )
    .await;

    let metrics = send(&h.app, "GET", "/api/admin/engagement-metrics", None, Some(&cookie)).await;
    assert_eq!(metrics.status, StatusCode::OK);
    assert_eq!(
        metrics.body["activeViewers"],
        json!({"tv": 2, "radio": 1, "total": 3})
    );
    assert_eq!(metrics.body["totalReactions"], 1);
    assert_eq!(metrics.body["hourlyActivity"].as_array().map(Vec::len), Some(24));
}

#[tokio::test]
async fn health_reports_sweep_status() {
    let h = harness();
    let health = send(&h.app, "GET", "/api/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["status"], "ok");
    assert_eq!(health.body["sweep"]["runs"], 0);
}
