//! Wire types and validation for the broadcast portal HTTP API.
//!
//! Shared by the server and its clients so request bodies cannot drift from
//! what the server accepts. The server remains the authority on validation,
//! but clients can run the same checks before sending.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const API_PREFIX: &str = "/api";
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

pub const MAX_SESSION_ID_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_TITLE_LEN: usize = 300;
pub const MAX_TEXT_LEN: usize = 20_000;
pub const MAX_EMOJI_LEN: usize = 16;
pub const MAX_SETTING_KEY_LEN: usize = 64;

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::default();
        errors.push(field, message);
        errors.into_error()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|entry| entry.field == field)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for entry in &self.fields {
            write!(f, "; {} {}", entry.field, entry.message)?;
        }
        Ok(())
    }
}

/// Collects every failing field so a client sees all problems at once.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn require(&mut self, field: &str, value: &str, max_len: usize) {
        if value.trim().is_empty() {
            self.push(field, "is required");
        } else if value.chars().count() > max_len {
            self.push(field, format!("must be {} characters or fewer", max_len));
        }
    }

    pub fn optional(&mut self, field: &str, value: &Option<String>, max_len: usize) {
        if let Some(value) = value {
            if value.chars().count() > max_len {
                self.push(field, format!("must be {} characters or fewer", max_len));
            }
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "is required");
        } else if value.len() > MAX_NAME_LEN || !RE_EMAIL.is_match(value.trim()) {
            self.push(field, "must be a valid email address");
        }
    }

    pub fn timestamp(&mut self, field: &str, value: &str) -> Option<DateTime<chrono::FixedOffset>> {
        if value.trim().is_empty() {
            self.push(field, "is required");
            return None;
        }
        match DateTime::parse_from_rfc3339(value.trim()) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.push(field, "must be an RFC3339 timestamp");
                None
            }
        }
    }

    pub fn stream_kind(&mut self, field: &str, value: &str) -> Option<StreamKind> {
        match StreamKind::parse(value) {
            Some(kind) => Some(kind),
            None => {
                self.push(field, "must be one of: tv, radio");
                None
            }
        }
    }

    pub fn into_error(self) -> ErrorInfo {
        ErrorInfo {
            code: "validation_failed".to_string(),
            message: "request failed validation".to_string(),
            fields: self.errors,
        }
    }

    pub fn finish(self) -> Result<(), ErrorInfo> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Presence
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Tv,
    Radio,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Tv, StreamKind::Radio];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Tv => "tv",
            StreamKind::Radio => "radio",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "tv" => Some(StreamKind::Tv),
            "radio" => Some(StreamKind::Radio),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body for join, heartbeat and leave.
///
/// `session_id` is optional on the wire: the server falls back to the
/// visitor cookie when it is absent.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PresenceRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub stream_type: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl PresenceRequest {
    pub fn validate(&self) -> Result<StreamKind, ErrorInfo> {
        let mut errors = FieldErrors::default();
        let kind = errors.stream_kind("streamType", &self.stream_type);
        if let Some(session_id) = &self.session_id {
            validate_session_id(&mut errors, session_id);
        }
        errors.optional("ipAddress", &self.ip_address, MAX_NAME_LEN);
        errors.optional("userAgent", &self.user_agent, MAX_TITLE_LEN * 2);
        errors.finish()?;
        kind.ok_or_else(|| ErrorInfo::field("streamType", "must be one of: tv, radio"))
    }
}

pub fn validate_session_id(errors: &mut FieldErrors, value: &str) {
    errors.require("sessionId", value, MAX_SESSION_ID_LEN);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub session_id: String,
    pub stream_type: StreamKind,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_watching: bool,
    pub joined_at: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub stream_type: StreamKind,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub refreshed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveResponse {
    pub left: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Auth
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginInput {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("username", &self.username, MAX_NAME_LEN);
        errors.require("password", &self.password, MAX_NAME_LEN);
        errors.finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Site content
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published: bool,
}

impl NewsInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("title", &self.title, MAX_TITLE_LEN);
        errors.require("content", &self.content, MAX_TEXT_LEN);
        errors.optional("summary", &self.summary, MAX_TEXT_LEN);
        errors.optional("imageUrl", &self.image_url, MAX_TITLE_LEN * 4);
        errors.optional("category", &self.category, MAX_NAME_LEN);
        errors.optional("author", &self.author, MAX_NAME_LEN);
        errors.finish()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub stream_type: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ProgramInput {
    pub fn validate(&self) -> Result<StreamKind, ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("title", &self.title, MAX_TITLE_LEN);
        errors.optional("description", &self.description, MAX_TEXT_LEN);
        errors.optional("host", &self.host, MAX_NAME_LEN);
        errors.optional("schedule", &self.schedule, MAX_NAME_LEN);
        errors.optional("imageUrl", &self.image_url, MAX_TITLE_LEN * 4);
        let kind = errors.stream_kind("streamType", &self.stream_type);
        errors.finish()?;
        kind.ok_or_else(|| ErrorInfo::field("streamType", "must be one of: tv, radio"))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub starts_at: String,
    #[serde(default)]
    pub ends_at: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl EventInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("title", &self.title, MAX_TITLE_LEN);
        errors.optional("description", &self.description, MAX_TEXT_LEN);
        errors.optional("location", &self.location, MAX_TITLE_LEN);
        errors.optional("imageUrl", &self.image_url, MAX_TITLE_LEN * 4);
        let starts_at = errors.timestamp("startsAt", &self.starts_at);
        if let Some(ends_at) = &self.ends_at {
            let ends_at = errors.timestamp("endsAt", ends_at);
            if let (Some(start), Some(end)) = (starts_at, ends_at) {
                if end < start {
                    errors.push("endsAt", "must not be before startsAt");
                }
            }
        }
        errors.finish()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl RsvpInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("name", &self.name, MAX_NAME_LEN);
        errors.email("email", &self.email);
        errors.finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Visitor submissions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl ContactInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("name", &self.name, MAX_NAME_LEN);
        errors.email("email", &self.email);
        errors.optional("subject", &self.subject, MAX_TITLE_LEN);
        errors.require("message", &self.message, MAX_TEXT_LEN);
        errors.finish()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SubscribeInput {
    #[serde(default)]
    pub email: String,
}

impl SubscribeInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.email("email", &self.email);
        errors.finish()
    }

    /// Subscribers are unique per address regardless of case.
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub content: String,
}

impl CommentInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("authorName", &self.author_name, MAX_NAME_LEN);
        errors.require("content", &self.content, MAX_TEXT_LEN);
        errors.finish()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveCommentInput {
    #[serde(default)]
    pub stream_type: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub content: String,
}

impl LiveCommentInput {
    pub fn validate(&self) -> Result<StreamKind, ErrorInfo> {
        let mut errors = FieldErrors::default();
        let kind = errors.stream_kind("streamType", &self.stream_type);
        errors.require("authorName", &self.author_name, MAX_NAME_LEN);
        errors.require("content", &self.content, MAX_TITLE_LEN * 2);
        errors.finish()?;
        kind.ok_or_else(|| ErrorInfo::field("streamType", "must be one of: tv, radio"))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveReactionInput {
    #[serde(default)]
    pub stream_type: String,
    #[serde(default)]
    pub emoji: String,
}

impl LiveReactionInput {
    pub fn validate(&self) -> Result<StreamKind, ErrorInfo> {
        let mut errors = FieldErrors::default();
        let kind = errors.stream_kind("streamType", &self.stream_type);
        errors.require("emoji", &self.emoji, MAX_EMOJI_LEN);
        errors.finish()?;
        kind.ok_or_else(|| ErrorInfo::field("streamType", "must be one of: tv, radio"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongRequestStatus {
    Pending,
    Played,
    Rejected,
}

impl SongRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongRequestStatus::Pending => "pending",
            SongRequestStatus::Played => "played",
            SongRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(SongRequestStatus::Pending),
            "played" => Some(SongRequestStatus::Played),
            "rejected" => Some(SongRequestStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRequestInput {
    #[serde(default)]
    pub requester_name: String,
    #[serde(default)]
    pub song_title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SongRequestInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("requesterName", &self.requester_name, MAX_NAME_LEN);
        errors.require("songTitle", &self.song_title, MAX_TITLE_LEN);
        errors.optional("artist", &self.artist, MAX_NAME_LEN);
        errors.optional("message", &self.message, MAX_TITLE_LEN * 2);
        errors.finish()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SongRequestStatusInput {
    #[serde(default)]
    pub status: String,
}

impl SongRequestStatusInput {
    pub fn validate(&self) -> Result<SongRequestStatus, ErrorInfo> {
        SongRequestStatus::parse(&self.status).ok_or_else(|| {
            ErrorInfo::field("status", "must be one of: pending, played, rejected")
        })
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRequestInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub preferred_date: Option<String>,
}

impl InterviewRequestInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("name", &self.name, MAX_NAME_LEN);
        errors.email("email", &self.email);
        errors.optional("organization", &self.organization, MAX_NAME_LEN);
        errors.require("topic", &self.topic, MAX_TEXT_LEN);
        errors.optional("preferredDate", &self.preferred_date, MAX_NAME_LEN);
        errors.finish()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramProposalInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl ProgramProposalInput {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        let mut errors = FieldErrors::default();
        errors.require("name", &self.name, MAX_NAME_LEN);
        errors.email("email", &self.email);
        errors.require("title", &self.title, MAX_TITLE_LEN);
        errors.require("description", &self.description, MAX_TEXT_LEN);
        errors.finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Site settings
// ═══════════════════════════════════════════════════════════════════════════════

pub type SiteSettings = BTreeMap<String, String>;

pub fn validate_settings(settings: &SiteSettings) -> Result<(), ErrorInfo> {
    let mut errors = FieldErrors::default();
    if settings.is_empty() {
        errors.push("settings", "at least one setting is required");
    }
    for (key, value) in settings {
        if key.trim().is_empty() || key.len() > MAX_SETTING_KEY_LEN {
            errors.push(
                key,
                format!("key must be 1 to {} characters", MAX_SETTING_KEY_LEN),
            );
        } else if value.chars().count() > MAX_TEXT_LEN {
            errors.push(key, format!("must be {} characters or fewer", MAX_TEXT_LEN));
        }
    }
    errors.finish()
}
