//! Site content: news, programs, events, visitor submissions and settings.
//!
//! Queries are further `impl Db` blocks; `ContentService` stamps times from
//! the shared clock and turns missing parents into `NotFound`.

use portal_protocol::{
    CommentInput, ContactInput, EventInput, InterviewRequestInput, LiveCommentInput,
    LiveReactionInput, NewsInput, ProgramInput, ProgramProposalInput, RsvpInput, SiteSettings,
    SongRequestInput, SongRequestStatus, StreamKind, SubscribeInput,
};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::clock::{format_timestamp, parse_timestamp, Clock};
use crate::db::{stream_kind_at, Db};
use crate::error::{ApiError, ApiResult};

pub const LIVE_COMMENT_LIMIT: u32 = 50;

// ═══════════════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct News {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub published: bool,
    pub views: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub host: Option<String>,
    pub schedule: Option<String>,
    pub stream_type: StreamKind,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: String,
    pub ends_at: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub news_id: i64,
    pub author_name: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveComment {
    pub id: i64,
    pub stream_type: StreamKind,
    pub author_name: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveReaction {
    pub id: i64,
    pub stream_type: StreamKind,
    pub emoji: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRequest {
    pub id: i64,
    pub requester_name: String,
    pub song_title: String,
    pub artist: Option<String>,
    pub message: Option<String>,
    pub status: SongRequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRequest {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub organization: Option<String>,
    pub topic: String,
    pub preferred_date: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramProposal {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub title: String,
    pub description: String,
    pub created_at: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════════════

const NEWS_COLUMNS: &str =
    "id, title, content, summary, image_url, category, author, published, views, created_at, updated_at";
const PROGRAM_COLUMNS: &str =
    "id, title, description, host, schedule, stream_type, image_url, created_at, updated_at";
const EVENT_COLUMNS: &str =
    "id, title, description, location, starts_at, ends_at, image_url, created_at, updated_at";
const RSVP_COLUMNS: &str = "id, event_id, name, email, created_at";
const COMMENT_COLUMNS: &str = "id, news_id, author_name, content, created_at";
const LIVE_COMMENT_COLUMNS: &str = "id, stream_type, author_name, content, created_at";
const SONG_REQUEST_COLUMNS: &str =
    "id, requester_name, song_title, artist, message, status, created_at, updated_at";

impl Db {
    // ─────────────────────────────────────────────────────────────────────
    // News
    // ─────────────────────────────────────────────────────────────────────

    pub fn list_news(&self, published_only: bool) -> Result<Vec<News>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                &format!(
                    "SELECT {} FROM news WHERE (?1 = 0 OR published = 1) \
                     ORDER BY created_at DESC, id DESC",
                    NEWS_COLUMNS
                ),
                params![published_only],
                news_from_row,
                "news",
            )
        })
    }

    pub fn get_news(&self, id: i64) -> Result<Option<News>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM news WHERE id = ?1", NEWS_COLUMNS),
                params![id],
                news_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to query news {}: {}", id, err))
        })
    }

    /// Bumps the view counter of a published article and returns it.
    pub fn view_published_news(&self, id: i64) -> Result<Option<News>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE news SET views = views + 1 WHERE id = ?1 AND published = 1 \
                     RETURNING {}",
                    NEWS_COLUMNS
                ),
                params![id],
                news_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to record news view {}: {}", id, err))
        })
    }

    pub fn insert_news(&self, input: &NewsInput, now: &str) -> Result<News, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO news \
                     (title, content, summary, image_url, category, author, published, views, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8) RETURNING {}",
                    NEWS_COLUMNS
                ),
                params![
                    input.title.trim(),
                    input.content,
                    input.summary,
                    input.image_url,
                    input.category,
                    input.author,
                    input.published,
                    now
                ],
                news_from_row,
            )
            .map_err(|err| format!("Failed to insert news: {}", err))
        })
    }

    pub fn update_news(&self, id: i64, input: &NewsInput, now: &str) -> Result<Option<News>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE news SET title = ?2, content = ?3, summary = ?4, image_url = ?5, \
                     category = ?6, author = ?7, published = ?8, updated_at = ?9 \
                     WHERE id = ?1 RETURNING {}",
                    NEWS_COLUMNS
                ),
                params![
                    id,
                    input.title.trim(),
                    input.content,
                    input.summary,
                    input.image_url,
                    input.category,
                    input.author,
                    input.published,
                    now
                ],
                news_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to update news {}: {}", id, err))
        })
    }

    pub fn delete_news(&self, id: i64) -> Result<bool, String> {
        delete_by_id(self, "news", id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Programs
    // ─────────────────────────────────────────────────────────────────────

    pub fn list_programs(&self) -> Result<Vec<Program>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                &format!(
                    "SELECT {} FROM programs ORDER BY stream_type, title, id",
                    PROGRAM_COLUMNS
                ),
                [],
                program_from_row,
                "programs",
            )
        })
    }

    pub fn get_program(&self, id: i64) -> Result<Option<Program>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM programs WHERE id = ?1", PROGRAM_COLUMNS),
                params![id],
                program_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to query program {}: {}", id, err))
        })
    }

    pub fn insert_program(
        &self,
        input: &ProgramInput,
        kind: StreamKind,
        now: &str,
    ) -> Result<Program, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO programs \
                     (title, description, host, schedule, stream_type, image_url, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) RETURNING {}",
                    PROGRAM_COLUMNS
                ),
                params![
                    input.title.trim(),
                    input.description,
                    input.host,
                    input.schedule,
                    kind.as_str(),
                    input.image_url,
                    now
                ],
                program_from_row,
            )
            .map_err(|err| format!("Failed to insert program: {}", err))
        })
    }

    pub fn update_program(
        &self,
        id: i64,
        input: &ProgramInput,
        kind: StreamKind,
        now: &str,
    ) -> Result<Option<Program>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE programs SET title = ?2, description = ?3, host = ?4, schedule = ?5, \
                     stream_type = ?6, image_url = ?7, updated_at = ?8 \
                     WHERE id = ?1 RETURNING {}",
                    PROGRAM_COLUMNS
                ),
                params![
                    id,
                    input.title.trim(),
                    input.description,
                    input.host,
                    input.schedule,
                    kind.as_str(),
                    input.image_url,
                    now
                ],
                program_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to update program {}: {}", id, err))
        })
    }

    pub fn delete_program(&self, id: i64) -> Result<bool, String> {
        delete_by_id(self, "programs", id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events + RSVPs
    // ─────────────────────────────────────────────────────────────────────

    pub fn list_events(&self) -> Result<Vec<Event>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                &format!("SELECT {} FROM events ORDER BY starts_at, id", EVENT_COLUMNS),
                [],
                event_from_row,
                "events",
            )
        })
    }

    pub fn get_event(&self, id: i64) -> Result<Option<Event>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                params![id],
                event_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to query event {}: {}", id, err))
        })
    }

    /// `starts_at`/`ends_at` must already be normalized to the stored format.
    pub fn insert_event(
        &self,
        input: &EventInput,
        starts_at: &str,
        ends_at: Option<&str>,
        now: &str,
    ) -> Result<Event, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO events \
                     (title, description, location, starts_at, ends_at, image_url, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) RETURNING {}",
                    EVENT_COLUMNS
                ),
                params![
                    input.title.trim(),
                    input.description,
                    input.location,
                    starts_at,
                    ends_at,
                    input.image_url,
                    now
                ],
                event_from_row,
            )
            .map_err(|err| format!("Failed to insert event: {}", err))
        })
    }

    pub fn update_event(
        &self,
        id: i64,
        input: &EventInput,
        starts_at: &str,
        ends_at: Option<&str>,
        now: &str,
    ) -> Result<Option<Event>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE events SET title = ?2, description = ?3, location = ?4, starts_at = ?5, \
                     ends_at = ?6, image_url = ?7, updated_at = ?8 \
                     WHERE id = ?1 RETURNING {}",
                    EVENT_COLUMNS
                ),
                params![
                    id,
                    input.title.trim(),
                    input.description,
                    input.location,
                    starts_at,
                    ends_at,
                    input.image_url,
                    now
                ],
                event_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to update event {}: {}", id, err))
        })
    }

    pub fn delete_event(&self, id: i64) -> Result<bool, String> {
        delete_by_id(self, "events", id)
    }

    /// One RSVP per (event, email); a repeat RSVP updates the name.
    pub fn upsert_rsvp(&self, event_id: i64, name: &str, email: &str, now: &str) -> Result<Rsvp, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO event_rsvps (event_id, name, email, created_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(event_id, email) DO UPDATE SET name = excluded.name \
                     RETURNING {}",
                    RSVP_COLUMNS
                ),
                params![event_id, name, email, now],
                rsvp_from_row,
            )
            .map_err(|err| format!("Failed to record rsvp: {}", err))
        })
    }

    pub fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                &format!(
                    "SELECT {} FROM event_rsvps WHERE event_id = ?1 ORDER BY created_at, id",
                    RSVP_COLUMNS
                ),
                params![event_id],
                rsvp_from_row,
                "rsvps",
            )
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Comments
    // ─────────────────────────────────────────────────────────────────────

    pub fn list_comments(&self, news_id: i64) -> Result<Vec<Comment>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                &format!(
                    "SELECT {} FROM comments WHERE news_id = ?1 ORDER BY created_at, id",
                    COMMENT_COLUMNS
                ),
                params![news_id],
                comment_from_row,
                "comments",
            )
        })
    }

    pub fn insert_comment(&self, news_id: i64, input: &CommentInput, now: &str) -> Result<Comment, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO comments (news_id, author_name, content, created_at) \
                     VALUES (?1, ?2, ?3, ?4) RETURNING {}",
                    COMMENT_COLUMNS
                ),
                params![news_id, input.author_name.trim(), input.content, now],
                comment_from_row,
            )
            .map_err(|err| format!("Failed to insert comment: {}", err))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Live interaction
    // ─────────────────────────────────────────────────────────────────────

    pub fn insert_live_comment(
        &self,
        kind: StreamKind,
        input: &LiveCommentInput,
        now: &str,
    ) -> Result<LiveComment, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO live_comments (stream_type, author_name, content, created_at) \
                     VALUES (?1, ?2, ?3, ?4) RETURNING {}",
                    LIVE_COMMENT_COLUMNS
                ),
                params![kind.as_str(), input.author_name.trim(), input.content, now],
                live_comment_from_row,
            )
            .map_err(|err| format!("Failed to insert live comment: {}", err))
        })
    }

    /// Latest `limit` comments, newest first.
    pub fn list_live_comments(&self, kind: StreamKind, limit: u32) -> Result<Vec<LiveComment>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                &format!(
                    "SELECT {} FROM live_comments WHERE stream_type = ?1 \
                     ORDER BY created_at DESC, id DESC LIMIT ?2",
                    LIVE_COMMENT_COLUMNS
                ),
                params![kind.as_str(), limit],
                live_comment_from_row,
                "live comments",
            )
        })
    }

    pub fn insert_live_reaction(&self, kind: StreamKind, emoji: &str, now: &str) -> Result<LiveReaction, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "INSERT INTO live_reactions (stream_type, emoji, created_at) \
                 VALUES (?1, ?2, ?3) RETURNING id, stream_type, emoji, created_at",
                params![kind.as_str(), emoji, now],
                |row| {
                    Ok(LiveReaction {
                        id: row.get(0)?,
                        stream_type: stream_kind_at(row, 1)?,
                        emoji: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .map_err(|err| format!("Failed to insert live reaction: {}", err))
        })
    }

    /// Reaction totals by emoji, most used first. `None` covers every stream.
    pub fn reaction_counts(&self, kind: Option<StreamKind>) -> Result<Vec<ReactionCount>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                "SELECT emoji, COUNT(*) AS total FROM live_reactions \
                 WHERE (?1 IS NULL OR stream_type = ?1) \
                 GROUP BY emoji ORDER BY total DESC, emoji",
                params![kind.map(|kind| kind.as_str())],
                |row| {
                    Ok(ReactionCount {
                        emoji: row.get(0)?,
                        count: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                },
                "reaction counts",
            )
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Song requests
    // ─────────────────────────────────────────────────────────────────────

    pub fn insert_song_request(&self, input: &SongRequestInput, now: &str) -> Result<SongRequest, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "INSERT INTO song_requests \
                     (requester_name, song_title, artist, message, status, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING {}",
                    SONG_REQUEST_COLUMNS
                ),
                params![
                    input.requester_name.trim(),
                    input.song_title.trim(),
                    input.artist,
                    input.message,
                    SongRequestStatus::Pending.as_str(),
                    now
                ],
                song_request_from_row,
            )
            .map_err(|err| format!("Failed to insert song request: {}", err))
        })
    }

    pub fn list_song_requests(&self) -> Result<Vec<SongRequest>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                &format!(
                    "SELECT {} FROM song_requests ORDER BY created_at DESC, id DESC",
                    SONG_REQUEST_COLUMNS
                ),
                [],
                song_request_from_row,
                "song requests",
            )
        })
    }

    pub fn update_song_request_status(
        &self,
        id: i64,
        status: SongRequestStatus,
        now: &str,
    ) -> Result<Option<SongRequest>, String> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE song_requests SET status = ?2, updated_at = ?3 WHERE id = ?1 RETURNING {}",
                    SONG_REQUEST_COLUMNS
                ),
                params![id, status.as_str(), now],
                song_request_from_row,
            )
            .optional()
            .map_err(|err| format!("Failed to update song request {}: {}", id, err))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Visitor submissions
    // ─────────────────────────────────────────────────────────────────────

    pub fn insert_contact(&self, input: &ContactInput, now: &str) -> Result<Contact, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "INSERT INTO contacts (name, email, subject, message, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 RETURNING id, name, email, subject, message, created_at",
                params![input.name.trim(), input.email.trim(), input.subject, input.message, now],
                contact_from_row,
            )
            .map_err(|err| format!("Failed to insert contact: {}", err))
        })
    }

    pub fn list_contacts(&self) -> Result<Vec<Contact>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                "SELECT id, name, email, subject, message, created_at FROM contacts \
                 ORDER BY created_at DESC, id DESC",
                [],
                contact_from_row,
                "contacts",
            )
        })
    }

    /// Returns the subscriber and whether this call created it.
    pub fn insert_subscriber(&self, email: &str, now: &str) -> Result<(Subscriber, bool), String> {
        self.with_connection(|conn| {
            let created = conn
                .execute(
                    "INSERT INTO subscribers (email, created_at) VALUES (?1, ?2) \
                     ON CONFLICT(email) DO NOTHING",
                    params![email, now],
                )
                .map_err(|err| format!("Failed to insert subscriber: {}", err))?
                > 0;
            let subscriber = conn
                .query_row(
                    "SELECT id, email, created_at FROM subscribers WHERE email = ?1",
                    params![email],
                    subscriber_from_row,
                )
                .map_err(|err| format!("Failed to query subscriber: {}", err))?;
            Ok((subscriber, created))
        })
    }

    pub fn list_subscribers(&self) -> Result<Vec<Subscriber>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                "SELECT id, email, created_at FROM subscribers ORDER BY created_at DESC, id DESC",
                [],
                subscriber_from_row,
                "subscribers",
            )
        })
    }

    pub fn insert_interview_request(
        &self,
        input: &InterviewRequestInput,
        now: &str,
    ) -> Result<InterviewRequest, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "INSERT INTO interview_requests \
                 (name, email, organization, topic, preferred_date, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 RETURNING id, name, email, organization, topic, preferred_date, created_at",
                params![
                    input.name.trim(),
                    input.email.trim(),
                    input.organization,
                    input.topic,
                    input.preferred_date,
                    now
                ],
                interview_request_from_row,
            )
            .map_err(|err| format!("Failed to insert interview request: {}", err))
        })
    }

    pub fn list_interview_requests(&self) -> Result<Vec<InterviewRequest>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                "SELECT id, name, email, organization, topic, preferred_date, created_at \
                 FROM interview_requests ORDER BY created_at DESC, id DESC",
                [],
                interview_request_from_row,
                "interview requests",
            )
        })
    }

    pub fn insert_program_proposal(
        &self,
        input: &ProgramProposalInput,
        now: &str,
    ) -> Result<ProgramProposal, String> {
        self.with_connection(|conn| {
            conn.query_row(
                "INSERT INTO program_proposals (name, email, title, description, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 RETURNING id, name, email, title, description, created_at",
                params![
                    input.name.trim(),
                    input.email.trim(),
                    input.title.trim(),
                    input.description,
                    now
                ],
                program_proposal_from_row,
            )
            .map_err(|err| format!("Failed to insert program proposal: {}", err))
        })
    }

    pub fn list_program_proposals(&self) -> Result<Vec<ProgramProposal>, String> {
        self.with_connection(|conn| {
            collect_rows(
                conn,
                "SELECT id, name, email, title, description, created_at \
                 FROM program_proposals ORDER BY created_at DESC, id DESC",
                [],
                program_proposal_from_row,
                "program proposals",
            )
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────

    pub fn get_settings(&self) -> Result<SiteSettings, String> {
        self.with_connection(|conn| {
            let pairs = collect_rows(
                conn,
                "SELECT key, value FROM site_settings ORDER BY key",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                "settings",
            )?;
            Ok(pairs.into_iter().collect())
        })
    }

    pub fn upsert_settings(&self, settings: &SiteSettings, now: &str) -> Result<(), String> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| format!("Failed to start settings transaction: {}", err))?;
            for (key, value) in settings {
                tx.execute(
                    "INSERT INTO site_settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key.trim(), value, now],
                )
                .map_err(|err| format!("Failed to save setting {}: {}", key, err))?;
            }
            tx.commit()
                .map_err(|err| format!("Failed to commit settings: {}", err))
        })
    }
}

fn collect_rows<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    what: &str,
) -> Result<Vec<T>, String> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| format!("Failed to prepare {} query: {}", what, err))?;
    let rows = stmt
        .query_map(params, map)
        .map_err(|err| format!("Failed to query {}: {}", what, err))?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row.map_err(|err| format!("Failed to decode {} row: {}", what, err))?);
    }
    Ok(items)
}

fn delete_by_id(db: &Db, table: &str, id: i64) -> Result<bool, String> {
    db.with_connection(|conn| {
        conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])
            .map(|count| count > 0)
            .map_err(|err| format!("Failed to delete from {}: {}", table, err))
    })
}

fn news_from_row(row: &Row<'_>) -> rusqlite::Result<News> {
    Ok(News {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        summary: row.get(3)?,
        image_url: row.get(4)?,
        category: row.get(5)?,
        author: row.get(6)?,
        published: row.get(7)?,
        views: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn program_from_row(row: &Row<'_>) -> rusqlite::Result<Program> {
    Ok(Program {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        host: row.get(3)?,
        schedule: row.get(4)?,
        stream_type: stream_kind_at(row, 5)?,
        image_url: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        starts_at: row.get(4)?,
        ends_at: row.get(5)?,
        image_url: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn rsvp_from_row(row: &Row<'_>) -> rusqlite::Result<Rsvp> {
    Ok(Rsvp {
        id: row.get(0)?,
        event_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        news_id: row.get(1)?,
        author_name: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn live_comment_from_row(row: &Row<'_>) -> rusqlite::Result<LiveComment> {
    Ok(LiveComment {
        id: row.get(0)?,
        stream_type: stream_kind_at(row, 1)?,
        author_name: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn song_request_from_row(row: &Row<'_>) -> rusqlite::Result<SongRequest> {
    let raw: String = row.get(5)?;
    let status = SongRequestStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown song request status: {}", raw),
            )),
        )
    })?;
    Ok(SongRequest {
        id: row.get(0)?,
        requester_name: row.get(1)?,
        song_title: row.get(2)?,
        artist: row.get(3)?,
        message: row.get(4)?,
        status,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        subject: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn subscriber_from_row(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        email: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn interview_request_from_row(row: &Row<'_>) -> rusqlite::Result<InterviewRequest> {
    Ok(InterviewRequest {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        organization: row.get(3)?,
        topic: row.get(4)?,
        preferred_date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn program_proposal_from_row(row: &Row<'_>) -> rusqlite::Result<ProgramProposal> {
    Ok(ProgramProposal {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ContentService {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl ContentService {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }

    pub fn published_news(&self) -> ApiResult<Vec<News>> {
        Ok(self.db.list_news(true)?)
    }

    pub fn all_news(&self) -> ApiResult<Vec<News>> {
        Ok(self.db.list_news(false)?)
    }

    pub fn view_news(&self, id: i64) -> ApiResult<News> {
        self.db.view_published_news(id)?.ok_or(ApiError::NotFound("news"))
    }

    pub fn create_news(&self, input: NewsInput) -> ApiResult<News> {
        input.validate()?;
        let news = self.db.insert_news(&input, &self.now())?;
        info!(news_id = news.id, published = news.published, "News created");
        Ok(news)
    }

    pub fn update_news(&self, id: i64, input: NewsInput) -> ApiResult<News> {
        input.validate()?;
        self.db
            .update_news(id, &input, &self.now())?
            .ok_or(ApiError::NotFound("news"))
    }

    pub fn delete_news(&self, id: i64) -> ApiResult<()> {
        if !self.db.delete_news(id)? {
            return Err(ApiError::NotFound("news"));
        }
        info!(news_id = id, "News deleted");
        Ok(())
    }

    pub fn comments(&self, news_id: i64) -> ApiResult<Vec<Comment>> {
        self.require_news(news_id)?;
        Ok(self.db.list_comments(news_id)?)
    }

    pub fn add_comment(&self, news_id: i64, input: CommentInput) -> ApiResult<Comment> {
        input.validate()?;
        self.require_news(news_id)?;
        Ok(self.db.insert_comment(news_id, &input, &self.now())?)
    }

    fn require_news(&self, id: i64) -> ApiResult<News> {
        match self.db.get_news(id)? {
            Some(news) if news.published => Ok(news),
            _ => Err(ApiError::NotFound("news")),
        }
    }

    pub fn programs(&self) -> ApiResult<Vec<Program>> {
        Ok(self.db.list_programs()?)
    }

    pub fn program(&self, id: i64) -> ApiResult<Program> {
        self.db.get_program(id)?.ok_or(ApiError::NotFound("program"))
    }

    pub fn create_program(&self, input: ProgramInput) -> ApiResult<Program> {
        let kind = input.validate()?;
        let program = self.db.insert_program(&input, kind, &self.now())?;
        info!(program_id = program.id, stream_type = %kind, "Program created");
        Ok(program)
    }

    pub fn update_program(&self, id: i64, input: ProgramInput) -> ApiResult<Program> {
        let kind = input.validate()?;
        self.db
            .update_program(id, &input, kind, &self.now())?
            .ok_or(ApiError::NotFound("program"))
    }

    pub fn delete_program(&self, id: i64) -> ApiResult<()> {
        if !self.db.delete_program(id)? {
            return Err(ApiError::NotFound("program"));
        }
        Ok(())
    }

    pub fn events(&self) -> ApiResult<Vec<Event>> {
        Ok(self.db.list_events()?)
    }

    pub fn event(&self, id: i64) -> ApiResult<Event> {
        self.db.get_event(id)?.ok_or(ApiError::NotFound("event"))
    }

    pub fn create_event(&self, input: EventInput) -> ApiResult<Event> {
        input.validate()?;
        let (starts_at, ends_at) = event_times(&input)?;
        let event = self
            .db
            .insert_event(&input, &starts_at, ends_at.as_deref(), &self.now())?;
        info!(event_id = event.id, starts_at = %event.starts_at, "Event created");
        Ok(event)
    }

    pub fn update_event(&self, id: i64, input: EventInput) -> ApiResult<Event> {
        input.validate()?;
        let (starts_at, ends_at) = event_times(&input)?;
        self.db
            .update_event(id, &input, &starts_at, ends_at.as_deref(), &self.now())?
            .ok_or(ApiError::NotFound("event"))
    }

    pub fn delete_event(&self, id: i64) -> ApiResult<()> {
        if !self.db.delete_event(id)? {
            return Err(ApiError::NotFound("event"));
        }
        Ok(())
    }

    pub fn rsvp(&self, event_id: i64, input: RsvpInput) -> ApiResult<Rsvp> {
        input.validate()?;
        self.event(event_id)?;
        let email = input.email.trim().to_lowercase();
        Ok(self
            .db
            .upsert_rsvp(event_id, input.name.trim(), &email, &self.now())?)
    }

    pub fn rsvps(&self, event_id: i64) -> ApiResult<Vec<Rsvp>> {
        self.event(event_id)?;
        Ok(self.db.list_rsvps(event_id)?)
    }

    pub fn add_live_comment(&self, input: LiveCommentInput) -> ApiResult<LiveComment> {
        let kind = input.validate()?;
        Ok(self.db.insert_live_comment(kind, &input, &self.now())?)
    }

    pub fn live_comments(&self, kind: StreamKind) -> ApiResult<Vec<LiveComment>> {
        Ok(self.db.list_live_comments(kind, LIVE_COMMENT_LIMIT)?)
    }

    pub fn add_live_reaction(&self, input: LiveReactionInput) -> ApiResult<LiveReaction> {
        let kind = input.validate()?;
        Ok(self
            .db
            .insert_live_reaction(kind, input.emoji.trim(), &self.now())?)
    }

    pub fn live_reactions(&self, kind: StreamKind) -> ApiResult<Vec<ReactionCount>> {
        Ok(self.db.reaction_counts(Some(kind))?)
    }

    pub fn request_song(&self, input: SongRequestInput) -> ApiResult<SongRequest> {
        input.validate()?;
        let request = self.db.insert_song_request(&input, &self.now())?;
        info!(song_request_id = request.id, "Song requested");
        Ok(request)
    }

    pub fn song_requests(&self) -> ApiResult<Vec<SongRequest>> {
        Ok(self.db.list_song_requests()?)
    }

    pub fn set_song_request_status(&self, id: i64, status: SongRequestStatus) -> ApiResult<SongRequest> {
        self.db
            .update_song_request_status(id, status, &self.now())?
            .ok_or(ApiError::NotFound("song request"))
    }

    pub fn contact(&self, input: ContactInput) -> ApiResult<Contact> {
        input.validate()?;
        Ok(self.db.insert_contact(&input, &self.now())?)
    }

    pub fn contacts(&self) -> ApiResult<Vec<Contact>> {
        Ok(self.db.list_contacts()?)
    }

    pub fn subscribe(&self, input: SubscribeInput) -> ApiResult<(Subscriber, bool)> {
        input.validate()?;
        Ok(self
            .db
            .insert_subscriber(&input.normalized_email(), &self.now())?)
    }

    pub fn subscribers(&self) -> ApiResult<Vec<Subscriber>> {
        Ok(self.db.list_subscribers()?)
    }

    pub fn request_interview(&self, input: InterviewRequestInput) -> ApiResult<InterviewRequest> {
        input.validate()?;
        Ok(self.db.insert_interview_request(&input, &self.now())?)
    }

    pub fn interview_requests(&self) -> ApiResult<Vec<InterviewRequest>> {
        Ok(self.db.list_interview_requests()?)
    }

    pub fn propose_program(&self, input: ProgramProposalInput) -> ApiResult<ProgramProposal> {
        input.validate()?;
        Ok(self.db.insert_program_proposal(&input, &self.now())?)
    }

    pub fn program_proposals(&self) -> ApiResult<Vec<ProgramProposal>> {
        Ok(self.db.list_program_proposals()?)
    }

    pub fn settings(&self) -> ApiResult<SiteSettings> {
        Ok(self.db.get_settings()?)
    }

    pub fn update_settings(&self, settings: SiteSettings) -> ApiResult<SiteSettings> {
        portal_protocol::validate_settings(&settings)?;
        self.db.upsert_settings(&settings, &self.now())?;
        info!(keys = settings.len(), "Site settings updated");
        Ok(self.db.get_settings()?)
    }
}

/// Normalizes event times to the stored UTC format so `starts_at` sorts and
/// compares lexically.
fn event_times(input: &EventInput) -> ApiResult<(String, Option<String>)> {
    let starts_at = parse_timestamp(input.starts_at.trim())
        .map(format_timestamp)
        .ok_or_else(|| portal_protocol::ErrorInfo::field("startsAt", "must be an RFC3339 timestamp"))?;
    let ends_at = match &input.ends_at {
        Some(raw) => Some(
            parse_timestamp(raw.trim())
                .map(format_timestamp)
                .ok_or_else(|| {
                    portal_protocol::ErrorInfo::field("endsAt", "must be an RFC3339 timestamp")
                })?,
        ),
        None => None,
    };
    Ok((starts_at, ends_at))
}
