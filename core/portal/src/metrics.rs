//! Read-only rollups for the admin dashboard, computed on demand.

use chrono::{DateTime, Duration, DurationRound, Utc};
use portal_protocol::StreamKind;
use rusqlite::{params, Connection, Params};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::format_timestamp;
use crate::content::ReactionCount;
use crate::db::Db;
use crate::presence::PresenceService;

const TOP_N: usize = 5;
const ACTIVITY_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerCounts {
    pub tv: u64,
    pub radio: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyActivity {
    pub hour: String,
    pub comments: u64,
    pub reactions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetrics {
    pub active_viewers: ViewerCounts,
    pub total_reactions: u64,
    pub reactions_by_emoji: Vec<ReactionCount>,
    pub top_reactions: Vec<ReactionCount>,
    pub total_live_comments: u64,
    pub total_news_comments: u64,
    pub total_song_requests: u64,
    pub pending_song_requests: u64,
    pub hourly_activity: Vec<HourlyActivity>,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsViews {
    pub id: i64,
    pub title: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRsvps {
    pub event_id: i64,
    pub title: String,
    pub rsvps: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetrics {
    pub total_news: u64,
    pub published_news: u64,
    pub total_news_views: u64,
    pub top_news: Vec<NewsViews>,
    pub total_programs: u64,
    pub total_events: u64,
    pub upcoming_events: u64,
    pub total_rsvps: u64,
    pub rsvps_by_event: Vec<EventRsvps>,
    pub total_subscribers: u64,
    pub total_contacts: u64,
    pub generated_at: String,
}

struct EngagementTotals {
    live_comments: u64,
    news_comments: u64,
    song_requests: u64,
    pending_song_requests: u64,
    comments_by_hour: HashMap<String, u64>,
    reactions_by_hour: HashMap<String, u64>,
}

impl Db {
    fn engagement_totals(&self, since: &str) -> Result<EngagementTotals, String> {
        self.with_connection(|conn| {
            Ok(EngagementTotals {
                live_comments: scalar(conn, "SELECT COUNT(*) FROM live_comments", [])?,
                news_comments: scalar(conn, "SELECT COUNT(*) FROM comments", [])?,
                song_requests: scalar(conn, "SELECT COUNT(*) FROM song_requests", [])?,
                pending_song_requests: scalar(
                    conn,
                    "SELECT COUNT(*) FROM song_requests WHERE status = 'pending'",
                    [],
                )?,
                comments_by_hour: hourly(conn, "live_comments", since)?,
                reactions_by_hour: hourly(conn, "live_reactions", since)?,
            })
        })
    }

    fn content_metrics_at(&self, now: &str) -> Result<ContentMetrics, String> {
        self.with_connection(|conn| {
            let top_news = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, title, views FROM news \
                         ORDER BY views DESC, id LIMIT ?1",
                    )
                    .map_err(|err| format!("Failed to prepare top news query: {}", err))?;
                let rows = stmt
                    .query_map(params![TOP_N as i64], |row| {
                        Ok(NewsViews {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            views: row.get::<_, i64>(2)?.max(0) as u64,
                        })
                    })
                    .map_err(|err| format!("Failed to query top news: {}", err))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|err| format!("Failed to decode top news: {}", err))?
            };

            let rsvps_by_event = {
                let mut stmt = conn
                    .prepare(
                        "SELECT e.id, e.title, COUNT(r.id) AS total FROM events e \
                         JOIN event_rsvps r ON r.event_id = e.id \
                         GROUP BY e.id ORDER BY total DESC, e.id LIMIT ?1",
                    )
                    .map_err(|err| format!("Failed to prepare rsvp rollup: {}", err))?;
                let rows = stmt
                    .query_map(params![TOP_N as i64], |row| {
                        Ok(EventRsvps {
                            event_id: row.get(0)?,
                            title: row.get(1)?,
                            rsvps: row.get::<_, i64>(2)?.max(0) as u64,
                        })
                    })
                    .map_err(|err| format!("Failed to query rsvp rollup: {}", err))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(|err| format!("Failed to decode rsvp rollup: {}", err))?
            };

            Ok(ContentMetrics {
                total_news: scalar(conn, "SELECT COUNT(*) FROM news", [])?,
                published_news: scalar(conn, "SELECT COUNT(*) FROM news WHERE published = 1", [])?,
                total_news_views: scalar(conn, "SELECT COALESCE(SUM(views), 0) FROM news", [])?,
                top_news,
                total_programs: scalar(conn, "SELECT COUNT(*) FROM programs", [])?,
                total_events: scalar(conn, "SELECT COUNT(*) FROM events", [])?,
                upcoming_events: scalar(
                    conn,
                    "SELECT COUNT(*) FROM events WHERE starts_at > ?1",
                    params![now],
                )?,
                total_rsvps: scalar(conn, "SELECT COUNT(*) FROM event_rsvps", [])?,
                rsvps_by_event,
                total_subscribers: scalar(conn, "SELECT COUNT(*) FROM subscribers", [])?,
                total_contacts: scalar(conn, "SELECT COUNT(*) FROM contacts", [])?,
                generated_at: now.to_string(),
            })
        })
    }
}

fn scalar<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<u64, String> {
    conn.query_row(sql, params, |row| row.get::<_, i64>(0))
        .map(|value| value.max(0) as u64)
        .map_err(|err| format!("Failed to run metrics query: {}", err))
}

/// Row counts keyed by the `YYYY-MM-DDTHH` prefix of `created_at`.
fn hourly(conn: &Connection, table: &str, since: &str) -> Result<HashMap<String, u64>, String> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT substr(created_at, 1, 13) AS hour, COUNT(*) FROM {} \
             WHERE created_at >= ?1 GROUP BY hour",
            table
        ))
        .map_err(|err| format!("Failed to prepare {} activity query: {}", table, err))?;
    let rows = stmt
        .query_map(params![since], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
        })
        .map_err(|err| format!("Failed to query {} activity: {}", table, err))?;

    let mut buckets = HashMap::new();
    for row in rows {
        let (hour, count) = row.map_err(|err| format!("Failed to decode activity row: {}", err))?;
        buckets.insert(hour, count);
    }
    Ok(buckets)
}

pub struct MetricsService {
    db: Db,
    presence: Arc<PresenceService>,
}

impl MetricsService {
    pub fn new(db: Db, presence: Arc<PresenceService>) -> Self {
        Self { db, presence }
    }

    pub fn engagement(&self) -> Result<EngagementMetrics, String> {
        let now = self.presence.now();
        let tv = self.presence.count(StreamKind::Tv)?;
        let radio = self.presence.count(StreamKind::Radio)?;

        let hours = activity_hours(now)?;
        let since = hours
            .first()
            .map(|hour| format_timestamp(*hour))
            .unwrap_or_else(|| format_timestamp(now));
        let totals = self.db.engagement_totals(&since)?;

        let reactions_by_emoji = self.db.reaction_counts(None)?;
        let total_reactions = reactions_by_emoji.iter().map(|entry| entry.count).sum();
        let top_reactions = reactions_by_emoji.iter().take(TOP_N).cloned().collect();

        let hourly_activity = hours
            .into_iter()
            .map(|hour| {
                let key = hour.format("%Y-%m-%dT%H").to_string();
                HourlyActivity {
                    hour: format_timestamp(hour),
                    comments: totals.comments_by_hour.get(&key).copied().unwrap_or(0),
                    reactions: totals.reactions_by_hour.get(&key).copied().unwrap_or(0),
                }
            })
            .collect();

        Ok(EngagementMetrics {
            active_viewers: ViewerCounts {
                tv,
                radio,
                total: tv + radio,
            },
            total_reactions,
            reactions_by_emoji,
            top_reactions,
            total_live_comments: totals.live_comments,
            total_news_comments: totals.news_comments,
            total_song_requests: totals.song_requests,
            pending_song_requests: totals.pending_song_requests,
            hourly_activity,
            generated_at: format_timestamp(now),
        })
    }

    pub fn content(&self) -> Result<ContentMetrics, String> {
        self.db
            .content_metrics_at(&format_timestamp(self.presence.now()))
    }
}

/// Start of each hour in the trailing window, oldest first, ending with the
/// current hour.
fn activity_hours(now: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, String> {
    let current = now
        .duration_trunc(Duration::hours(1))
        .map_err(|err| format!("Failed to truncate activity hour: {}", err))?;
    Ok((0..ACTIVITY_HOURS)
        .rev()
        .map(|back| current - Duration::hours(back))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_timestamp, ManualClock};
    use crate::config::PresenceConfig;
    use crate::content::ContentService;
    use portal_protocol::{
        EventInput, LiveCommentInput, LiveReactionInput, NewsInput, RsvpInput, SongRequestInput,
        SubscribeInput,
    };

    struct Fixture {
        _dir: tempfile::TempDir,
        clock: Arc<ManualClock>,
        presence: Arc<PresenceService>,
        content: ContentService,
        metrics: MetricsService,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(dir.path().join("portal.db")).expect("db init");
        let clock = Arc::new(ManualClock::new(
            parse_timestamp("2026-07-10T14:25:00Z").expect("start time"),
        ));
        let presence = Arc::new(PresenceService::new(
            db.clone(),
            clock.clone(),
            PresenceConfig::default(),
        ));
        Fixture {
            _dir: dir,
            clock: clock.clone(),
            presence: Arc::clone(&presence),
            content: ContentService::new(db.clone(), clock),
            metrics: MetricsService::new(db, presence),
        }
    }

    #[test]
    fn activity_window_covers_trailing_day() {
        let hours = activity_hours(parse_timestamp("2026-07-10T14:25:00Z").unwrap()).unwrap();
        assert_eq!(hours.len(), 24);
        assert_eq!(format_timestamp(hours[0]), "2026-07-09T15:00:00.000Z");
        assert_eq!(format_timestamp(hours[23]), "2026-07-10T14:00:00.000Z");
    }

    #[test]
    fn empty_database_reports_zeroes() {
        let fx = fixture();
        let engagement = fx.metrics.engagement().unwrap();
        assert_eq!(engagement.active_viewers.total, 0);
        assert_eq!(engagement.total_reactions, 0);
        assert_eq!(engagement.hourly_activity.len(), 24);
        assert!(engagement
            .hourly_activity
            .iter()
            .all(|bucket| bucket.comments == 0 && bucket.reactions == 0));

        let content = fx.metrics.content().unwrap();
        assert_eq!(content.total_news, 0);
        assert_eq!(content.total_news_views, 0);
        assert!(content.top_news.is_empty());
    }

    #[test]
    fn engagement_reflects_recorded_activity() {
        let fx = fixture();
        fx.presence.join("a", StreamKind::Tv, None, None).unwrap();
        fx.presence.join("b", StreamKind::Radio, None, None).unwrap();
        fx.presence.join("c", StreamKind::Radio, None, None).unwrap();

        fx.content
            .add_live_comment(LiveCommentInput {
                stream_type: "tv".to_string(),
                author_name: "Abena".to_string(),
                content: "Hello".to_string(),
            })
            .unwrap();
        for emoji in ["🎉", "🎉", "❤️"] {
            fx.content
                .add_live_reaction(LiveReactionInput {
                    stream_type: "radio".to_string(),
                    emoji: emoji.to_string(),
                })
                .unwrap();
        }
        fx.content
            .request_song(SongRequestInput {
                requester_name: "Kwame".to_string(),
                song_title: "Sunshine".to_string(),
                ..Default::default()
            })
            .unwrap();

        let engagement = fx.metrics.engagement().unwrap();
        assert_eq!(
            engagement.active_viewers,
            ViewerCounts {
                tv: 1,
                radio: 2,
                total: 3
            }
        );
        assert_eq!(engagement.total_reactions, 3);
        assert_eq!(engagement.top_reactions[0].emoji, "🎉");
        assert_eq!(engagement.total_live_comments, 1);
        assert_eq!(engagement.pending_song_requests, 1);

        let current = engagement.hourly_activity.last().unwrap();
        assert_eq!(current.hour, "2026-07-10T14:00:00.000Z");
        assert_eq!(current.comments, 1);
        assert_eq!(current.reactions, 3);
    }

    #[test]
    fn activity_older_than_a_day_is_excluded() {
        let fx = fixture();
        fx.content
            .add_live_comment(LiveCommentInput {
                stream_type: "radio".to_string(),
                author_name: "Efua".to_string(),
                content: "Yesterday".to_string(),
            })
            .unwrap();
        fx.clock.advance(Duration::hours(25));

        let engagement = fx.metrics.engagement().unwrap();
        assert_eq!(engagement.total_live_comments, 1);
        assert!(engagement
            .hourly_activity
            .iter()
            .all(|bucket| bucket.comments == 0));
    }

    #[test]
    fn content_rollups_count_views_and_rsvps() {
        let fx = fixture();
        let popular = fx
            .content
            .create_news(NewsInput {
                title: "Popular".to_string(),
                content: "Body".to_string(),
                published: true,
                ..Default::default()
            })
            .unwrap();
        fx.content
            .create_news(NewsInput {
                title: "Draft".to_string(),
                content: "Body".to_string(),
                ..Default::default()
            })
            .unwrap();
        for _ in 0..3 {
            fx.content.view_news(popular.id).unwrap();
        }

        let past = fx
            .content
            .create_event(EventInput {
                title: "Past".to_string(),
                starts_at: "2026-07-01T10:00:00Z".to_string(),
                ..Default::default()
            })
            .unwrap();
        let future = fx
            .content
            .create_event(EventInput {
                title: "Future".to_string(),
                starts_at: "2026-08-01T10:00:00Z".to_string(),
                ..Default::default()
            })
            .unwrap();
        for (event_id, email) in [
            (future.id, "a@example.com"),
            (future.id, "b@example.com"),
            (past.id, "a@example.com"),
        ] {
            fx.content
                .rsvp(
                    event_id,
                    RsvpInput {
                        name: "Guest".to_string(),
                        email: email.to_string(),
                    },
                )
                .unwrap();
        }
        fx.content
            .subscribe(SubscribeInput {
                email: "fan@example.com".to_string(),
            })
            .unwrap();

        let content = fx.metrics.content().unwrap();
        assert_eq!(content.total_news, 2);
        assert_eq!(content.published_news, 1);
        assert_eq!(content.total_news_views, 3);
        assert_eq!(content.top_news[0].title, "Popular");
        assert_eq!(content.total_events, 2);
        assert_eq!(content.upcoming_events, 1);
        assert_eq!(content.total_rsvps, 3);
        assert_eq!(content.rsvps_by_event[0].title, "Future");
        assert_eq!(content.rsvps_by_event[0].rsvps, 2);
        assert_eq!(content.total_subscribers, 1);
    }
}
