//! Viewer presence: which sessions are watching which stream right now.
//!
//! A record is live while its `last_seen` is inside the configured live
//! window. `count` is a pure read against that window; physical removal is
//! left to `leave` and to the sweeper (see `sweep.rs`), which deletes rows
//! past the retention threshold.

use chrono::{DateTime, Utc};
use portal_protocol::{PresenceRecord, StreamKind};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::{format_timestamp, Clock};
use crate::config::PresenceConfig;
use crate::db::Db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PruneOutcome {
    pub presence_removed: u64,
    pub auth_sessions_removed: u64,
}

pub struct PresenceService {
    db: Db,
    clock: Arc<dyn Clock>,
    config: PresenceConfig,
}

impl PresenceService {
    pub fn new(db: Db, clock: Arc<dyn Clock>, config: PresenceConfig) -> Self {
        Self { db, clock, config }
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn join(
        &self,
        session_id: &str,
        kind: StreamKind,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<PresenceRecord, String> {
        let now = format_timestamp(self.clock.now());
        let record = self
            .db
            .upsert_presence(session_id, kind, ip_address, user_agent, &now)?;
        info!(
            session_id = %session_id,
            stream_type = %kind,
            ip_address = ?ip_address,
            "Viewer joined"
        );
        Ok(record)
    }

    /// Refreshes `last_seen`. A heartbeat for a record that no longer exists
    /// is not an error and does not recreate it; the `false` return tells the
    /// client to join again.
    pub fn heartbeat(&self, session_id: &str, kind: StreamKind) -> Result<bool, String> {
        let now = format_timestamp(self.clock.now());
        let refreshed = self.db.touch_presence(session_id, kind, &now)?;
        if refreshed {
            debug!(session_id = %session_id, stream_type = %kind, "Viewer heartbeat");
        } else {
            debug!(
                session_id = %session_id,
                stream_type = %kind,
                "Heartbeat for unknown viewer ignored"
            );
        }
        Ok(refreshed)
    }

    pub fn leave(&self, session_id: &str, kind: StreamKind) -> Result<bool, String> {
        let removed = self.db.delete_presence(session_id, kind)?;
        info!(
            session_id = %session_id,
            stream_type = %kind,
            removed,
            "Viewer left"
        );
        Ok(removed)
    }

    pub fn count(&self, kind: StreamKind) -> Result<u64, String> {
        self.db.count_live_presence(kind, &self.live_after())
    }

    pub fn live_viewers(&self, kind: Option<StreamKind>) -> Result<Vec<PresenceRecord>, String> {
        self.db.list_live_presence(kind, &self.live_after())
    }

    /// Deletes presence rows past retention and expired login sessions.
    pub fn prune_expired(&self) -> Result<PruneOutcome, String> {
        let now = self.clock.now();
        let presence_removed = self
            .db
            .prune_presence(&format_timestamp(now - self.config.retention()))?;
        let auth_sessions_removed = self.db.prune_auth_sessions(&format_timestamp(now))?;
        Ok(PruneOutcome {
            presence_removed,
            auth_sessions_removed,
        })
    }

    fn live_after(&self) -> String {
        format_timestamp(self.clock.now() - self.config.live_window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{parse_timestamp, ManualClock};
    use chrono::Duration;
    use std::thread;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Db,
        clock: Arc<ManualClock>,
        service: PresenceService,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Db::new(dir.path().join("portal.db")).expect("db init");
        let clock = Arc::new(ManualClock::new(
            parse_timestamp("2026-03-01T20:00:00Z").expect("start time"),
        ));
        let service = PresenceService::new(db.clone(), clock.clone(), PresenceConfig::default());
        Fixture {
            _dir: dir,
            db,
            clock,
            service,
        }
    }

    #[test]
    fn repeated_join_keeps_one_record_with_latest_timestamps() {
        let fx = fixture();
        let first = fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();
        fx.clock.advance(Duration::seconds(30));
        let second = fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();

        assert_eq!(fx.db.count_presence_rows(Some(StreamKind::Tv)).unwrap(), 1);
        assert!(second.joined_at > first.joined_at);
        assert_eq!(second.joined_at, second.last_seen);
        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 1);
    }

    #[test]
    fn heartbeat_keeps_viewer_live() {
        let fx = fixture();
        fx.service.join("s-1", StreamKind::Radio, None, None).unwrap();

        fx.clock.advance(Duration::seconds(100));
        assert!(fx.service.heartbeat("s-1", StreamKind::Radio).unwrap());

        fx.clock.advance(Duration::seconds(100));
        assert_eq!(fx.service.count(StreamKind::Radio).unwrap(), 1);

        fx.clock.advance(Duration::seconds(30));
        assert_eq!(fx.service.count(StreamKind::Radio).unwrap(), 0);
    }

    #[test]
    fn heartbeat_after_expiry_does_not_recreate() {
        let fx = fixture();
        fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();
        fx.clock.advance(Duration::minutes(11));
        fx.service.prune_expired().unwrap();

        assert!(!fx.service.heartbeat("s-1", StreamKind::Tv).unwrap());
        assert!(fx.db.get_presence("s-1", StreamKind::Tv).unwrap().is_none());
        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 0);
    }

    #[test]
    fn leave_removes_the_record() {
        let fx = fixture();
        fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();
        fx.service.heartbeat("s-1", StreamKind::Tv).unwrap();
        fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();

        assert!(fx.service.leave("s-1", StreamKind::Tv).unwrap());
        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 0);
        assert!(!fx.service.leave("s-1", StreamKind::Tv).unwrap());
    }

    #[test]
    fn live_window_boundary() {
        let fx = fixture();
        let start = fx.clock.now();
        fx.service.join("older", StreamKind::Tv, None, None).unwrap();
        fx.clock.set(start + Duration::milliseconds(2));
        fx.service.join("newer", StreamKind::Tv, None, None).unwrap();

        // "older" is 2m + 1ms old, "newer" is 2m - 1ms old.
        fx.clock
            .set(start + Duration::minutes(2) + Duration::milliseconds(1));
        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 1);
        let live = fx.service.live_viewers(Some(StreamKind::Tv)).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].session_id, "newer");

        // Exactly at the window edge a record is no longer live.
        fx.clock
            .set(start + Duration::minutes(2) + Duration::milliseconds(2));
        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 0);
    }

    #[test]
    fn stale_rows_stay_until_swept() {
        let fx = fixture();
        fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();
        fx.clock.advance(Duration::minutes(5));

        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 0);
        assert_eq!(fx.db.count_presence_rows(Some(StreamKind::Tv)).unwrap(), 1);

        let outcome = fx.service.prune_expired().unwrap();
        assert_eq!(outcome.presence_removed, 0);
        assert_eq!(fx.db.count_presence_rows(Some(StreamKind::Tv)).unwrap(), 1);

        fx.clock.advance(Duration::minutes(6));
        let outcome = fx.service.prune_expired().unwrap();
        assert_eq!(outcome.presence_removed, 1);
        assert_eq!(fx.db.count_presence_rows(None).unwrap(), 0);
    }

    #[test]
    fn stream_kinds_are_independent() {
        let fx = fixture();
        fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();
        fx.service.join("s-2", StreamKind::Radio, None, None).unwrap();

        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 1);
        assert_eq!(fx.service.count(StreamKind::Radio).unwrap(), 1);

        fx.service.leave("s-1", StreamKind::Tv).unwrap();
        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 0);
        assert_eq!(fx.service.count(StreamKind::Radio).unwrap(), 1);
    }

    #[test]
    fn same_session_may_watch_both_streams() {
        let fx = fixture();
        fx.service.join("s-1", StreamKind::Tv, None, None).unwrap();
        fx.service.join("s-1", StreamKind::Radio, None, None).unwrap();

        fx.service.leave("s-1", StreamKind::Radio).unwrap();
        assert_eq!(fx.service.count(StreamKind::Tv).unwrap(), 1);
        assert_eq!(fx.service.count(StreamKind::Radio).unwrap(), 0);
    }

    #[test]
    fn concurrent_joins_converge_to_one_record() {
        let fx = fixture();
        let service = Arc::new(fx.service);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    service
                        .join("shared", StreamKind::Tv, Some(format!("10.0.0.{}", i).as_str()), None)
                        .expect("join")
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join thread");
        }

        assert_eq!(fx.db.count_presence_rows(Some(StreamKind::Tv)).unwrap(), 1);
        assert_eq!(service.count(StreamKind::Tv).unwrap(), 1);
    }

    #[test]
    fn join_records_diagnostics() {
        let fx = fixture();
        let record = fx
            .service
            .join("s-1", StreamKind::Radio, Some("203.0.113.9"), Some("Mozilla/5.0"))
            .unwrap();
        assert_eq!(record.stream_type, StreamKind::Radio);
        assert_eq!(record.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(record.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(record.joined_at, "2026-03-01T20:00:00.000Z");
    }
}
