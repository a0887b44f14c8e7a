//! Periodic cleanup of expired presence rows and login sessions.
//!
//! The sweeper is owned by whoever spawns it: `shutdown` signals the task and
//! waits for it to finish, so the server stops it alongside the HTTP
//! listener.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::format_timestamp;
use crate::presence::PresenceService;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSnapshot {
    pub interval_secs: u64,
    pub runs: u64,
    pub last_run_at: Option<String>,
    pub last_presence_removed: u64,
    pub last_auth_sessions_removed: u64,
    pub total_presence_removed: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct SweepStatus {
    inner: Mutex<SweepSnapshot>,
}

impl SweepStatus {
    pub fn snapshot(&self) -> SweepSnapshot {
        self.inner
            .lock()
            .map(|snapshot| snapshot.clone())
            .unwrap_or_default()
    }

    fn update(&self, apply: impl FnOnce(&mut SweepSnapshot)) {
        if let Ok(mut snapshot) = self.inner.lock() {
            apply(&mut snapshot);
        }
    }
}

pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    status: Arc<SweepStatus>,
}

impl Sweeper {
    pub fn spawn(service: Arc<PresenceService>, interval: Duration) -> Self {
        let status = Arc::new(SweepStatus::default());
        status.update(|snapshot| snapshot.interval_secs = interval.as_secs());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(service, interval, Arc::clone(&status), shutdown_rx));
        info!(interval_secs = interval.as_secs(), "Presence sweeper started");
        Self {
            shutdown,
            handle,
            status,
        }
    }

    pub fn status(&self) -> Arc<SweepStatus> {
        Arc::clone(&self.status)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Presence sweeper task failed");
        }
        info!("Presence sweeper stopped");
    }
}

async fn run(
    service: Arc<PresenceService>,
    interval: Duration,
    status: Arc<SweepStatus>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the first sweep waits one interval.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let service = Arc::clone(&service);
                let status = Arc::clone(&status);
                let joined = tokio::task::spawn_blocking(move || sweep_once(&service, &status)).await;
                if let Err(err) = joined {
                    warn!(error = %err, "Presence sweep panicked");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// One sweep pass. Failures are recorded on the status and logged; the next
/// tick tries again.
pub fn sweep_once(service: &PresenceService, status: &SweepStatus) {
    let ran_at = format_timestamp(service.now());
    match service.prune_expired() {
        Ok(outcome) => {
            if outcome.presence_removed > 0 || outcome.auth_sessions_removed > 0 {
                info!(
                    presence_removed = outcome.presence_removed,
                    auth_sessions_removed = outcome.auth_sessions_removed,
                    "Presence sweep removed expired rows"
                );
            } else {
                debug!("Presence sweep found nothing to remove");
            }
            status.update(|snapshot| {
                snapshot.runs += 1;
                snapshot.last_run_at = Some(ran_at);
                snapshot.last_presence_removed = outcome.presence_removed;
                snapshot.last_auth_sessions_removed = outcome.auth_sessions_removed;
                snapshot.total_presence_removed += outcome.presence_removed;
                snapshot.last_error = None;
            });
        }
        Err(err) => {
            warn!(error = %err, "Presence sweep failed");
            status.update(|snapshot| {
                snapshot.runs += 1;
                snapshot.last_run_at = Some(ran_at);
                snapshot.last_error = Some(err);
            });
        }
    }
}
