//! Shared handles for request handlers.

use std::sync::Arc;
use tracing::warn;

use crate::auth::{AuthService, SessionSigner};
use crate::clock::{format_timestamp, Clock};
use crate::config::PortalConfig;
use crate::content::ContentService;
use crate::db::Db;
use crate::error::{ApiError, ApiResult};
use crate::metrics::MetricsService;
use crate::presence::PresenceService;
use crate::sweep::SweepStatus;

#[derive(Clone)]
pub struct AppState {
    pub presence: Arc<PresenceService>,
    pub auth: Arc<AuthService>,
    pub content: Arc<ContentService>,
    pub metrics: Arc<MetricsService>,
    pub sweep: Arc<SweepStatus>,
    pub started_at: String,
}

impl AppState {
    pub fn new(
        db: Db,
        clock: Arc<dyn Clock>,
        config: &PortalConfig,
        presence: Arc<PresenceService>,
        sweep: Arc<SweepStatus>,
    ) -> Self {
        let signer = match config.auth.session_secret.as_deref() {
            Some(secret) if !secret.is_empty() => SessionSigner::new(secret.as_bytes()),
            _ => {
                warn!("No session secret configured; login sessions will not survive a restart");
                SessionSigner::random()
            }
        };

        Self {
            auth: Arc::new(AuthService::new(
                db.clone(),
                Arc::clone(&clock),
                signer,
                config.auth.session_ttl(),
            )),
            content: Arc::new(ContentService::new(db.clone(), Arc::clone(&clock))),
            metrics: Arc::new(MetricsService::new(db, Arc::clone(&presence))),
            presence,
            sweep,
            started_at: format_timestamp(clock.now()),
        }
    }
}

/// Runs a store call on the blocking pool.
pub async fn blocking<T, E, F>(op: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| ApiError::Internal(format!("Blocking task failed: {}", err)))?
        .map_err(Into::into)
}
