//! Portal server entrypoint.

use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tracing::{error, info, warn};

use portal_server::auth::AuthService;
use portal_server::clock::{Clock, SystemClock};
use portal_server::config::{load_config, PortalConfig};
use portal_server::db::Db;
use portal_server::presence::PresenceService;
use portal_server::sweep::Sweeper;
use portal_server::{logging, router, AppState};

#[derive(Parser)]
#[command(name = "portal-server")]
#[command(about = "Broadcast portal API server")]
#[command(version)]
struct Cli {
    /// Path to portal.toml (defaults to the platform data directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Port to listen on, overriding config and PORT
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path, overriding config and DATABASE_PATH
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = resolve_config(&cli);
    let _logging_guard = logging::init(
        config
            .as_ref()
            .ok()
            .and_then(|config| config.logging.dir.as_deref()),
    );

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Invalid portal configuration");
            std::process::exit(1);
        }
    };

    let db_path = match config.database_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve portal database path");
            std::process::exit(1);
        }
    };

    let db = match Db::new(db_path.clone()) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, path = %db_path.display(), "Failed to initialize portal database");
            std::process::exit(1);
        }
    };
    info!(path = %db_path.display(), "Portal database ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let presence = Arc::new(PresenceService::new(
        db.clone(),
        Arc::clone(&clock),
        config.presence,
    ));
    let sweeper = Sweeper::spawn(Arc::clone(&presence), config.presence.sweep_interval());
    let state = AppState::new(db, clock, &config, presence, sweeper.status());

    if let (Some(username), Some(password)) = (
        config.auth.admin_username.clone(),
        config.auth.admin_password.clone(),
    ) {
        if let Err(err) = bootstrap_admin(Arc::clone(&state.auth), username, password).await {
            error!(error = %err, "Failed to create bootstrap admin");
            std::process::exit(1);
        }
    } else {
        let auth = Arc::clone(&state.auth);
        match tokio::task::spawn_blocking(move || auth.has_admin()).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                warn!("No admin account exists and no bootstrap credentials are configured; admin routes will reject every request")
            }
            Ok(Err(err)) => warn!(error = %err, "Failed to check for an admin account"),
            Err(err) => warn!(error = %err, "Admin check task failed"),
        }
    }

    let address = format!("{}:{}", config.server.bind, config.server.port);
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, address = %address, "Failed to bind portal listener");
            std::process::exit(1);
        }
    };
    info!(
        address = %address,
        live_window_secs = config.presence.live_window_secs,
        retention_secs = config.presence.retention_secs,
        "Portal server started"
    );

    if let Err(err) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %err, "Portal server failed");
    }

    sweeper.shutdown().await;
    info!("Portal server stopped");
}

/// Defaults, then the TOML file, then the environment, then CLI flags.
fn resolve_config(cli: &Cli) -> Result<PortalConfig, String> {
    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env(|key| env::var(key).ok())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(database) = &cli.database {
        config.storage.database_path = Some(database.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn bootstrap_admin(auth: Arc<AuthService>, username: String, password: String) -> Result<(), String> {
    let created = tokio::task::spawn_blocking(move || auth.ensure_admin(&username, &password))
        .await
        .map_err(|err| format!("Admin bootstrap task failed: {}", err))??;
    if !created {
        info!("Bootstrap admin already exists");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
