//! Runtime configuration.
//!
//! Layering: defaults, then an optional TOML file, then environment
//! variables, then CLI flags (applied by `main`).

use chrono::Duration;
use serde::Deserialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

const APP_DIR: &str = "broadcast-portal";
const CONFIG_FILE: &str = "portal.toml";
const DB_FILE: &str = "portal.db";

/// Upper bound for presence windows and the sweep interval: one year.
pub const MAX_PRESENCE_SECS: u64 = 365 * 24 * 60 * 60;
/// Upper bound for admin session lifetime: ten years.
pub const MAX_SESSION_TTL_HOURS: i64 = 10 * 365 * 24;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortalConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub presence: PresenceConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub session_secret: Option<String>,
    pub session_ttl_hours: i64,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_hours: 24 * 7,
            admin_username: None,
            admin_password: None,
        }
    }
}

impl AuthConfig {
    /// Clamped to `1..=MAX_SESSION_TTL_HOURS`; `validate` rejects values
    /// outside that range.
    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS))
    }
}

/// Presence staleness policy.
///
/// `live_window` decides what `count` reports; `retention` decides when the
/// sweep physically deletes a row. Retention never undercuts the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceConfig {
    pub live_window_secs: u64,
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            live_window_secs: 2 * 60,
            retention_secs: 10 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl PresenceConfig {
    pub fn live_window(&self) -> Duration {
        bounded_seconds(self.live_window_secs)
    }

    pub fn retention(&self) -> Duration {
        bounded_seconds(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.min(MAX_PRESENCE_SECS))
    }

    pub fn validate(&self) -> Result<(), String> {
        for (key, value) in [
            ("live_window_secs", self.live_window_secs),
            ("retention_secs", self.retention_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if value > MAX_PRESENCE_SECS {
                return Err(format!(
                    "presence.{} ({}) must be at most {}",
                    key, value, MAX_PRESENCE_SECS
                ));
            }
        }
        if self.live_window_secs == 0 {
            return Err("presence.live_window_secs must be greater than zero".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("presence.sweep_interval_secs must be greater than zero".to_string());
        }
        if self.retention_secs < self.live_window_secs {
            return Err(format!(
                "presence.retention_secs ({}) must be at least live_window_secs ({})",
                self.retention_secs, self.live_window_secs
            ));
        }
        Ok(())
    }
}

fn bounded_seconds(secs: u64) -> Duration {
    // min() keeps the cast in range, so a bad value never wraps negative.
    Duration::seconds(secs.min(MAX_PRESENCE_SECS) as i64)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
}

impl PortalConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.presence.validate()?;
        if self.auth.session_ttl_hours <= 0 {
            return Err("auth.session_ttl_hours must be greater than zero".to_string());
        }
        if self.auth.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(format!(
                "auth.session_ttl_hours ({}) must be at most {}",
                self.auth.session_ttl_hours, MAX_SESSION_TTL_HOURS
            ));
        }
        match (&self.auth.admin_username, &self.auth.admin_password) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(
                    "auth.admin_username and auth.admin_password must be set together".to_string(),
                )
            }
            _ => {}
        }
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf, String> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(app_data_dir()?.join(DB_FILE)),
        }
    }

    /// Applies environment overrides through `lookup` so tests can supply a
    /// fake environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        if let Some(port) = parse_var::<u16>(&lookup, "PORT")? {
            self.server.port = port;
        }
        if let Some(secret) = lookup("SESSION_SECRET").filter(|value| !value.trim().is_empty()) {
            self.auth.session_secret = Some(secret);
        }
        if let Some(path) = lookup("DATABASE_PATH").filter(|value| !value.trim().is_empty()) {
            self.storage.database_path = Some(PathBuf::from(path));
        }
        if let Some(username) = lookup("PORTAL_ADMIN_USERNAME") {
            self.auth.admin_username = Some(username);
        }
        if let Some(password) = lookup("PORTAL_ADMIN_PASSWORD") {
            self.auth.admin_password = Some(password);
        }
        if let Some(dir) = lookup("PORTAL_LOG_DIR").filter(|value| !value.trim().is_empty()) {
            self.logging.dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, String> {
    Ok(app_data_dir()?.join(CONFIG_FILE))
}

fn app_data_dir() -> Result<PathBuf, String> {
    let base = dirs::data_dir().ok_or_else(|| "Data directory not found".to_string())?;
    Ok(base.join(APP_DIR))
}

/// Loads the TOML file at `path` (or the default location). A missing file
/// yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<PortalConfig, String> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        info!(path = %config_path.display(), "No config file found, using defaults");
        return Ok(PortalConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| {
        format!(
            "Failed to read portal config {}: {}",
            config_path.display(),
            err
        )
    })?;
    toml::from_str::<PortalConfig>(&content).map_err(|err| {
        format!(
            "Failed to parse portal config {}: {}",
            config_path.display(),
            err
        )
    })
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, String>
where
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| format!("Invalid {} value {:?}: {}", key, raw, err)),
        Some(_) => {
            warn!("{key} is set but empty, ignoring");
            Ok(None)
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = load_config(Some(&temp_dir.path().join("missing.toml"))).expect("load");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.presence, PresenceConfig::default());
        assert_eq!(config.presence.live_window(), Duration::minutes(2));
        assert_eq!(config.presence.retention(), Duration::minutes(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_sections_from_toml() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("portal.toml");
        fs_err::write(
            &path,
            r#"
[server]
port = 8080

[auth]
session_secret = "s3cret"
session_ttl_hours = 12
admin_username = "admin"
admin_password = "changeme"

[presence]
live_window_secs = 90
retention_secs = 900
sweep_interval_secs = 60

[storage]
database_path = "/var/lib/portal/portal.db"
"#,
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load config");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.auth.session_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.session_ttl(), Duration::hours(12));
        assert_eq!(config.presence.live_window_secs, 90);
        assert_eq!(
            config.presence.sweep_interval(),
            std::time::Duration::from_secs(60)
        );
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/var/lib/portal/portal.db")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("portal.toml");
        fs_err::write(&path, "[presence]\nstale_after = 5\n").expect("write config");
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn retention_must_cover_live_window() {
        let presence = PresenceConfig {
            live_window_secs: 300,
            retention_secs: 120,
            sweep_interval_secs: 60,
        };
        assert!(presence.validate().is_err());
    }

    #[test]
    fn oversized_presence_windows_are_rejected() {
        let presence = PresenceConfig {
            live_window_secs: u64::MAX,
            retention_secs: u64::MAX,
            sweep_interval_secs: 60,
        };
        assert!(presence.validate().is_err());
        assert_eq!(presence.live_window(), Duration::seconds(MAX_PRESENCE_SECS as i64));
        assert!(presence.retention() > Duration::zero());

        let presence = PresenceConfig {
            live_window_secs: 120,
            retention_secs: 10_000_000_000_000_000,
            sweep_interval_secs: 60,
        };
        assert!(presence.validate().is_err());
        assert_eq!(presence.retention(), Duration::seconds(MAX_PRESENCE_SECS as i64));

        let presence = PresenceConfig {
            live_window_secs: MAX_PRESENCE_SECS,
            retention_secs: MAX_PRESENCE_SECS,
            sweep_interval_secs: MAX_PRESENCE_SECS + 1,
        };
        assert!(presence.validate().is_err());
    }

    #[test]
    fn session_ttl_is_bounded() {
        let mut config = PortalConfig::default();
        config.auth.session_ttl_hours = i64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(
            config.auth.session_ttl(),
            Duration::hours(MAX_SESSION_TTL_HOURS)
        );

        config.auth.session_ttl_hours = MAX_SESSION_TTL_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn admin_credentials_come_in_pairs() {
        let mut config = PortalConfig::default();
        config.auth.admin_username = Some("admin".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "7000"),
            ("SESSION_SECRET", "from-env"),
            ("DATABASE_PATH", "/tmp/portal-env.db"),
        ]);
        let mut config = PortalConfig::default();
        config
            .apply_env(|key| env.get(key).map(|value| value.to_string()))
            .expect("apply env");

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.auth.session_secret.as_deref(), Some("from-env"));
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/portal-env.db")
        );
    }

    #[test]
    fn invalid_port_is_an_error() {
        let mut config = PortalConfig::default();
        let result = config.apply_env(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }
}
