use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEBUG_ENV: &str = "PORTAL_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "portal.log";

/// Installs the global subscriber: stderr always, plus a daily rolling file
/// when `log_dir` is set. Keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
    if let Err(err) = installed {
        eprintln!("portal-server: logging already initialized: {}", err);
    }

    guard
}

fn filter() -> EnvFilter {
    let debug_enabled = std::env::var(DEBUG_ENV)
        .map(|value| debug_flag(&value))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_accepts_common_truthy_values() {
        for value in ["1", "true", "TRUE", "yes", "YES"] {
            assert!(debug_flag(value), "{value} should enable debug logging");
        }
        for value in ["0", "false", "", "debug"] {
            assert!(!debug_flag(value), "{value} should not enable debug logging");
        }
    }
}
