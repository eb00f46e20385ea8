//! Subscriber setup for the dashboard pipeline.
//!
//! `RUST_LOG` wins when it is set. Otherwise the level comes from
//! [`Config::log_level`], with the HTTP stack held at `warn` so chunk-level
//! chatter from `hyper` does not drown out download progress.

use crate::config::Config;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_PREFIX: &str = "vulnera-dashboard.log";

/// Dependencies that are capped at `warn` unless `RUST_LOG` says otherwise.
const QUIET_DEPENDENCIES: [&str; 3] = ["hyper=warn", "hyper_util=warn", "reqwest=warn"];

fn default_directives(level: &str) -> String {
    let mut directives = vec![level];
    directives.extend(QUIET_DEPENDENCIES);
    directives.join(",")
}

fn build_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)))
}

/// Install the global subscriber.
///
/// With `log_to_file` set, output goes to a daily rolling file in `log_dir`
/// and the returned guard must be kept alive until shutdown so buffered lines
/// are flushed. If a subscriber is already installed it is left in place and
/// `None` is returned.
pub fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let env_filter = build_filter(config);

    if config.log_to_file {
        let file_appender = rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init();

        match installed {
            Ok(()) => Some(guard),
            Err(e) => {
                debug!("Keeping existing subscriber: {}", e);
                None
            }
        }
    } else {
        if let Err(e) = fmt().with_env_filter(env_filter).with_target(false).try_init() {
            debug!("Keeping existing subscriber: {}", e);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_http_stack() {
        assert_eq!(
            default_directives("debug"),
            "debug,hyper=warn,hyper_util=warn,reqwest=warn"
        );
    }

    #[test]
    fn test_configured_level_parses_as_filter() {
        let config = Config {
            log_level: "vulnera_dashboard=trace".to_string(),
            ..Config::default()
        };
        assert!(EnvFilter::try_new(default_directives(&config.log_level)).is_ok());
    }

    #[test]
    fn test_second_init_keeps_first_subscriber() {
        let config = Config::default();
        assert!(init_logging(&config).is_none());
        assert!(init_logging(&config).is_none());
    }
}
