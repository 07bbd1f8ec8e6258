//! Log output for the command line tool.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary. `RUST_LOG` wins when set. Otherwise the level comes from
//! `[logging] level`, raised one step per `-v`.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// The configured level raised by `verbosity` steps, capped at `trace`.
pub fn effective_level(config: &LoggingConfig, verbosity: u8) -> &'static str {
    let configured = config.level.to_ascii_lowercase();
    let base = LEVELS
        .iter()
        .position(|l| *l == configured)
        .unwrap_or(3);
    let index = (base + verbosity as usize).min(LEVELS.len() - 1);
    LEVELS[index]
}

/// Install a stderr subscriber. A second call leaves the first one in place.
pub fn init(config: &LoggingConfig, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(effective_level(config, verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
        }
    }

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(effective_level(&config("info"), 0), "info");
        assert_eq!(effective_level(&config("info"), 1), "debug");
        assert_eq!(effective_level(&config("warn"), 2), "debug");
    }

    #[test]
    fn level_capped_at_trace() {
        assert_eq!(effective_level(&config("debug"), 9), "trace");
    }

    #[test]
    fn off_stays_off_without_flags() {
        assert_eq!(effective_level(&config("OFF"), 0), "off");
        assert_eq!(effective_level(&config("off"), 1), "error");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(&config("warn"), 0);
        init(&config("debug"), 2);
    }
}
