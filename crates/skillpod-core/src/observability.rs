//! Tracing initialization.
//!
//! Uses [`ObservabilityConfig`](crate::config::ObservabilityConfig) for SKILLPOD_QUIET,
//! SKILLPOD_LOG_LEVEL and SKILLPOD_LOG_JSON. Output goes to stderr so stdout stays
//! machine-readable for the CLI and the stdio loop.

use tracing_subscriber::{prelude::*, EnvFilter};

/// Initialize tracing. Call once at process startup; later calls are no-ops.
///
/// `RUST_LOG` wins over the configured level. Quiet mode only logs WARN and above.
pub fn init_tracing() {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level = filter_directive(cfg.quiet, &cfg.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
}

fn filter_directive(quiet: bool, log_level: &str) -> String {
    if quiet {
        "skillpod=warn".to_string()
    } else {
        log_level.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_overrides_level() {
        assert_eq!(filter_directive(true, "skillpod=debug"), "skillpod=warn");
        assert_eq!(filter_directive(false, "skillpod=debug"), "skillpod=debug");
    }
}
