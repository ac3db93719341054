use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the log filter
pub const LOG_ENV: &str = "POREFLOW_LOG";

/// Filter string for a given `-v` count when no environment override exists
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `POREFLOW_LOG`, which wins over the `-v` count.
pub fn init_logging(verbose: u8) {
    let log_level = std::env::var(LOG_ENV)
        .unwrap_or_else(|_| level_for_verbosity(verbose).to_string());

    // A second init (e.g. from tests) is not an error worth surfacing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_target(false)
        .try_init();
}
