//! Logging initialization for the CLI.
//!
//! Library crates only emit `tracing` events; the subscriber is installed
//! here. Output always goes to stderr so stdout stays clean for `--json`.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE
/// * `json` - emit JSON lines instead of human-readable output
///
/// ```json
/// {"timestamp":"...","level":"INFO","span":{"cmd":"dev","cwd":"/path"},"fields":{"message":"app start: http://localhost:3000"}}
/// ```
///
/// # Panics
/// Panics if a global subscriber is already installed.
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG wins for other crates; -v raises ours
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(format!("devssr_core={level}").parse().unwrap())
        .add_directive(format!("devssr={level}").parse().unwrap());

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
