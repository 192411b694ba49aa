//! Log setup for the `labci` binary.
//!
//! The requested level applies to labci's own crates. HTTP plumbing stays at
//! `warn` unless `RUST_LOG` says otherwise, so `-v` shows cascade decisions
//! rather than connection-pool chatter.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level.
const LABCI_TARGETS: [&str; 3] = ["labci", "labci_core", "labci_circleci"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(LABCI_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber, logging to stderr.
///
/// With `json` each event is one JSON object per line, which is what CI log
/// collectors expect. Returns `false` when a subscriber was already set.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}
