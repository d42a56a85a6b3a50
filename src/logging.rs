//! Tracing subscriber setup for the CLI.
//!
//! Logs go to stderr so command output on stdout stays parseable. The
//! filter comes from `RUST_LOG` when set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Filter forced by the `-v`/`-q` flags, overriding `RUST_LOG`.
fn flag_directive(verbose: bool, quiet: bool) -> Option<&'static str> {
    if quiet {
        Some("warn")
    } else if verbose {
        Some("debug")
    } else {
        None
    }
}

/// Install the global subscriber. `verbose` forces the debug filter even
/// when `RUST_LOG` is set; `quiet` limits output to warnings.
pub fn init_tracing(verbose: bool, quiet: bool) {
    let env_filter = match flag_directive(verbose, quiet) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
