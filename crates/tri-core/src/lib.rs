// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber. `RUST_LOG` wins over `fallback`; an
/// unparsable fallback degrades to [`DEFAULT_FILTER`].
///
/// Output goes to stderr so a fatal one-line diagnostic is never interleaved
/// with anything written to stdout.
pub fn init_tracing(fallback: &str) {
    use tracing_subscriber::fmt;
    let _ = fmt()
        .with_env_filter(env_filter(fallback))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
