//! # Logging
//!
//! tracing subscriber setup. `RUST_LOG` wins over the default directive;
//! `LOG_FORMAT=text` switches from JSON lines to human-readable output.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// Calling it twice is harmless: the second install is ignored.
pub fn init_logging(format: &str, default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if format.eq_ignore_ascii_case("text") {
        builder.try_init()
    } else {
        builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
