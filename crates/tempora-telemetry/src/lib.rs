//! Tracing setup for tempora.
//!
//! Binaries call [`init_tracing`] once at startup; tests call
//! [`init_test_tracing`], which is safe to call from every test.
//!
//! # Filtering
//!
//! The filter comes from `RUST_LOG` when set and falls back to the default
//! directive otherwise:
//!
//! ```bash
//! RUST_LOG=tempora_timeline=trace,tempora_stm=debug tempora converge --modulus 3
//! ```
//!
//! Set `NO_COLOR` to disable ANSI escapes.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Whether log output should carry ANSI colors.
///
/// Follows the `NO_COLOR` convention: any non-empty value disables color.
pub fn ansi_enabled() -> bool {
    std::env::var("NO_COLOR").map(|v| v.is_empty()).unwrap_or(true)
}

/// Build the env filter, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber, writing to stderr.
///
/// Stdout stays free for command output. Returns an error if a global
/// subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi_enabled())
                .with_target(true),
        )
        .try_init()
}

static TEST_INIT: Once = Once::new();

/// Install a test subscriber routed through libtest's output capture.
///
/// Quiet by default (`warn`); raise with `RUST_LOG`. Idempotent.
pub fn init_test_tracing() {
    TEST_INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(env_filter("warn"))
            .with(fmt::layer().with_test_writer().with_ansi(false))
            .try_init();
    });
}
