//! # ragline-telemetry
//!
//! Logging setup for ragline binaries and log capture for tests.
//!
//! ## Overview
//!
//! - [`init_telemetry`] installs human-readable output filtered by `RUST_LOG`
//!   (default `info`).
//! - [`init_json_telemetry`] installs one JSON object per line instead.
//! - [`init_with_level`] uses an explicit default level when `RUST_LOG` is unset.
//! - [`capture`] records events in memory so tests can assert on them.
//!
//! Initialising twice returns an error instead of panicking.

pub mod capture;

pub use capture::{CaptureLayer, CapturedEvent, EventCapture};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_LEVEL: &str = "info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// `RUST_LOG` when set, `level` otherwise.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a global subscriber with the given format and default level.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init(service_name: &str, format: LogFormat, level: &str) -> Result<(), TryInitError> {
    let filter = env_filter(level);
    let fmt_layer = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    tracing::debug!(service = service_name, ?format, "telemetry initialised");
    Ok(())
}

/// Install human-readable logging at [`DEFAULT_LEVEL`].
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_telemetry(service_name: &str) -> Result<(), TryInitError> {
    init(service_name, LogFormat::Pretty, DEFAULT_LEVEL)
}

/// Install JSON logging at [`DEFAULT_LEVEL`].
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_json_telemetry(service_name: &str) -> Result<(), TryInitError> {
    init(service_name, LogFormat::Json, DEFAULT_LEVEL)
}

/// Install human-readable logging with `level` as the default filter.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_with_level(service_name: &str, level: &str) -> Result<(), TryInitError> {
    init(service_name, LogFormat::Pretty, level)
}
