//! Logging setup shared by the API binary and its test harness.

mod subscriber;

pub use subscriber::{LogFormat, init_for_tests, init_with};

/// Install the process-wide subscriber: `info` unless `RUST_LOG` says
/// otherwise, format from `LOG_FORMAT`. Later calls are no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .map(|raw| LogFormat::parse(&raw))
        .unwrap_or_default();
    init_with("info", format);
}
