//! Process-wide logging setup shared by every binary.

pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings};

/// Install the default subscriber: JSON lines, `RUST_LOG` or `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init(&LogSettings::from_env());
}
