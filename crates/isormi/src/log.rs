//! # Critical Log
//!
//! Sink for conditions that cannot be reported to any caller yet do not
//! warrant closing the channel, such as a bean reference naming nothing.

/// Receives irrecoverable-but-non-fatal conditions.
pub trait CriticalLog: Send + Sync + 'static {
    fn critical(&self, message: &str);
}

/// Emits through `tracing` at error level under the `isormi::critical` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl CriticalLog for TracingLog {
    fn critical(&self, message: &str) {
        tracing::error!(target: "isormi::critical", "{}", message);
    }
}
