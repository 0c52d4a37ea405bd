//! Out-of-band failure reporting.
//!
//! Tasks surface failures here, then decide on their own whether to signal
//! completion. Reporting never panics and never resumes a stalled chain.

use std::sync::{Mutex, PoisonError};

/// Sink for operator-visible failure messages.
pub trait ReportSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Reports failures as `error`-level tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ReportSink for TracingReporter {
    fn report(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Accumulates failure messages for later display.
///
/// The log starts hidden and becomes visible on the first report, like an
/// error panel that is only shown once there is something in it.
#[derive(Debug, Default)]
pub struct ErrorLog {
    messages: Mutex<Vec<String>>,
}

impl ErrorLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything has been reported.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All messages, newline-separated, in report order.
    #[must_use]
    pub fn render(&self) -> String {
        self.messages().join("\n")
    }
}

impl ReportSink for ErrorLog {
    fn report(&self, message: &str) {
        tracing::error!("{message}");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
