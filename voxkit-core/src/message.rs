//! Status, warning and error events emitted by filters

use std::fmt;

use serde::{Deserialize, Serialize};

/// How serious a message is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Progress information
    Status,

    /// Something unexpected that does not stop the run
    Warning,

    /// The phase failed
    Error,
}

/// Which phase of a filter produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Validate-only pass over placeholder data
    Preflight,

    /// The real computation
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Preflight => f.write_str("preflight"),
            Phase::Execute => f.write_str("execute"),
        }
    }
}

/// One event as the runner reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMessage {
    /// Position of the originating filter in the pipeline
    pub filter_index: usize,

    /// Human label of the originating filter
    pub filter_label: String,

    /// Phase that produced the message
    pub phase: Phase,

    /// Filter-local code; negative for warnings and errors, 0 for status
    pub code: i32,

    /// Message text
    pub message: String,

    /// Severity
    pub severity: Severity,
}

impl fmt::Display for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} #{} {}] {:?} {}: {}",
            self.filter_label, self.filter_index, self.phase, self.severity, self.code, self.message
        )
    }
}

/// Receives every message as the runner emits it
///
/// This is the seam for presentation layers; the runner does not depend on
/// what an observer does with the message.
pub trait MessageObserver: Send {
    /// Called once per message, in emission order
    fn on_message(&mut self, message: &PipelineMessage);
}

impl<F> MessageObserver for F
where
    F: FnMut(&PipelineMessage) + Send,
{
    fn on_message(&mut self, message: &PipelineMessage) {
        self(message);
    }
}
