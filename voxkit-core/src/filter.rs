//! The two-phase filter contract

use std::fmt;

use crate::catalog::FilterMetadata;
use crate::error::{Error, Result};
use crate::message::{Phase, Severity};
use crate::params::{ParametersReader, ParametersWriter};
use crate::registry::DataContainerRegistry;

/// One event recorded by a filter during a phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMessage {
    /// Filter-local code
    pub code: i32,

    /// Message text
    pub message: String,

    /// Severity
    pub severity: Severity,
}

/// Per-phase scratch state handed to a filter
///
/// The only channel besides the registry through which a filter talks to
/// the outside world.
#[derive(Debug)]
pub struct FilterContext {
    /// Phase being run
    phase: Phase,

    /// Messages in emission order
    messages: Vec<FilterMessage>,

    /// Last error code, 0 when clean
    error_condition: i32,
}

impl FilterContext {
    /// Create a clean context for `phase`
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            messages: Vec::new(),
            error_condition: 0,
        }
    }

    /// Phase being run
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Check if this is the validate-only phase
    pub fn is_preflight(&self) -> bool {
        self.phase == Phase::Preflight
    }

    /// Record an error; a non-negative code is coerced to -1
    pub fn error(&mut self, code: i32, message: impl Into<String>) {
        let code = if code < 0 { code } else { -1 };
        self.error_condition = code;
        self.push(code, message.into(), Severity::Error);
    }

    /// Record a warning; never fails the phase
    pub fn warning(&mut self, code: i32, message: impl Into<String>) {
        self.push(code, message.into(), Severity::Warning);
    }

    /// Record a progress message
    pub fn status(&mut self, message: impl Into<String>) {
        self.push(0, message.into(), Severity::Status);
    }

    /// Turn a model error into an error event with `code`
    ///
    /// Returns the value on success so callers can write
    /// `let Some(dc) = ctx.check(registry.get_or_fail(name), -999) else { return };`.
    pub fn check<T>(&mut self, result: Result<T>, code: i32) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.error(code, err.to_string());
                None
            }
        }
    }

    /// Last error code, 0 when the phase is clean
    pub fn error_condition(&self) -> i32 {
        self.error_condition
    }

    /// Check if an error has been recorded
    pub fn has_error(&self) -> bool {
        self.error_condition < 0
    }

    /// Check if a warning has been recorded
    pub fn has_warning(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Warning)
    }

    /// Messages recorded so far
    pub fn messages(&self) -> &[FilterMessage] {
        &self.messages
    }

    /// Take the recorded messages, leaving the error condition intact
    pub fn take_messages(&mut self) -> Vec<FilterMessage> {
        std::mem::take(&mut self.messages)
    }

    fn push(&mut self, code: i32, message: String, severity: Severity) {
        self.messages.push(FilterMessage {
            code,
            message,
            severity,
        });
    }
}

/// A pipeline step: validate against the registry, then compute
///
/// Implementors share one `data_check` between phases. In preflight it
/// resolves or creates containers, groups and placeholder arrays and reads
/// nothing but file metadata; in execute it runs again against real tuple
/// counts before the computation, since upstream state may have changed.
pub trait Filter: Send {
    /// Stable identifier used by pipeline files and the catalog
    fn class_name(&self) -> &'static str;

    /// Catalog display information
    fn metadata(&self) -> FilterMetadata;

    /// Shared validation and structure setup; `ctx.phase()` tells which phase
    fn data_check(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext);

    /// Validate-only pass
    fn preflight(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
        self.data_check(registry, ctx);
    }

    /// Re-validate, then compute
    fn execute(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext);

    /// Load parameters from filter group `index`; unknown keys keep defaults
    fn read_parameters(&mut self, reader: &mut dyn ParametersReader, index: usize) -> Result<()>;

    /// Store parameters as filter group `index`, returning the next free index
    fn write_parameters(&self, writer: &mut dyn ParametersWriter, index: usize) -> Result<usize>;

    /// Human label, taken from the metadata
    fn human_label(&self) -> String {
        self.metadata().human_label.to_string()
    }
}

/// Lifecycle of one filter within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FilterState {
    /// Nothing has run yet
    Idle,
    /// Preflight in progress
    Preflighting,
    /// Preflight finished without errors
    PreflightOk,
    /// Preflight reported an error
    PreflightFailed,
    /// Execute in progress
    Executing,
    /// Execute finished without errors
    ExecuteOk,
    /// Execute reported an error
    ExecuteFailed,
}

/// Something that moves a [`FilterState`] along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterEvent {
    /// Preflight starts
    BeginPreflight,
    /// Preflight ended clean
    PreflightSucceeded,
    /// Preflight ended with an error
    PreflightFailed,
    /// Execute starts
    BeginExecute,
    /// Execute ended clean
    ExecuteSucceeded,
    /// Execute ended with an error
    ExecuteFailed,
    /// Back to idle before a new run
    Reset,
}

impl FilterState {
    /// Apply `event`, or fail with [`Error::InvalidTransition`]
    pub fn transition(self, event: FilterEvent) -> Result<Self> {
        use FilterEvent as E;
        use FilterState as S;

        match (self, event) {
            (_, E::Reset) => Ok(S::Idle),
            (S::Idle, E::BeginPreflight) => Ok(S::Preflighting),
            (S::Preflighting, E::PreflightSucceeded) => Ok(S::PreflightOk),
            (S::Preflighting, E::PreflightFailed) => Ok(S::PreflightFailed),
            (S::PreflightOk, E::BeginExecute) => Ok(S::Executing),
            (S::Executing, E::ExecuteSucceeded) => Ok(S::ExecuteOk),
            (S::Executing, E::ExecuteFailed) => Ok(S::ExecuteFailed),
            (from, event) => Err(Error::InvalidTransition {
                from: from.name(),
                event: event.name(),
            }),
        }
    }

    /// Check if no further event other than a reset applies
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FilterState::PreflightFailed | FilterState::ExecuteFailed | FilterState::ExecuteOk
        )
    }

    /// Static name of the state
    pub fn name(self) -> &'static str {
        match self {
            FilterState::Idle => "Idle",
            FilterState::Preflighting => "Preflighting",
            FilterState::PreflightOk => "PreflightOk",
            FilterState::PreflightFailed => "PreflightFailed",
            FilterState::Executing => "Executing",
            FilterState::ExecuteOk => "ExecuteOk",
            FilterState::ExecuteFailed => "ExecuteFailed",
        }
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FilterEvent {
    fn name(self) -> &'static str {
        match self {
            FilterEvent::BeginPreflight => "BeginPreflight",
            FilterEvent::PreflightSucceeded => "PreflightSucceeded",
            FilterEvent::PreflightFailed => "PreflightFailed",
            FilterEvent::BeginExecute => "BeginExecute",
            FilterEvent::ExecuteSucceeded => "ExecuteSucceeded",
            FilterEvent::ExecuteFailed => "ExecuteFailed",
            FilterEvent::Reset => "Reset",
        }
    }
}
