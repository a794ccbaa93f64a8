//! Two-phase pipeline execution

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::{Filter, FilterContext, FilterEvent, FilterState};
use crate::message::{MessageObserver, Phase, PipelineMessage, Severity};
use crate::registry::DataContainerRegistry;

/// Configuration for a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Treat a preflight warning as a preflight failure
    pub halt_on_warning: bool,

    /// Emit every message through `tracing`
    pub log_messages: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            halt_on_warning: false,
            log_messages: true,
        }
    }
}

/// Cooperative cancellation flag, checked between filters
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Every phase of every filter succeeded
    Completed,

    /// Every phase succeeded but warnings were reported
    CompletedWithWarnings,

    /// A preflight failed; no execute phase ran
    PreflightFailed {
        /// First failing filter
        filter_index: usize,
    },

    /// An execute failed; later filters did not run
    ExecuteFailed {
        /// Failing filter
        filter_index: usize,
    },

    /// Cancellation was observed before `next_filter` started
    Cancelled {
        /// Filter that would have run next
        next_filter: usize,
    },
}

impl RunOutcome {
    /// Check if the run got through every filter
    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::CompletedWithWarnings)
    }
}

/// Wall-clock time spent in one filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTiming {
    /// Position in the pipeline
    pub filter_index: usize,

    /// Human label
    pub filter_label: String,

    /// Time spent in preflight
    pub preflight: Duration,

    /// Time spent in execute, if it ran
    pub execute: Option<Duration>,
}

/// Everything a run produced besides the registry contents
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Unique id of this run
    pub run_id: Uuid,

    /// How the run ended
    pub outcome: RunOutcome,

    /// Every message in emission order
    pub messages: Vec<PipelineMessage>,

    /// Final state of each filter
    pub states: Vec<FilterState>,

    /// Per-filter timings
    pub timings: Vec<FilterTiming>,

    /// Placeholder registry the preflight ran against
    #[serde(skip)]
    pub scratch_registry: Option<DataContainerRegistry>,
}

impl PipelineReport {
    fn new(filter_count: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            outcome: RunOutcome::Completed,
            messages: Vec::new(),
            states: vec![FilterState::Idle; filter_count],
            timings: Vec::with_capacity(filter_count),
            scratch_registry: None,
        }
    }

    /// Check if the run got through every filter
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Messages of the given severity
    pub fn messages_with(&self, severity: Severity) -> impl Iterator<Item = &PipelineMessage> {
        self.messages.iter().filter(move |m| m.severity == severity)
    }

    /// Error messages
    pub fn errors(&self) -> impl Iterator<Item = &PipelineMessage> {
        self.messages_with(Severity::Error)
    }

    /// Warning messages
    pub fn warnings(&self) -> impl Iterator<Item = &PipelineMessage> {
        self.messages_with(Severity::Warning)
    }
}

struct PipelineEntry {
    filter: Box<dyn Filter>,
    state: FilterState,
}

impl PipelineEntry {
    fn advance(&mut self, event: FilterEvent) {
        match self.state.transition(event) {
            Ok(next) => self.state = next,
            Err(err) => tracing::error!(%err, "filter state machine rejected event"),
        }
    }
}

/// An ordered list of filters run against one registry
///
/// Preflight runs every filter against a placeholder copy of the registry;
/// only when all of them pass do the execute phases run, in order, against
/// the real one.
pub struct Pipeline {
    /// Name persisted with the pipeline
    name: String,

    /// Filters and their states
    entries: Vec<PipelineEntry>,

    /// Configuration for this pipeline
    config: PipelineConfig,

    /// Whether the pipeline is cancelled
    cancelled: CancelHandle,

    /// Message sinks
    observers: Vec<Box<dyn MessageObserver>>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new(name: &str) -> Self {
        Self::with_config(name, PipelineConfig::default())
    }

    /// Create an empty pipeline with an explicit configuration
    pub fn with_config(name: &str, config: PipelineConfig) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
            config,
            cancelled: CancelHandle::default(),
            observers: Vec::new(),
        }
    }

    /// Name persisted with the pipeline
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the configuration
    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
    }

    /// Append a filter
    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.entries.push(PipelineEntry {
            filter,
            state: FilterState::Idle,
        });
    }

    /// Number of filters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pipeline has no filters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filters in run order
    pub fn filters(&self) -> impl Iterator<Item = &dyn Filter> {
        self.entries.iter().map(|entry| entry.filter.as_ref())
    }

    /// Current state of each filter
    pub fn states(&self) -> Vec<FilterState> {
        self.entries.iter().map(|entry| entry.state).collect()
    }

    /// Register a message observer
    pub fn add_observer(&mut self, observer: Box<dyn MessageObserver>) {
        self.observers.push(observer);
    }

    /// Handle that cancels this pipeline from anywhere
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancelled.clone()
    }

    /// Validate every filter without touching `registry`
    pub fn preflight(&mut self, registry: &DataContainerRegistry) -> PipelineReport {
        let mut report = PipelineReport::new(self.len());
        let mut scratch = registry.structure_clone();

        let span = tracing::info_span!("pipeline", name = %self.name, run_id = %report.run_id);
        let _guard = span.enter();

        if let Some(outcome) = self.preflight_all(&mut scratch, &mut report) {
            report.outcome = outcome;
        } else {
            report.outcome = self.success_outcome(&report);
        }
        report.states = self.states();
        report.scratch_registry = Some(scratch);
        report
    }

    /// Preflight every filter, then execute them in order against `registry`
    ///
    /// Never fails; the report carries the verdict.
    pub fn run(&mut self, registry: &mut DataContainerRegistry) -> PipelineReport {
        let mut report = PipelineReport::new(self.len());
        let mut scratch = registry.structure_clone();

        let span = tracing::info_span!("pipeline", name = %self.name, run_id = %report.run_id);
        let _guard = span.enter();
        tracing::info!(filters = self.len(), "starting pipeline");
        let start = Instant::now();

        let failure = match self.preflight_all(&mut scratch, &mut report) {
            Some(outcome) => Some(outcome),
            None => self.execute_all(registry, &mut report),
        };
        let outcome = failure.unwrap_or_else(|| self.success_outcome(&report));

        tracing::info!(?outcome, elapsed = ?start.elapsed(), "pipeline finished");
        report.outcome = outcome;
        report.states = self.states();
        report.scratch_registry = Some(scratch);
        report
    }

    /// Returns the failure outcome, or `None` when every preflight passed
    fn preflight_all(
        &mut self,
        scratch: &mut DataContainerRegistry,
        report: &mut PipelineReport,
    ) -> Option<RunOutcome> {
        for entry in &mut self.entries {
            entry.advance(FilterEvent::Reset);
        }

        for index in 0..self.entries.len() {
            if self.cancelled.is_cancelled() {
                return Some(RunOutcome::Cancelled { next_filter: index });
            }

            let entry = &mut self.entries[index];
            let label = entry.filter.human_label();
            let span = tracing::info_span!("filter", index, label = %label, phase = "preflight");
            let _guard = span.enter();

            entry.advance(FilterEvent::BeginPreflight);
            let mut ctx = FilterContext::new(Phase::Preflight);
            let start = Instant::now();
            entry.filter.preflight(scratch, &mut ctx);
            let elapsed = start.elapsed();

            let failed =
                ctx.has_error() || (self.config.halt_on_warning && ctx.has_warning());
            entry.advance(if failed {
                FilterEvent::PreflightFailed
            } else {
                FilterEvent::PreflightSucceeded
            });

            report.timings.push(FilterTiming {
                filter_index: index,
                filter_label: label.clone(),
                preflight: elapsed,
                execute: None,
            });
            self.dispatch(index, &label, &mut ctx, report);

            if failed {
                return Some(RunOutcome::PreflightFailed {
                    filter_index: index,
                });
            }
        }
        None
    }

    /// Returns the failure outcome, or `None` when every execute passed
    fn execute_all(
        &mut self,
        registry: &mut DataContainerRegistry,
        report: &mut PipelineReport,
    ) -> Option<RunOutcome> {
        for index in 0..self.entries.len() {
            if self.cancelled.is_cancelled() {
                tracing::warn!(next_filter = index, "pipeline cancelled");
                return Some(RunOutcome::Cancelled { next_filter: index });
            }

            let entry = &mut self.entries[index];
            let label = entry.filter.human_label();
            let span = tracing::info_span!("filter", index, label = %label, phase = "execute");
            let _guard = span.enter();

            entry.advance(FilterEvent::BeginExecute);
            let mut ctx = FilterContext::new(Phase::Execute);
            let start = Instant::now();
            entry.filter.execute(registry, &mut ctx);
            let elapsed = start.elapsed();

            let failed = ctx.has_error();
            entry.advance(if failed {
                FilterEvent::ExecuteFailed
            } else {
                FilterEvent::ExecuteSucceeded
            });

            if let Some(timing) = report.timings.get_mut(index) {
                timing.execute = Some(elapsed);
            }
            self.dispatch(index, &label, &mut ctx, report);

            if failed {
                return Some(RunOutcome::ExecuteFailed {
                    filter_index: index,
                });
            }
        }
        None
    }

    fn success_outcome(&self, report: &PipelineReport) -> RunOutcome {
        if report.warnings().next().is_some() {
            RunOutcome::CompletedWithWarnings
        } else {
            RunOutcome::Completed
        }
    }

    fn dispatch(
        &mut self,
        index: usize,
        label: &str,
        ctx: &mut FilterContext,
        report: &mut PipelineReport,
    ) {
        let phase = ctx.phase();
        for event in ctx.take_messages() {
            let message = PipelineMessage {
                filter_index: index,
                filter_label: label.to_string(),
                phase,
                code: event.code,
                message: event.message,
                severity: event.severity,
            };

            if self.config.log_messages {
                match message.severity {
                    Severity::Status => tracing::info!(code = message.code, "{}", message.message),
                    Severity::Warning => tracing::warn!(code = message.code, "{}", message.message),
                    Severity::Error => tracing::error!(code = message.code, "{}", message.message),
                }
            }
            for observer in &mut self.observers {
                observer.on_message(&message);
            }
            report.messages.push(message);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("filters", &self.filters().map(|f| f.class_name()).collect::<Vec<_>>())
            .field("states", &self.states())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::catalog::FilterMetadata;
    use crate::error::Result;
    use crate::group::GroupType;
    use crate::params::{ParametersReader, ParametersWriter};
    use crate::scalar::ScalarKind;

    /// Creates `DC|G|<array>` with four Int32 tuples and fills it with `value`
    struct Fill {
        array: &'static str,
        value: i32,
        fail_preflight: bool,
        fail_execute: bool,
        warn: bool,
        cancel_after_execute: Option<CancelHandle>,
        executed: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Fill {
        fn new(array: &'static str, executed: &Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                array,
                value: 1,
                fail_preflight: false,
                fail_execute: false,
                warn: false,
                cancel_after_execute: None,
                executed: Arc::clone(executed),
            }
        }
    }

    impl Filter for Fill {
        fn class_name(&self) -> &'static str {
            "Fill"
        }

        fn metadata(&self) -> FilterMetadata {
            FilterMetadata {
                compiled_library_name: "Test",
                group_name: "Test",
                sub_group_name: "Misc",
                human_label: "Fill",
            }
        }

        fn data_check(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
            if self.fail_preflight {
                ctx.error(-1, "refusing");
                return;
            }
            if self.warn {
                ctx.warning(-2, "odd but fine");
            }
            let Some(dc) = ctx.check(registry.create_or_reuse("DC"), -999) else {
                return;
            };
            if !dc.contains_group("G")
                && ctx
                    .check(dc.create_group("G", vec![4], GroupType::Generic), -10000)
                    .is_none()
            {
                return;
            }
            let Some(group) = ctx.check(dc.get_group_mut("G"), -10000) else {
                return;
            };
            if !group.contains_array(self.array) {
                ctx.check(
                    group.create_placeholder_array(ScalarKind::Int32, self.array, 1),
                    -1050,
                );
            }
        }

        fn execute(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
            self.data_check(registry, ctx);
            if ctx.has_error() {
                return;
            }
            if self.fail_execute {
                ctx.error(-3, "boom");
                return;
            }
            let Some(group) = ctx.check(
                registry.get_or_fail_mut("DC").and_then(|dc| dc.get_group_mut("G")),
                -10000,
            ) else {
                return;
            };
            let Some(array) = ctx.check(group.get_array_mut(self.array), -300) else {
                return;
            };
            if ctx.check(array.allocate(), -1040).is_none() {
                return;
            }
            if let Some(values) = ctx.check(array.as_mut_slice::<i32>(), -300) {
                values.fill(self.value);
            }
            self.executed.lock().unwrap().push(self.array);
            if let Some(handle) = &self.cancel_after_execute {
                handle.cancel();
            }
            ctx.status("Complete");
        }

        fn read_parameters(&mut self, _: &mut dyn ParametersReader, _: usize) -> Result<()> {
            Ok(())
        }

        fn write_parameters(&self, _: &mut dyn ParametersWriter, index: usize) -> Result<usize> {
            Ok(index + 1)
        }
    }

    fn log() -> Arc<Mutex<Vec<&'static str>>> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_run_executes_in_order() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        pipeline.push(Box::new(Fill::new("A", &executed)));
        pipeline.push(Box::new(Fill::new("B", &executed)));

        let mut registry = DataContainerRegistry::new();
        let report = pipeline.run(&mut registry);

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(*executed.lock().unwrap(), vec!["A", "B"]);
        assert_eq!(report.states, vec![FilterState::ExecuteOk; 2]);
        assert_eq!(report.timings.len(), 2);
        assert!(report.timings.iter().all(|t| t.execute.is_some()));

        let group = registry.get_or_fail("DC").unwrap().get_group("G").unwrap();
        assert_eq!(group.get_array("B").unwrap().as_slice::<i32>().unwrap(), &[1; 4]);
    }

    #[test]
    fn test_preflight_failure_blocks_every_execute() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        pipeline.push(Box::new(Fill::new("A", &executed)));
        let mut bad = Fill::new("B", &executed);
        bad.fail_preflight = true;
        pipeline.push(Box::new(bad));
        pipeline.push(Box::new(Fill::new("C", &executed)));

        let mut registry = DataContainerRegistry::new();
        let report = pipeline.run(&mut registry);

        assert_eq!(report.outcome, RunOutcome::PreflightFailed { filter_index: 1 });
        assert!(executed.lock().unwrap().is_empty());
        assert!(registry.is_empty());
        assert_eq!(
            report.states,
            vec![FilterState::PreflightOk, FilterState::PreflightFailed, FilterState::Idle]
        );
        assert_eq!(report.errors().count(), 1);
    }

    #[test]
    fn test_preflight_leaves_registry_untouched_and_is_idempotent() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        pipeline.push(Box::new(Fill::new("A", &executed)));

        let registry = DataContainerRegistry::new();
        let first = pipeline.preflight(&registry);
        let second = pipeline.preflight(&registry);

        assert!(registry.is_empty());
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.scratch_registry, second.scratch_registry);
        let scratch = first.scratch_registry.unwrap();
        let array = scratch
            .get_or_fail("DC")
            .unwrap()
            .get_group("G")
            .unwrap()
            .get_array("A")
            .unwrap();
        assert!(!array.is_allocated());
        assert!(executed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_execute_failure_keeps_earlier_writes() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        let mut first = Fill::new("A", &executed);
        first.value = 9;
        pipeline.push(Box::new(first));
        let mut bad = Fill::new("B", &executed);
        bad.fail_execute = true;
        pipeline.push(Box::new(bad));
        pipeline.push(Box::new(Fill::new("C", &executed)));

        let mut registry = DataContainerRegistry::new();
        let report = pipeline.run(&mut registry);

        assert_eq!(report.outcome, RunOutcome::ExecuteFailed { filter_index: 1 });
        assert_eq!(*executed.lock().unwrap(), vec!["A"]);
        assert_eq!(
            report.states,
            vec![FilterState::ExecuteOk, FilterState::ExecuteFailed, FilterState::PreflightOk]
        );
        let group = registry.get_or_fail("DC").unwrap().get_group("G").unwrap();
        assert_eq!(group.get_array("A").unwrap().as_slice::<i32>().unwrap(), &[9; 4]);
    }

    #[test]
    fn test_warnings_do_not_halt_by_default() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        let mut noisy = Fill::new("A", &executed);
        noisy.warn = true;
        pipeline.push(Box::new(noisy));

        let report = pipeline.run(&mut DataContainerRegistry::new());

        assert_eq!(report.outcome, RunOutcome::CompletedWithWarnings);
        assert_eq!(*executed.lock().unwrap(), vec!["A"]);
    }

    #[test]
    fn test_halt_on_warning() {
        let executed = log();
        let config = PipelineConfig {
            halt_on_warning: true,
            ..PipelineConfig::default()
        };
        let mut pipeline = Pipeline::with_config("test", config);
        let mut noisy = Fill::new("A", &executed);
        noisy.warn = true;
        pipeline.push(Box::new(noisy));

        let report = pipeline.run(&mut DataContainerRegistry::new());

        assert_eq!(report.outcome, RunOutcome::PreflightFailed { filter_index: 0 });
        assert!(executed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_before_execute() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        pipeline.push(Box::new(Fill::new("A", &executed)));
        pipeline.cancel_handle().cancel();

        let report = pipeline.run(&mut DataContainerRegistry::new());

        assert_eq!(report.outcome, RunOutcome::Cancelled { next_filter: 0 });
        assert!(executed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_during_execute_stops_before_next_filter() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        let mut first = Fill::new("A", &executed);
        first.cancel_after_execute = Some(pipeline.cancel_handle());
        pipeline.push(Box::new(first));
        pipeline.push(Box::new(Fill::new("B", &executed)));

        let mut registry = DataContainerRegistry::new();
        let report = pipeline.run(&mut registry);

        assert_eq!(report.outcome, RunOutcome::Cancelled { next_filter: 1 });
        assert_eq!(*executed.lock().unwrap(), vec!["A"]);
        assert_eq!(
            report.states,
            vec![FilterState::ExecuteOk, FilterState::PreflightOk]
        );
        assert!(report.timings[0].execute.is_some());
        assert!(report.timings[1].execute.is_none());

        let group = registry.get_or_fail("DC").unwrap().get_group("G").unwrap();
        assert!(group.get_array("A").unwrap().is_allocated());
        assert!(!group.contains_array("B"));
    }

    #[test]
    fn test_observers_see_every_message() {
        let executed = log();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut pipeline = Pipeline::new("test");
        pipeline.push(Box::new(Fill::new("A", &executed)));
        pipeline.add_observer(Box::new(move |m: &PipelineMessage| {
            sink.lock().unwrap().push(m.clone());
        }));

        let report = pipeline.run(&mut DataContainerRegistry::new());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), report.messages.len());
        assert_eq!(seen[0].message, "Complete");
        assert_eq!(seen[0].phase, Phase::Execute);
        assert_eq!(seen[0].filter_label, "Fill");
    }

    #[test]
    fn test_rerun_resets_states() {
        let executed = log();
        let mut pipeline = Pipeline::new("test");
        pipeline.push(Box::new(Fill::new("A", &executed)));
        let mut registry = DataContainerRegistry::new();

        assert!(pipeline.run(&mut registry).is_success());
        let report = pipeline.run(&mut registry);

        assert!(report.is_success());
        assert_eq!(report.states, vec![FilterState::ExecuteOk]);
    }
}
