use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::messages::{Message, Messages, Severity};

use super::progress::{OperationEvent, OperationKind, OperationReporter};
use super::stage::Stage;

/// Configured user settings pushed to every stage: name -> values.
pub type UserSettings = BTreeMap<String, Vec<String>>;

/// Shared view of an operation's error flag, for stages that must know
/// whether the run is failing (e.g. save finalization).
#[derive(Debug, Clone, Default)]
pub struct ErrorFlag(Arc<AtomicBool>);

impl ErrorFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    NotStarted,
    Preparing,
    Running,
    Done,
    Aborted,
}

/// Ordered, cooperatively scheduled sequence of stages.
///
/// The host drives the operation by calling [`Operation::step`] repeatedly
/// (from its event loop, or via `WorkerOperation` on a dedicated thread).
/// Each call performs at most one stage step.
pub struct Operation<C> {
    kind: OperationKind,
    ordered: bool,
    final_always: bool,
    stages: Vec<(Box<dyn Stage<C>>, usize)>,
    context: C,
    settings: UserSettings,
    reporters: Vec<Box<dyn OperationReporter>>,
    default_severity: Severity,
    state: OperationState,
    prepared: bool,
    current_stage: usize,
    current_step: usize,
    steps_completed: usize,
    total_steps: usize,
    error: ErrorFlag,
}

impl<C> Operation<C> {
    /// `ordered` records that stages depend on running in sequence; stages
    /// always run in append order regardless. With `final_always` the last
    /// stage still runs after an abort.
    pub fn new(kind: OperationKind, ordered: bool, final_always: bool, context: C) -> Self {
        Self::with_error_flag(kind, ordered, final_always, context, ErrorFlag::default())
    }

    pub fn with_error_flag(
        kind: OperationKind,
        ordered: bool,
        final_always: bool,
        context: C,
        error: ErrorFlag,
    ) -> Self {
        Self {
            kind,
            ordered,
            final_always,
            stages: Vec::new(),
            context,
            settings: UserSettings::new(),
            reporters: Vec::new(),
            default_severity: Severity::Error,
            state: OperationState::NotStarted,
            prepared: false,
            current_stage: 0,
            current_step: 0,
            steps_completed: 0,
            total_steps: 0,
            error,
        }
    }

    /// Takes ownership of `stage`.
    pub fn append_stage<S: Stage<C> + 'static>(&mut self, stage: S) {
        if self.is_active() {
            warn!("Ignoring stage '{}' appended to a running operation", stage.name());
            return;
        }
        self.stages.push((Box::new(stage), 0));
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn OperationReporter>) {
        self.reporters.push(reporter);
    }

    /// Drops all reporters, closing any channels they hold.
    pub fn clear_reporters(&mut self) {
        self.reporters.clear();
    }

    pub fn configure_settings(&mut self, settings: UserSettings) {
        self.settings = settings;
    }

    /// Severity for messages stages add without an explicit one.
    pub fn set_default_severity(&mut self, severity: Severity) {
        self.default_severity = severity;
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn is_final_always(&self) -> bool {
        self.final_always
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            OperationState::Preparing | OperationState::Running
        )
    }

    pub fn has_error(&self) -> bool {
        self.error.is_set()
    }

    pub fn error_flag(&self) -> ErrorFlag {
        self.error.clone()
    }

    /// `(steps completed, total steps)`; total is 0 until the first tick.
    pub fn progress(&self) -> (usize, usize) {
        (self.steps_completed, self.total_steps)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    /// Resets the cursor and starts scheduling. Preparation happens lazily
    /// on the first tick.
    pub fn run(&mut self) {
        if self.is_active() {
            warn!("{} operation is already running", self.kind);
            return;
        }
        info!(
            "Starting {} operation ({} stages, ordered: {})",
            self.kind,
            self.stages.len(),
            self.ordered
        );
        self.error.clear();
        self.prepared = false;
        self.current_stage = 0;
        self.current_step = 0;
        self.steps_completed = 0;
        self.total_steps = 0;
        self.state = OperationState::Preparing;
    }

    /// One scheduling tick. Returns true while the operation stays active.
    pub fn step(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }

        let mut messages = Messages::new(self.default_severity);

        if !self.prepared {
            self.prepare(&mut messages);
        }

        let mut failure = None;
        while self.current_stage < self.stages.len() {
            let (stage, steps) = &mut self.stages[self.current_stage];
            if self.current_step >= *steps {
                self.current_step = 0;
                self.current_stage += 1;
                continue;
            }

            let step = self.current_step;
            self.current_step += 1;
            if let Err(e) = stage.perform(step, &mut self.context, &mut messages) {
                warn!("Stage '{}' failed at step {}: {}", stage.name(), step, e);
                failure = Some(e.to_string());
            }
            self.steps_completed += 1;
            break;
        }

        if let Some(text) = failure {
            messages.push(Message::new(None, text, "", Severity::SeriousError));
            self.cancel();
        }

        self.report(OperationEvent::Progress {
            current: self.steps_completed,
            max: self.total_steps.max(1),
            kind: self.kind,
        });
        for message in messages {
            self.report(OperationEvent::Message {
                message,
                kind: self.kind,
            });
        }

        if self.is_active() && self.current_stage >= self.stages.len() {
            self.finish();
        }
        self.is_active()
    }

    /// Drives the operation until it completes. Returns true on success.
    pub fn run_to_completion(&mut self) -> bool {
        self.run();
        while self.step() {}
        !self.has_error()
    }

    /// Cooperative cancel; takes effect at the next step boundary.
    pub fn abort(&mut self) {
        if self.cancel() {
            self.finish();
        }
    }

    /// Moves the cursor for an abort. Returns true when nothing is left to
    /// run and the operation should finish.
    fn cancel(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.error.set();

        if self.final_always && !self.stages.is_empty() {
            let last = self.stages.len() - 1;
            if self.current_stage < last {
                debug!("Aborting {} operation, jumping to final stage", self.kind);
                self.current_stage = last;
                self.current_step = 0;
            }
            false
        } else {
            debug!("Aborting {} operation", self.kind);
            self.current_stage = self.stages.len();
            true
        }
    }

    fn prepare(&mut self, messages: &mut Messages) {
        let mut setup_failed = false;
        self.total_steps = 0;
        for (stage, steps) in self.stages.iter_mut() {
            for (name, values) in &self.settings {
                stage.update_user_setting(name, values);
            }
            *steps = match stage.setup(&mut self.context) {
                Ok(count) => count,
                Err(e) => {
                    warn!("Setup of stage '{}' failed: {}", stage.name(), e);
                    messages.push(Message::new(None, e.to_string(), "", Severity::SeriousError));
                    setup_failed = true;
                    0
                }
            };
            self.total_steps += *steps;
        }
        self.prepared = true;
        if self.state == OperationState::Preparing {
            self.state = OperationState::Running;
        }
        debug!(
            "Prepared {} operation: {} steps",
            self.kind, self.total_steps
        );
        if setup_failed {
            self.cancel();
        }
    }

    fn finish(&mut self) {
        let failed = self.error.is_set();
        self.state = if failed {
            OperationState::Aborted
        } else {
            OperationState::Done
        };
        info!(
            "{} operation finished ({} of {} steps, failed: {})",
            self.kind, self.steps_completed, self.total_steps, failed
        );
        self.report(OperationEvent::Done {
            kind: self.kind,
            failed,
        });
    }

    fn report(&self, event: OperationEvent) {
        for reporter in &self.reporters {
            reporter.report(&event);
        }
    }
}
