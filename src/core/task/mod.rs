//! Task lifecycle state machine.

pub mod poller;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::gateway::PollingHandle;

pub use poller::{PollSink, PollTiming, StatusPoller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Starting,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Idle => "idle",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Stopped => "stopped",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    /// A task occupies the session in these states.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TaskState::Starting | TaskState::Running | TaskState::Paused
        )
    }
}

pub fn can_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    match (from, to) {
        (Idle | Stopped | Completed | Failed, Starting) => true,
        (Starting, Running | Failed | Stopped) => true,
        (Running, Paused) | (Paused, Running) => true,
        (Running | Paused, Stopped | Completed | Failed) => true,
        // Manual handoff returns to idle once the explanation has been shown.
        (Running | Paused, Idle) => true,
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub instruction: String,
    pub created_at: DateTime<Utc>,
    handle: Option<PollingHandle>,
}

impl Task {
    fn new(instruction: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instruction: instruction.to_string(),
            created_at: Utc::now(),
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<&PollingHandle> {
        self.handle.as_ref()
    }

    /// Returns false when a handle was already assigned; the first one wins.
    fn assign_handle(&mut self, handle: PollingHandle) -> bool {
        if self.handle.is_some() {
            return false;
        }
        self.handle = Some(handle);
        true
    }
}

/// Identifies one task launch. Background work carries the generation it was
/// started for and is ignored once the controller has moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRejection {
    EmptyInstruction,
    Busy(TaskState),
}

impl std::fmt::Display for StartRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartRejection::EmptyInstruction => write!(f, "Please enter an instruction first."),
            StartRejection::Busy(state) => write!(
                f,
                "A task is already {}. Stop it before starting another.",
                state.as_str()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed,
    Failed,
}

#[derive(Debug)]
pub struct TaskController {
    state: TaskState,
    task: Option<Task>,
    generation: u64,
}

impl Default for TaskController {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskController {
    pub fn new() -> Self {
        Self {
            state: TaskState::Idle,
            task: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    /// True while `generation` still owns an active task.
    pub fn is_current(&self, generation: Generation) -> bool {
        generation.0 == self.generation && self.state.is_active()
    }

    fn transition(&mut self, to: TaskState) -> bool {
        if !can_transition(self.state, to) {
            warn!(
                "Ignoring task transition {} -> {}",
                self.state.as_str(),
                to.as_str()
            );
            return false;
        }
        info!("Task {} -> {}", self.state.as_str(), to.as_str());
        self.state = to;
        true
    }

    pub fn begin(&mut self, instruction: &str) -> Result<Generation, StartRejection> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(StartRejection::EmptyInstruction);
        }
        if self.state.is_active() {
            return Err(StartRejection::Busy(self.state));
        }
        self.generation += 1;
        self.task = Some(Task::new(instruction));
        self.transition(TaskState::Starting);
        Ok(self.generation())
    }

    /// Executor acknowledged the task. `handle` is set for tasks that will be
    /// polled; manual handoffs have none.
    pub fn accept(
        &mut self,
        generation: Generation,
        task_id: &str,
        handle: Option<PollingHandle>,
    ) -> bool {
        if generation.0 != self.generation || self.state != TaskState::Starting {
            return false;
        }
        if let Some(task) = self.task.as_mut() {
            task.id = task_id.to_string();
            if let Some(handle) = handle {
                task.assign_handle(handle);
            }
        }
        self.transition(TaskState::Running)
    }

    pub fn fail_submission(&mut self, generation: Generation) -> bool {
        if generation.0 != self.generation || self.state != TaskState::Starting {
            return false;
        }
        self.task = None;
        self.transition(TaskState::Failed)
    }

    /// Local pause flag only; the executor keeps running.
    pub fn toggle_pause(&mut self) -> Option<TaskState> {
        let next = match self.state {
            TaskState::Running => TaskState::Paused,
            TaskState::Paused => TaskState::Running,
            _ => return None,
        };
        self.transition(next);
        Some(next)
    }

    /// Stop the active task and invalidate its background work. Returns the
    /// discarded task.
    pub fn stop(&mut self) -> Option<Task> {
        if !self.state.is_active() {
            return None;
        }
        self.generation += 1;
        self.transition(TaskState::Stopped);
        self.task.take()
    }

    pub fn finish(&mut self, generation: Generation, outcome: TerminalOutcome) -> bool {
        if !self.is_current(generation) || self.state == TaskState::Starting {
            return false;
        }
        let to = match outcome {
            TerminalOutcome::Completed => TaskState::Completed,
            TerminalOutcome::Failed => TaskState::Failed,
        };
        if !self.transition(to) {
            return false;
        }
        self.task = None;
        true
    }

    /// End of a manual handoff.
    pub fn release(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) || self.state == TaskState::Starting {
            return false;
        }
        self.task = None;
        self.transition(TaskState::Idle)
    }
}
