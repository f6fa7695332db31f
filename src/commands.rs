//! Operator-facing surface: submit a task, request a stop, watch the live feed.
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::agent_engine::engine::{AgentEngine, Session};
use crate::agent_engine::event_bus::{EventBus, FeedEvent};
use crate::agent_engine::loop_control::RunControl;
use crate::agent_engine::state::{ActionOutcome, AgentCommand, AgentState};
use crate::config::{SessionSettings, SharedSettings};
use crate::errors::{DeskPilotError, DeskPilotResult};

/// Cheap-to-clone handle for talking to the engine task.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentCommand>,
    control: Arc<RunControl>,
    events: EventBus,
    settings: SharedSettings,
}

impl AgentHandle {
    /// Spawns the engine on its own task and returns a handle to it.
    pub fn spawn(session: Session) -> (Self, JoinHandle<()>) {
        let control = Arc::new(RunControl::new(session.stop.clone()));
        let events = session.events.clone();
        let settings = session.settings.clone();
        let (tx, rx) = mpsc::channel(8);

        let mut engine = AgentEngine::new(session, control.clone(), rx);
        tracing::info!("spawning agent engine task");
        let join = tokio::spawn(async move {
            engine.run_loop().await;
        });

        let handle = Self {
            tx,
            control,
            events,
            settings,
        };
        (handle, join)
    }

    /// Starts a run. Rejected with `AgentBusy` while another run is active.
    pub async fn start_task(&self, task: &str) -> DeskPilotResult<()> {
        let task = task.trim();
        if task.is_empty() {
            return Err(DeskPilotError::Config("task must not be empty".into()));
        }
        if !self.control.try_claim() {
            tracing::warn!(task = %task, "task rejected: a run is already active");
            return Err(DeskPilotError::AgentBusy);
        }
        if self
            .tx
            .send(AgentCommand::StartTask(task.to_string()))
            .await
            .is_err()
        {
            self.control.release();
            return Err(DeskPilotError::Config("agent engine is not running".into()));
        }
        tracing::info!(task = %task, "task submitted");
        Ok(())
    }

    /// Requests a stop of the active run. Returns whether a run was active.
    pub fn stop_task(&self) -> bool {
        let active = self.control.is_running();
        if active {
            self.control.stop_signal().request();
            tracing::info!("stop requested");
        }
        active
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings.snapshot()
    }

    pub fn update_settings(&self, settings: SessionSettings) -> DeskPilotResult<()> {
        self.settings.update(settings)
    }

    /// Asks the engine to exit once the active run, if any, is over.
    pub async fn shutdown(&self) {
        self.stop_task();
        if self.tx.send(AgentCommand::Shutdown).await.is_err() {
            tracing::debug!("engine already gone at shutdown");
        }
    }
}

/// One-line human-readable rendering of a feed event.
pub fn render_event(event: &FeedEvent) -> String {
    match event {
        FeedEvent::RunStarted { task, .. } => format!("> started: {task}"),
        FeedEvent::StateChanged { state } => format!("  state: {}", render_state(state)),
        FeedEvent::Iteration {
            iteration,
            max_iterations,
        } => format!("  iteration {iteration}/{max_iterations}"),
        FeedEvent::ActionExecuted { result, .. } => {
            let name = result
                .directive
                .as_ref()
                .map(|d| format!("{:?}", d.kind()))
                .unwrap_or_else(|| "undecodable".to_string());
            match &result.outcome {
                ActionOutcome::Error { detail } => format!("  ! {name}: {detail}"),
                outcome => format!(
                    "  - {name}: {}",
                    serde_json::to_string(outcome).unwrap_or_else(|_| format!("{outcome:?}"))
                ),
            }
        }
        FeedEvent::ModelRetry { kind, detail, .. } => format!("  retrying ({kind:?}): {detail}"),
        FeedEvent::Error { message } => format!("! error: {message}"),
        FeedEvent::RunFinished { report } => format!(
            "< finished after {} iteration(s): {}",
            report.iterations,
            render_state(&report.state)
        ),
    }
}

fn render_state(state: &AgentState) -> String {
    match state {
        AgentState::Idle => "idle".into(),
        AgentState::Running { iteration } => format!("running (iteration {iteration})"),
        AgentState::Completed { reason } => format!("completed ({reason:?})"),
        AgentState::Stopped => "stopped".into(),
        AgentState::Failed { message } => format!("failed: {message}"),
    }
}
