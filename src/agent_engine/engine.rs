use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::agent_engine::event_bus::{EventBus, FeedEvent};
use crate::agent_engine::history::Conversation;
use crate::agent_engine::loop_control::{interruptible_sleep, LoopController, RunControl, StopSignal};
use crate::agent_engine::state::{
    ActionOutcome, ActionResult, AgentCommand, AgentState, CompletionReason,
    RunReport, RunState,
};
use crate::config::{AgentConfig, SharedSettings};
use crate::errors::{DeskPilotResult, ModelErrorKind, RetryPolicy};
use crate::executor::dispatcher::{ActionExecutor, ExecutorOptions};
use crate::executor::input::InputDriver;
use crate::llm::decoder::{decode_response, detect_completion};
use crate::llm::provider::ModelClient;
use crate::llm::tools::display_for;
use crate::llm::types::{ContentBlock, ModelRequest, ModelResponse, ResponseBlock, Turn};
use crate::perception::screenshot::ScreenCapture;
use crate::perception::traits::ScreenSource;

/// Everything one run needs, constructed once and owned by the engine.
pub struct Session {
    pub client: Arc<dyn ModelClient>,
    pub executor: ActionExecutor,
    pub settings: SharedSettings,
    pub agent: AgentConfig,
    pub stop: StopSignal,
    pub events: EventBus,
}

impl Session {
    pub fn new(
        client: Arc<dyn ModelClient>,
        input: Arc<dyn InputDriver>,
        screen: Arc<dyn ScreenSource>,
        settings: SharedSettings,
        agent: AgentConfig,
        stop: StopSignal,
        events: EventBus,
    ) -> DeskPilotResult<Self> {
        let capture = Arc::new(ScreenCapture::new(
            screen,
            settings.clone(),
            Duration::from_millis(agent.capture_interval_ms),
        ));
        let executor = ActionExecutor::new(
            input,
            capture,
            settings.clone(),
            ExecutorOptions::from_config(&agent)?,
            stop.clone(),
        );
        Ok(Self {
            client,
            executor,
            settings,
            agent,
            stop,
            events,
        })
    }
}

pub struct AgentEngine {
    session: Session,
    control: Arc<RunControl>,
    command_rx: mpsc::Receiver<AgentCommand>,
    state: AgentState,
    run_state: RunState,
    conversation: Conversation,
}

impl AgentEngine {
    pub fn new(
        session: Session,
        control: Arc<RunControl>,
        command_rx: mpsc::Receiver<AgentCommand>,
    ) -> Self {
        Self {
            session,
            control,
            command_rx,
            state: AgentState::Idle,
            run_state: RunState::default(),
            conversation: Conversation::new(),
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Waits for commands until shutdown or until every sender is gone.
    pub async fn run_loop(&mut self) {
        self.set_state(AgentState::Idle);
        while let Some(command) = self.command_rx.recv().await {
            match command {
                AgentCommand::StartTask(task) => {
                    let report = self.run_task(&task).await;
                    self.control.release();
                    tracing::info!(
                        run_id = %report.run_id,
                        state = ?report.state,
                        iterations = report.iterations,
                        "run finished"
                    );
                }
                AgentCommand::Shutdown => break,
            }
        }
        tracing::info!("agent engine stopped");
    }

    /// Runs one task to a terminal state. The caller is responsible for having cleared the
    /// stop signal when the task was accepted.
    pub async fn run_task(&mut self, task: &str) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.conversation.clear();
        tracing::info!(
            run_id = %run_id,
            session = %self.conversation.session_id(),
            task = %task,
            "run started"
        );

        self.run_state = RunState {
            is_running: true,
            ..Default::default()
        };
        self.session.events.publish(FeedEvent::RunStarted {
            run_id: run_id.clone(),
            task: task.to_string(),
        });

        let max_iterations = self.session.settings.snapshot().max_iterations;
        let mut ctrl = LoopController::new(max_iterations);
        self.set_state(AgentState::Running { iteration: 0 });

        let terminal = self.drive(task, &mut ctrl).await;

        self.session.executor.reset();
        self.run_state.is_running = false;
        self.run_state.stop_requested = self.session.stop.is_requested();
        self.run_state.is_complete = matches!(terminal, AgentState::Completed { .. });

        if let AgentState::Failed { message } = &terminal {
            tracing::error!(run_id = %run_id, error = %message, "run failed");
            self.session.events.publish(FeedEvent::Error {
                message: message.clone(),
            });
        }
        self.set_state(terminal.clone());

        let report = RunReport {
            run_id,
            state: terminal,
            iterations: ctrl.iteration_count(),
        };
        self.session.events.publish(FeedEvent::RunFinished {
            report: report.clone(),
        });
        report
    }

    async fn drive(&mut self, task: &str, ctrl: &mut LoopController) -> AgentState {
        if self.session.stop.is_requested() {
            return AgentState::Stopped;
        }

        let first = match self.session.executor.capture().await {
            Ok(shot) => ContentBlock::jpeg(shot),
            Err(e) => return AgentState::Failed { message: e.to_string() },
        };
        self.conversation.push(Turn::user(vec![
            ContentBlock::text(format!("Task: {task}")),
            first,
        ]));

        let mut response = match self.call_model().await {
            Ok(r) => r,
            Err(terminal) => return terminal,
        };

        loop {
            if self.session.stop.is_requested() {
                tracing::info!(iteration = ctrl.iteration_count(), "stop requested");
                return AgentState::Stopped;
            }
            if ctrl.budget_exhausted() {
                tracing::info!(max = ctrl.max_iterations(), "iteration budget exhausted");
                return AgentState::Completed {
                    reason: CompletionReason::IterationBudget,
                };
            }

            let iteration = ctrl.begin_iteration();
            self.run_state.iteration_count = iteration;
            self.set_state(AgentState::Running { iteration });
            self.session.events.publish(FeedEvent::Iteration {
                iteration,
                max_iterations: ctrl.max_iterations(),
            });

            self.conversation.push(Turn::assistant(assistant_summary(&response)));

            if detect_completion(&response, &self.session.agent.completion_phrases) {
                tracing::info!(iteration, "model signalled completion");
                return AgentState::Completed {
                    reason: CompletionReason::TaskDone,
                };
            }

            let results = self.execute_directives(iteration, &response).await;

            // Stop and budget are handled at the top of the loop, before any further call.
            if self.session.stop.is_requested() || ctrl.budget_exhausted() {
                continue;
            }

            let needs_capture = results.iter().any(|r| r.directive.is_some() && !r.is_error())
                && !matches!(
                    results.iter().rev().find(|r| r.directive.is_some()),
                    Some(ActionResult {
                        outcome: ActionOutcome::ScreenshotTaken { .. },
                        ..
                    })
                );
            if needs_capture {
                let settle = Duration::try_from_secs_f64(
                    self.session.settings.snapshot().post_action_wait,
                )
                .unwrap_or_default();
                if interruptible_sleep(settle, &self.session.stop).await {
                    continue;
                }
                if let Err(e) = self.session.executor.capture().await {
                    return AgentState::Failed { message: e.to_string() };
                }
            }

            let Some(turn) = self.compose_turn(task, iteration, ctrl.max_iterations(), &results)
            else {
                return AgentState::Failed {
                    message: "no screenshot available for the next turn".into(),
                };
            };
            self.conversation.push(turn);

            response = match self.call_model().await {
                Ok(r) => r,
                Err(terminal) => return terminal,
            };
        }
    }

    /// Executes decoded directives in order, checking for a stop before each one.
    async fn execute_directives(
        &mut self,
        iteration: u32,
        response: &ModelResponse,
    ) -> Vec<ActionResult> {
        let mut results = Vec::new();
        for decoded in decode_response(response) {
            if self.session.stop.is_requested() {
                tracing::info!(iteration, executed = results.len(), "stop requested mid-sequence");
                break;
            }
            let result = match decoded {
                Ok(directive) => self.session.executor.execute(&directive).await,
                Err(e) => {
                    tracing::warn!(error = %e, "directive could not be decoded");
                    ActionResult::new(
                        None,
                        ActionOutcome::Error {
                            detail: e.to_string(),
                        },
                    )
                }
            };
            self.session.events.publish(FeedEvent::ActionExecuted {
                iteration,
                result: result.clone(),
            });
            results.push(result);
        }
        results
    }

    fn compose_turn(
        &self,
        task: &str,
        iteration: u32,
        max_iterations: u32,
        results: &[ActionResult],
    ) -> Option<Turn> {
        let shot = self.session.executor.latest_screenshot()?;
        let summary = if results.is_empty() {
            "No actions were executed.".to_string()
        } else {
            serde_json::to_string(results)
                .unwrap_or_else(|e| format!("action results could not be encoded: {e}"))
        };
        Some(Turn::user(vec![
            ContentBlock::text(format!(
                "Task: {task}\nIteration {iteration} of {max_iterations}. Action results:\n{summary}\nThe screenshot below shows the current screen ({}).",
                shot.resolution()
            )),
            ContentBlock::jpeg(shot),
        ]))
    }

    /// Sends the conversation, applying the retry policy of each failure kind. A terminal
    /// state comes back as `Err`.
    async fn call_model(&mut self) -> Result<ModelResponse, AgentState> {
        let Some(display) = self.session.executor.latest_screenshot().map(display_for) else {
            return Err(AgentState::Failed {
                message: "no screenshot to describe the display".into(),
            });
        };
        let image_limit = self.session.agent.image_history_limit;
        let backoff = backoff_duration(self.session.agent.rate_limit_backoff_secs);
        let mut strip_images = false;
        let mut rate_limit_retries = 0;
        let mut attempt = 0;

        loop {
            if self.session.stop.is_requested() {
                return Err(AgentState::Stopped);
            }
            attempt += 1;

            let turns = if strip_images {
                self.conversation.without_images()
            } else {
                self.conversation.request_view(image_limit)
            };
            let request = ModelRequest { turns, display };

            let err = match self.session.client.send(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            let kind = err.model_kind().unwrap_or(ModelErrorKind::Other);

            match kind.retry_policy() {
                RetryPolicy::StripImagesOnce if !strip_images => {
                    tracing::warn!(error = %err, "safety rejection; retrying without images");
                    strip_images = true;
                }
                RetryPolicy::BackOff if rate_limit_retries < self.session.agent.rate_limit_retries => {
                    rate_limit_retries += 1;
                    tracing::warn!(
                        error = %err,
                        wait_secs = backoff.as_secs_f64(),
                        retry = rate_limit_retries,
                        "rate limited; backing off"
                    );
                    self.session.events.publish(FeedEvent::ModelRetry {
                        kind,
                        attempt,
                        detail: err.to_string(),
                    });
                    if interruptible_sleep(backoff, &self.session.stop).await {
                        return Err(AgentState::Stopped);
                    }
                    continue;
                }
                _ => {
                    return Err(AgentState::Failed {
                        message: err.to_string(),
                    })
                }
            }

            self.session.events.publish(FeedEvent::ModelRetry {
                kind,
                attempt,
                detail: err.to_string(),
            });
        }
    }

    fn set_state(&mut self, state: AgentState) {
        tracing::debug!(?state, "agent state changed");
        self.state = state.clone();
        self.session.events.publish(FeedEvent::StateChanged { state });
    }
}

fn backoff_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
        tracing::warn!(secs, "invalid rate-limit back-off; using 60 s");
        Duration::from_secs(60)
    })
}

/// Text stored for an assistant turn: the response text plus one line per action call.
fn assistant_summary(response: &ModelResponse) -> String {
    let mut lines: Vec<String> = Vec::new();
    for block in &response.blocks {
        match block {
            ResponseBlock::Text { text } if !text.trim().is_empty() => lines.push(text.clone()),
            ResponseBlock::Text { .. } => {}
            ResponseBlock::Action { name, params } => {
                lines.push(format!("computer action {name}: {params}"))
            }
        }
    }
    if lines.is_empty() {
        "(empty response)".to_string()
    } else {
        lines.join("\n")
    }
}
