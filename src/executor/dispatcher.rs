//! Executes decoded directives against the OS and owns the pointer/drag state.
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agent_engine::loop_control::{interruptible_sleep, StopSignal};
use crate::agent_engine::state::{ActionDirective, ActionOutcome, ActionResult};
use crate::config::{AgentConfig, SharedSettings};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::{model_to_native, ModelPoint, NativePoint};
use crate::executor::input::{ButtonAction, InputDriver, KeyChord, MouseButton};
use crate::executor::text_input::type_with_layout;
use crate::perception::screenshot::ScreenCapture;
use crate::perception::types::ScreenshotArtifact;

const ANIMATION_FRAME: Duration = Duration::from_millis(16);

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub pointer_animation: Duration,
    pub max_wait: Duration,
    pub layout_toggle: Option<KeyChord>,
}

impl ExecutorOptions {
    pub fn from_config(agent: &AgentConfig) -> DeskPilotResult<Self> {
        let max_wait = Duration::try_from_secs_f64(agent.max_wait_secs).map_err(|e| {
            DeskPilotError::Config(format!(
                "max_wait_secs must be a non-negative number, got {}: {e}",
                agent.max_wait_secs
            ))
        })?;
        let layout_toggle = if agent.layout_toggle.is_empty() {
            None
        } else {
            Some(KeyChord::from_names(&agent.layout_toggle)?)
        };
        Ok(Self {
            pointer_animation: Duration::from_millis(agent.pointer_animation_ms),
            max_wait,
            layout_toggle,
        })
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            pointer_animation: Duration::from_millis(500),
            max_wait: Duration::from_secs(60),
            layout_toggle: None,
        }
    }
}

/// Transient pointer bookkeeping. Positions are native pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerState {
    last_position: Option<NativePoint>,
    drag_origin: Option<NativePoint>,
}

impl PointerState {
    pub fn last_position(&self) -> Option<NativePoint> {
        self.last_position
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    pub fn drag_origin(&self) -> Option<NativePoint> {
        self.drag_origin
    }
}

pub struct ActionExecutor {
    input: Arc<dyn InputDriver>,
    capture: Arc<ScreenCapture>,
    settings: SharedSettings,
    options: ExecutorOptions,
    stop: StopSignal,
    pointer: PointerState,
    last_action_at: Option<Instant>,
    latest_screenshot: Option<ScreenshotArtifact>,
}

impl ActionExecutor {
    pub fn new(
        input: Arc<dyn InputDriver>,
        capture: Arc<ScreenCapture>,
        settings: SharedSettings,
        options: ExecutorOptions,
        stop: StopSignal,
    ) -> Self {
        Self {
            input,
            capture,
            settings,
            options,
            stop,
            pointer: PointerState::default(),
            last_action_at: None,
            latest_screenshot: None,
        }
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub fn latest_screenshot(&self) -> Option<&ScreenshotArtifact> {
        self.latest_screenshot.as_ref()
    }

    /// Runs one directive. Failures come back as an `error` outcome, never as `Err`.
    pub async fn execute(&mut self, directive: &ActionDirective) -> ActionResult {
        self.pace().await;

        let outcome = match self.dispatch(directive).await {
            Ok(outcome) => {
                tracing::info!(kind = ?directive.kind(), ?outcome, "action executed");
                outcome
            }
            Err(e) => {
                tracing::warn!(kind = ?directive.kind(), error = %e, "action failed");
                ActionOutcome::Error {
                    detail: e.to_string(),
                }
            }
        };

        self.last_action_at = Some(Instant::now());
        ActionResult::new(Some(directive.clone()), outcome)
    }

    /// Takes a fresh screenshot and keeps it as the latest artifact.
    pub async fn capture(&mut self) -> DeskPilotResult<&ScreenshotArtifact> {
        let shot = self.capture.capture().await?;
        Ok(&*self.latest_screenshot.insert(shot))
    }

    /// Releases a held drag and forgets pointer state. Called when a run ends.
    pub fn reset(&mut self) {
        self.release_drag();
        self.pointer = PointerState::default();
        self.latest_screenshot = None;
    }

    async fn pace(&self) {
        let min_delay = self.settings.snapshot().min_action_delay;
        let Some(last) = self.last_action_at else {
            return;
        };
        let min_delay = Duration::try_from_secs_f64(min_delay).unwrap_or_default();
        let elapsed = last.elapsed();
        if elapsed < min_delay {
            tokio::time::sleep(min_delay - elapsed).await;
        }
    }

    async fn dispatch(&mut self, directive: &ActionDirective) -> DeskPilotResult<ActionOutcome> {
        match directive {
            ActionDirective::Screenshot => {
                let shot = self.capture().await?;
                Ok(ActionOutcome::ScreenshotTaken {
                    resolution: shot.resolution(),
                    byte_size: shot.byte_size(),
                    scale_factor: shot.meta.scale_factor,
                })
            }
            ActionDirective::Move { coordinate } => self.move_pointer(*coordinate).await,
            ActionDirective::Click => self.click(MouseButton::Left, 1, "click"),
            ActionDirective::DoubleClick => self.click(MouseButton::Left, 2, "double_click"),
            ActionDirective::RightClick => self.click(MouseButton::Right, 1, "right_click"),
            ActionDirective::Drag { coordinate } => {
                let result = self.drag(*coordinate).await;
                if result.is_err() {
                    self.release_drag();
                }
                result
            }
            ActionDirective::TypeText { text } => {
                type_with_layout(self.input.as_ref(), self.options.layout_toggle.as_ref(), text)
                    .await?;
                Ok(ActionOutcome::Typed { text: text.clone() })
            }
            ActionDirective::KeyPress { key } => {
                let chord = KeyChord::parse(key)?;
                self.input.key_chord(&chord)?;
                Ok(ActionOutcome::KeyPressed { key: key.clone() })
            }
            ActionDirective::Scroll { amount } => {
                self.input.scroll(*amount)?;
                Ok(ActionOutcome::Scrolled { amount: *amount })
            }
            ActionDirective::Wait { seconds } => self.wait(*seconds).await,
        }
    }

    /// Scale factor of the image the model is looking at, falling back to the settings.
    fn active_scale(&self) -> f64 {
        self.latest_screenshot
            .as_ref()
            .map(|s| s.meta.scale_factor)
            .unwrap_or_else(|| self.settings.snapshot().scale_factor)
    }

    async fn move_pointer(&mut self, point: ModelPoint) -> DeskPilotResult<ActionOutcome> {
        let from = match self.pointer.last_position {
            Some(p) => p,
            None => self.input.pointer_position()?,
        };
        let screen = self.input.display_size()?;
        let target = model_to_native(self.active_scale(), point, screen)?;

        tracing::debug!(
            model_x = point.x,
            model_y = point.y,
            native = %target.native,
            clamped = target.clamped,
            "pointer move"
        );

        if self.settings.snapshot().teleport_pointer || self.options.pointer_animation.is_zero() {
            self.input.move_pointer(target.native)?;
        } else {
            self.animate_pointer(from, target.native).await?;
        }
        self.pointer.last_position = Some(target.native);

        Ok(ActionOutcome::PointerMoved {
            from,
            to: target.native,
            model: point,
            clamped: target.clamped,
        })
    }

    async fn animate_pointer(&self, from: NativePoint, to: NativePoint) -> DeskPilotResult<()> {
        let frames = (self.options.pointer_animation.as_millis() / ANIMATION_FRAME.as_millis())
            .max(1) as u32;
        let frame = self.options.pointer_animation / frames;
        for i in 1..frames {
            let t = i as f64 / frames as f64;
            let eased = t * t * (3.0 - 2.0 * t);
            let x = from.x as f64 + (to.x - from.x) as f64 * eased;
            let y = from.y as f64 + (to.y - from.y) as f64 * eased;
            self.input
                .move_pointer(NativePoint::new(x.round() as i32, y.round() as i32))?;
            tokio::time::sleep(frame).await;
        }
        self.input.move_pointer(to)
    }

    fn click(
        &mut self,
        button: MouseButton,
        clicks: u8,
        name: &str,
    ) -> DeskPilotResult<ActionOutcome> {
        let position = self.pointer.last_position.ok_or_else(|| {
            DeskPilotError::NoPointerPosition(format!("{name} needs a prior move"))
        })?;
        for _ in 0..clicks {
            self.input.button(button, ButtonAction::Click)?;
        }
        Ok(ActionOutcome::Clicked {
            button,
            clicks,
            position,
        })
    }

    /// Without a coordinate a drag toggles between press and release at the current position.
    /// With one, a held drag finishes there, and otherwise the whole drag runs in one step
    /// from the current position to the coordinate.
    async fn drag(&mut self, coordinate: Option<ModelPoint>) -> DeskPilotResult<ActionOutcome> {
        match (self.pointer.is_dragging(), coordinate) {
            (false, None) => self.begin_drag(),
            (false, Some(point)) => {
                self.begin_drag()?;
                self.move_pointer(point).await?;
                self.finish_drag()
            }
            (true, Some(point)) => {
                self.move_pointer(point).await?;
                self.finish_drag()
            }
            (true, None) => self.finish_drag(),
        }
    }

    fn begin_drag(&mut self) -> DeskPilotResult<ActionOutcome> {
        let origin = self.pointer.last_position.ok_or_else(|| {
            DeskPilotError::NoPointerPosition("drag start needs a prior move".into())
        })?;
        // Recorded before pressing so a failed press is still released.
        self.pointer.drag_origin = Some(origin);
        self.input.button(MouseButton::Left, ButtonAction::Press)?;
        Ok(ActionOutcome::DragStarted { origin })
    }

    fn finish_drag(&mut self) -> DeskPilotResult<ActionOutcome> {
        let origin = self.pointer.drag_origin.ok_or_else(|| {
            DeskPilotError::ActionExecution("no drag in progress".into())
        })?;
        let destination = self.pointer.last_position.ok_or_else(|| {
            DeskPilotError::NoPointerPosition("drag end needs a pointer position".into())
        })?;
        self.input.button(MouseButton::Left, ButtonAction::Release)?;
        self.pointer.drag_origin = None;
        Ok(ActionOutcome::DragFinished {
            origin,
            destination,
        })
    }

    fn release_drag(&mut self) {
        if !self.pointer.is_dragging() {
            return;
        }
        if let Err(e) = self.input.button(MouseButton::Left, ButtonAction::Release) {
            tracing::error!(error = %e, "forced pointer-up after drag failure also failed");
        }
        self.pointer.drag_origin = None;
    }

    async fn wait(&self, seconds: f64) -> DeskPilotResult<ActionOutcome> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(DeskPilotError::ActionExecution(format!(
                "wait duration must be a non-negative number of seconds, got {seconds}"
            )));
        }
        let capped = seconds.min(self.options.max_wait.as_secs_f64());
        let duration = Duration::try_from_secs_f64(capped)
            .map_err(|e| DeskPilotError::ActionExecution(format!("wait of {seconds}s: {e}")))?;
        if capped < seconds {
            tracing::warn!(requested = seconds, capped, "wait capped");
        }
        let interrupted = interruptible_sleep(duration, &self.stop).await;
        Ok(ActionOutcome::Waited {
            seconds: duration.as_secs_f64(),
            interrupted,
        })
    }
}
