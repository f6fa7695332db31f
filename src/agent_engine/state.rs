use serde::{Deserialize, Serialize};

use crate::executor::coordinator::{ModelPoint, NativePoint};
use crate::executor::input::MouseButton;

/// Lifecycle states of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Running { iteration: u32 },
    Completed { reason: CompletionReason },
    Stopped,
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The model signalled that the task is done.
    TaskDone,
    /// The iteration budget ran out.
    IterationBudget,
}

/// Bookkeeping the controller keeps for the active run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub iteration_count: u32,
    pub is_running: bool,
    pub stop_requested: bool,
    pub is_complete: bool,
}

/// Canonical action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Screenshot,
    Move,
    Click,
    DoubleClick,
    RightClick,
    Drag,
    TypeText,
    KeyPress,
    Scroll,
    Wait,
}

impl ActionKind {
    /// Maps an action name as it appears on the wire (the canonical names, and the
    /// vocabulary of the declared computer tool) to the canonical kind.
    pub fn from_wire(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "screenshot" => ActionKind::Screenshot,
            "move" | "mouse_move" => ActionKind::Move,
            "click" | "left_click" => ActionKind::Click,
            "double_click" => ActionKind::DoubleClick,
            "right_click" => ActionKind::RightClick,
            "drag" | "left_click_drag" => ActionKind::Drag,
            "type_text" | "type" => ActionKind::TypeText,
            "key_press" | "key" => ActionKind::KeyPress,
            "scroll" => ActionKind::Scroll,
            "wait" => ActionKind::Wait,
            _ => return None,
        };
        Some(kind)
    }
}

/// One decoded instruction for the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDirective {
    Screenshot,
    Move { coordinate: ModelPoint },
    Click,
    DoubleClick,
    RightClick,
    /// Starts a drag when none is held, finishes it otherwise. With a coordinate the
    /// pointer first travels there.
    Drag {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coordinate: Option<ModelPoint>,
    },
    TypeText { text: String },
    KeyPress { key: String },
    Scroll { amount: i32 },
    Wait { seconds: f64 },
}

impl ActionDirective {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionDirective::Screenshot => ActionKind::Screenshot,
            ActionDirective::Move { .. } => ActionKind::Move,
            ActionDirective::Click => ActionKind::Click,
            ActionDirective::DoubleClick => ActionKind::DoubleClick,
            ActionDirective::RightClick => ActionKind::RightClick,
            ActionDirective::Drag { .. } => ActionKind::Drag,
            ActionDirective::TypeText { .. } => ActionKind::TypeText,
            ActionDirective::KeyPress { .. } => ActionKind::KeyPress,
            ActionDirective::Scroll { .. } => ActionKind::Scroll,
            ActionDirective::Wait { .. } => ActionKind::Wait,
        }
    }
}

/// What happened when a directive ran; reported back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionOutcome {
    ScreenshotTaken {
        resolution: String,
        byte_size: usize,
        scale_factor: f64,
    },
    PointerMoved {
        from: NativePoint,
        to: NativePoint,
        model: ModelPoint,
        clamped: bool,
    },
    Clicked {
        button: MouseButton,
        clicks: u8,
        position: NativePoint,
    },
    DragStarted {
        origin: NativePoint,
    },
    DragFinished {
        origin: NativePoint,
        destination: NativePoint,
    },
    Typed {
        text: String,
    },
    KeyPressed {
        key: String,
    },
    Scrolled {
        amount: i32,
    },
    Waited {
        seconds: f64,
        interrupted: bool,
    },
    Error {
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// `None` when the directive could not be decoded at all.
    pub directive: Option<ActionDirective>,
    pub outcome: ActionOutcome,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ActionResult {
    pub fn new(directive: Option<ActionDirective>, outcome: ActionOutcome) -> Self {
        Self {
            directive,
            outcome,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Error { .. })
    }
}

/// Commands delivered to the engine task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    StartTask(String),
    Shutdown,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: AgentState,
    pub iterations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_map_to_canonical_kinds() {
        assert_eq!(ActionKind::from_wire("mouse_move"), Some(ActionKind::Move));
        assert_eq!(ActionKind::from_wire("left_click"), Some(ActionKind::Click));
        assert_eq!(ActionKind::from_wire("key"), Some(ActionKind::KeyPress));
        assert_eq!(ActionKind::from_wire("TYPE"), Some(ActionKind::TypeText));
        assert_eq!(ActionKind::from_wire("mouse_scroll"), None);
        assert_eq!(ActionKind::from_wire("teleport"), None);
    }

    #[test]
    fn outcomes_serialize_with_type_tag() {
        let err = ActionOutcome::Error {
            detail: "boom".into(),
        };
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v, serde_json::json!({"type": "error", "detail": "boom"}));

        let drag = ActionDirective::Drag { coordinate: None };
        assert_eq!(
            serde_json::to_value(&drag).unwrap(),
            serde_json::json!({"action": "drag"})
        );
    }
}
