use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent_engine::state::{ActionResult, AgentState, RunReport};
use crate::errors::ModelErrorKind;

/// Read-only live feed of loop events for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    RunStarted {
        run_id: String,
        task: String,
    },
    StateChanged {
        state: AgentState,
    },
    Iteration {
        iteration: u32,
        max_iterations: u32,
    },
    ActionExecuted {
        iteration: u32,
        result: ActionResult,
    },
    ModelRetry {
        kind: ModelErrorKind,
        attempt: u32,
        detail: String,
    },
    Error {
        message: String,
    },
    RunFinished {
        report: RunReport,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    /// Publishing with nobody listening is fine; the event is just dropped.
    pub fn publish(&self, event: FeedEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("feed event published with no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
