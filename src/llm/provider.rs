use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::llm::types::{ModelRequest, ModelResponse};

/// Boundary to a remote multimodal model.
///
/// Failed calls must come back as `DeskPilotError::ModelCall` carrying a
/// [`ModelErrorKind`](crate::errors::ModelErrorKind), so the loop can pick its retry policy
/// without looking at error text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier matching the provider's key in config.toml.
    fn name(&self) -> &str;

    async fn send(&self, request: &ModelRequest) -> DeskPilotResult<ModelResponse>;
}
