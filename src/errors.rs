use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification attached to every failed model call by the model client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    /// The provider declined the request on content-safety grounds.
    SafetyRejection,
    /// Rate limited or temporarily overloaded.
    RateLimited,
    Other,
}

/// What the agent loop does after a model call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry once with every image removed from the conversation.
    StripImagesOnce,
    /// Wait the configured back-off and retry the same request.
    BackOff,
    Fatal,
}

impl ModelErrorKind {
    pub fn retry_policy(self) -> RetryPolicy {
        match self {
            ModelErrorKind::SafetyRejection => RetryPolicy::StripImagesOnce,
            ModelErrorKind::RateLimited => RetryPolicy::BackOff,
            ModelErrorKind::Other => RetryPolicy::Fatal,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("No pointer position: {0}")]
    NoPointerPosition(String),

    #[error("Action execution error: {0}")]
    ActionExecution(String),

    #[error("Model call error ({kind:?}): {message}")]
    ModelCall { kind: ModelErrorKind, message: String },

    #[error("Directive decode error: {0}")]
    Decode(String),

    #[error("A task is already running")]
    AgentBusy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl DeskPilotError {
    pub fn model(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        DeskPilotError::ModelCall {
            kind,
            message: message.into(),
        }
    }

    /// The model-call classification, if this is a model-call failure.
    pub fn model_kind(&self) -> Option<ModelErrorKind> {
        match self {
            DeskPilotError::ModelCall { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl serde::Serialize for DeskPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_is_a_table_lookup() {
        assert_eq!(
            ModelErrorKind::SafetyRejection.retry_policy(),
            RetryPolicy::StripImagesOnce
        );
        assert_eq!(ModelErrorKind::RateLimited.retry_policy(), RetryPolicy::BackOff);
        assert_eq!(ModelErrorKind::Other.retry_policy(), RetryPolicy::Fatal);
    }

    #[test]
    fn errors_serialize_as_display_text() {
        let err = DeskPilotError::NoPointerPosition("click needs a prior move".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"No pointer position: click needs a prior move\"");
        assert_eq!(
            DeskPilotError::model(ModelErrorKind::RateLimited, "slow down").model_kind(),
            Some(ModelErrorKind::RateLimited)
        );
    }
}
