use serde::{Deserialize, Serialize};

use crate::perception::types::ScreenshotArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Always `base64`.
    #[serde(rename = "type")]
    pub encoding: String,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn jpeg(shot: &ScreenshotArtifact) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                encoding: "base64".to_string(),
                media_type: "image/jpeg".to_string(),
                data: shot.to_base64(),
            },
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::Image { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn image_count(&self) -> usize {
        self.content.iter().filter(|b| b.is_image()).count()
    }
}

/// The virtual display declared to the model. Sizes are model-space pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayDescriptor {
    pub width: u32,
    pub height: u32,
    pub display_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub turns: Vec<Turn>,
    pub display: DisplayDescriptor,
}

impl ModelRequest {
    pub fn image_count(&self) -> usize {
        self.turns.iter().map(Turn::image_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text {
        text: String,
    },
    /// One named action of the declared computer tool plus its parameter map.
    Action {
        name: String,
        params: serde_json::Value,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub blocks: Vec<ResponseBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl ModelResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![ResponseBlock::Text { text: text.into() }],
            stop_reason: None,
        }
    }

    /// Structured when at least one block is an action call.
    pub fn is_structured(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ResponseBlock::Action { .. }))
    }

    /// All text blocks joined by newlines.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Action { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_blocks_use_the_wire_shape() {
        let block = ContentBlock::Image {
            source: ImageSource {
                encoding: "base64".into(),
                media_type: "image/jpeg".into(),
                data: "AAAA".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            serde_json::json!({
                "type": "image",
                "source": {"type": "base64", "media_type": "image/jpeg", "data": "AAAA"}
            })
        );
        let turn = Turn::assistant("ok");
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            serde_json::json!({"role": "assistant", "content": [{"type": "text", "text": "ok"}]})
        );
    }

    #[test]
    fn response_text_skips_actions() {
        let resp = ModelResponse {
            blocks: vec![
                ResponseBlock::Text { text: "a".into() },
                ResponseBlock::Action {
                    name: "left_click".into(),
                    params: serde_json::json!({}),
                },
                ResponseBlock::Text { text: "b".into() },
            ],
            stop_reason: None,
        };
        assert!(resp.is_structured());
        assert_eq!(resp.text(), "a\nb");
        assert!(!ModelResponse::from_text("1. [click]").is_structured());
    }
}
