use crate::llm::types::{ContentBlock, Turn};

pub const IMAGE_PLACEHOLDER: &str = "[earlier screenshot omitted]";

/// Turns exchanged with the model during one run. Append-only until cleared at task start.
#[derive(Debug, Clone)]
pub struct Conversation {
    session_id: String,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            turns: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drops every turn and starts a new session id.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.session_id = uuid::Uuid::new_v4().to_string();
    }

    /// The turns to send: only the newest `image_limit` screenshots are kept, older ones become
    /// a text placeholder. A limit of 0 keeps every image.
    pub fn request_view(&self, image_limit: usize) -> Vec<Turn> {
        if image_limit == 0 {
            return self.turns.clone();
        }
        let mut remaining = image_limit;
        let mut view: Vec<Turn> = self
            .turns
            .iter()
            .rev()
            .map(|turn| {
                let mut turn = turn.clone();
                for block in turn.content.iter_mut().rev() {
                    if block.is_image() {
                        if remaining > 0 {
                            remaining -= 1;
                        } else {
                            *block = ContentBlock::text(IMAGE_PLACEHOLDER);
                        }
                    }
                }
                turn
            })
            .collect();
        view.reverse();
        view
    }

    /// Text-only copy of the whole conversation.
    pub fn without_images(&self) -> Vec<Turn> {
        self.turns
            .iter()
            .map(|turn| Turn {
                role: turn.role,
                content: turn
                    .content
                    .iter()
                    .map(|block| {
                        if block.is_image() {
                            ContentBlock::text(IMAGE_PLACEHOLDER)
                        } else {
                            block.clone()
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ImageSource;

    fn image(tag: &str) -> ContentBlock {
        ContentBlock::Image {
            source: ImageSource {
                encoding: "base64".into(),
                media_type: "image/jpeg".into(),
                data: tag.into(),
            },
        }
    }

    fn conversation_with_images(n: usize) -> Conversation {
        let mut conv = Conversation::new();
        for i in 0..n {
            conv.push(Turn::user(vec![
                ContentBlock::text(format!("turn {i}")),
                image(&i.to_string()),
            ]));
            conv.push(Turn::assistant("ok"));
        }
        conv
    }

    #[test]
    fn request_view_keeps_newest_images_only() {
        let conv = conversation_with_images(5);
        let view = conv.request_view(2);
        let kept: Vec<_> = view
            .iter()
            .flat_map(|t| t.content.iter())
            .filter_map(|b| match b {
                ContentBlock::Image { source } => Some(source.data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(kept, vec!["3".to_string(), "4".to_string()]);
        assert_eq!(view.len(), conv.len());
        // Stored history is untouched.
        assert_eq!(conv.turns().iter().map(Turn::image_count).sum::<usize>(), 5);
    }

    #[test]
    fn zero_limit_keeps_everything() {
        let conv = conversation_with_images(4);
        assert_eq!(conv.request_view(0), conv.turns().to_vec());
    }

    #[test]
    fn stripped_view_has_no_images_but_same_shape() {
        let conv = conversation_with_images(3);
        let stripped = conv.without_images();
        assert_eq!(stripped.iter().map(Turn::image_count).sum::<usize>(), 0);
        assert_eq!(stripped.len(), conv.len());
        assert_eq!(
            stripped[0].content[1],
            ContentBlock::text(IMAGE_PLACEHOLDER)
        );
    }

    #[test]
    fn clear_starts_a_new_session() {
        let mut conv = conversation_with_images(1);
        let before = conv.session_id().to_string();
        conv.clear();
        assert!(conv.is_empty());
        assert_ne!(conv.session_id(), before);
    }
}
