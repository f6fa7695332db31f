//! Turns model responses into ordered action directives.
//!
//! Two encodings are accepted: structured action blocks, and numbered text lines of the form
//! `1. [tag] args`. Completion is detected separately for each encoding, see
//! [`detect_completion`].
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::agent_engine::state::{ActionDirective, ActionKind};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::ModelPoint;
use crate::llm::types::{ModelResponse, ResponseBlock};

const DONE: &str = "done";

fn line_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+\.\s*\[(\w+)\]\s*(.*?)\s*$").ok())
        .as_ref()
}

fn point_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*>$").ok())
        .as_ref()
}

fn done_tag_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[\s*done\s*\]").ok())
        .as_ref()
}

/// Whether the response ends the run.
///
/// Structured responses complete on a `done` action or on a completion phrase in any text
/// block. Textual responses complete only on the `[done]` tag.
pub fn detect_completion(response: &ModelResponse, phrases: &[String]) -> bool {
    if response.is_structured() {
        let done_action = response.blocks.iter().any(|b| {
            matches!(b, ResponseBlock::Action { name, .. } if name.eq_ignore_ascii_case(DONE))
        });
        if done_action {
            return true;
        }
        let text = response.text().to_lowercase();
        phrases
            .iter()
            .any(|p| !p.is_empty() && text.contains(&p.to_lowercase()))
    } else {
        done_tag_pattern().is_some_and(|re| re.is_match(&response.text()))
    }
}

/// Decodes every directive of `response` in order. Entries that could not be decoded are
/// kept as errors so they can be reported back to the model.
pub fn decode_response(response: &ModelResponse) -> Vec<DeskPilotResult<ActionDirective>> {
    if response.is_structured() {
        response
            .blocks
            .iter()
            .filter_map(|b| match b {
                ResponseBlock::Action { name, params } if !name.eq_ignore_ascii_case(DONE) => {
                    Some(decode_action(name, params))
                }
                _ => None,
            })
            .collect()
    } else {
        decode_text(&response.text())
    }
}

pub fn decode_action(name: &str, params: &Value) -> DeskPilotResult<ActionDirective> {
    let kind = ActionKind::from_wire(name)
        .ok_or_else(|| DeskPilotError::Decode(format!("unknown action '{name}'")))?;

    let directive = match kind {
        ActionKind::Screenshot => ActionDirective::Screenshot,
        ActionKind::Move => ActionDirective::Move {
            coordinate: coordinate_param(params)?.ok_or_else(|| missing(name, "coordinate"))?,
        },
        ActionKind::Click => ActionDirective::Click,
        ActionKind::DoubleClick => ActionDirective::DoubleClick,
        ActionKind::RightClick => ActionDirective::RightClick,
        ActionKind::Drag => ActionDirective::Drag {
            coordinate: coordinate_param(params)?,
        },
        ActionKind::TypeText => ActionDirective::TypeText {
            text: str_param(params, &["text"]).ok_or_else(|| missing(name, "text"))?,
        },
        ActionKind::KeyPress => ActionDirective::KeyPress {
            key: str_param(params, &["key", "text"])
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| missing(name, "key"))?,
        },
        ActionKind::Scroll => ActionDirective::Scroll {
            amount: scroll_param(params).ok_or_else(|| missing(name, "amount"))?,
        },
        ActionKind::Wait => ActionDirective::Wait {
            seconds: ["duration", "seconds"]
                .iter()
                .find_map(|k| params.get(*k).and_then(Value::as_f64))
                .ok_or_else(|| missing(name, "duration"))?,
        },
    };
    Ok(directive)
}

fn missing(action: &str, param: &str) -> DeskPilotError {
    DeskPilotError::Decode(format!("action '{action}' is missing '{param}'"))
}

fn coordinate_param(params: &Value) -> DeskPilotResult<Option<ModelPoint>> {
    let Some(raw) = params.get("coordinate") else {
        return Ok(None);
    };
    match raw.as_array().map(Vec::as_slice) {
        Some([x, y]) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => Ok(Some(ModelPoint::new(x, y))),
            _ => Err(DeskPilotError::Decode(format!("non-numeric coordinate {raw}"))),
        },
        _ => Err(DeskPilotError::Decode(format!(
            "coordinate must be an [x, y] pair, got {raw}"
        ))),
    }
}

fn str_param(params: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| params.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn scroll_param(params: &Value) -> Option<i32> {
    if let Some(amount) = params.get("amount").and_then(Value::as_i64) {
        return i32::try_from(amount).ok();
    }
    // The newer tool shape: unsigned amount plus a direction.
    let amount = params.get("scroll_amount").and_then(Value::as_i64)?;
    let amount = i32::try_from(amount).ok()?;
    match params.get("scroll_direction").and_then(Value::as_str) {
        Some("down") => Some(-amount),
        Some("up") | None => Some(amount),
        Some(_) => None,
    }
}

/// Decodes numbered `[tag]` lines. Lines not in that form are ignored.
pub fn decode_text(text: &str) -> Vec<DeskPilotResult<ActionDirective>> {
    text.lines()
        .filter_map(|line| {
            let caps = line_pattern()?.captures(line)?;
            let tag = caps.get(1)?.as_str().to_ascii_lowercase();
            if tag == DONE {
                return None;
            }
            let args = caps.get(2).map_or("", |m| m.as_str());
            Some(decode_tagged_line(&tag, args))
        })
        .collect()
}

fn decode_tagged_line(tag: &str, args: &str) -> DeskPilotResult<ActionDirective> {
    let kind = ActionKind::from_wire(tag)
        .ok_or_else(|| DeskPilotError::Decode(format!("unknown action tag [{tag}]")))?;
    let bad = |what: &str| DeskPilotError::Decode(format!("[{tag}] expects {what}, got '{args}'"));

    let directive = match kind {
        ActionKind::Screenshot => ActionDirective::Screenshot,
        ActionKind::Move => ActionDirective::Move {
            coordinate: parse_point(args).ok_or_else(|| bad("<x,y>"))?,
        },
        ActionKind::Click => ActionDirective::Click,
        ActionKind::DoubleClick => ActionDirective::DoubleClick,
        ActionKind::RightClick => ActionDirective::RightClick,
        ActionKind::Drag => ActionDirective::Drag {
            coordinate: if args.is_empty() {
                None
            } else {
                Some(parse_point(args).ok_or_else(|| bad("an optional <x,y>"))?)
            },
        },
        ActionKind::TypeText => {
            let text = unquote(args);
            if text.is_empty() {
                return Err(bad("quoted text"));
            }
            ActionDirective::TypeText {
                text: text.to_string(),
            }
        }
        ActionKind::KeyPress => {
            let key = unquote(args).trim();
            if key.is_empty() {
                return Err(bad("a key name"));
            }
            ActionDirective::KeyPress {
                key: key.to_string(),
            }
        }
        ActionKind::Scroll => ActionDirective::Scroll {
            amount: args.parse().map_err(|_| bad("a signed integer"))?,
        },
        ActionKind::Wait => ActionDirective::Wait {
            seconds: args
                .trim_end_matches('s')
                .parse()
                .map_err(|_| bad("a duration in seconds"))?,
        },
    };
    Ok(directive)
}

fn parse_point(args: &str) -> Option<ModelPoint> {
    let caps = point_pattern()?.captures(args)?;
    let x = caps.get(1)?.as_str().parse().ok()?;
    let y = caps.get(2)?.as_str().parse().ok()?;
    Some(ModelPoint::new(x, y))
}

fn unquote(args: &str) -> &str {
    args.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::executor::coordinator::{model_to_native, NativePoint, ScreenSize};
    use serde_json::json;

    fn phrases() -> Vec<String> {
        AgentConfig::default().completion_phrases
    }

    fn action(name: &str, params: Value) -> ResponseBlock {
        ResponseBlock::Action {
            name: name.into(),
            params,
        }
    }

    #[test]
    fn textual_move_line_maps_to_native_target() {
        let decoded = decode_text("1. [move]<100,200>");
        assert_eq!(decoded.len(), 1);
        let directive = decoded.into_iter().next().unwrap().unwrap();
        let ActionDirective::Move { coordinate } = directive else {
            panic!("expected a move, got {directive:?}");
        };
        let target = model_to_native(0.5, coordinate, ScreenSize::new(2000, 1000)).unwrap();
        assert_eq!(target.native, NativePoint::new(200, 400));
        assert!(!target.clamped);
    }

    #[test]
    fn textual_lines_decode_in_order_and_ignore_noise() {
        let text = "Sure, here is the plan:\n\
                    1. [move] <10, 20>\n\
                    2. [click]\n\
                    just chatting\n\
                    3. [type]\"hello world\"\n\
                    4. [key] ctrl+s\n\
                    5. [scroll]-3\n\
                    6. [wait]1.5\n\
                    7. [drag]\n\
                    8. [screenshot]";
        let decoded: Vec<_> = decode_text(text).into_iter().map(|d| d.unwrap()).collect();
        assert_eq!(
            decoded,
            vec![
                ActionDirective::Move {
                    coordinate: ModelPoint::new(10.0, 20.0)
                },
                ActionDirective::Click,
                ActionDirective::TypeText {
                    text: "hello world".into()
                },
                ActionDirective::KeyPress {
                    key: "ctrl+s".into()
                },
                ActionDirective::Scroll { amount: -3 },
                ActionDirective::Wait { seconds: 1.5 },
                ActionDirective::Drag { coordinate: None },
                ActionDirective::Screenshot,
            ]
        );
    }

    #[test]
    fn bad_arguments_are_decode_errors_not_dropped() {
        let decoded = decode_text("1. [move]<oops>\n2. [teleport]<1,2>\n3. [scroll]up");
        assert_eq!(decoded.len(), 3);
        assert!(decoded
            .iter()
            .all(|d| matches!(d, Err(DeskPilotError::Decode(_)))));
    }

    #[test]
    fn done_tag_anywhere_completes_textual_response() {
        let resp = ModelResponse::from_text("1. [move]<1,1>\n2. [click]\n3. [done]\n4. [click]");
        assert!(detect_completion(&resp, &phrases()));
        let resp = ModelResponse::from_text("All set [DONE] thanks");
        assert!(detect_completion(&resp, &phrases()));
    }

    #[test]
    fn phrases_do_not_complete_textual_responses() {
        let resp = ModelResponse::from_text("Task completed.\n1. [click]");
        assert!(!detect_completion(&resp, &phrases()));
    }

    #[test]
    fn structured_completion_by_action_or_phrase() {
        let by_action = ModelResponse {
            blocks: vec![action("done", json!({}))],
            stop_reason: None,
        };
        assert!(detect_completion(&by_action, &phrases()));

        let by_phrase = ModelResponse {
            blocks: vec![
                ResponseBlock::Text {
                    text: "I have COMPLETED the request.".into(),
                },
                action("screenshot", json!({})),
            ],
            stop_reason: None,
        };
        assert!(detect_completion(&by_phrase, &phrases()));

        let working = ModelResponse {
            blocks: vec![
                ResponseBlock::Text {
                    text: "Opening the menu".into(),
                },
                action("left_click", json!({})),
            ],
            stop_reason: None,
        };
        assert!(!detect_completion(&working, &phrases()));
    }

    #[test]
    fn structured_actions_decode_with_wire_names() {
        let resp = ModelResponse {
            blocks: vec![
                ResponseBlock::Text {
                    text: "moving".into(),
                },
                action("mouse_move", json!({"action": "mouse_move", "coordinate": [12, 34]})),
                action("left_click", json!({})),
                action("type", json!({"text": "abc"})),
                action("key", json!({"text": "Return"})),
                action("scroll", json!({"scroll_amount": 2, "scroll_direction": "down"})),
                action("wait", json!({"duration": 0.5})),
                action("left_click_drag", json!({"coordinate": [5.5, 6]})),
            ],
            stop_reason: None,
        };
        let decoded: Vec<_> = decode_response(&resp)
            .into_iter()
            .map(|d| d.unwrap())
            .collect();
        assert_eq!(
            decoded,
            vec![
                ActionDirective::Move {
                    coordinate: ModelPoint::new(12.0, 34.0)
                },
                ActionDirective::Click,
                ActionDirective::TypeText { text: "abc".into() },
                ActionDirective::KeyPress {
                    key: "Return".into()
                },
                ActionDirective::Scroll { amount: -2 },
                ActionDirective::Wait { seconds: 0.5 },
                ActionDirective::Drag {
                    coordinate: Some(ModelPoint::new(5.5, 6.0))
                },
            ]
        );
    }

    #[test]
    fn structured_errors_for_missing_or_malformed_params() {
        assert!(decode_action("mouse_move", &json!({})).is_err());
        assert!(decode_action("mouse_move", &json!({"coordinate": [1]})).is_err());
        assert!(decode_action("mouse_move", &json!({"coordinate": ["a", 2]})).is_err());
        assert!(decode_action("key", &json!({"text": "  "})).is_err());
        assert!(decode_action("mouse_scroll", &json!({"amount": 1})).is_err());
        assert_eq!(
            decode_action("drag", &json!({})).unwrap(),
            ActionDirective::Drag { coordinate: None }
        );
    }
}
