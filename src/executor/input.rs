//! OS input injection: pointer, buttons, keys, text and scroll.
use std::sync::Mutex;

use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::coordinator::{NativePoint, ScreenSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Press,
    Release,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedKey {
    Enter,
    Tab,
    Space,
    Backspace,
    Delete,
    Escape,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Shift,
    Control,
    Alt,
    Meta,
    CapsLock,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    Named(NamedKey),
    Char(char),
}

/// One key or a shortcut such as `ctrl+shift+t`: every key but the last is held
/// while the last one is tapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChord {
    pub keys: Vec<KeyCode>,
}

impl KeyChord {
    pub fn parse(spec: &str) -> DeskPilotResult<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(DeskPilotError::ActionExecution("empty key name".into()));
        }
        // A lone "+" is the plus key, not a separator.
        if spec == "+" {
            return Ok(Self {
                keys: vec![KeyCode::Char('+')],
            });
        }
        let keys = spec
            .split('+')
            .map(parse_key)
            .collect::<DeskPilotResult<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub fn from_names(names: &[String]) -> DeskPilotResult<Self> {
        if names.is_empty() {
            return Err(DeskPilotError::Config("key chord needs at least one key".into()));
        }
        let keys = names
            .iter()
            .map(|n| parse_key(n))
            .collect::<DeskPilotResult<Vec<_>>>()?;
        Ok(Self { keys })
    }
}

fn parse_key(name: &str) -> DeskPilotResult<KeyCode> {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(KeyCode::Char(c.to_ascii_lowercase()));
    }

    let normalized: String = trimmed
        .chars()
        .filter(|c| *c != '_' && *c != '-' && *c != ' ')
        .collect::<String>()
        .to_lowercase();

    let named = match normalized.as_str() {
        "enter" | "return" | "kpenter" => NamedKey::Enter,
        "tab" => NamedKey::Tab,
        "space" => NamedKey::Space,
        "backspace" | "back" => NamedKey::Backspace,
        "delete" | "del" => NamedKey::Delete,
        "escape" | "esc" => NamedKey::Escape,
        "home" => NamedKey::Home,
        "end" => NamedKey::End,
        "pageup" | "pgup" | "prior" => NamedKey::PageUp,
        "pagedown" | "pgdn" | "next" => NamedKey::PageDown,
        "up" | "uparrow" => NamedKey::Up,
        "down" | "downarrow" => NamedKey::Down,
        "left" | "leftarrow" => NamedKey::Left,
        "right" | "rightarrow" => NamedKey::Right,
        "shift" => NamedKey::Shift,
        "ctrl" | "control" => NamedKey::Control,
        "alt" | "option" => NamedKey::Alt,
        "super" | "meta" | "cmd" | "command" | "win" | "windows" => NamedKey::Meta,
        "capslock" => NamedKey::CapsLock,
        other => match other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            Some(n) if (1..=12).contains(&n) => NamedKey::F(n),
            _ => {
                return Err(DeskPilotError::ActionExecution(format!(
                    "unknown key name: {name}"
                )))
            }
        },
    };
    Ok(KeyCode::Named(named))
}

/// Primitive OS automation capabilities the executor needs.
pub trait InputDriver: Send + Sync {
    fn pointer_position(&self) -> DeskPilotResult<NativePoint>;
    fn display_size(&self) -> DeskPilotResult<ScreenSize>;
    fn move_pointer(&self, to: NativePoint) -> DeskPilotResult<()>;
    fn button(&self, button: MouseButton, action: ButtonAction) -> DeskPilotResult<()>;
    fn key_chord(&self, chord: &KeyChord) -> DeskPilotResult<()>;
    fn text(&self, text: &str) -> DeskPilotResult<()>;
    /// Positive amounts scroll up, negative down.
    fn scroll(&self, amount: i32) -> DeskPilotResult<()>;
}

pub struct EnigoDriver {
    enigo: Mutex<Enigo>,
}

impl EnigoDriver {
    pub fn new() -> DeskPilotResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| DeskPilotError::ActionExecution(format!("input backend unavailable: {e}")))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    fn with_enigo<T>(
        &self,
        f: impl FnOnce(&mut Enigo) -> Result<T, enigo::InputError>,
    ) -> DeskPilotResult<T> {
        let mut enigo = self.enigo.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut enigo).map_err(|e| DeskPilotError::ActionExecution(e.to_string()))
    }

    fn to_enigo_key(key: KeyCode) -> Key {
        match key {
            KeyCode::Char(c) => Key::Unicode(c),
            KeyCode::Named(named) => match named {
                NamedKey::Enter => Key::Return,
                NamedKey::Tab => Key::Tab,
                NamedKey::Space => Key::Space,
                NamedKey::Backspace => Key::Backspace,
                NamedKey::Delete => Key::Delete,
                NamedKey::Escape => Key::Escape,
                NamedKey::Home => Key::Home,
                NamedKey::End => Key::End,
                NamedKey::PageUp => Key::PageUp,
                NamedKey::PageDown => Key::PageDown,
                NamedKey::Up => Key::UpArrow,
                NamedKey::Down => Key::DownArrow,
                NamedKey::Left => Key::LeftArrow,
                NamedKey::Right => Key::RightArrow,
                NamedKey::Shift => Key::Shift,
                NamedKey::Control => Key::Control,
                NamedKey::Alt => Key::Alt,
                NamedKey::Meta => Key::Meta,
                NamedKey::CapsLock => Key::CapsLock,
                NamedKey::F(n) => match n {
                    1 => Key::F1,
                    2 => Key::F2,
                    3 => Key::F3,
                    4 => Key::F4,
                    5 => Key::F5,
                    6 => Key::F6,
                    7 => Key::F7,
                    8 => Key::F8,
                    9 => Key::F9,
                    10 => Key::F10,
                    11 => Key::F11,
                    _ => Key::F12,
                },
            },
        }
    }
}

impl InputDriver for EnigoDriver {
    fn pointer_position(&self) -> DeskPilotResult<NativePoint> {
        self.with_enigo(|e| e.location())
            .map(|(x, y)| NativePoint::new(x, y))
    }

    fn display_size(&self) -> DeskPilotResult<ScreenSize> {
        let (w, h) = self.with_enigo(|e| e.main_display())?;
        Ok(ScreenSize::new(w.max(0) as u32, h.max(0) as u32))
    }

    fn move_pointer(&self, to: NativePoint) -> DeskPilotResult<()> {
        self.with_enigo(|e| e.move_mouse(to.x, to.y, Coordinate::Abs))
    }

    fn button(&self, button: MouseButton, action: ButtonAction) -> DeskPilotResult<()> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        let direction = match action {
            ButtonAction::Press => Direction::Press,
            ButtonAction::Release => Direction::Release,
            ButtonAction::Click => Direction::Click,
        };
        self.with_enigo(|e| e.button(button, direction))
    }

    fn key_chord(&self, chord: &KeyChord) -> DeskPilotResult<()> {
        self.with_enigo(|e| {
            send_chord(&chord.keys, |key, direction| {
                e.key(Self::to_enigo_key(key), direction)
            })
        })
    }

    fn text(&self, text: &str) -> DeskPilotResult<()> {
        self.with_enigo(|e| e.text(text))
    }

    fn scroll(&self, amount: i32) -> DeskPilotResult<()> {
        // enigo treats positive lengths as "down".
        self.with_enigo(|e| e.scroll(-amount, Axis::Vertical))
    }
}

/// Presses the held keys, taps the last one, then releases every key that went down in
/// reverse order. The first error is returned only after those releases.
fn send_chord<E>(
    keys: &[KeyCode],
    mut send: impl FnMut(KeyCode, Direction) -> Result<(), E>,
) -> Result<(), E> {
    let Some((last, held)) = keys.split_last() else {
        return Ok(());
    };
    let mut result = Ok(());
    let mut pressed = 0;
    for key in held {
        if let Err(e) = send(*key, Direction::Press) {
            result = Err(e);
            break;
        }
        pressed += 1;
    }
    if result.is_ok() {
        result = send(*last, Direction::Click);
    }
    for key in held[..pressed].iter().rev() {
        let released = send(*key, Direction::Release);
        if result.is_ok() {
            result = released;
        }
    }
    result
}
