//! Fakes shared by the unit tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{DeskPilotError, DeskPilotResult, ModelErrorKind};
use crate::executor::coordinator::{NativePoint, ScreenSize};
use crate::executor::input::{ButtonAction, InputDriver, KeyChord, MouseButton};
use crate::llm::provider::ModelClient;
use crate::llm::types::{ModelRequest, ModelResponse};
use crate::perception::traits::ScreenSource;

/// A display of one flat colour that counts how often it was captured.
pub struct SolidScreen {
    width: u32,
    height: u32,
    captures: AtomicUsize,
}

impl SolidScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            captures: AtomicUsize::new(0),
        }
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl ScreenSource for SolidScreen {
    fn capture_native(&self) -> DeskPilotResult<image::RgbaImage> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(image::RgbaImage::from_pixel(
            self.width,
            self.height,
            image::Rgba([40, 90, 160, 255]),
        ))
    }
}

pub struct FailingScreen;

impl ScreenSource for FailingScreen {
    fn capture_native(&self) -> DeskPilotResult<image::RgbaImage> {
        Err(DeskPilotError::Capture("no display available".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCall {
    Move(NativePoint),
    Button(MouseButton, ButtonAction),
    Chord(KeyChord),
    Text(String),
    Scroll(i32),
}

#[derive(Default)]
struct Recorded {
    position: NativePoint,
    calls: Vec<InputCall>,
    fail_text: bool,
    fail_release_once: bool,
}

/// Input driver that records every call instead of touching the OS.
pub struct RecordingInput {
    size: ScreenSize,
    inner: Mutex<Recorded>,
}

impl RecordingInput {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: ScreenSize::new(width, height),
            inner: Mutex::new(Recorded {
                position: NativePoint::new(width as i32 / 2, height as i32 / 2),
                ..Default::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<InputCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn fail_text(&self, fail: bool) {
        self.inner.lock().unwrap().fail_text = fail;
    }

    /// The next button release is recorded and then fails.
    pub fn fail_release_once(&self) {
        self.inner.lock().unwrap().fail_release_once = true;
    }

    fn record(&self, call: InputCall) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

impl InputDriver for RecordingInput {
    fn pointer_position(&self) -> DeskPilotResult<NativePoint> {
        Ok(self.inner.lock().unwrap().position)
    }

    fn display_size(&self) -> DeskPilotResult<ScreenSize> {
        Ok(self.size)
    }

    fn move_pointer(&self, to: NativePoint) -> DeskPilotResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.position = to;
        inner.calls.push(InputCall::Move(to));
        Ok(())
    }

    fn button(&self, button: MouseButton, action: ButtonAction) -> DeskPilotResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(InputCall::Button(button, action));
        if action == ButtonAction::Release && inner.fail_release_once {
            inner.fail_release_once = false;
            return Err(DeskPilotError::ActionExecution("button release rejected".into()));
        }
        Ok(())
    }

    fn key_chord(&self, chord: &KeyChord) -> DeskPilotResult<()> {
        self.record(InputCall::Chord(chord.clone()));
        Ok(())
    }

    fn text(&self, text: &str) -> DeskPilotResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(InputCall::Text(text.to_string()));
        if inner.fail_text {
            return Err(DeskPilotError::ActionExecution("text injection rejected".into()));
        }
        Ok(())
    }

    fn scroll(&self, amount: i32) -> DeskPilotResult<()> {
        self.record(InputCall::Scroll(amount));
        Ok(())
    }
}

/// Model client replaying a fixed script of results, then a fallback response if one is set.
pub struct ScriptedModel {
    script: Mutex<VecDeque<DeskPilotResult<ModelResponse>>>,
    fallback: Option<ModelResponse>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<DeskPilotResult<ModelResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, response: ModelResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: &ModelRequest) -> DeskPilotResult<ModelResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(DeskPilotError::model(
                ModelErrorKind::Other,
                "script exhausted",
            )),
        }
    }
}
