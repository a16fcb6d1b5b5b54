//! In-memory stand-ins for the device, the OCR engine and the LLM provider.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::GrayImage;

use crate::device::Device;
use crate::errors::{BotError, BotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, LlmResponse, MessageContent};
use crate::ocr::engine::{OcrEngine, OcrWord};
use crate::ocr::preprocess::Region;
use crate::perception::types::ScreenCoordinate;

/// Replays queued replies in order and records what it was asked.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<BotResult<String>>>,
    seen: Mutex<Vec<(String, bool)>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<BotResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Text of the last user turn of every call.
    pub fn prompts(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn saw_image(&self, call: usize) -> bool {
        self.seen.lock().unwrap()[call].1
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> BotResult<LlmResponse> {
        let mut prompt = String::new();
        let mut image = false;
        if let Some(last) = messages.last() {
            match &last.content {
                MessageContent::Text(text) => prompt = text.clone(),
                MessageContent::Parts(parts) => {
                    for part in parts {
                        match part {
                            ContentPart::Text { text } => prompt.push_str(text),
                            ContentPart::ImageUrl { .. } => image = true,
                        }
                    }
                }
            }
        }
        self.seen.lock().unwrap().push((prompt, image));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BotError::LlmProvider("script exhausted".into())))?;
        Ok(LlmResponse { content: reply })
    }
}

/// A registry whose only provider, active for every role, is `provider`.
pub fn registry_with(provider: Arc<ScriptedProvider>) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new("scripted".into());
    registry.register(provider);
    Arc::new(registry)
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Connect,
    Disconnect,
    Tap(ScreenCoordinate),
    Swipe(ScreenCoordinate, ScreenCoordinate, u32),
    InputText(String),
    PressKey(String),
    Capture,
}

/// Records every command. Captures return the configured screenshot, or fail
/// when none is set.
pub struct RecordingDevice {
    width: u32,
    height: u32,
    screenshot: Option<PathBuf>,
    fail_taps: AtomicBool,
    calls: Mutex<Vec<DeviceCall>>,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            screenshot: None,
            fail_taps: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_screenshot(mut self, path: PathBuf) -> Self {
        self.screenshot = Some(path);
        self
    }

    pub fn fail_taps(&self, fail: bool) {
        self.fail_taps.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: DeviceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Device for RecordingDevice {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&self) -> BotResult<()> {
        self.push(DeviceCall::Connect);
        Ok(())
    }

    fn disconnect(&self) {
        self.push(DeviceCall::Disconnect);
    }

    async fn tap(&self, at: ScreenCoordinate) -> BotResult<()> {
        if self.fail_taps.load(Ordering::SeqCst) {
            return Err(BotError::Device("tap rejected".into()));
        }
        self.push(DeviceCall::Tap(at.clamped(self.width, self.height)));
        Ok(())
    }

    async fn swipe(&self, from: ScreenCoordinate, to: ScreenCoordinate, duration_ms: u32) -> BotResult<()> {
        self.push(DeviceCall::Swipe(from, to, duration_ms));
        Ok(())
    }

    async fn input_text(&self, text: &str) -> BotResult<()> {
        self.push(DeviceCall::InputText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, keycode: &str) -> BotResult<()> {
        self.push(DeviceCall::PressKey(keycode.to_string()));
        Ok(())
    }

    async fn capture_screenshot(&self, _path: Option<&Path>) -> BotResult<PathBuf> {
        self.push(DeviceCall::Capture);
        self.screenshot
            .clone()
            .ok_or_else(|| BotError::Device("no screenshot configured".into()))
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Returns fixed words regardless of the image. Each input line becomes one
/// OCR line.
pub struct StubOcr {
    words: Vec<OcrWord>,
    fail: bool,
}

impl StubOcr {
    pub fn new(text: &str) -> Self {
        let words = text
            .lines()
            .enumerate()
            .flat_map(|(idx, line)| {
                line.split_whitespace()
                    .map(move |w| word(w, 90.0, (0, 0, idx as u32)))
            })
            .collect();
        Self { words, fail: false }
    }

    /// Words on a single line, each with its own confidence.
    pub fn with_confidences(words: &[(&str, f32)]) -> Self {
        Self {
            words: words.iter().map(|(w, c)| word(w, *c, (0, 0, 0))).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            words: Vec::new(),
            fail: true,
        }
    }
}

fn word(text: &str, confidence: f32, line: (u32, u32, u32)) -> OcrWord {
    OcrWord {
        text: text.to_string(),
        confidence,
        bbox: Region::new(0, 0, 10, 10),
        line,
    }
}

#[async_trait]
impl OcrEngine for StubOcr {
    fn name(&self) -> &str {
        "stub"
    }

    async fn recognize(&self, _image: &GrayImage) -> BotResult<Vec<OcrWord>> {
        if self.fail {
            return Err(BotError::Ocr("stub failure".into()));
        }
        Ok(self.words.clone())
    }
}

/// Write a mid-grey `width`×`height` PNG into `dir`.
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]))
        .save(&path)
        .unwrap();
    path
}
