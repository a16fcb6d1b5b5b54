#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::GrayImage;

use hinge_autobot_lib::device::Device;
use hinge_autobot_lib::errors::{BotError, BotResult};
use hinge_autobot_lib::llm::provider::LlmProvider;
use hinge_autobot_lib::llm::registry::ProviderRegistry;
use hinge_autobot_lib::llm::types::{CallConfig, ChatMessage, LlmResponse};
use hinge_autobot_lib::ocr::engine::{OcrEngine, OcrWord};
use hinge_autobot_lib::ocr::preprocess::Region;
use hinge_autobot_lib::perception::types::ScreenCoordinate;

/// Answers with queued replies; errors once the queue runs dry.
pub struct QueuedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl QueuedLlm {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmProvider for QueuedLlm {
    fn name(&self) -> &str {
        "queued"
    }

    async fn chat(&self, _messages: Vec<ChatMessage>, _cfg: &CallConfig) -> BotResult<LlmResponse> {
        *self.calls.lock().unwrap() += 1;
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BotError::LlmProvider("no more replies".into()))?;
        Ok(LlmResponse { content })
    }
}

pub fn registry(llm: Option<Arc<QueuedLlm>>) -> Arc<ProviderRegistry> {
    let Some(llm) = llm else {
        return Arc::new(ProviderRegistry::empty());
    };
    let mut registry = ProviderRegistry::new("queued".into());
    registry.register(llm);
    Arc::new(registry)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhoneEvent {
    Tap(i32, i32),
    Swipe,
    Text(String),
    Key(String),
    Screenshot,
    Released,
}

/// A phone that always shows the same screenshot and logs every command.
pub struct FakePhone {
    size: (u32, u32),
    screen: PathBuf,
    events: Mutex<Vec<PhoneEvent>>,
}

impl FakePhone {
    pub fn new(screen: PathBuf, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            size: (width, height),
            screen,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<PhoneEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn taps(&self) -> Vec<(i32, i32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PhoneEvent::Tap(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    fn log(&self, event: PhoneEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Device for FakePhone {
    fn name(&self) -> &str {
        "fake-phone"
    }

    async fn connect(&self) -> BotResult<()> {
        Ok(())
    }

    fn disconnect(&self) {
        self.log(PhoneEvent::Released);
    }

    async fn tap(&self, at: ScreenCoordinate) -> BotResult<()> {
        self.log(PhoneEvent::Tap(at.x, at.y));
        Ok(())
    }

    async fn swipe(&self, _from: ScreenCoordinate, _to: ScreenCoordinate, _duration_ms: u32) -> BotResult<()> {
        self.log(PhoneEvent::Swipe);
        Ok(())
    }

    async fn input_text(&self, text: &str) -> BotResult<()> {
        self.log(PhoneEvent::Text(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, keycode: &str) -> BotResult<()> {
        self.log(PhoneEvent::Key(keycode.to_string()));
        Ok(())
    }

    async fn capture_screenshot(&self, _path: Option<&Path>) -> BotResult<PathBuf> {
        self.log(PhoneEvent::Screenshot);
        Ok(self.screen.clone())
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        self.size
    }
}

/// OCR that reads the same single line from every image.
pub struct FixedOcr(pub String);

#[async_trait]
impl OcrEngine for FixedOcr {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn recognize(&self, _image: &GrayImage) -> BotResult<Vec<OcrWord>> {
        Ok(self
            .0
            .split_whitespace()
            .map(|w| OcrWord {
                text: w.to_string(),
                confidence: 95.0,
                bbox: Region::new(0, 0, 1, 1),
                line: (0, 0, 0),
            })
            .collect())
    }
}

pub fn screenshot(dir: &Path, width: u32, height: u32) -> PathBuf {
    let path = dir.join("screen.png");
    image::RgbImage::from_pixel(width, height, image::Rgb([240, 240, 240]))
        .save(&path)
        .unwrap();
    path
}
