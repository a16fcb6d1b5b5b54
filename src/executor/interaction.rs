use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Delays;
use crate::decision::engine::DecisionEngine;
use crate::decision::types::{Action, Decision};
use crate::device::Device;
use crate::errors::{BotError, BotResult};
use crate::ocr::extract::TextExtractor;
use crate::perception::screen::ScreenPerception;
use crate::perception::types::UiElementKind;

/// Turns a decision into device input.
///
/// Every action is a linear chain of locate, tap and settle steps. The first
/// failing step aborts the chain and its error is returned; later steps never run.
pub struct InteractionExecutor {
    pub(crate) device: Arc<dyn Device>,
    pub(crate) perception: Arc<ScreenPerception>,
    extractor: Arc<TextExtractor>,
    decisions: Arc<DecisionEngine>,
    pub(crate) delays: Delays,
}

impl InteractionExecutor {
    pub fn new(
        device: Arc<dyn Device>,
        perception: Arc<ScreenPerception>,
        extractor: Arc<TextExtractor>,
        decisions: Arc<DecisionEngine>,
        delays: Delays,
    ) -> Self {
        Self {
            device,
            perception,
            extractor,
            decisions,
            delays,
        }
    }

    pub async fn execute(&self, decision: Decision, screenshot: &Path) -> BotResult<()> {
        tracing::info!(action = %decision.action(), reason = %decision.reason(), "executing decision");
        let result = match decision.action() {
            Action::Like => self.press(UiElementKind::LikeButton, screenshot).await,
            Action::Pass => self.press(UiElementKind::PassButton, screenshot).await,
            Action::Comment => self.comment(decision.comment(), screenshot).await,
        };
        match &result {
            Ok(()) => tracing::info!(action = %decision.action(), "decision executed"),
            Err(e) => tracing::error!(action = %decision.action(), error = %e, "decision aborted"),
        }
        result
    }

    async fn press(&self, kind: UiElementKind, screenshot: &Path) -> BotResult<()> {
        self.tap_element(kind, screenshot).await?;
        tokio::time::sleep(self.delays.tap_settle).await;
        Ok(())
    }

    async fn comment(&self, text: Option<&str>, screenshot: &Path) -> BotResult<()> {
        let text = match text {
            Some(text) => text.to_string(),
            None => {
                let profile_text = self.extractor.extract_text(screenshot, None).await;
                self.decisions.generate_comment(&profile_text).await
            }
        };
        tracing::info!(comment = %text, "commenting");

        self.tap_element(UiElementKind::CommentButton, screenshot).await?;
        tokio::time::sleep(self.delays.tap_settle).await;

        let composer = self.refresh(screenshot).await;
        self.tap_element(UiElementKind::TextInput, &composer).await?;
        tokio::time::sleep(self.delays.text_settle).await;

        self.device.input_text(&text).await.inspect_err(|e| {
            tracing::error!(error = %e, "entering comment text failed");
        })?;
        tokio::time::sleep(self.delays.text_settle).await;

        let typed = self.refresh(&composer).await;
        self.tap_element(UiElementKind::SendButton, &typed).await?;
        tokio::time::sleep(self.delays.tap_settle).await;
        Ok(())
    }

    /// Locate `kind` on `screenshot` and tap it.
    pub async fn tap_element(&self, kind: UiElementKind, screenshot: &Path) -> BotResult<()> {
        let Some(at) = self.perception.locate_element(screenshot, kind).await else {
            tracing::error!(element = %kind, "element not found");
            return Err(BotError::ElementNotFound(kind));
        };
        self.device.tap(at).await.inspect_err(|e| {
            tracing::error!(element = %kind, %at, error = %e, "tap rejected");
        })?;
        tracing::debug!(element = %kind, %at, "element tapped");
        Ok(())
    }

    /// A fresh screenshot after the screen changed, or `previous` when capture fails.
    async fn refresh(&self, previous: &Path) -> PathBuf {
        match self.device.capture_screenshot(None).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "screenshot refresh failed, reusing previous one");
                previous.to_path_buf()
            }
        }
    }
}
