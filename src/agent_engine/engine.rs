use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::history::SessionHistory;
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{CycleOutcome, LoopConfig, ProfileEvaluation};
use crate::config::{BotConfig, Delays, OcrConfig};
use crate::decision::criteria::MatchingCriteria;
use crate::decision::engine::DecisionEngine;
use crate::decision::watch::CriteriaWatch;
use crate::device::Device;
use crate::executor::interaction::InteractionExecutor;
use crate::llm::registry::ProviderRegistry;
use crate::ocr::engine::OcrEngine;
use crate::ocr::extract::TextExtractor;
use crate::perception::screen::ScreenPerception;

/// The components one cycle runs through, wired to a shared device and registry.
pub struct Pipeline {
    pub device: Arc<dyn Device>,
    pub perception: Arc<ScreenPerception>,
    pub extractor: Arc<TextExtractor>,
    pub decisions: Arc<DecisionEngine>,
    pub executor: InteractionExecutor,
}

impl Pipeline {
    pub fn new(
        device: Arc<dyn Device>,
        registry: Arc<ProviderRegistry>,
        ocr: Arc<dyn OcrEngine>,
        ocr_config: &OcrConfig,
        criteria: MatchingCriteria,
        delays: Delays,
    ) -> Self {
        let perception = Arc::new(ScreenPerception::new(registry.clone()));
        let extractor = Arc::new(TextExtractor::new(ocr, ocr_config));
        let decisions = Arc::new(DecisionEngine::new(registry, criteria));
        let executor = InteractionExecutor::new(
            device.clone(),
            perception.clone(),
            extractor.clone(),
            decisions.clone(),
            delays,
        );
        Self {
            device,
            perception,
            extractor,
            decisions,
            executor,
        }
    }
}

/// Capture, classify, extract, decide, execute; then sleep and repeat.
///
/// One cycle runs to completion before the next starts. Per-cycle failures are
/// logged and never end the loop; only a run limit or the shutdown signal does.
pub struct ControlLoop {
    pipeline: Pipeline,
    controller: LoopController,
    history: Option<SessionHistory>,
    criteria_watch: Option<CriteriaWatch>,
    poll_interval: Duration,
    capture_retry: Duration,
}

impl ControlLoop {
    pub fn new(pipeline: Pipeline, bot: &BotConfig) -> Self {
        Self {
            pipeline,
            controller: LoopController::new(LoopConfig::from(bot)),
            history: None,
            criteria_watch: None,
            poll_interval: bot.poll_interval(),
            capture_retry: bot.capture_retry(),
        }
    }

    pub fn with_history(mut self, history: SessionHistory) -> Self {
        tracing::info!(path = %history.path().display(), "recording session history");
        self.history = Some(history);
        self
    }

    pub fn with_criteria_watch(mut self, watch: CriteriaWatch) -> Self {
        tracing::info!(path = %watch.path().display(), "watching criteria file");
        self.criteria_watch = Some(watch);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn profiles_evaluated(&self) -> u32 {
        self.controller.profiles_evaluated()
    }

    /// Run until a limit is reached or `shutdown` completes. Returns the number
    /// of profiles evaluated.
    pub async fn run<F>(&mut self, shutdown: F) -> u32
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!("starting automation loop");

        loop {
            if let Some(reason) = self.controller.stop_reason() {
                tracing::info!(%reason, "loop limit reached");
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("stopped by user");
                    break;
                }
                outcome = self.run_cycle() => outcome,
            };

            let pause = if outcome.is_capture_failure() {
                self.capture_retry
            } else {
                self.poll_interval
            };
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("stopped by user");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        let evaluated = self.controller.profiles_evaluated();
        tracing::info!(profiles = evaluated, "automation loop finished");
        evaluated
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.reload_criteria();
        let p = &self.pipeline;

        let shot = match p.device.capture_screenshot(None).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(error = %e, "failed to capture screenshot, retrying after delay");
                return CycleOutcome::CaptureFailed { error: e.to_string() };
            }
        };

        if !p.perception.is_profile_screen(&shot).await {
            tracing::info!("not on profile screen, waiting");
            if self.controller.record_idle() {
                if let Err(e) = p.executor.handle_popup().await {
                    tracing::warn!(error = %e, "popup dismissal failed");
                }
            }
            return CycleOutcome::NotProfile;
        }

        tracing::info!(screenshot = %shot.display(), "profile screen detected");
        let profile_text = p.extractor.extract_text(&shot, None).await;
        let verdict = p.decisions.evaluate(&profile_text, Some(&shot)).await;
        let result = p.executor.execute(verdict.decision.clone(), &shot).await;

        self.controller.record_profile();
        let evaluation = ProfileEvaluation {
            profile_text,
            verdict,
            executed: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        };
        if let Some(history) = self.history.as_mut() {
            history.record(&evaluation);
        }
        CycleOutcome::Evaluated(evaluation)
    }

    fn reload_criteria(&mut self) {
        let Some(watch) = self.criteria_watch.as_mut() else {
            return;
        };
        if let Some(criteria) = watch.poll() {
            self.pipeline.decisions.replace_criteria(criteria);
        }
    }
}
