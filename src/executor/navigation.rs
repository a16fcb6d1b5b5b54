use crate::errors::{BotError, BotResult};
use crate::executor::interaction::InteractionExecutor;
use crate::perception::types::ScreenCoordinate;

/// Horizontal swipe endpoints as width fractions, at half height.
const SWIPE_FROM: f64 = 0.8;
const SWIPE_TO: f64 = 0.2;

impl InteractionExecutor {
    /// Right-to-left swipe to the next profile.
    pub async fn swipe_next(&self) -> BotResult<()> {
        self.horizontal_swipe(SWIPE_FROM, SWIPE_TO, "next").await
    }

    /// Left-to-right swipe back to the previous profile.
    pub async fn swipe_previous(&self) -> BotResult<()> {
        self.horizontal_swipe(SWIPE_TO, SWIPE_FROM, "previous").await
    }

    async fn horizontal_swipe(&self, from_fx: f64, to_fx: f64, direction: &str) -> BotResult<()> {
        let (width, height) = self.device.screen_dimensions();
        let from = ScreenCoordinate::from_fractions(from_fx, 0.5, width, height);
        let to = ScreenCoordinate::from_fractions(to_fx, 0.5, width, height);

        self.device
            .swipe(from, to, self.delays.swipe_duration_ms)
            .await
            .inspect_err(|e| tracing::error!(direction, error = %e, "swipe failed"))?;
        tracing::info!(direction, "swiped");
        tokio::time::sleep(self.delays.swipe_settle).await;
        Ok(())
    }

    /// Tap the screen centre to dismiss whatever is in front. Not popup-aware.
    pub async fn handle_popup(&self) -> BotResult<()> {
        let (width, height) = self.device.screen_dimensions();
        let centre = ScreenCoordinate::new((width / 2) as i32, (height / 2) as i32);
        self.device.tap(centre).await?;
        tracing::info!(%centre, "tapped screen centre to dismiss popup");
        tokio::time::sleep(self.delays.tap_settle).await;
        Ok(())
    }

    /// Poll until a profile screen shows, at most `max_polls` times.
    pub async fn wait_for_ready(&self, max_polls: u32) -> BotResult<()> {
        for attempt in 1..=max_polls {
            match self.device.capture_screenshot(None).await {
                Ok(shot) => {
                    if self.perception.is_profile_screen(&shot).await {
                        tracing::info!(attempt, "app is ready for interaction");
                        return Ok(());
                    }
                    tracing::debug!(attempt, "not a profile screen yet");
                }
                Err(e) => tracing::debug!(attempt, error = %e, "readiness screenshot failed"),
            }
            if attempt < max_polls {
                tokio::time::sleep(self.delays.poll).await;
            }
        }
        tracing::warn!(max_polls, "app did not become ready in time");
        Err(BotError::Timeout(format!("no profile screen after {max_polls} polls")))
    }
}
