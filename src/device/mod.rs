pub mod adb;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::BotResult;
use crate::perception::types::ScreenCoordinate;

/// A phone the bot can drive. Commands are issued one at a time by the loop;
/// a rejected command is an `Err`.
#[async_trait]
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> BotResult<()>;

    /// Release the connection. Idempotent, never fails.
    fn disconnect(&self);

    async fn tap(&self, at: ScreenCoordinate) -> BotResult<()>;

    async fn swipe(&self, from: ScreenCoordinate, to: ScreenCoordinate, duration_ms: u32) -> BotResult<()>;

    async fn input_text(&self, text: &str) -> BotResult<()>;

    async fn press_key(&self, keycode: &str) -> BotResult<()>;

    /// Save a PNG screenshot to `path`, or to a generated path when `None`.
    async fn capture_screenshot(&self, path: Option<&Path>) -> BotResult<PathBuf>;

    /// (width, height) in pixels; (0, 0) before a successful connect.
    fn screen_dimensions(&self) -> (u32, u32);
}

/// Disconnects the device when dropped, on every exit path.
pub struct DeviceGuard {
    device: Arc<dyn Device>,
}

impl DeviceGuard {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> Arc<dyn Device> {
        self.device.clone()
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        tracing::info!(device = %self.device.name(), "releasing device connection");
        self.device.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DeviceCall, RecordingDevice};

    #[test]
    fn guard_disconnects_on_drop() {
        let device = Arc::new(RecordingDevice::new(1080, 1920));
        {
            let _guard = DeviceGuard::new(device.clone());
        }
        assert_eq!(device.calls(), vec![DeviceCall::Disconnect]);
    }

    #[test]
    fn guard_disconnects_on_panic() {
        let device = Arc::new(RecordingDevice::new(1080, 1920));
        let inner = device.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = DeviceGuard::new(inner);
            panic!("cycle failed");
        }));
        assert!(result.is_err());
        assert_eq!(device.calls(), vec![DeviceCall::Disconnect]);
    }
}
