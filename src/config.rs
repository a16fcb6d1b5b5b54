use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decision::criteria::MatchingCriteria;
use crate::errors::{BotError, BotResult};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub device: DeviceConfig,
    pub ocr: OcrConfig,
    pub matching: MatchingConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub history: HistoryConfig,
}

/// Timing and run limits for the control loop and the interaction executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Pause between two control-loop cycles.
    pub poll_interval_secs: f64,
    pub tap_delay_secs: f64,
    pub swipe_delay_secs: f64,
    pub text_delay_secs: f64,
    /// Pause after a failed screenshot before the next attempt.
    pub capture_retry_secs: f64,
    /// Upper bound for the startup readiness check, in seconds.
    pub ready_timeout_secs: u32,
    pub ready_poll_secs: f64,
    pub swipe_duration_ms: u32,
    pub max_profiles: Option<u32>,
    pub max_duration_minutes: Option<u32>,
    /// Consecutive non-profile cycles before a popup dismissal is attempted. 0 disables.
    pub popup_after_idle_cycles: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3.0,
            tap_delay_secs: 1.0,
            swipe_delay_secs: 2.0,
            text_delay_secs: 0.5,
            capture_retry_secs: 5.0,
            ready_timeout_secs: 10,
            ready_poll_secs: 1.0,
            swipe_duration_ms: 300,
            max_profiles: None,
            max_duration_minutes: None,
            popup_after_idle_cycles: 0,
        }
    }
}

impl BotConfig {
    pub fn delays(&self) -> Delays {
        Delays {
            tap_settle: secs(self.tap_delay_secs),
            swipe_settle: secs(self.swipe_delay_secs),
            text_settle: secs(self.text_delay_secs),
            poll: secs(self.ready_poll_secs),
            swipe_duration_ms: self.swipe_duration_ms,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }

    pub fn capture_retry(&self) -> Duration {
        secs(self.capture_retry_secs)
    }

    /// Readiness polls that fit in `ready_timeout_secs`, at least one.
    pub fn ready_polls(&self) -> u32 {
        let timeout = f64::from(self.ready_timeout_secs);
        if self.ready_poll_secs <= 0.0 {
            return self.ready_timeout_secs.max(1);
        }
        ((timeout / self.ready_poll_secs).ceil() as u32).max(1)
    }
}

/// Settle delays handed to the interaction executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delays {
    pub tap_settle: Duration,
    pub swipe_settle: Duration,
    pub text_settle: Duration,
    /// Interval between readiness polls.
    pub poll: Duration,
    pub swipe_duration_ms: u32,
}

impl Delays {
    /// No settling at all. Useful against stub devices.
    pub fn immediate() -> Self {
        Self {
            tap_settle: Duration::ZERO,
            swipe_settle: Duration::ZERO,
            text_settle: Duration::ZERO,
            poll: Duration::ZERO,
            swipe_duration_ms: 300,
        }
    }
}

impl Default for Delays {
    fn default() -> Self {
        BotConfig::default().delays()
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub adb_path: String,
    /// Serial of the device to drive. The first attached device is used when absent.
    pub serial: Option<String>,
    /// Wireless ADB target; `adb connect ip:port` is issued before device selection.
    pub ip: Option<String>,
    pub port: u16,
    pub screenshot_dir: PathBuf,
    pub command_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".into(),
            serial: None,
            ip: None,
            port: 5555,
            screenshot_dir: PathBuf::from("screenshots"),
            command_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_path: String,
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    /// Tesseract page segmentation mode.
    pub psm: u8,
    pub char_whitelist: Option<String>,
    /// Words at or below this confidence (0–100) are dropped.
    pub min_confidence: f32,
    pub contrast: f32,
    pub blur_sigma: f32,
    /// Crops smaller than this on either side are upscaled before recognition.
    pub min_dimension: u32,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".into(),
            tessdata_dir: None,
            language: "eng".into(),
            psm: 6,
            char_whitelist: Some(
                "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,!? ".into(),
            ),
            min_confidence: 30.0,
            contrast: 2.0,
            blur_sigma: 0.5,
            min_dimension: 100,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    #[serde(flatten)]
    pub criteria: MatchingCriteria,
    /// Optional standalone criteria document, re-read whenever it changes on disk.
    pub criteria_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderEntry {
                display_name: "OpenAI".into(),
                api_base: "https://api.openai.com/v1/chat/completions".into(),
                model: "gpt-4o".into(),
                temperature: default_temperature(),
                api_key: None,
                timeout_secs: default_timeout_secs(),
            },
        );
        Self {
            active_provider: "openai".into(),
            providers,
            roles: RolesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (overridden by env var HINGEBOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Maps bot roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Screen classification and element location.
    pub vision: Option<RoleEntry>,
    /// Like / pass / comment judgments.
    pub analysis: Option<RoleEntry>,
    /// Opening-line generation.
    pub comment: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: Some(PathBuf::from("hinge_bot.log")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Defaults to `<data dir>/hinge-autobot/sessions`.
    pub dir: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Apply the supported environment variable overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(serial) = lookup("DEVICE_SERIAL") {
            self.device.serial = Some(serial);
        }
        if let Some(ip) = lookup("DEVICE_IP") {
            self.device.ip = Some(ip);
        }
        if let Some(port) = lookup("DEVICE_PORT") {
            match port.parse() {
                Ok(p) => self.device.port = p,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid DEVICE_PORT"),
            }
        }
        if let Some(delay) = lookup("BOT_DELAY") {
            match delay.parse() {
                Ok(d) => self.bot.poll_interval_secs = d,
                Err(_) => tracing::warn!(value = %delay, "ignoring invalid BOT_DELAY"),
            }
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> BotResult<()> {
        self.matching.criteria.validate()?;

        let delays = [
            ("poll_interval_secs", self.bot.poll_interval_secs),
            ("tap_delay_secs", self.bot.tap_delay_secs),
            ("swipe_delay_secs", self.bot.swipe_delay_secs),
            ("text_delay_secs", self.bot.text_delay_secs),
            ("capture_retry_secs", self.bot.capture_retry_secs),
            ("ready_poll_secs", self.bot.ready_poll_secs),
        ];
        for (key, value) in delays {
            if !value.is_finite() || value < 0.0 {
                return Err(BotError::Config(format!(
                    "bot.{key} must be a non-negative number, got {value}"
                )));
            }
        }

        if !(0.0..=100.0).contains(&self.ocr.min_confidence) {
            return Err(BotError::Config(format!(
                "ocr.min_confidence must be within 0..=100, got {}",
                self.ocr.min_confidence
            )));
        }

        for (role, entry) in [
            ("vision", &self.llm.roles.vision),
            ("analysis", &self.llm.roles.analysis),
            ("comment", &self.llm.roles.comment),
        ] {
            if let Some(entry) = entry {
                if !self.llm.providers.contains_key(&entry.provider) {
                    return Err(BotError::Config(format!(
                        "llm.roles.{role} references unknown provider '{}'",
                        entry.provider
                    )));
                }
            }
        }

        tracing::debug!("configuration validation passed");
        Ok(())
    }

    /// Create the screenshot and history directories.
    pub fn setup_directories(&self) -> BotResult<()> {
        std::fs::create_dir_all(&self.device.screenshot_dir)?;
        tracing::debug!(dir = %self.device.screenshot_dir.display(), "screenshot directory ready");
        if self.history.enabled {
            let dir = self.history_dir();
            std::fs::create_dir_all(&dir)?;
            tracing::debug!(dir = %dir.display(), "history directory ready");
        }
        Ok(())
    }

    pub fn history_dir(&self) -> PathBuf {
        if let Some(dir) = &self.history.dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("hinge-autobot").join("sessions"))
            .unwrap_or_else(|| PathBuf::from("sessions"))
    }
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Load the configuration file and apply environment overrides.
///
/// An explicit path must exist. Without one, the usual locations are searched and
/// a missing file yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> BotResult<AppConfig> {
    let path = match explicit {
        Some(p) if !p.exists() => {
            return Err(BotError::Config(format!("{} does not exist", p.display())));
        }
        Some(p) => Some(p.to_path_buf()),
        None => resolve_config_path(),
    };

    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config: AppConfig = toml::from_str(&content)?;
            tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
            config
        }
        None => {
            tracing::info!("{CONFIG_FILE_NAME} not found, using defaults");
            AppConfig::default()
        }
    };
    config.apply_env_overrides();
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> BotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

const ENV_TEMPLATE: &str = "\
# HingeAutoBot environment variables
# Copy this file to .env and fill in your values

# API key for the provider with id \"openai\" (HINGEBOT_<ID>_API_KEY for other ids)
OPENAI_API_KEY=your-api-key-here

# Device selection (optional - defaults to the first USB device)
DEVICE_SERIAL=
DEVICE_IP=192.168.1.100
DEVICE_PORT=5555

# Bot settings (optional)
BOT_DELAY=3
LOG_LEVEL=info
";

pub fn write_env_template(path: &Path) -> BotResult<()> {
    std::fs::write(path, ENV_TEMPLATE)?;
    tracing::info!(path = %path.display(), "environment template written");
    Ok(())
}
