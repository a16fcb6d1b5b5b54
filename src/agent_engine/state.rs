use serde::{Deserialize, Serialize};

use crate::config::BotConfig;
use crate::decision::engine::Verdict;

/// What one control-loop cycle ended with.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No screenshot; the loop waits the retry delay.
    CaptureFailed { error: String },
    /// Screen is not a profile; nothing was decided.
    NotProfile,
    Evaluated(ProfileEvaluation),
}

impl CycleOutcome {
    pub fn is_capture_failure(&self) -> bool {
        matches!(self, CycleOutcome::CaptureFailed { .. })
    }
}

/// One profile taken through extract, decide and execute.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileEvaluation {
    pub profile_text: String,
    pub verdict: Verdict,
    pub executed: bool,
    pub error: Option<String>,
}

/// Run limits. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub max_profiles: Option<u32>,
    pub max_duration_minutes: Option<u32>,
    pub popup_after_idle_cycles: u32,
}

impl From<&BotConfig> for LoopConfig {
    fn from(cfg: &BotConfig) -> Self {
        Self {
            max_profiles: cfg.max_profiles,
            max_duration_minutes: cfg.max_duration_minutes,
            popup_after_idle_cycles: cfg.popup_after_idle_cycles,
        }
    }
}
