use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decision::prompts::DEFAULT_REASON;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Like,
    Pass,
    Comment,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Like => "like",
            Action::Pass => "pass",
            Action::Comment => "comment",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(Action::Like),
            "pass" => Ok(Action::Pass),
            "comment" => Ok(Action::Comment),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// The verdict on one profile. Built once, consumed once by the executor.
///
/// Fields are private so the invariants hold: confidence in `[0, 1]`, a
/// non-empty reason, and a comment only on `Action::Comment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    action: Action,
    confidence: f64,
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

impl Decision {
    pub fn new(action: Action, confidence: f64, reason: impl Into<String>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            DEFAULT_REASON.to_string()
        } else {
            reason
        };
        Self {
            action,
            confidence,
            reason,
            comment: None,
        }
    }

    /// Attach comment text. Ignored unless the action is `Comment`; blank text is dropped.
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        if self.action == Action::Comment {
            self.comment = comment.filter(|c| !c.trim().is_empty());
        }
        self
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}): {}", self.action, self.confidence, self.reason)
    }
}
