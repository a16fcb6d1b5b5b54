use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::ProfileEvaluation;
use crate::decision::engine::DecisionStage;
use crate::decision::types::Action;
use crate::errors::BotResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub session_id: String,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub stage: DecisionStage,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub profile_text: String,
}

/// Append-only JSONL log of evaluated profiles, one file per session.
pub struct SessionHistory {
    pub session_id: String,
    file_path: PathBuf,
    written: usize,
}

impl SessionHistory {
    pub fn new(dir: &Path) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = dir.join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            file_path,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn entry_for(&self, evaluation: &ProfileEvaluation) -> HistoryEntry {
        let decision = &evaluation.verdict.decision;
        HistoryEntry {
            ts: chrono::Utc::now(),
            session_id: self.session_id.clone(),
            action: decision.action(),
            confidence: decision.confidence(),
            reason: decision.reason().to_string(),
            comment: decision.comment().map(str::to_string),
            stage: evaluation.verdict.stage,
            executed: evaluation.executed,
            error: evaluation.error.clone(),
            profile_text: evaluation.profile_text.clone(),
        }
    }

    /// Append one entry as a JSON line.
    pub fn append(&mut self, entry: &HistoryEntry) -> BotResult<()> {
        let line = serde_json::to_string(entry)?;
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        writeln!(file, "{}", line)?;
        self.written += 1;
        tracing::debug!(path = %self.file_path.display(), "history entry flushed");
        Ok(())
    }

    /// Log `evaluation`, swallowing write errors.
    pub fn record(&mut self, evaluation: &ProfileEvaluation) {
        let entry = self.entry_for(evaluation);
        if let Err(e) = self.append(&entry) {
            tracing::warn!(path = %self.file_path.display(), error = %e, "failed to write session history");
        }
    }
}
