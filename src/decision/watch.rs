use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::decision::criteria::MatchingCriteria;

/// Reloads a criteria document when its modification time changes.
pub struct CriteriaWatch {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl CriteriaWatch {
    /// Start watching; the file's current state counts as already seen.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = modified(&path);
        Self { path, last_modified }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// New criteria if the file changed since the last poll and parses cleanly.
    pub fn poll(&mut self) -> Option<MatchingCriteria> {
        let current = modified(&self.path)?;
        if self.last_modified == Some(current) {
            return None;
        }
        self.last_modified = Some(current);

        match MatchingCriteria::load_from_file(&self.path) {
            Ok(criteria) => {
                tracing::info!(path = %self.path.display(), "criteria file changed, reloading");
                Some(criteria)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "criteria file changed but is invalid, keeping current criteria");
                None
            }
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
