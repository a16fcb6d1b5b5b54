use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{BotError, BotResult};

/// What the user is looking for in a profile.
///
/// List order matters: the first matching deal-breaker is the one reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingCriteria {
    pub min_age: u32,
    pub max_age: u32,
    pub preferred_interests: Vec<String>,
    pub deal_breakers: Vec<String>,
    pub personality_traits: Vec<String>,
}

impl Default for MatchingCriteria {
    fn default() -> Self {
        Self {
            min_age: 21,
            max_age: 35,
            preferred_interests: to_strings(&[
                "technology",
                "travel",
                "fitness",
                "music",
                "art",
                "photography",
                "cooking",
                "reading",
                "hiking",
                "yoga",
            ]),
            deal_breakers: to_strings(&[
                "smoking",
                "drugs",
                "excessive drinking",
                "toxic",
                "narcissist",
                "cheater",
                "liar",
            ]),
            personality_traits: to_strings(&[
                "intelligent",
                "funny",
                "adventurous",
                "kind",
                "creative",
                "passionate",
                "ambitious",
                "empathetic",
            ]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl MatchingCriteria {
    pub fn validate(&self) -> BotResult<()> {
        if self.min_age >= self.max_age {
            return Err(BotError::Config(format!(
                "invalid age range: min_age ({}) must be less than max_age ({})",
                self.min_age, self.max_age
            )));
        }
        Ok(())
    }

    pub fn accepts_age(&self, age: u32) -> bool {
        (self.min_age..=self.max_age).contains(&age)
    }

    /// Read a standalone criteria document (TOML with the same keys as `[matching]`).
    pub fn load_from_file(path: &Path) -> BotResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let criteria: MatchingCriteria = toml::from_str(&content)?;
        criteria.validate()?;
        Ok(criteria)
    }
}
