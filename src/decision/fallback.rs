use std::sync::LazyLock;

use regex::Regex;

use crate::decision::criteria::MatchingCriteria;
use crate::decision::prompts::COMMON_INTERESTS_COMMENT;
use crate::decision::types::{Action, Decision};

static AGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{2})\b").expect("age regex"));

/// Every standalone two-digit number in the text.
pub fn extract_ages(text: &str) -> Vec<u32> {
    AGE_PATTERN
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

/// No two-digit token counts as compatible; otherwise any token inside the range does.
pub fn is_age_compatible(text: &str, criteria: &MatchingCriteria) -> bool {
    let ages = extract_ages(text);
    ages.is_empty() || ages.into_iter().any(|age| criteria.accepts_age(age))
}

/// Keyword and age rules used when no model is available.
pub fn evaluate(profile_text: &str, criteria: &MatchingCriteria) -> Decision {
    let lower = profile_text.to_lowercase();

    if let Some(term) = criteria
        .deal_breakers
        .iter()
        .find(|term| !term.trim().is_empty() && lower.contains(&term.to_lowercase()))
    {
        return Decision::new(Action::Pass, 0.9, format!("Deal breaker found: {term}"));
    }

    let interest_matches = criteria
        .preferred_interests
        .iter()
        .filter(|interest| !interest.trim().is_empty() && lower.contains(&interest.to_lowercase()))
        .count();
    let age_ok = is_age_compatible(profile_text, criteria);

    if interest_matches >= 2 && age_ok {
        Decision::new(Action::Like, 0.7, format!("Good match: {interest_matches} shared interests"))
    } else if interest_matches >= 1 {
        Decision::new(Action::Comment, 0.6, "Some shared interests, worth a conversation")
            .with_comment(Some(COMMON_INTERESTS_COMMENT.to_string()))
    } else {
        Decision::new(Action::Pass, 0.5, "Limited compatibility")
    }
}
