use crate::decision::criteria::MatchingCriteria;

pub const DEFAULT_REASON: &str = "No reason provided";
pub const KEYWORD_REASON: &str = "AI analysis completed";
pub const GENERIC_COMMENT: &str = "Hey! Your profile caught my attention 😊";
pub const COMMON_INTERESTS_COMMENT: &str = "Hey! I noticed we have some things in common 😊";

pub const ANALYSIS_SYSTEM: &str =
    "You are an AI assistant that analyzes dating profiles and makes matching decisions based on compatibility criteria.";

pub const COMMENT_SYSTEM: &str = "You are a witty, charming person writing dating app comments.";

const RESPONSE_INSTRUCTIONS: &str = r#"Please respond with a JSON object containing:
1. "action": "like", "pass", or "comment"
2. "confidence": float between 0.0 and 1.0
3. "reason": brief explanation of the decision
4. "comment": if action is "comment", provide a personalized, witty one-liner

Guidelines:
- Like profiles that match most criteria and seem compatible
- Pass on profiles with deal-breakers or poor compatibility
- Comment on profiles that are interesting but need a conversation starter
- Be selective but not overly picky
- Consider age, interests, and personality traits
- Avoid generic or inappropriate comments

Response format:
{
    "action": "like|pass|comment",
    "confidence": 0.85,
    "reason": "Profile shows good compatibility with shared interests in technology and travel",
    "comment": "Your travel photos look amazing! What's the most adventurous place you've been?"
}"#;

fn criteria_json(criteria: &MatchingCriteria) -> String {
    serde_json::to_string_pretty(criteria).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "criteria serialization failed");
        String::from("{}")
    })
}

/// Prompt sent together with the screenshot.
pub fn vision_analysis_prompt(profile_text: &str, criteria: &MatchingCriteria) -> String {
    format!(
        "Analyze this dating app profile screenshot and make a matching decision based on the criteria below.\n\n\
         PROFILE TEXT (if any):\n{profile_text}\n\n\
         MATCHING CRITERIA:\n{criteria}\n\n\
         Look at both the visual elements (photos, layout) and any text content to make your decision.\n\n\
         {RESPONSE_INSTRUCTIONS}",
        criteria = criteria_json(criteria),
    )
}

pub fn text_analysis_prompt(profile_text: &str, criteria: &MatchingCriteria) -> String {
    format!(
        "Analyze this dating profile and make a matching decision based on the criteria below.\n\n\
         PROFILE TEXT:\n{profile_text}\n\n\
         MATCHING CRITERIA:\n{criteria}\n\n\
         {RESPONSE_INSTRUCTIONS}",
        criteria = criteria_json(criteria),
    )
}

pub fn comment_prompt(profile_text: &str) -> String {
    format!(
        "Generate a personalized, witty one-liner comment for this dating profile.\n\
         Keep it light, fun, and engaging. Avoid being generic or inappropriate.\n\n\
         PROFILE TEXT:\n{profile_text}\n\n\
         Guidelines:\n\
         - Be specific to something mentioned in their profile\n\
         - Keep it under 50 characters\n\
         - Make it conversation-starting\n\
         - Be respectful and genuine\n\
         - Use emojis sparingly\n\n\
         Generate just the comment, no explanation needed."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_prompt_embeds_text_and_criteria() {
        let mut criteria = MatchingCriteria::default();
        criteria.preferred_interests = vec!["bouldering".into()];
        let prompt = text_analysis_prompt("Jo, 30", &criteria);
        assert!(prompt.contains("Jo, 30"));
        assert!(prompt.contains("\"bouldering\""));
        assert!(prompt.contains("\"min_age\": 21"));
        assert!(prompt.contains("\"action\": \"like|pass|comment\""));
    }

    #[test]
    fn vision_prompt_mentions_photos() {
        let prompt = vision_analysis_prompt("", &MatchingCriteria::default());
        assert!(prompt.contains("visual elements"));
    }
}
