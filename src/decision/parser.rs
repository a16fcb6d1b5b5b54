use serde_json::Value;

use crate::decision::prompts::{DEFAULT_REASON, GENERIC_COMMENT, KEYWORD_REASON};
use crate::decision::types::{Action, Decision};

const DEFAULT_CONFIDENCE: f64 = 0.5;
const KEYWORD_CONFIDENCE: f64 = 0.6;

/// How a raw model reply was turned into a decision.
///
/// Construction is total: every input string maps to exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// A `{...}` object was found and had usable fields.
    StructuredJson(Decision),
    /// No usable object; "like" or "comment" occurred in the text.
    KeywordMatch(Decision),
    /// Neither an object nor a keyword.
    DefaultFallback(Decision),
}

impl ParsedResponse {
    pub fn from_raw(raw: &str) -> Self {
        match parse_structured(raw) {
            Ok(decision) => ParsedResponse::StructuredJson(decision),
            Err(reason) => {
                tracing::debug!(%reason, "structured parse failed, scanning for keywords");
                parse_keywords(raw)
            }
        }
    }

    pub fn decision(&self) -> &Decision {
        match self {
            ParsedResponse::StructuredJson(d)
            | ParsedResponse::KeywordMatch(d)
            | ParsedResponse::DefaultFallback(d) => d,
        }
    }

    pub fn into_decision(self) -> Decision {
        match self {
            ParsedResponse::StructuredJson(d)
            | ParsedResponse::KeywordMatch(d)
            | ParsedResponse::DefaultFallback(d) => d,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParsedResponse::StructuredJson(_) => "structured_json",
            ParsedResponse::KeywordMatch(_) => "keyword_match",
            ParsedResponse::DefaultFallback(_) => "default_fallback",
        }
    }
}

/// The slice from the first `{` to the last `}`, if they appear in that order.
fn braced_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn parse_structured(raw: &str) -> Result<Decision, String> {
    let json = braced_slice(raw).ok_or("no braces")?;
    let value: Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let obj = value.as_object().ok_or("not an object")?;

    let action = match obj.get("action") {
        None | Some(Value::Null) => Action::Pass,
        Some(Value::String(s)) => s.parse::<Action>()?,
        Some(other) => return Err(format!("action is not a string: {other}")),
    };
    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(v) => coerce_f64(v).ok_or_else(|| format!("confidence is not numeric: {v}"))?,
    };
    let reason = match obj.get("reason") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => DEFAULT_REASON.to_string(),
        Some(other) => other.to_string(),
    };
    let comment = obj.get("comment").and_then(Value::as_str).map(str::to_string);

    Ok(Decision::new(action, confidence, reason).with_comment(comment))
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn parse_keywords(raw: &str) -> ParsedResponse {
    let lower = raw.to_lowercase();
    if lower.contains("like") {
        ParsedResponse::KeywordMatch(Decision::new(Action::Like, KEYWORD_CONFIDENCE, KEYWORD_REASON))
    } else if lower.contains("comment") {
        ParsedResponse::KeywordMatch(
            Decision::new(Action::Comment, KEYWORD_CONFIDENCE, KEYWORD_REASON)
                .with_comment(Some(GENERIC_COMMENT.to_string())),
        )
    } else {
        ParsedResponse::DefaultFallback(Decision::new(Action::Pass, KEYWORD_CONFIDENCE, KEYWORD_REASON))
    }
}
