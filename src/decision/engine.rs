use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::decision::criteria::MatchingCriteria;
use crate::decision::fallback;
use crate::decision::parser::ParsedResponse;
use crate::decision::prompts::{self, GENERIC_COMMENT};
use crate::decision::types::Decision;
use crate::errors::BotResult;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::llm::types::ChatMessage;
use crate::perception::screen::encode_image_data_uri;

const ANALYSIS_MAX_TOKENS: u32 = 500;
const COMMENT_MAX_TOKENS: u32 = 50;

/// One link of the decision chain, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    /// Screenshot plus OCR text sent to the vision role.
    Vision,
    /// OCR text only, sent to the analysis role.
    TextOnly,
    /// Local keyword and age rules. Always succeeds.
    Rules,
}

impl DecisionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStage::Vision => "vision",
            DecisionStage::TextOnly => "text_only",
            DecisionStage::Rules => "rules",
        }
    }
}

impl fmt::Display for DecisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision together with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub decision: Decision,
    pub stage: DecisionStage,
}

/// Profile decisions and comment generation.
///
/// Holds no per-profile state. The criteria may be swapped at any time; each
/// evaluation works on the snapshot it started with.
pub struct DecisionEngine {
    registry: Arc<ProviderRegistry>,
    criteria: RwLock<Arc<MatchingCriteria>>,
}

impl DecisionEngine {
    pub fn new(registry: Arc<ProviderRegistry>, criteria: MatchingCriteria) -> Self {
        Self {
            registry,
            criteria: RwLock::new(Arc::new(criteria)),
        }
    }

    pub fn criteria(&self) -> Arc<MatchingCriteria> {
        self.criteria
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace_criteria(&self, criteria: MatchingCriteria) {
        *self
            .criteria
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(criteria);
        tracing::info!("matching criteria updated");
    }

    /// Stages that apply to this call, in the order they are tried.
    pub fn stages(&self, image: Option<&Path>) -> Vec<DecisionStage> {
        let mut stages = Vec::with_capacity(3);
        if image.is_some() && self.registry.is_available(Role::Vision) {
            stages.push(DecisionStage::Vision);
        }
        if self.registry.is_available(Role::Analysis) {
            stages.push(DecisionStage::TextOnly);
        }
        stages.push(DecisionStage::Rules);
        stages
    }

    pub async fn decide(&self, profile_text: &str, image: Option<&Path>) -> Decision {
        self.evaluate(profile_text, image).await.decision
    }

    /// Walk the chain until a stage yields a decision.
    pub async fn evaluate(&self, profile_text: &str, image: Option<&Path>) -> Verdict {
        let criteria = self.criteria();
        for stage in self.stages(image) {
            let attempt = match stage {
                DecisionStage::Vision => match image {
                    Some(image) => self.ask_with_image(profile_text, image, &criteria).await,
                    None => continue,
                },
                DecisionStage::TextOnly => self.ask_text_only(profile_text, &criteria).await,
                DecisionStage::Rules => {
                    let decision = fallback::evaluate(profile_text, &criteria);
                    tracing::info!(stage = %stage, %decision, "profile decision");
                    return Verdict { decision, stage };
                }
            };
            match attempt {
                Ok(parsed) => {
                    let parse = parsed.kind();
                    let decision = parsed.into_decision();
                    tracing::info!(stage = %stage, parse, %decision, "profile decision");
                    return Verdict { decision, stage };
                }
                Err(e) => {
                    tracing::warn!(stage = %stage, error = %e, "decision stage failed, trying next");
                }
            }
        }
        // Rules is always the last stage, so this only guards an empty chain.
        Verdict {
            decision: fallback::evaluate(profile_text, &criteria),
            stage: DecisionStage::Rules,
        }
    }

    async fn ask_with_image(
        &self,
        profile_text: &str,
        image: &Path,
        criteria: &MatchingCriteria,
    ) -> BotResult<ParsedResponse> {
        let (provider, cfg) = self.registry.call_config_for_role(Role::Vision)?;
        let data_uri = encode_image_data_uri(image).await?;
        let messages = vec![
            ChatMessage::system(prompts::ANALYSIS_SYSTEM),
            ChatMessage::user_with_image(prompts::vision_analysis_prompt(profile_text, criteria), data_uri),
        ];
        let reply = provider
            .chat(messages, &cfg.with_default_max_tokens(ANALYSIS_MAX_TOKENS))
            .await?;
        tracing::debug!(reply = %reply.content, "vision analysis reply");
        Ok(ParsedResponse::from_raw(&reply.content))
    }

    async fn ask_text_only(&self, profile_text: &str, criteria: &MatchingCriteria) -> BotResult<ParsedResponse> {
        let (provider, cfg) = self.registry.call_config_for_role(Role::Analysis)?;
        let messages = vec![
            ChatMessage::system(prompts::ANALYSIS_SYSTEM),
            ChatMessage::user(prompts::text_analysis_prompt(profile_text, criteria)),
        ];
        let reply = provider
            .chat(messages, &cfg.with_default_max_tokens(ANALYSIS_MAX_TOKENS))
            .await?;
        tracing::debug!(reply = %reply.content, "text analysis reply");
        Ok(ParsedResponse::from_raw(&reply.content))
    }

    /// A short opener for this profile, or a fixed greeting when no model answers.
    pub async fn generate_comment(&self, profile_text: &str) -> String {
        match self.ask_comment(profile_text).await {
            Ok(comment) if !comment.is_empty() => {
                tracing::info!(%comment, "generated comment");
                comment
            }
            Ok(_) => {
                tracing::warn!("model returned an empty comment, using generic greeting");
                GENERIC_COMMENT.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "comment generation unavailable, using generic greeting");
                GENERIC_COMMENT.to_string()
            }
        }
    }

    async fn ask_comment(&self, profile_text: &str) -> BotResult<String> {
        let (provider, cfg) = self.registry.call_config_for_role(Role::Comment)?;
        let messages = vec![
            ChatMessage::system(prompts::COMMENT_SYSTEM),
            ChatMessage::user(prompts::comment_prompt(profile_text)),
        ];
        let reply = provider
            .chat(messages, &cfg.with_default_max_tokens(COMMENT_MAX_TOKENS))
            .await?;
        Ok(strip_quotes(reply.content.trim()).to_string())
    }
}

fn strip_quotes(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted {
        s[1..s.len() - 1].trim()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::prompts::COMMON_INTERESTS_COMMENT;
    use crate::decision::types::Action;
    use crate::errors::BotError;
    use crate::testing::{registry_with, write_png, ScriptedProvider};

    fn hiking_criteria() -> MatchingCriteria {
        MatchingCriteria {
            preferred_interests: vec!["hiking".into(), "technology".into()],
            deal_breakers: vec!["smoking".into()],
            ..Default::default()
        }
    }

    const PROFILE: &str = "Alex, 27, loves hiking and technology";

    #[tokio::test]
    async fn without_provider_rules_decide() {
        let engine = DecisionEngine::new(Arc::new(ProviderRegistry::empty()), hiking_criteria());
        assert_eq!(engine.stages(None), vec![DecisionStage::Rules]);

        let verdict = engine.evaluate(PROFILE, None).await;
        assert_eq!(verdict.stage, DecisionStage::Rules);
        assert_eq!(verdict.decision.action(), Action::Like);
        assert_eq!(verdict.decision.confidence(), 0.7);
    }

    #[tokio::test]
    async fn image_goes_to_vision_stage_first() {
        let dir = tempfile::tempdir().unwrap();
        let shot = write_png(dir.path(), "p.png", 540, 1200);
        let provider = ScriptedProvider::new(vec![Ok(
            r#"Sure! {"action":"pass","confidence":0.8,"reason":"not my type"}"#.into(),
        )]);
        let engine = DecisionEngine::new(registry_with(provider.clone()), hiking_criteria());

        let verdict = engine.evaluate(PROFILE, Some(&shot)).await;
        assert_eq!(verdict.stage, DecisionStage::Vision);
        assert_eq!(verdict.decision.action(), Action::Pass);
        assert_eq!(verdict.decision.reason(), "not my type");
        assert!(provider.prompts()[0].contains(PROFILE));
        assert!(provider.saw_image(0));
    }

    #[tokio::test]
    async fn vision_failure_falls_to_text_then_rules() {
        let dir = tempfile::tempdir().unwrap();
        let shot = write_png(dir.path(), "p.png", 540, 1200);
        let provider = ScriptedProvider::new(vec![
            Err(BotError::LlmProvider("503".into())),
            Ok("I'd leave a comment".into()),
        ]);
        let engine = DecisionEngine::new(registry_with(provider.clone()), hiking_criteria());

        let verdict = engine.evaluate(PROFILE, Some(&shot)).await;
        assert_eq!(verdict.stage, DecisionStage::TextOnly);
        assert_eq!(verdict.decision.action(), Action::Comment);
        assert!(!provider.saw_image(1));

        // queue exhausted: both model stages fail and the rules decide
        let verdict = engine.evaluate(PROFILE, Some(&shot)).await;
        assert_eq!(verdict.stage, DecisionStage::Rules);
        assert_eq!(verdict.decision.action(), Action::Like);
    }

    #[tokio::test]
    async fn replaced_criteria_apply_to_next_call() {
        let engine = DecisionEngine::new(Arc::new(ProviderRegistry::empty()), hiking_criteria());
        engine.replace_criteria(MatchingCriteria {
            preferred_interests: vec!["hiking".into()],
            ..Default::default()
        });
        let d = engine.decide(PROFILE, None).await;
        assert_eq!(d.action(), Action::Comment);
        assert_eq!(d.comment(), Some(COMMON_INTERESTS_COMMENT));
    }

    #[tokio::test]
    async fn generated_comment_is_unquoted() {
        let provider = ScriptedProvider::new(vec![Ok("\"Which trail is your favourite?\"\n".into())]);
        let engine = DecisionEngine::new(registry_with(provider), hiking_criteria());
        assert_eq!(engine.generate_comment(PROFILE).await, "Which trail is your favourite?");
    }

    #[tokio::test]
    async fn comment_falls_back_to_greeting() {
        let engine = DecisionEngine::new(Arc::new(ProviderRegistry::empty()), hiking_criteria());
        assert_eq!(engine.generate_comment(PROFILE).await, GENERIC_COMMENT);

        let provider = ScriptedProvider::new(vec![Ok("   ".into())]);
        let engine = DecisionEngine::new(registry_with(provider), hiking_criteria());
        assert_eq!(engine.generate_comment(PROFILE).await, GENERIC_COMMENT);
    }

    #[test]
    fn quote_stripping() {
        assert_eq!(strip_quotes("'hi'"), "hi");
        assert_eq!(strip_quotes("\"hi"), "\"hi");
        assert_eq!(strip_quotes("\""), "\"");
    }
}
