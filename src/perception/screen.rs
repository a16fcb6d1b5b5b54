use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;

use crate::errors::BotResult;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::llm::types::ChatMessage;
use crate::perception::elements::{self, LocationReply};
use crate::perception::types::{ScreenCoordinate, UiElementKind};

const PROFILE_SCREEN_PROMPT: &str = "\
Analyze this screenshot from a mobile dating app (likely Hinge).
Determine if this is a profile screen showing a person's dating profile.

Look for these indicators:
- A person's photo(s)
- Like/Pass buttons (usually heart/X or thumbs up/down)
- Profile text/bio information
- Name and age
- Dating app interface elements

Respond with only \"YES\" if this is a profile screen, or \"NO\" if it's not.";

/// Minimum screenshot height the heuristic accepts as a profile screen.
const PROFILE_MIN_HEIGHT: u32 = 1000;

/// Screen classification and element location.
///
/// Each call asks the vision role once and never caches replies. When the model is
/// unavailable or answers out of format, the classification falls back to an
/// aspect-ratio heuristic and element location falls back to fixed screen fractions.
/// Both fallbacks are coarse approximations, not detections.
pub struct ScreenPerception {
    registry: Arc<ProviderRegistry>,
}

impl ScreenPerception {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn is_profile_screen(&self, image: &Path) -> bool {
        match self.ask_vision(image, PROFILE_SCREEN_PROMPT, 10).await {
            Ok(reply) => match parse_yes_no(&reply) {
                Some(is_profile) => {
                    tracing::debug!(reply = %reply.trim(), is_profile, "AI profile screen classification");
                    is_profile
                }
                None => {
                    tracing::warn!(reply = %reply.trim(), "unrecognised classification reply, using heuristic");
                    heuristic_profile_screen(image)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "vision classification unavailable, using heuristic");
                heuristic_profile_screen(image)
            }
        }
    }

    /// Locate `kind` on the screenshot. `None` means the element is not there.
    pub async fn locate_element(&self, image: &Path, kind: UiElementKind) -> Option<ScreenCoordinate> {
        let prompt = elements::location_prompt(kind);
        match self.ask_vision(image, &prompt, 20).await {
            Ok(reply) => match elements::parse_location_reply(&reply) {
                LocationReply::At(coord) => {
                    tracing::debug!(element = %kind, x = coord.x, y = coord.y, "AI located element");
                    Some(coord)
                }
                LocationReply::NotFound => {
                    tracing::debug!(element = %kind, "AI could not find element");
                    None
                }
                LocationReply::Malformed => {
                    tracing::warn!(element = %kind, reply = %reply.trim(), "invalid coordinate format from AI");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(element = %kind, error = %e, "vision location unavailable, using fixed-ratio fallback");
                fallback_location(image, kind)
            }
        }
    }

    async fn ask_vision(&self, image: &Path, prompt: &str, max_tokens: u32) -> BotResult<String> {
        let (provider, cfg) = self.registry.call_config_for_role(Role::Vision)?;
        let data_uri = encode_image_data_uri(image).await?;
        let messages = vec![ChatMessage::user_with_image(prompt, data_uri)];
        let reply = provider
            .chat(messages, &cfg.with_default_max_tokens(max_tokens))
            .await?;
        Ok(reply.content)
    }
}

/// Exact YES / NO, case-insensitive, surrounding whitespace ignored.
pub fn parse_yes_no(reply: &str) -> Option<bool> {
    match reply.trim().to_uppercase().as_str() {
        "YES" => Some(true),
        "NO" => Some(false),
        _ => None,
    }
}

/// Portrait orientation taller than [`PROFILE_MIN_HEIGHT`]. Lossy: any tall
/// portrait screenshot passes, including menus and match screens.
pub fn heuristic_profile_screen(image: &Path) -> bool {
    match image::image_dimensions(image) {
        Ok((width, height)) => height > width && height > PROFILE_MIN_HEIGHT,
        Err(e) => {
            tracing::error!(path = %image.display(), error = %e, "cannot read screenshot for fallback detection");
            false
        }
    }
}

fn fallback_location(image: &Path, kind: UiElementKind) -> Option<ScreenCoordinate> {
    match image::image_dimensions(image) {
        Ok((width, height)) => Some(elements::fallback_position(kind, width, height)),
        Err(e) => {
            tracing::error!(path = %image.display(), error = %e, "cannot read screenshot for fallback location");
            None
        }
    }
}

/// Read an image file into a `data:` URI suitable for an `image_url` content part.
pub async fn encode_image_data_uri(path: &Path) -> BotResult<String> {
    let bytes = tokio::fs::read(path).await?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{mime};base64,{b64}"))
}
