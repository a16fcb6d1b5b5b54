use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;

use crate::config::OcrConfig;
use crate::errors::BotResult;
use crate::ocr::engine::{words_to_text, OcrEngine, OcrWord};
use crate::ocr::preprocess::{self, PreprocessSettings, Region};

/// Character fixes applied after recognition. Digits are left alone so ages survive.
const SUBSTITUTIONS: &[(char, char)] = &[('|', 'I'), ('\u{2018}', '\''), ('\u{2019}', '\''), ('\u{201C}', '"'), ('\u{201D}', '"')];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    Age,
    Bio,
    Prompts,
}

impl ProfileField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Age => "age",
            ProfileField::Bio => "bio",
            ProfileField::Prompts => "prompts",
        }
    }

    /// Fixed proportional layout of a profile screenshot. Coarse: it assumes the
    /// name sits in the top quarter and free text in the bottom half.
    pub fn region(&self, width: u32, height: u32) -> Region {
        match self {
            ProfileField::Name => Region::new(0, 0, width, height / 4),
            ProfileField::Age => Region::new(0, height / 4, width / 3, height / 8),
            ProfileField::Bio | ProfileField::Prompts => Region::new(0, height / 2, width, height / 2),
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OCR front end. Every operation is total: failures are logged and yield
/// empty results.
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    settings: PreprocessSettings,
    min_confidence: f32,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, cfg: &OcrConfig) -> Self {
        Self {
            engine,
            settings: PreprocessSettings::from(cfg),
            min_confidence: cfg.min_confidence,
        }
    }

    pub async fn extract_text(&self, image: &Path, region: Option<Region>) -> String {
        match self.recognize(image, region).await {
            Ok(words) => {
                let text = clean_text(&words_to_text(&words));
                tracing::debug!(chars = text.len(), preview = %preview(&text), "extracted text");
                text
            }
            Err(e) => {
                tracing::error!(path = %image.display(), ?region, error = %e, "text extraction failed");
                String::new()
            }
        }
    }

    /// Text per layout field; fields with no text are left out.
    pub async fn extract_profile_info(&self, image: &Path) -> BTreeMap<ProfileField, String> {
        let mut info = BTreeMap::new();
        let (width, height) = match image::image_dimensions(image) {
            Ok(dims) => dims,
            Err(e) => {
                tracing::error!(path = %image.display(), error = %e, "cannot read screenshot for profile info");
                return info;
            }
        };
        for field in [ProfileField::Name, ProfileField::Age, ProfileField::Bio, ProfileField::Prompts] {
            let text = self.extract_text(image, Some(field.region(width, height))).await;
            let text = text.trim();
            if !text.is_empty() {
                info.insert(field, text.to_string());
            }
        }
        info
    }

    /// Words above the configured minimum confidence, with their boxes.
    pub async fn extract_text_with_confidence(&self, image: &Path) -> Vec<OcrWord> {
        match self.recognize(image, None).await {
            Ok(words) => words
                .into_iter()
                .filter(|w| w.confidence > self.min_confidence && !w.text.trim().is_empty())
                .collect(),
            Err(e) => {
                tracing::error!(path = %image.display(), error = %e, "confidence extraction failed");
                Vec::new()
            }
        }
    }

    /// True when the region holds more than 10 recognised characters.
    pub async fn is_text_region(&self, image: &Path, region: Region) -> bool {
        self.extract_text(image, Some(region)).await.trim().chars().count() > 10
    }

    async fn recognize(&self, image: &Path, region: Option<Region>) -> BotResult<Vec<OcrWord>> {
        let img = load(image).await?;
        let Some(prepared) = preprocess::prepare(&img, region, &self.settings) else {
            tracing::debug!(?region, "region outside image, nothing to recognise");
            return Ok(Vec::new());
        };
        self.engine.recognize(&prepared).await
    }
}

async fn load(path: &Path) -> BotResult<DynamicImage> {
    let bytes = tokio::fs::read(path).await?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Collapse whitespace inside lines, drop empty lines and apply [`SUBSTITUTIONS`].
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.chars()
                .map(|c| {
                    SUBSTITUTIONS
                        .iter()
                        .find(|(from, _)| *from == c)
                        .map_or(c, |(_, to)| *to)
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
