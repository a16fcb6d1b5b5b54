use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::GrayImage;
use serde::Serialize;

use crate::config::OcrConfig;
use crate::errors::{BotError, BotResult};
use crate::ocr::preprocess::Region;

/// One recognised word.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrWord {
    pub text: String,
    /// 0..=100, as reported by the engine.
    pub confidence: f32,
    pub bbox: Region,
    /// (block, paragraph, line) the word belongs to, used to rebuild lines.
    #[serde(skip)]
    pub line: (u32, u32, u32),
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognise the words of an already preprocessed image, in reading order.
    async fn recognize(&self, image: &GrayImage) -> BotResult<Vec<OcrWord>>;
}

/// Runs the `tesseract` executable with TSV output.
pub struct TesseractEngine {
    binary: String,
    tessdata_dir: Option<PathBuf>,
    language: String,
    psm: u8,
    char_whitelist: Option<String>,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(cfg: &OcrConfig) -> Self {
        Self {
            binary: cfg.tesseract_path.clone(),
            tessdata_dir: cfg.tessdata_dir.clone(),
            language: cfg.language.clone(),
            psm: cfg.psm,
            char_whitelist: cfg.char_whitelist.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    fn args(&self, input: &std::path::Path) -> Vec<String> {
        let mut args = vec![
            input.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "--psm".to_string(),
            self.psm.to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        if let Some(dir) = &self.tessdata_dir {
            args.push("--tessdata-dir".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        if let Some(whitelist) = &self.char_whitelist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={whitelist}"));
        }
        args.push("tsv".to_string());
        args
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &GrayImage) -> BotResult<Vec<OcrWord>> {
        let input = tempfile::Builder::new()
            .prefix("ocr_")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(input.path(), image::ImageFormat::Png)?;

        let args = self.args(input.path());
        tracing::debug!(binary = %self.binary, ?args, "running tesseract");

        let child = tokio::process::Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| BotError::Timeout(format!("tesseract after {:?}", self.timeout)))?
            .map_err(|e| BotError::Ocr(format!("cannot run '{}': {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BotError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(words = words.len(), "tesseract finished");
        Ok(words)
    }
}

/// Parse tesseract's TSV output, keeping word-level rows with text and a
/// non-negative confidence.
pub fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();
    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let nums: Option<Vec<u32>> = cols[2..10].iter().map(|c| c.trim().parse().ok()).collect();
        let Some(nums) = nums else { continue };
        let Ok(confidence) = cols[10].trim().parse::<f32>() else {
            continue;
        };
        if confidence < 0.0 {
            continue;
        }
        words.push(OcrWord {
            text: text.to_string(),
            confidence,
            bbox: Region::new(nums[4], nums[5], nums[6], nums[7]),
            line: (nums[0], nums[1], nums[2]),
        });
    }
    words
}

/// Join words into lines, one line per (block, paragraph, line) run.
pub fn words_to_text(words: &[OcrWord]) -> String {
    let mut out = String::new();
    let mut current: Option<(u32, u32, u32)> = None;
    for word in words {
        match current {
            Some(line) if line == word.line => out.push(' '),
            Some(_) => out.push('\n'),
            None => {}
        }
        out.push_str(&word.text);
        current = Some(word.line);
    }
    out
}
