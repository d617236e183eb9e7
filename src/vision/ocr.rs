//! Text recognition
//!
//! Wraps the ocrs engine behind a small trait so the classifier (and its
//! tests) never depend on the real models being present.

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::Path;

/// How the recognizer should segment the crop into text.
///
/// The reader sweeps these modes because name bands sometimes render as one
/// tight line and sometimes as scattered labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    /// Treat the crop as a uniform block of text.
    Block,
    /// Find sparse text scattered over the crop.
    SparseText,
    /// Treat the crop as a single text line.
    SingleLine,
}

impl SegmentationMode {
    pub const ALL: [SegmentationMode; 3] = [
        SegmentationMode::Block,
        SegmentationMode::SparseText,
        SegmentationMode::SingleLine,
    ];
}

/// Turns a grayscale crop into whatever text it can read.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, gray: &GrayImage, mode: SegmentationMode) -> Result<String>;
}

/// ocrs-backed recognizer.
pub struct OcrsRecognizer {
    engine: OcrEngine,
}

impl OcrsRecognizer {
    /// Build an engine from the standard model cache
    /// (`~/.cache/ocrs/text-{detection,recognition}.rten`).
    pub fn from_default_models() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME not set")?;
        let cache = Path::new(&home).join(".cache/ocrs");
        Self::from_model_files(
            &cache.join("text-detection.rten"),
            &cache.join("text-recognition.rten"),
        )
    }

    pub fn from_model_files(detection: &Path, recognition: &Path) -> Result<Self> {
        let detection_model = Model::load_file(detection)
            .with_context(|| format!("failed to load detection model {detection:?}"))?;
        let recognition_model = Model::load_file(recognition)
            .with_context(|| format!("failed to load recognition model {recognition:?}"))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })?;

        Ok(Self { engine })
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&mut self, gray: &GrayImage, mode: SegmentationMode) -> Result<String> {
        let rgb = DynamicImage::ImageLuma8(gray.clone()).to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height))?;
        let input = self.engine.prepare_input(source)?;

        let word_rects = self.engine.detect_words(&input)?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let line_texts = self.engine.recognize_text(&input, &line_rects)?;

        let lines: Vec<String> = line_texts
            .into_iter()
            .flatten()
            .map(|l| l.to_string())
            .filter(|l| !l.trim().is_empty())
            .collect();

        // The engine segments on its own; the mode only changes how we
        // stitch the lines back together.
        let joined = match mode {
            SegmentationMode::SingleLine => lines.join(" "),
            SegmentationMode::Block | SegmentationMode::SparseText => lines.join("\n"),
        };
        Ok(joined)
    }
}
