//! Reference-image matching
//!
//! Zero-mean normalized cross-correlation against named grayscale patterns.
//! References are loaded from a directory; the filename stem becomes the
//! reference name.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Reference dimensions accepted at load time. Anything smaller is likely a
/// stray icon, anything larger cannot fit a captured frame.
const MIN_REF_SIZE: (u32, u32) = (50, 20);
const MAX_REF_SIZE: (u32, u32) = (1920, 1080);

/// Confidence cutoff before any reference has loaded.
const STRICT_THRESHOLD: f32 = 0.8;
/// Relaxed cutoff once at least one reference is available.
const LOADED_THRESHOLD: f32 = 0.7;

/// A named grayscale pattern to search for.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub name: String,
    gray: GrayImage,
    pub width: u32,
    pub height: u32,
}

impl ReferenceImage {
    /// Load a reference from an image file. Dimensions outside the accepted
    /// band are rejected.
    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("failed to load reference image {path:?}"))?;
        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();

        anyhow::ensure!(
            width >= MIN_REF_SIZE.0
                && height >= MIN_REF_SIZE.1
                && width <= MAX_REF_SIZE.0
                && height <= MAX_REF_SIZE.1,
            "reference '{name}' has unusable dimensions {width}x{height}"
        );

        Ok(Self { name: name.to_string(), gray, width, height })
    }

    #[cfg(test)]
    pub fn from_gray(name: &str, gray: GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        Self { name: name.to_string(), gray, width, height }
    }

    pub fn image(&self) -> &GrayImage {
        &self.gray
    }
}

/// Outcome of matching one reference against a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub matched: bool,
    /// Best correlation score found, in [0, 1].
    pub confidence: f32,
    /// Top-left corner of the best-scoring placement, when one exists.
    pub location: Option<(u32, u32)>,
}

impl DetectionResult {
    fn miss() -> Self {
        Self { matched: false, confidence: 0.0, location: None }
    }
}

/// Holds loaded references and answers match queries against frames.
pub struct TemplateDetector {
    references: HashMap<String, ReferenceImage>,
    threshold: f32,
}

impl TemplateDetector {
    pub fn new() -> Self {
        Self {
            references: HashMap::new(),
            threshold: STRICT_THRESHOLD,
        }
    }

    /// Scan a directory for image files and load each as a reference named
    /// after its filename stem. Unreadable or out-of-band files are skipped
    /// with a warning. Returns the number of references loaded.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read reference directory {dir:?}"))?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "bmp"))
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match ReferenceImage::from_file(name, &path) {
                Ok(r) => {
                    debug!("loaded reference '{}' ({}x{})", r.name, r.width, r.height);
                    self.references.insert(r.name.clone(), r);
                    loaded += 1;
                }
                Err(e) => warn!("skipping {path:?}: {e:#}"),
            }
        }

        if !self.references.is_empty() {
            self.threshold = LOADED_THRESHOLD;
        }
        info!("{loaded} reference image(s) loaded, threshold {}", self.threshold);
        Ok(loaded)
    }

    pub fn insert(&mut self, reference: ReferenceImage) {
        self.references.insert(reference.name.clone(), reference);
        self.threshold = LOADED_THRESHOLD;
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    pub fn has_reference(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Match one named reference against a grayscale frame, reporting the
    /// best score over every placement. Fails closed (no match, zero
    /// confidence) when the reference is unknown or exceeds the frame.
    pub fn match_template(&self, frame: &GrayImage, name: &str) -> DetectionResult {
        let Some(reference) = self.references.get(name) else {
            return DetectionResult::miss();
        };
        self.match_reference(frame, reference)
    }

    /// Whether any loaded reference clears the threshold somewhere in the
    /// frame. References are evaluated in parallel; no tie-breaking.
    pub fn match_any(&self, frame: &GrayImage) -> bool {
        self.references
            .par_iter()
            .any(|(_, r)| self.match_reference(frame, r).matched)
    }

    fn match_reference(&self, frame: &GrayImage, reference: &ReferenceImage) -> DetectionResult {
        let (img_w, img_h) = frame.dimensions();
        let (ref_w, ref_h) = (reference.width, reference.height);

        if ref_w > img_w || ref_h > img_h {
            debug!(
                "reference '{}' ({ref_w}x{ref_h}) exceeds frame ({img_w}x{img_h})",
                reference.name
            );
            return DetectionResult::miss();
        }

        let mut best_score = 0.0f32;
        let mut best_pos = (0u32, 0u32);

        for y in 0..=(img_h - ref_h) {
            for x in 0..=(img_w - ref_w) {
                let score = normalized_cross_correlation(frame, reference.image(), x, y);
                if score > best_score {
                    best_score = score;
                    best_pos = (x, y);
                }
            }
        }

        let matched = best_score >= self.threshold;
        DetectionResult {
            matched,
            confidence: best_score,
            location: matched.then_some(best_pos),
        }
    }
}

impl Default for TemplateDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero-mean normalized cross-correlation between a frame region and a
/// reference, anchored at (x, y).
fn normalized_cross_correlation(image: &GrayImage, reference: &GrayImage, x: u32, y: u32) -> f32 {
    let (ref_w, ref_h) = reference.dimensions();

    let mut sum_it = 0.0f64;
    let mut sum_i2 = 0.0f64;
    let mut sum_t2 = 0.0f64;
    let mut sum_i = 0.0f64;
    let mut sum_t = 0.0f64;
    let count = (ref_w as f64) * (ref_h as f64);

    for ty in 0..ref_h {
        for tx in 0..ref_w {
            let img_val = image.get_pixel(x + tx, y + ty).0[0] as f64;
            let ref_val = reference.get_pixel(tx, ty).0[0] as f64;

            sum_it += img_val * ref_val;
            sum_i2 += img_val * img_val;
            sum_t2 += ref_val * ref_val;
            sum_i += img_val;
            sum_t += ref_val;
        }
    }

    if count == 0.0 {
        return 0.0;
    }

    let mean_i = sum_i / count;
    let mean_t = sum_t / count;

    let numerator = sum_it - count * mean_i * mean_t;
    let denom_i = (sum_i2 - count * mean_i * mean_i).sqrt();
    let denom_t = (sum_t2 - count * mean_t * mean_t).sqrt();
    let denominator = denom_i * denom_t;

    // Flat patches have no structure to correlate against.
    if denominator < 1e-10 {
        return 0.0;
    }

    (numerator / denominator).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn striped(width: u32, height: u32, period: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            Luma([if (x / period) % 2 == 0 { 220 } else { 30 }])
        })
    }

    #[test]
    fn ncc_perfect_match_scores_near_one() {
        let img = striped(20, 10, 2);
        let tmpl = striped(8, 4, 2);
        let score = normalized_cross_correlation(&img, &tmpl, 0, 0);
        assert!(score > 0.99, "got {score}");
    }

    #[test]
    fn ncc_flat_region_scores_zero() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));
        let tmpl = striped(4, 4, 1);
        let score = normalized_cross_correlation(&img, &tmpl, 0, 0);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn oversized_reference_fails_closed() {
        let mut detector = TemplateDetector::new();
        detector.insert(ReferenceImage::from_gray("big", striped(30, 30, 2)));

        let frame = striped(10, 10, 2);
        let result = detector.match_template(&frame, "big");
        assert!(!result.matched);
        assert_eq!(result.confidence, 0.0);
        assert!(result.location.is_none());
    }

    #[test]
    fn unknown_reference_fails_closed() {
        let detector = TemplateDetector::new();
        let frame = striped(10, 10, 2);
        assert!(!detector.match_template(&frame, "missing").matched);
    }

    #[test]
    fn embedded_pattern_is_located() {
        let mut frame = GrayImage::from_pixel(30, 30, Luma([128]));
        let pattern = striped(8, 6, 2);
        image::imageops::overlay(&mut frame, &pattern, 12, 9);

        let mut detector = TemplateDetector::new();
        detector.insert(ReferenceImage::from_gray("stripes", pattern));

        let result = detector.match_template(&frame, "stripes");
        assert!(result.matched);
        assert!(result.confidence > 0.99);
        assert_eq!(result.location, Some((12, 9)));
    }

    #[test]
    fn noise_degrades_confidence() {
        let pattern = striped(12, 8, 2);
        let mut detector = TemplateDetector::new();
        detector.insert(ReferenceImage::from_gray("stripes", pattern.clone()));

        let clean = GrayImage::from_fn(40, 40, |x, y| {
            if (8..20).contains(&x) && (10..18).contains(&y) {
                *pattern.get_pixel(x - 8, y - 10)
            } else {
                Luma([128])
            }
        });
        // Deterministic per-pixel perturbation standing in for noise.
        let perturb = |img: &GrayImage, amplitude: i16| {
            GrayImage::from_fn(img.width(), img.height(), |x, y| {
                let v = img.get_pixel(x, y).0[0] as i16;
                let offset = (((x * 31 + y * 17) % 13) as i16 - 6) * amplitude / 6;
                Luma([(v + offset).clamp(0, 255) as u8])
            })
        };

        let base = detector.match_template(&clean, "stripes").confidence;
        let mild = detector.match_template(&perturb(&clean, 20), "stripes").confidence;
        let heavy = detector.match_template(&perturb(&clean, 80), "stripes").confidence;

        assert!(base >= 0.99, "got {base}");
        assert!(mild <= base);
        assert!(heavy <= mild, "heavy {heavy} vs mild {mild}");
    }

    #[test]
    fn match_any_false_without_references() {
        let detector = TemplateDetector::new();
        let frame = striped(10, 10, 2);
        assert!(!detector.match_any(&frame));
    }

    #[test]
    fn threshold_relaxes_after_load() {
        let mut detector = TemplateDetector::new();
        assert_eq!(detector.threshold(), STRICT_THRESHOLD);
        detector.insert(ReferenceImage::from_gray("a", striped(8, 4, 2)));
        assert_eq!(detector.threshold(), LOADED_THRESHOLD);
    }

    #[test]
    fn load_directory_rejects_out_of_band_sizes() {
        let dir = tempfile::tempdir().unwrap();
        // Too small in both dimensions.
        striped(10, 5, 2).save(dir.path().join("tiny.png")).unwrap();
        // In-band.
        striped(60, 30, 3).save(dir.path().join("menu.png")).unwrap();
        // Not an image extension; ignored.
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut detector = TemplateDetector::new();
        let loaded = detector.load_directory(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert!(detector.has_reference("menu"));
        assert!(!detector.has_reference("tiny"));
    }
}
