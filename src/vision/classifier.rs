//! Encounter text classification
//!
//! Reads the name band out of a frame with several preprocessing variants,
//! extracts known subject labels from the noisy text, and classifies the
//! encounter for the orchestrator's battle branch.

use anyhow::Result;
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::vision::fuzzy;
use crate::vision::ocr::{SegmentationMode, TextRecognizer};
use crate::vision::preprocess::Enhancement;

/// Reserved marker; its presence anywhere in the read text flags the
/// encounter, even fused into another token.
pub const MARKER_TOKEN: &str = "shiny";

/// Labels that flag the encounter no matter what the roster says.
pub const NOTABLE_LABELS: &[&str] = &[
    "chansey", "dratini", "lapras", "larvitar", "porygon", "snorlax",
];

/// Known subject names the extractor can recognize. The roster narrows
/// which of these count as ordinary for the current location; extraction
/// itself must see past the roster or an off-roster subject would read as
/// no text at all.
pub const CATALOG: &[&str] = &[
    "abra", "bellsprout", "caterpie", "chansey", "diglett", "doduo",
    "dratini", "drowzee", "ekans", "exeggcute", "gastly", "geodude",
    "goldeen", "grimer", "growlithe", "hoothoot", "kakuna", "koffing",
    "krabby", "lapras", "larvitar", "machop", "magikarp", "magnemite",
    "mankey", "marill", "meowth", "metapod", "murkrow", "nidoran",
    "oddish", "onix", "paras", "pidgeotto", "pidgey", "pikachu",
    "poliwag", "ponyta", "porygon", "psyduck", "rattata", "sandshrew",
    "sentret", "slowpoke", "snorlax", "spearow", "spinarak", "tangela",
    "tentacool", "venonat", "voltorb", "vulpix", "weedle", "wooper",
    "zubat",
];

/// Minimum concatenated text length before extraction is worth running.
const MIN_TEXT_LEN: usize = 4;

/// Minimum single-output length considered non-trivial.
const MIN_OUTPUT_LEN: usize = 3;

/// What kind of encounter the text evidence describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncounterKind {
    /// Every detected subject is on the roster.
    Ordinary,
    /// The same subject appears three or more times (horde-like).
    Duplicated,
    /// Marker token present or a notable subject detected; always pauses.
    Flagged,
    /// Off-roster subject, or nothing readable at all.
    Unknown,
}

/// Result of classifying one encounter.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterClassification {
    pub subjects: Vec<String>,
    pub kind: EncounterKind,
}

impl EncounterClassification {
    pub fn unknown_empty() -> Self {
        Self { subjects: Vec::new(), kind: EncounterKind::Unknown }
    }
}

/// Region of the frame holding the subject name band, as fractions.
#[derive(Debug, Clone, Copy)]
pub struct ReadRegion {
    pub fx: f32,
    pub fy: f32,
    pub fw: f32,
    pub fh: f32,
}

impl Default for ReadRegion {
    fn default() -> Self {
        // Name band across the top of the battle view.
        Self { fx: 0.06, fy: 0.06, fw: 0.88, fh: 0.24 }
    }
}

/// OCR-driven encounter classifier.
pub struct TextClassifier {
    recognizer: Box<dyn TextRecognizer>,
    region: ReadRegion,
    max_retries: u32,
}

impl TextClassifier {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self { recognizer, region: ReadRegion::default(), max_retries: 2 }
    }

    pub fn with_region(mut self, region: ReadRegion) -> Self {
        self.region = region;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Read whatever subject text the name band yields, retrying with the
    /// full variant sweep up to `max_retries` times. Empty on exhaustion.
    pub fn read_subjects(&mut self, frame: &Frame) -> String {
        let crop = frame
            .crop_fraction(self.region.fx, self.region.fy, self.region.fw, self.region.fh)
            .to_gray();

        for attempt in 0..=self.max_retries {
            // Distinct outputs only: every variant reading the same name
            // must not count as multiple sightings.
            let mut outputs: Vec<String> = Vec::new();
            for enhancement in Enhancement::ALL {
                let processed = enhancement.apply(&crop);
                for mode in SegmentationMode::ALL {
                    match self.recognizer.recognize(&processed, mode) {
                        Ok(text) => {
                            let trimmed = text.trim();
                            if trimmed.len() >= MIN_OUTPUT_LEN
                                && !outputs.iter().any(|o| o == trimmed)
                            {
                                outputs.push(trimmed.to_string());
                            }
                        }
                        Err(e) => debug!("recognizer failed ({enhancement:?}/{mode:?}): {e:#}"),
                    }
                }
            }
            let combined = outputs.join(" ");
            if combined.len() >= MIN_TEXT_LEN {
                debug!(attempt, "read {} chars of subject text", combined.len());
                return combined;
            }
            debug!(attempt, "subject text too short, retrying");
        }
        String::new()
    }

    /// Read and classify in one step.
    pub fn classify(&mut self, frame: &Frame, roster: &[String]) -> Result<EncounterClassification> {
        let raw = self.read_subjects(frame);
        if raw.is_empty() {
            warn!("no readable subject text after retries");
            return Ok(EncounterClassification::unknown_empty());
        }
        Ok(classify_text(&raw, roster))
    }
}

/// Extract known subject labels and their folded counts from raw text.
///
/// Strict matching runs first across the whole catalog; the permissive
/// per-label fallback only runs when the strict pass found nothing.
pub fn extract_subjects(raw: &str) -> Vec<(String, usize)> {
    let text = fuzzy::normalize(raw);
    if text.is_empty() {
        return Vec::new();
    }

    let mut found: Vec<(String, usize)> = Vec::new();
    for label in CATALOG {
        let count = fuzzy::strict_count(&text, label);
        if count > 0 {
            found.push((label.to_string(), fuzzy::fold_count(count)));
        }
    }

    if found.is_empty() {
        for label in CATALOG {
            if fuzzy::permissive_match(&text, label) {
                found.push((label.to_string(), 1));
            }
        }
    }

    found
}

/// Classify already-read text against the roster. Flagged beats Duplicated
/// beats the roster test.
pub fn classify_text(raw: &str, roster: &[String]) -> EncounterClassification {
    let normalized = fuzzy::normalize(raw);
    let extracted = extract_subjects(raw);
    let subjects: Vec<String> = extracted.iter().map(|(l, _)| l.clone()).collect();

    if subjects.is_empty() {
        return EncounterClassification::unknown_empty();
    }

    // Containment, not token equality: OCR routinely fuses the marker with
    // the name, and a false positive here only pauses the session.
    let marker_present = normalized.contains(MARKER_TOKEN);
    let notable_present = subjects.iter().any(|s| NOTABLE_LABELS.contains(&s.as_str()));
    if marker_present || notable_present {
        return EncounterClassification { subjects, kind: EncounterKind::Flagged };
    }

    if extracted.iter().any(|(_, count)| *count >= 2) {
        return EncounterClassification { subjects, kind: EncounterKind::Duplicated };
    }

    let all_on_roster = subjects
        .iter()
        .all(|s| roster.iter().any(|r| r.eq_ignore_ascii_case(s)));
    let kind = if all_on_roster { EncounterKind::Ordinary } else { EncounterKind::Unknown };
    EncounterClassification { subjects, kind }
}
