//! Perception layer
//!
//! Combines reference-image matching, pixel statistics and OCR-driven text
//! classification into the yes/no and what-is-it answers the orchestrator
//! consumes. Every query degrades to "not detected" rather than erroring.

pub mod classifier;
pub mod fuzzy;
pub mod ocr;
pub mod preprocess;
pub mod state;
pub mod template;

pub use classifier::{EncounterClassification, EncounterKind, TextClassifier};
pub use state::CompositeStateDetector;
pub use template::{DetectionResult, TemplateDetector};
