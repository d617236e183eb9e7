//! Composite screen-state queries
//!
//! Each query ORs independent signals (reference matching, pixel
//! statistics) and short-circuits on the first positive. A failure inside
//! one sub-signal never takes down the query; the signal just reads absent.

use std::panic::{catch_unwind, AssertUnwindSafe};

use image::GrayImage;
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::vision::template::TemplateDetector;

/// Reference name consulted for the pre-transition flash.
pub const PRE_TRANSITION_REF: &str = "pre_battle";
/// Reference name consulted for the stuck-dialog overlay.
pub const STUCK_DIALOG_REF: &str = "stuck_dialog";

/// Fraction of the frame height treated as the dialog strip.
const DIALOG_STRIP_FRACTION: f32 = 0.2;
/// A dialog strip is "dark" when this share of its pixels sit below
/// `DIALOG_DARK_LEVEL`.
const DIALOG_DARK_SHARE: f64 = 0.9;
const DIALOG_DARK_LEVEL: u8 = 25;
/// Whole-frame blackout: mean below this and most pixels near black.
const BLACKOUT_MEAN: f64 = 30.0;
const BLACKOUT_DARK_SHARE: f64 = 0.6;
const BLACKOUT_DARK_LEVEL: u8 = 15;

/// Answers the orchestrator's three screen-state questions.
pub struct CompositeStateDetector {
    templates: TemplateDetector,
}

impl CompositeStateDetector {
    pub fn new(templates: TemplateDetector) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &TemplateDetector {
        &self.templates
    }

    /// Is a response menu on screen? Looks only at the bottom half, where
    /// the menu renders. Template evidence is mandatory: with no references
    /// loaded this is deterministically `false`.
    pub fn response_menu_visible(&self, frame: &Frame) -> bool {
        if self.templates.reference_count() == 0 {
            return false;
        }
        let bottom = frame.bottom_half().to_gray();
        contained(|| self.templates.match_any(&bottom)).unwrap_or(false)
    }

    /// Is the pre-transition flash on screen? A single named reference, no
    /// pixel fallback.
    pub fn pre_transition_visible(&self, frame: &Frame) -> bool {
        contained(|| {
            let gray = frame.to_gray();
            self.templates.match_template(&gray, PRE_TRANSITION_REF).matched
        })
        .unwrap_or(false)
    }

    /// Is a blocking dialog on screen? OR of three signals: the named
    /// reference, a near-black bottom strip, and a whole-frame blackout.
    pub fn blocking_dialog_visible(&self, frame: &Frame) -> bool {
        let by_template = contained(|| {
            let gray = frame.to_gray();
            self.templates.match_template(&gray, STUCK_DIALOG_REF).matched
        })
        .unwrap_or(false);
        if by_template {
            debug!("blocking dialog: reference match");
            return true;
        }

        let by_strip = contained(|| {
            let strip_y = 1.0 - DIALOG_STRIP_FRACTION;
            let strip = frame
                .crop_fraction(0.0, strip_y, 1.0, DIALOG_STRIP_FRACTION)
                .to_gray();
            dark_fraction(&strip, DIALOG_DARK_LEVEL) > DIALOG_DARK_SHARE
        })
        .unwrap_or(false);
        if by_strip {
            debug!("blocking dialog: dark bottom strip");
            return true;
        }

        let by_blackout = contained(|| {
            let gray = frame.to_gray();
            mean_brightness(&gray) < BLACKOUT_MEAN
                && dark_fraction(&gray, BLACKOUT_DARK_LEVEL) > BLACKOUT_DARK_SHARE
        })
        .unwrap_or(false);
        if by_blackout {
            debug!("blocking dialog: frame blackout");
        }
        by_blackout
    }
}

/// Run a sub-signal, converting a panic into "signal absent".
fn contained<T>(f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("state sub-signal panicked, treating as absent");
            None
        }
    }
}

/// Mean pixel value of a grayscale image.
pub fn mean_brightness(gray: &GrayImage) -> f64 {
    let total: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    let count = (gray.width() as u64) * (gray.height() as u64);
    if count == 0 {
        return 0.0;
    }
    total as f64 / count as f64
}

/// Fraction of pixels strictly below `level`.
pub fn dark_fraction(gray: &GrayImage, level: u8) -> f64 {
    let count = (gray.width() as u64) * (gray.height() as u64);
    if count == 0 {
        return 0.0;
    }
    let dark = gray.pixels().filter(|p| p.0[0] < level).count() as u64;
    dark as f64 / count as f64
}
