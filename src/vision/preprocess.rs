//! Grayscale preprocessing variants for the text reader
//!
//! Game text renders over noisy backdrops, so the reader tries several
//! enhanced renditions of the same crop and keeps whatever any of them
//! yields.

use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::sharpen_gaussian;
use imageproc::morphology::open;

/// The enhancement applied to a crop before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enhancement {
    /// Mild contrast stretch around the midpoint (x1.5).
    ContrastMild,
    /// Aggressive contrast stretch (x2.5).
    ContrastStrong,
    /// Unsharp-mask sharpening.
    Sharpen,
    /// Otsu binary threshold.
    Binary,
    /// Binary threshold followed by a morphological open to drop speckle.
    BinaryOpened,
}

impl Enhancement {
    /// Every variant, in the order the reader tries them.
    pub const ALL: [Enhancement; 5] = [
        Enhancement::ContrastMild,
        Enhancement::ContrastStrong,
        Enhancement::Sharpen,
        Enhancement::Binary,
        Enhancement::BinaryOpened,
    ];

    pub fn apply(self, gray: &GrayImage) -> GrayImage {
        match self {
            Enhancement::ContrastMild => stretch_contrast(gray, 1.5),
            Enhancement::ContrastStrong => stretch_contrast(gray, 2.5),
            Enhancement::Sharpen => sharpen_gaussian(gray, 1.0, 1.5),
            Enhancement::Binary => binarize(gray),
            Enhancement::BinaryOpened => open(&binarize(gray), Norm::LInf, 1),
        }
    }
}

/// Contrast stretch around the midpoint (128). Factor > 1 increases
/// contrast.
fn stretch_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        let v = p.0[0] as f32;
        p.0[0] = ((v - 128.0) * factor + 128.0).clamp(0.0, 255.0) as u8;
    }
    out
}

fn binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    threshold(gray, level, ThresholdType::Binary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn contrast_pushes_values_apart() {
        let gray = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 100 } else { 160 }]));
        let out = stretch_contrast(&gray, 2.0);
        // (100-128)*2+128 = 72, (160-128)*2+128 = 192
        assert_eq!(out.get_pixel(0, 0).0[0], 72);
        assert_eq!(out.get_pixel(1, 0).0[0], 192);
    }

    #[test]
    fn contrast_clamps_extremes() {
        let gray = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 10 } else { 250 }]));
        let out = stretch_contrast(&gray, 2.5);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn binarize_separates_text_from_backdrop() {
        let gray = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 40 } else { 210 }]));
        let out = binarize(&gray);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(9, 0).0[0], 255);
    }

    #[test]
    fn all_variants_preserve_dimensions() {
        let gray = GrayImage::from_pixel(16, 8, Luma([90]));
        for e in Enhancement::ALL {
            let out = e.apply(&gray);
            assert_eq!(out.dimensions(), (16, 8), "{e:?}");
        }
    }
}
