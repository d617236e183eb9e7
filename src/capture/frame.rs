//! Captured frame container shared by all detectors.

use image::{GrayImage, Luma};

/// A single captured frame in RGBA byte order.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixel data, row-major
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Create a frame from raw RGBA bytes. Returns `None` if the buffer
    /// does not match the stated dimensions.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 4 {
            return None;
        }
        Some(Self { data, width, height })
    }

    /// Build a frame from a grayscale image. Each gray value is replicated
    /// into the RGB channels; mostly useful for synthetic frames in tests.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for p in gray.pixels() {
            let v = p.0[0];
            data.extend_from_slice(&[v, v, v, 255]);
        }
        Self { data, width, height }
    }

    /// Convert to grayscale using standard luminance weights.
    pub fn to_gray(&self) -> GrayImage {
        let mut gray = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = ((y * self.width + x) * 4) as usize;
                let r = self.data[idx] as f32;
                let g = self.data[idx + 1] as f32;
                let b = self.data[idx + 2] as f32;
                let v = (0.299 * r + 0.587 * g + 0.114 * b) as u8;
                gray.put_pixel(x, y, Luma([v]));
            }
        }
        gray
    }

    /// Extract a sub-frame, clamping the requested rectangle to the frame
    /// bounds. A fully out-of-bounds request yields a 1x1 frame.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Frame {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        let w = w.min(self.width - x).max(1);
        let h = h.min(self.height - y).max(1);

        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for row in y..(y + h) {
            let start = ((row * self.width + x) * 4) as usize;
            let end = start + (w * 4) as usize;
            data.extend_from_slice(&self.data[start..end]);
        }

        Frame { data, width: w, height: h }
    }

    /// The lower half of the frame, where response menus render.
    pub fn bottom_half(&self) -> Frame {
        let top = self.height / 2;
        self.crop(0, top, self.width, self.height - top)
    }

    /// Crop by normalized fractions of the frame dimensions.
    pub fn crop_fraction(&self, fx: f32, fy: f32, fw: f32, fh: f32) -> Frame {
        let x = (fx.clamp(0.0, 1.0) * self.width as f32) as u32;
        let y = (fy.clamp(0.0, 1.0) * self.height as f32) as u32;
        let w = (fw.clamp(0.0, 1.0) * self.width as f32).ceil() as u32;
        let h = (fh.clamp(0.0, 1.0) * self.height as f32).ceil() as u32;
        self.crop(x, y, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> Frame {
        let gray = GrayImage::from_fn(width, height, |x, y| {
            Luma([if (x + y) % 2 == 0 { 200 } else { 40 }])
        });
        Frame::from_gray(&gray)
    }

    #[test]
    fn from_rgba_rejects_bad_length() {
        assert!(Frame::from_rgba(vec![0u8; 15], 2, 2).is_none());
        assert!(Frame::from_rgba(vec![0u8; 16], 2, 2).is_some());
    }

    #[test]
    fn gray_roundtrip_preserves_values() {
        let frame = checkerboard(4, 4);
        let gray = frame.to_gray();
        assert_eq!(gray.get_pixel(0, 0).0[0], 200);
        assert_eq!(gray.get_pixel(1, 0).0[0], 40);
    }

    #[test]
    fn crop_clamps_to_bounds() {
        let frame = checkerboard(10, 10);
        let sub = frame.crop(8, 8, 50, 50);
        assert_eq!((sub.width, sub.height), (2, 2));
    }

    #[test]
    fn bottom_half_dimensions() {
        let frame = checkerboard(8, 10);
        let bottom = frame.bottom_half();
        assert_eq!((bottom.width, bottom.height), (8, 5));
    }
}
