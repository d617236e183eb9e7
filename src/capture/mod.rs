//! Screen Capture Layer
//!
//! Read-only perception of the target window. Capture failures are soft:
//! callers receive `None` and decide how to degrade, the layer never panics.

pub mod frame;

pub use frame::Frame;

use tracing::{debug, warn};
use xcap::Window;

/// Sub-region of the capture area in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Source of frames for the perception layer.
///
/// Implementations must treat failure as a transient condition: return
/// `None` when the target cannot currently be perceived and let callers
/// retry on a later frame.
pub trait FrameSource: Send {
    /// Capture the entire tracked area.
    fn capture_full_area(&mut self) -> Option<Frame>;

    /// Capture a sub-region of the tracked area.
    fn capture_sub_area(&mut self, region: CaptureRegion) -> Option<Frame> {
        self.capture_full_area()
            .map(|f| f.crop(region.x, region.y, region.width, region.height))
    }
}

/// xcap-backed source that tracks a window by title substring.
///
/// The window handle is re-resolved whenever a capture fails, so the
/// session survives the target being re-created (e.g. a game relaunch).
pub struct WindowFrameSource {
    title_fragment: String,
    window: Option<Window>,
}

impl WindowFrameSource {
    pub fn new(title_fragment: impl Into<String>) -> Self {
        Self {
            title_fragment: title_fragment.into().to_lowercase(),
            window: None,
        }
    }

    fn resolve_window(&mut self) -> Option<&Window> {
        if self.window.is_none() {
            let windows = match Window::all() {
                Ok(windows) => windows,
                Err(e) => {
                    warn!("window enumeration failed: {e}");
                    return None;
                }
            };
            self.window = windows.into_iter().find(|w| {
                let title = w.title().unwrap_or_default().to_lowercase();
                let app = w.app_name().unwrap_or_default().to_lowercase();
                title.contains(&self.title_fragment) || app.contains(&self.title_fragment)
            });
            match &self.window {
                Some(w) => debug!(title = ?w.title(), "resolved target window"),
                None => warn!("no window matching '{}'", self.title_fragment),
            }
        }
        self.window.as_ref()
    }
}

impl FrameSource for WindowFrameSource {
    fn capture_full_area(&mut self) -> Option<Frame> {
        let window = self.resolve_window()?;
        match window.capture_image() {
            Ok(img) => {
                let (width, height) = img.dimensions();
                Frame::from_rgba(img.into_raw(), width, height)
            }
            Err(e) => {
                // Stale handle; drop it and re-resolve on the next capture.
                warn!("capture failed, will re-resolve window: {e}");
                self.window = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    struct FixedSource {
        frame: Frame,
    }

    impl FrameSource for FixedSource {
        fn capture_full_area(&mut self) -> Option<Frame> {
            Some(self.frame.clone())
        }
    }

    #[test]
    fn default_sub_area_crops_full_capture() {
        let gray = GrayImage::from_pixel(20, 20, image::Luma([128]));
        let mut source = FixedSource { frame: Frame::from_gray(&gray) };
        let sub = source
            .capture_sub_area(CaptureRegion { x: 5, y: 5, width: 10, height: 4 })
            .unwrap();
        assert_eq!((sub.width, sub.height), (10, 4));
    }
}
