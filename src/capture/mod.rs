//! Window discovery and screen capture for the game window.
//!
//! This module provides:
//! - The `Region` of the game window in screen pixels
//! - Window lookup (`WindowLocator`) with a best-effort `RegionTracker`
//! - Grayscale region capture (`ScreenCapturer`)

pub mod screenshot;
#[cfg(not(windows))]
mod unsupported;
#[cfg(windows)]
pub mod window;

use crate::error::Result;

/// A rectangle in screen pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Converts a point given as ratios of the region into screen coordinates.
    pub fn point_at(&self, x_ratio: f32, y_ratio: f32) -> (i32, i32) {
        (
            self.left + (self.width as f32 * x_ratio).round() as i32,
            self.top + (self.height as f32 * y_ratio).round() as i32,
        )
    }

    /// Converts a point relative to the region origin into screen coordinates.
    pub fn to_screen(&self, x: u32, y: u32) -> (i32, i32) {
        (self.left + x as i32, self.top + y as i32)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Finds the game window on screen.
pub trait WindowLocator: Send {
    /// Returns the current client area of the window. Never cached.
    fn locate(&self) -> Result<Region>;

    /// Brings the window to the foreground.
    fn bring_to_front(&self) -> Result<()>;
}

/// Captures screen pixels as a single-channel image.
pub trait ScreenCapturer: Send {
    /// Captures exactly `region` at native pixel density, converted to grayscale.
    fn capture(&mut self, region: &Region) -> Result<image::GrayImage>;
}

/// Re-resolves the window region before every action and falls back to the
/// last known region when a lookup fails mid-session.
pub struct RegionTracker {
    locator: Box<dyn WindowLocator>,
    last: Option<Region>,
}

impl RegionTracker {
    pub fn new(locator: Box<dyn WindowLocator>) -> Self {
        Self {
            locator,
            last: None,
        }
    }

    /// Looks the window up and remembers the result. Errors are returned as is.
    pub fn refresh(&mut self) -> Result<Region> {
        let region = self.locator.locate()?;
        self.last = Some(region);
        Ok(region)
    }

    /// Returns the live region, or the last known one if the lookup fails.
    pub fn current(&mut self) -> Result<Region> {
        match self.refresh() {
            Ok(region) => Ok(region),
            Err(e) => match self.last {
                Some(region) => {
                    log::warn!("Window lookup failed ({}), reusing last known region", e);
                    Ok(region)
                }
                None => Err(e),
            },
        }
    }

    pub fn bring_to_front(&self) -> Result<()> {
        self.locator.bring_to_front()
    }
}

/// Creates the window locator for the current OS.
pub fn create_locator(title: &str, process_name: Option<&str>) -> Box<dyn WindowLocator> {
    #[cfg(windows)]
    {
        Box::new(window::Win32WindowLocator::new(title, process_name))
    }
    #[cfg(not(windows))]
    {
        let _ = process_name;
        Box::new(unsupported::UnsupportedLocator::new(title))
    }
}

/// Creates the screen capturer for the current OS.
pub fn create_capturer() -> Box<dyn ScreenCapturer> {
    #[cfg(windows)]
    {
        Box::new(screenshot::GdiScreenCapturer)
    }
    #[cfg(not(windows))]
    {
        Box::new(unsupported::UnsupportedCapturer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefresherError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyLocator {
        calls: Arc<AtomicUsize>,
    }

    impl WindowLocator for FlakyLocator {
        fn locate(&self) -> Result<Region> {
            // Succeeds on the first call only
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Region::new(100, 50, 800, 600))
            } else {
                Err(RefresherError::WindowNotFound("Epic Seven".to_string()))
            }
        }

        fn bring_to_front(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_point_at() {
        let region = Region::new(100, 50, 800, 600);
        assert_eq!(region.point_at(0.5, 0.5), (500, 350));
        assert_eq!(region.point_at(0.0, 1.0), (100, 650));
        assert_eq!(region.to_screen(10, 20), (110, 70));
    }

    #[test]
    fn test_tracker_reuses_last_region() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tracker = RegionTracker::new(Box::new(FlakyLocator {
            calls: calls.clone(),
        }));

        let first = tracker.current().unwrap();
        let second = tracker.current().unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Strict lookups still report the failure
        assert!(tracker.refresh().is_err());
    }

    #[test]
    fn test_tracker_without_history_fails() {
        let calls = Arc::new(AtomicUsize::new(1));
        let mut tracker = RegionTracker::new(Box::new(FlakyLocator { calls }));
        assert!(matches!(
            tracker.current(),
            Err(RefresherError::WindowNotFound(_))
        ));
    }
}
