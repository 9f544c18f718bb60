//! Placeholders for platforms without window lookup or screen capture.
//!
//! Every call fails, so the settings window still opens and reports the
//! game window as not detected.

use super::{Region, ScreenCapturer, WindowLocator};
use crate::error::{RefresherError, Result};

pub struct UnsupportedLocator {
    title: String,
}

impl UnsupportedLocator {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
        }
    }
}

impl WindowLocator for UnsupportedLocator {
    fn locate(&self) -> Result<Region> {
        log::debug!("Window lookup for \"{}\" is unavailable on this platform", self.title);
        Err(RefresherError::WindowNotFound(self.title.clone()))
    }

    fn bring_to_front(&self) -> Result<()> {
        Err(RefresherError::Unsupported("Window activation"))
    }
}

pub struct UnsupportedCapturer;

impl ScreenCapturer for UnsupportedCapturer {
    fn capture(&mut self, _region: &Region) -> Result<image::GrayImage> {
        Err(RefresherError::Unsupported("Screen capture"))
    }
}
