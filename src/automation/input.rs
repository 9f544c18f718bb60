//! Mouse input simulation for the shop automation.
//!
//! Clicks are injected with `SendInput`, which the game processes like
//! hardware input (window messages sent with `PostMessage` are ignored by the
//! client because it validates focus state). The OS backend only knows how
//! to move, press and release; pacing and jitter live in `InputSimulator`.

use std::time::Duration;

use rand::Rng;

use crate::automation::config::{ButtonConfig, SessionSettings, secs};
use crate::automation::runner::CancellationSignal;
use crate::capture::Region;
use crate::error::{RefresherError, Result};

/// Interval between intermediate pointer positions while gliding.
const GLIDE_STEP: Duration = Duration::from_millis(10);

/// Low-level pointer backend.
pub trait InputDevice: Send {
    /// Current pointer position in screen pixels.
    fn cursor_position(&self) -> Result<(i32, i32)>;
    /// Moves the pointer to an absolute screen position.
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    /// Presses the left button at the current position.
    fn press(&mut self) -> Result<()>;
    /// Releases the left button at the current position.
    fn release(&mut self) -> Result<()>;
}

/// Pacing for simulated input, taken from the session settings.
#[derive(Clone, Debug)]
pub struct InputPacing {
    /// Pointer travel time and center of the post-click wait
    pub mouse_delay: Duration,
    /// Spread of the post-click wait around `mouse_delay`
    pub click_jitter: Duration,
    /// Maximum click offset in pixels, each axis
    pub position_jitter_px: i32,
    /// Travel to the start of a drag
    pub drag_move: Duration,
    /// Duration of the drag
    pub drag: Duration,
    /// Wait after a drag
    pub drag_settle: Duration,
}

impl InputPacing {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            mouse_delay: settings.mouse_delay,
            click_jitter: secs(settings.timings.click_jitter_secs),
            position_jitter_px: settings.timings.position_jitter_px.max(0),
            drag_move: secs(settings.timings.scroll_move_secs),
            drag: secs(settings.timings.scroll_drag_secs),
            drag_settle: settings.scroll_settle(),
        }
    }
}

/// Human-like clicks and drags on top of an `InputDevice`.
///
/// Every wait, including the pauses between glide steps, is a
/// cancellable wait on the session's signal.
pub struct InputSimulator {
    device: Box<dyn InputDevice>,
    pacing: InputPacing,
    cancel: CancellationSignal,
}

impl InputSimulator {
    pub fn new(device: Box<dyn InputDevice>, pacing: InputPacing, cancel: CancellationSignal) -> Self {
        Self {
            device,
            pacing,
            cancel,
        }
    }

    /// Clicks near `(x, y)` in screen coordinates.
    ///
    /// Returns the point actually clicked after jitter. Returns
    /// `RefresherError::Cancelled` without pressing if the signal is set
    /// while the pointer travels; a cancel during the post-click wait only
    /// cuts the wait short.
    pub fn click_at(&mut self, x: i32, y: i32) -> Result<(i32, i32)> {
        let target = jittered(&mut rand::rng(), (x, y), self.pacing.position_jitter_px);
        log::debug!("Click at ({}, {}) -> ({}, {})", x, y, target.0, target.1);

        self.glide_to(target, self.pacing.mouse_delay)?;
        self.device.press()?;
        self.device.release()?;

        self.cancel.wait(post_click_delay(
            &mut rand::rng(),
            self.pacing.mouse_delay,
            self.pacing.click_jitter,
        ));
        Ok(target)
    }

    /// Drags between two points given as ratios of `region`.
    ///
    /// The button is released even if the drag fails or is cancelled.
    pub fn drag_region(&mut self, region: &Region, start: &ButtonConfig, end: &ButtonConfig) -> Result<()> {
        let from = region.point_at(start.x, start.y);
        let to = region.point_at(end.x, end.y);
        log::debug!("Drag ({}, {}) -> ({}, {})", from.0, from.1, to.0, to.1);

        self.glide_to(from, self.pacing.drag_move)?;
        self.device.press()?;
        let dragged = self.glide_to(to, self.pacing.drag);
        // Never leave the button held down
        let released = self.device.release();
        dragged.and(released)?;

        self.cancel.wait(self.pacing.drag_settle);
        Ok(())
    }

    /// Moves the pointer in a straight line over `duration`.
    fn glide_to(&mut self, target: (i32, i32), duration: Duration) -> Result<()> {
        let from = match self.device.cursor_position() {
            Ok(position) => position,
            Err(e) => {
                log::debug!("Cursor position unavailable ({}), jumping to target", e);
                target
            }
        };
        let steps = glide_steps(duration);
        let pause = duration / steps;

        for step in 1..=steps {
            if self.cancel.is_cancelled() {
                return Err(RefresherError::Cancelled);
            }
            let (x, y) = lerp(from, target, step as f32 / steps as f32);
            self.device.move_to(x, y)?;
            if step < steps && self.cancel.wait(pause) {
                return Err(RefresherError::Cancelled);
            }
        }
        Ok(())
    }
}

fn glide_steps(duration: Duration) -> u32 {
    (duration.as_millis() / GLIDE_STEP.as_millis()).clamp(1, 100) as u32
}

fn lerp(from: (i32, i32), to: (i32, i32), t: f32) -> (i32, i32) {
    (
        from.0 + ((to.0 - from.0) as f32 * t).round() as i32,
        from.1 + ((to.1 - from.1) as f32 * t).round() as i32,
    )
}

/// Offsets a point by up to `max_px` in each axis.
pub fn jittered<R: Rng>(rng: &mut R, (x, y): (i32, i32), max_px: i32) -> (i32, i32) {
    if max_px <= 0 {
        return (x, y);
    }
    (
        x + rng.random_range(-max_px..=max_px),
        y + rng.random_range(-max_px..=max_px),
    )
}

/// Wait after a click: `base ± spread`, never negative.
pub fn post_click_delay<R: Rng>(rng: &mut R, base: Duration, spread: Duration) -> Duration {
    let spread = spread.as_secs_f32();
    if spread <= 0.0 {
        return base;
    }
    secs(base.as_secs_f32() + rng.random_range(-spread..=spread))
}

/// Creates the input device for the current OS.
pub fn create_device() -> Box<dyn InputDevice> {
    #[cfg(windows)]
    {
        Box::new(send_input::SendInputDevice)
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedDevice)
    }
}

/// Input backend for platforms without injection support.
#[cfg(not(windows))]
pub struct UnsupportedDevice;

#[cfg(not(windows))]
impl InputDevice for UnsupportedDevice {
    fn cursor_position(&self) -> Result<(i32, i32)> {
        Err(RefresherError::Unsupported("Input injection"))
    }

    fn move_to(&mut self, _x: i32, _y: i32) -> Result<()> {
        Err(RefresherError::Unsupported("Input injection"))
    }

    fn press(&mut self) -> Result<()> {
        Err(RefresherError::Unsupported("Input injection"))
    }

    fn release(&mut self) -> Result<()> {
        Err(RefresherError::Unsupported("Input injection"))
    }
}

#[cfg(windows)]
pub use send_input::SendInputDevice;

#[cfg(windows)]
mod send_input {
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        INPUT, INPUT_0, INPUT_MOUSE, MOUSE_EVENT_FLAGS, MOUSEEVENTF_ABSOLUTE,
        MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT, SendInput,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetCursorPos, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
    };

    use super::InputDevice;
    use crate::error::{RefresherError, Result};

    /// Hardware-level input through `SendInput`. Moves the real cursor.
    pub struct SendInputDevice;

    impl SendInputDevice {
        /// Sends one absolute mouse event at the cursor's current position.
        fn send_at_cursor(&self, flags: MOUSE_EVENT_FLAGS, action: &str) -> Result<()> {
            let (x, y) = self.cursor_position()?;
            send(x, y, flags | MOUSEEVENTF_MOVE, action)
        }
    }

    impl InputDevice for SendInputDevice {
        fn cursor_position(&self) -> Result<(i32, i32)> {
            let mut point = POINT::default();
            unsafe { GetCursorPos(&mut point) }
                .map_err(|e| RefresherError::InputInjection(format!("GetCursorPos failed: {}", e)))?;
            Ok((point.x, point.y))
        }

        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            send(x, y, MOUSEEVENTF_MOVE, "move")
        }

        fn press(&mut self) -> Result<()> {
            self.send_at_cursor(MOUSEEVENTF_LEFTDOWN, "press")
        }

        fn release(&mut self) -> Result<()> {
            self.send_at_cursor(MOUSEEVENTF_LEFTUP, "release")
        }
    }

    fn send(x: i32, y: i32, flags: MOUSE_EVENT_FLAGS, action: &str) -> Result<()> {
        // Get screen dimensions for normalization
        let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
        let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
        if screen_width <= 0 || screen_height <= 0 {
            return Err(RefresherError::InputInjection(
                "screen metrics unavailable".to_string(),
            ));
        }

        // Normalize to 0-65535 range (required by MOUSEEVENTF_ABSOLUTE)
        let norm_x = ((x as i64 * 65535) / screen_width as i64) as i32;
        let norm_y = ((y as i64 * 65535) / screen_height as i64) as i32;

        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: norm_x,
                    dy: norm_y,
                    dwFlags: flags | MOUSEEVENTF_ABSOLUTE,
                    ..Default::default()
                },
            },
        };
        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent != 1 {
            return Err(RefresherError::InputInjection(format!(
                "SendInput {} at ({}, {}) was blocked",
                action, x, y
            )));
        }
        Ok(())
    }
}
