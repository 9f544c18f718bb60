//! Global Escape hotkey that cancels the running session.
//!
//! The hotkey is registered on a dedicated thread with its own message loop.
//! If registration fails (another program owns Escape, or the platform has
//! no global hotkeys) the session can still be stopped from the GUI.

use crate::automation::runner::CancellationSignal;

/// Owns the hotkey thread; dropping it unregisters the hotkey.
pub struct HotkeyMonitor {
    #[cfg(windows)]
    thread_id: u32,
    #[cfg(windows)]
    handle: Option<std::thread::JoinHandle<()>>,
}

#[cfg(windows)]
mod win32 {
    use std::sync::mpsc::channel;
    use std::thread;

    use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        MOD_NOREPEAT, RegisterHotKey, UnregisterHotKey, VK_ESCAPE,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetMessageW, MSG, PostThreadMessageW, WM_HOTKEY, WM_QUIT,
    };

    use super::{CancellationSignal, HotkeyMonitor};

    const HOTKEY_CANCEL: i32 = 1;

    impl HotkeyMonitor {
        /// Registers Escape and sets `signal` whenever it is pressed.
        pub fn install(signal: CancellationSignal) -> Option<Self> {
            let (ready_tx, ready_rx) = channel();

            let handle = thread::Builder::new()
                .name("cancel-hotkey".to_string())
                .spawn(move || unsafe {
                    // Thread-bound hotkey: WM_HOTKEY arrives in this thread's queue
                    if let Err(e) =
                        RegisterHotKey(HWND::default(), HOTKEY_CANCEL, MOD_NOREPEAT, VK_ESCAPE.0 as u32)
                    {
                        log::warn!("Could not register the Escape hotkey: {}", e);
                        let _ = ready_tx.send(None);
                        return;
                    }
                    let _ = ready_tx.send(Some(GetCurrentThreadId()));

                    let mut msg = MSG::default();
                    while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                        if msg.message == WM_HOTKEY && msg.wParam.0 == HOTKEY_CANCEL as usize {
                            log::info!("Escape pressed, cancelling");
                            signal.cancel();
                        }
                    }

                    let _ = UnregisterHotKey(HWND::default(), HOTKEY_CANCEL);
                })
                .ok()?;

            match ready_rx.recv() {
                Ok(Some(thread_id)) => {
                    log::info!("Hotkey: Esc (stop refreshing)");
                    Some(Self {
                        thread_id,
                        handle: Some(handle),
                    })
                }
                _ => {
                    let _ = handle.join();
                    None
                }
            }
        }
    }

    impl Drop for HotkeyMonitor {
        fn drop(&mut self) {
            unsafe {
                let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(not(windows))]
impl HotkeyMonitor {
    /// Global hotkeys are unavailable here; cancel from the GUI instead.
    pub fn install(signal: CancellationSignal) -> Option<Self> {
        let _ = signal;
        log::warn!("Global Escape hotkey is not supported on this platform");
        None
    }
}
