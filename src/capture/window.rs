//! Window discovery for the game window.

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::time::Duration;

use windows::Win32::Foundation::{BOOL, CloseHandle, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
    IsIconic, IsWindowVisible, SW_RESTORE, SetForegroundWindow, ShowWindow,
};

use super::{Region, WindowLocator};
use crate::error::{RefresherError, Result};

/// Finds the game window by title substring and, optionally, process name.
///
/// Holds no window handle: every call enumerates the windows again, so a
/// restarted or moved game window is picked up on the next action.
pub struct Win32WindowLocator {
    title: String,
    process_name: Option<String>,
}

impl Win32WindowLocator {
    pub fn new(title: &str, process_name: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            process_name: process_name.map(str::to_lowercase),
        }
    }

    fn find_window(&self) -> Result<HWND> {
        struct EnumData<'a> {
            title: String,
            process_name: Option<&'a str>,
            hwnd: Option<HWND>,
        }

        unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
            unsafe {
                let data = &mut *(lparam.0 as *mut EnumData);

                // Skip invisible windows
                if !IsWindowVisible(hwnd).as_bool() {
                    return TRUE;
                }

                let title = window_title(hwnd);
                if title.is_empty() || !title.to_lowercase().contains(&data.title) {
                    return TRUE;
                }

                if let Some(expected) = data.process_name {
                    match process_name(hwnd) {
                        Some(name) if name.to_lowercase() == expected => {}
                        other => {
                            log::debug!(
                                "  \"{}\" belongs to {:?}, expected {}",
                                title,
                                other,
                                expected
                            );
                            return TRUE;
                        }
                    }
                }

                log::debug!("Found window \"{}\"", title);
                data.hwnd = Some(hwnd);
                BOOL(0) // Stop enumeration
            }
        }

        let mut data = EnumData {
            title: self.title.to_lowercase(),
            process_name: self.process_name.as_deref(),
            hwnd: None,
        };
        unsafe {
            // EnumWindows returns FALSE when the callback stops it early
            let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
        }

        data.hwnd
            .ok_or_else(|| RefresherError::WindowNotFound(self.title.clone()))
    }
}

impl WindowLocator for Win32WindowLocator {
    fn locate(&self) -> Result<Region> {
        let hwnd = self.find_window()?;
        client_region(hwnd)
    }

    fn bring_to_front(&self) -> Result<()> {
        let hwnd = self.find_window()?;
        unsafe {
            if IsIconic(hwnd).as_bool() {
                let _ = ShowWindow(hwnd, SW_RESTORE);
            }
            let _ = SetForegroundWindow(hwnd);
        }
        // Give the window time to activate
        std::thread::sleep(Duration::from_millis(100));
        Ok(())
    }
}

/// Returns the client area of a window in screen coordinates.
///
/// The client area excludes the title bar and borders, so ratios computed
/// against it match the game's own layout.
fn client_region(hwnd: HWND) -> Result<Region> {
    let mut client_rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut client_rect) }
        .map_err(|e| RefresherError::Setup(format!("GetClientRect failed: {}", e)))?;

    let mut origin = POINT { x: 0, y: 0 };
    unsafe {
        if !ClientToScreen(hwnd, &mut origin).as_bool() {
            return Err(RefresherError::Setup("ClientToScreen failed".to_string()));
        }
    }

    Ok(Region::new(
        origin.x,
        origin.y,
        (client_rect.right - client_rect.left).max(0) as u32,
        (client_rect.bottom - client_rect.top).max(0) as u32,
    ))
}

fn window_title(hwnd: HWND) -> String {
    unsafe {
        let title_len = GetWindowTextLengthW(hwnd);
        if title_len <= 0 {
            return String::new();
        }
        let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
        let copied = GetWindowTextW(hwnd, &mut title_buf);
        OsString::from_wide(&title_buf[..copied.max(0) as usize])
            .to_string_lossy()
            .to_string()
    }
}

/// Returns the executable file name of the process owning `hwnd`.
fn process_name(hwnd: HWND) -> Option<String> {
    unsafe {
        let mut process_id: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));
        if process_id == 0 {
            return None;
        }

        let process_handle =
            OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;

        let mut name_buf: Vec<u16> = vec![0; 1024];
        let mut len = name_buf.len() as u32;
        let result = QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(name_buf.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(process_handle);

        if result.is_err() || len == 0 {
            return None;
        }

        let full_path = OsString::from_wide(&name_buf[..len as usize])
            .to_string_lossy()
            .to_string();
        full_path.rsplit('\\').next().map(str::to_string)
    }
}
