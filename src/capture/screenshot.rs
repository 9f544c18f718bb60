//! Region screenshots converted to grayscale.
//!
//! On Windows the screen is read with GDI `BitBlt`. The process is DPI aware,
//! so the region is copied 1:1 in physical pixels.

use image::{GrayImage, Luma};

/// Converts a top-down BGRA buffer into a grayscale image.
///
/// Uses the ITU-R BT.601 luma formula: Y = 0.299*R + 0.587*G + 0.114*B.
/// The alpha channel is dropped. Returns `None` if the buffer is too short.
pub fn bgra_to_gray(data: &[u8], width: u32, height: u32, row_pitch: usize) -> Option<GrayImage> {
    let needed = row_pitch.checked_mul(height as usize)?;
    if data.len() < needed || row_pitch < width as usize * 4 {
        return None;
    }

    Some(GrayImage::from_fn(width, height, |x, y| {
        let offset = y as usize * row_pitch + x as usize * 4;
        let b = data[offset] as f32;
        let g = data[offset + 1] as f32;
        let r = data[offset + 2] as f32;
        Luma([(0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8])
    }))
}

#[cfg(windows)]
pub use gdi::GdiScreenCapturer;

#[cfg(windows)]
mod gdi {
    use image::GrayImage;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::{
        BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CAPTUREBLT, CreateCompatibleBitmap,
        CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, ReleaseDC,
        SRCCOPY, SelectObject,
    };

    use super::bgra_to_gray;
    use crate::capture::{Region, ScreenCapturer};
    use crate::error::{RefresherError, Result};

    /// Copies a rectangle of the desktop through GDI.
    pub struct GdiScreenCapturer;

    impl ScreenCapturer for GdiScreenCapturer {
        fn capture(&mut self, region: &Region) -> Result<GrayImage> {
            if region.is_empty() {
                return Err(RefresherError::Capture(format!(
                    "empty region {}x{}",
                    region.width, region.height
                )));
            }

            let width = region.width as i32;
            let height = region.height as i32;
            let mut pixels = vec![0u8; region.width as usize * region.height as usize * 4];

            unsafe {
                let screen_dc = GetDC(HWND::default());
                if screen_dc.is_invalid() {
                    return Err(RefresherError::Capture("GetDC failed".to_string()));
                }
                let mem_dc = CreateCompatibleDC(screen_dc);
                let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
                let old = SelectObject(mem_dc, bitmap);

                let blit = BitBlt(
                    mem_dc,
                    0,
                    0,
                    width,
                    height,
                    screen_dc,
                    region.left,
                    region.top,
                    SRCCOPY | CAPTUREBLT,
                );

                // Negative height requests a top-down DIB
                let mut info = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: width,
                        biHeight: -height,
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let lines = GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    height as u32,
                    Some(pixels.as_mut_ptr() as *mut _),
                    &mut info,
                    DIB_RGB_COLORS,
                );

                SelectObject(mem_dc, old);
                let _ = DeleteObject(bitmap);
                let _ = DeleteDC(mem_dc);
                ReleaseDC(HWND::default(), screen_dc);

                if let Err(e) = blit {
                    return Err(RefresherError::Capture(format!("BitBlt failed: {}", e)));
                }
                if lines != height {
                    return Err(RefresherError::Capture(format!(
                        "GetDIBits copied {} of {} rows",
                        lines, height
                    )));
                }
            }

            bgra_to_gray(&pixels, region.width, region.height, region.width as usize * 4)
                .ok_or_else(|| RefresherError::Capture("pixel buffer size mismatch".to_string()))
        }
    }
}
