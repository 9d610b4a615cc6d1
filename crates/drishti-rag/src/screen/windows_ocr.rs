//! Windows screen reading: GDI screen grab + Windows.Media.Ocr recognition.
//!
//! Zero model overhead — the OS OCR engine runs outside the process and does
//! not compete with the resident generation model for memory.

use windows::Graphics::Imaging::{BitmapPixelFormat, SoftwareBitmap};
use windows::Media::Ocr::OcrEngine;
use windows::Storage::Streams::DataWriter;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use crate::error::{EngineError, Result};
use crate::screen::{ScreenFrame, ScreenOcr};

pub struct NativeScreenOcr;

impl NativeScreenOcr {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeScreenOcr {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if Windows OCR is available on this system.
pub fn is_ocr_available() -> bool {
    OcrEngine::TryCreateFromUserProfileLanguages().is_ok()
}

impl ScreenOcr for NativeScreenOcr {
    fn capture(&self) -> Result<ScreenFrame> {
        unsafe {
            let width = GetSystemMetrics(SM_CXSCREEN);
            let height = GetSystemMetrics(SM_CYSCREEN);
            if width <= 0 || height <= 0 {
                return Err(EngineError::Screen("no display metrics".to_string()));
            }

            let screen_dc = GetDC(None);
            let mem_dc = CreateCompatibleDC(Some(screen_dc));
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let previous = SelectObject(mem_dc, bitmap.into());

            let blit = BitBlt(mem_dc, 0, 0, width, height, Some(screen_dc), 0, 0, SRCCOPY);

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // Negative height: top-down rows, matching Bgra8 bitmaps.
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };

            let mut pixels = vec![0u8; (width as usize) * (height as usize) * 4];
            let copied = GetDIBits(
                mem_dc,
                bitmap,
                0,
                height as u32,
                Some(pixels.as_mut_ptr() as *mut _),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(bitmap.into());
            let _ = DeleteDC(mem_dc);
            ReleaseDC(None, screen_dc);

            if blit.is_err() || copied == 0 {
                return Err(EngineError::Screen("screen blit failed".to_string()));
            }

            Ok(ScreenFrame {
                bgra: pixels,
                width,
                height,
            })
        }
    }

    fn recognize(&self, frame: &ScreenFrame) -> Result<String> {
        let to_screen_err =
            |stage: &str, e: windows::core::Error| EngineError::Screen(format!("{}: {}", stage, e));

        let writer = DataWriter::new().map_err(|e| to_screen_err("stream init", e))?;
        writer
            .WriteBytes(&frame.bgra)
            .map_err(|e| to_screen_err("pixel copy", e))?;
        let buffer = writer
            .DetachBuffer()
            .map_err(|e| to_screen_err("buffer detach", e))?;

        let bitmap = SoftwareBitmap::CreateCopyFromBuffer(
            &buffer,
            BitmapPixelFormat::Bgra8,
            frame.width,
            frame.height,
        )
        .map_err(|e| to_screen_err("bitmap build", e))?;

        let engine = OcrEngine::TryCreateFromUserProfileLanguages()
            .map_err(|e| to_screen_err("OCR engine unavailable", e))?;

        let result = engine
            .RecognizeAsync(&bitmap)
            .map_err(|e| to_screen_err("OCR dispatch", e))?
            .get()
            .map_err(|e| to_screen_err("OCR recognition", e))?;

        let text = result
            .Text()
            .map_err(|e| to_screen_err("OCR text", e))?
            .to_string();

        Ok(text)
    }

    fn engine_name(&self) -> &str {
        "windows-native-ocr"
    }
}
