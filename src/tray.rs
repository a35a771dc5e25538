//! System tray icon: tooltip, balloon notices and the speaker glyph.

use tracing::debug;
use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Gdi::*;
use windows::Win32::UI::Shell::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::app::WM_TRAY_ICON;

const TRAY_ICON_ID: u32 = 1;

/// Manages the system tray icon
pub struct TrayIcon {
    hwnd: HWND,
    icon: HICON,
    owns_icon: bool,
}

impl TrayIcon {
    pub fn new(hwnd: HWND, tooltip: &str) -> Result<Self> {
        let (icon, owns_icon) = match create_speaker_icon() {
            Ok(icon) => (icon, true),
            Err(e) => {
                debug!(error = %e, "custom tray icon unavailable, using system icon");
                (unsafe { LoadIconW(None, IDI_APPLICATION)? }, false)
            }
        };

        let tray = Self {
            hwnd,
            icon,
            owns_icon,
        };
        tray.add(tooltip)?;
        Ok(tray)
    }

    fn base_data(&self) -> NOTIFYICONDATAW {
        NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: TRAY_ICON_ID,
            ..Default::default()
        }
    }

    fn add(&self, tooltip: &str) -> Result<()> {
        let mut nid = self.base_data();
        nid.uFlags = NIF_ICON | NIF_MESSAGE | NIF_TIP | NIF_SHOWTIP;
        nid.uCallbackMessage = WM_TRAY_ICON;
        nid.hIcon = self.icon;
        copy_wide(&mut nid.szTip, tooltip);

        unsafe {
            if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
                let err = GetLastError();
                return Err(Error::new(HRESULT::from_win32(err.0), "Shell_NotifyIconW failed"));
            }

            nid.Anonymous.uVersion = NOTIFYICON_VERSION_4;
            let _ = Shell_NotifyIconW(NIM_SETVERSION, &nid);
        }

        Ok(())
    }

    pub fn set_tooltip(&self, tooltip: &str) {
        let mut nid = self.base_data();
        nid.uFlags = NIF_TIP | NIF_SHOWTIP;
        copy_wide(&mut nid.szTip, tooltip);

        unsafe {
            let _ = Shell_NotifyIconW(NIM_MODIFY, &nid);
        }
    }

    /// Show an informational balloon anchored to the icon.
    pub fn show_balloon(&self, title: &str, text: &str) {
        let mut nid = self.base_data();
        nid.uFlags = NIF_INFO;
        nid.dwInfoFlags = NIIF_INFO;
        copy_wide(&mut nid.szInfoTitle, title);
        copy_wide(&mut nid.szInfo, text);

        unsafe {
            if !Shell_NotifyIconW(NIM_MODIFY, &nid).as_bool() {
                debug!("balloon notification rejected by the shell");
            }
        }
    }

    pub fn remove(&self) {
        let nid = self.base_data();
        unsafe {
            let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
        }
    }
}

impl Drop for TrayIcon {
    fn drop(&mut self) {
        self.remove();
        // System icons (IDI_APPLICATION) must not be destroyed
        if self.owns_icon {
            unsafe {
                let _ = DestroyIcon(self.icon);
            }
        }
    }
}

/// Copy `text` into a fixed-size, NUL-terminated UTF-16 field, truncating.
fn copy_wide(dst: &mut [u16], text: &str) {
    if dst.is_empty() {
        return;
    }
    let max = dst.len() - 1;
    let mut len = 0;
    for (slot, unit) in dst.iter_mut().zip(text.encode_utf16().take(max)) {
        *slot = unit;
        len += 1;
    }
    dst[len] = 0;
}

/// Draw a 16x16 speaker (box, cone and two sound waves).
fn create_speaker_icon() -> Result<HICON> {
    const SIZE: i32 = 16;

    unsafe {
        let screen_dc = GetDC(None);
        if screen_dc.is_invalid() {
            return Err(Error::from_win32());
        }

        let mem_dc = CreateCompatibleDC(screen_dc);
        let color = CreateCompatibleBitmap(screen_dc, SIZE, SIZE);
        let mask = CreateBitmap(SIZE, SIZE, 1, 1, None);
        if mem_dc.is_invalid() || color.is_invalid() || mask.is_invalid() {
            let _ = DeleteObject(color);
            let _ = DeleteObject(mask);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(None, screen_dc);
            return Err(Error::from_win32());
        }

        let rect = RECT {
            left: 0,
            top: 0,
            right: SIZE,
            bottom: SIZE,
        };

        let old_bitmap = SelectObject(mem_dc, color);
        FillRect(mem_dc, &rect, HBRUSH(GetStockObject(BLACK_BRUSH).0));

        let body = CreateSolidBrush(COLORREF(0x00B46622));
        let cone = CreateSolidBrush(COLORREF(0x00F5A542));
        let wave = CreatePen(PS_SOLID, 1, COLORREF(0x00FFB000));
        let no_pen = GetStockObject(NULL_PEN);

        let old_pen = SelectObject(mem_dc, no_pen);
        let old_brush = SelectObject(mem_dc, body);
        let _ = Rectangle(mem_dc, 1, 5, 6, 12);

        SelectObject(mem_dc, cone);
        let _ = Polygon(
            mem_dc,
            &[
                POINT { x: 5, y: 6 },
                POINT { x: 9, y: 3 },
                POINT { x: 9, y: 13 },
                POINT { x: 5, y: 10 },
            ],
        );

        SelectObject(mem_dc, wave);
        let _ = Arc(mem_dc, 7, 5, 13, 11, 12, 5, 12, 11);
        let _ = Arc(mem_dc, 7, 2, 16, 14, 15, 3, 15, 13);

        SelectObject(mem_dc, old_pen);
        SelectObject(mem_dc, old_brush);
        let _ = DeleteObject(body);
        let _ = DeleteObject(cone);
        let _ = DeleteObject(wave);

        // All-zero mask: every pixel opaque
        SelectObject(mem_dc, mask);
        FillRect(mem_dc, &rect, HBRUSH(GetStockObject(BLACK_BRUSH).0));
        SelectObject(mem_dc, old_bitmap);

        let _ = DeleteDC(mem_dc);
        ReleaseDC(None, screen_dc);

        let icon_info = ICONINFO {
            fIcon: TRUE,
            xHotspot: 0,
            yHotspot: 0,
            hbmMask: mask,
            hbmColor: color,
        };
        let icon = CreateIconIndirect(&icon_info);

        let _ = DeleteObject(color);
        let _ = DeleteObject(mask);

        icon
    }
}
