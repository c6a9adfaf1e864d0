//! Win32 implementations of the platform capabilities: window discovery and
//! activation, GDI client-area capture, SendInput-based mouse/keyboard
//! injection, and launcher dialog automation (Edit/Button child controls,
//! progress-bar polling).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use image::{DynamicImage, ImageBuffer, Rgb};
use windows::Win32::Foundation::{CloseHandle, HWND, LPARAM, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, ClientToScreen, CreateCompatibleBitmap,
    CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, ReleaseDC,
    SRCCOPY, SelectObject,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT, KEYEVENTF_KEYUP,
    MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEINPUT, SendInput, VIRTUAL_KEY, VK_DOWN,
    VK_ESCAPE, VK_LEFT, VK_RETURN, VK_RIGHT, VK_UP, VkKeyScanW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowExW, FindWindowW, GetClientRect, GetSystemMetrics, GetWindowRect, IsWindow,
    MoveWindow, SM_CXSCREEN, SM_CYSCREEN, SPI_GETWORKAREA, SendMessageW, SetCursorPos,
    SetForegroundWindow, SetWindowTextW, SystemParametersInfoW,
    SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, WM_SETTEXT,
};
use windows::core::PCWSTR;

use super::{GameWindow, Input, Key, LauncherDriver};
use crate::locator::{Frame, Region};
use crate::login;
use crate::target::Point;

/// Progress-bar "get position" message (comctl32, not exposed by the crate).
const PBM_GETPOS: u32 = 0x0408;
/// Button "simulate click" message.
const BM_CLICK: u32 = 0x00F5;
/// Dialog window class used by the launcher login window.
const DIALOG_CLASS: &str = "#32770";
const LAUNCHER_TITLE: &str = "Wizard101";

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn find_window_by_title(title: &str) -> Option<HWND> {
    let title = wide(title);
    let hwnd = unsafe { FindWindowW(PCWSTR::null(), PCWSTR(title.as_ptr())) };
    if hwnd.0 != 0 && unsafe { IsWindow(hwnd) }.as_bool() {
        Some(hwnd)
    } else {
        None
    }
}

/// Client-area origin and size in screen coordinates.
fn client_region(hwnd: HWND) -> Option<Region> {
    unsafe {
        let mut rect = RECT::default();
        GetClientRect(hwnd, &mut rect).ok()?;
        let mut origin = POINT { x: 0, y: 0 };
        if !ClientToScreen(hwnd, &mut origin).as_bool() {
            return None;
        }
        let width = (rect.right - rect.left).max(0) as u32;
        let height = (rect.bottom - rect.top).max(0) as u32;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Region {
            left: origin.x,
            top: origin.y,
            width,
            height,
        })
    }
}

/// BitBlt the client area into an RGB buffer.
fn capture_client_area(hwnd: HWND, region: Region) -> Result<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    let width = region.width as i32;
    let height = region.height as i32;

    unsafe {
        let hdc = GetDC(hwnd);
        if hdc.is_invalid() {
            bail!("failed to get client device context");
        }

        let mem_dc = CreateCompatibleDC(hdc);
        if mem_dc.is_invalid() {
            ReleaseDC(hwnd, hdc);
            bail!("failed to create compatible DC");
        }

        let bitmap = CreateCompatibleBitmap(hdc, width, height);
        if bitmap.is_invalid() {
            let _ = DeleteDC(mem_dc);
            ReleaseDC(hwnd, hdc);
            bail!("failed to create compatible bitmap");
        }

        let old_bitmap = SelectObject(mem_dc, bitmap);

        let blit = BitBlt(mem_dc, 0, 0, width, height, hdc, 0, 0, SRCCOPY);

        let mut bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                biHeight: -height, // top-down
                biPlanes: 1,
                // 32bpp keeps rows free of alignment padding.
                biBitCount: 32,
                biCompression: BI_RGB.0 as u32,
                ..Default::default()
            },
            bmiColors: [Default::default(); 1],
        };

        let mut buffer = vec![0u8; (width * height * 4) as usize];
        let scan_lines = if blit.is_ok() {
            GetDIBits(
                mem_dc,
                bitmap,
                0,
                height as u32,
                Some(buffer.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            )
        } else {
            0
        };

        let _ = SelectObject(mem_dc, old_bitmap);
        let _ = DeleteObject(bitmap);
        let _ = DeleteDC(mem_dc);
        ReleaseDC(hwnd, hdc);

        if blit.is_err() {
            bail!("BitBlt failed, window not capturable");
        }
        if scan_lines == 0 {
            bail!("failed to read bitmap bits");
        }

        // GetDIBits hands back BGRX.
        let mut img = ImageBuffer::new(region.width, region.height);
        for y in 0..height {
            for x in 0..width {
                let idx = ((y * width + x) * 4) as usize;
                let (b, g, r) = (buffer[idx], buffer[idx + 1], buffer[idx + 2]);
                img.put_pixel(x as u32, y as u32, Rgb([r, g, b]));
            }
        }
        Ok(img)
    }
}

pub struct Win32GameWindow {
    title: String,
    hwnd: HWND,
}

impl Win32GameWindow {
    pub fn find(title: &str) -> Result<Self> {
        let hwnd = find_window_by_title(title)
            .ok_or_else(|| anyhow!("window '{title}' not found"))?;
        Ok(Self {
            title: title.to_string(),
            hwnd,
        })
    }

    fn revalidate(&mut self) -> bool {
        if unsafe { IsWindow(self.hwnd) }.as_bool() {
            return true;
        }
        // The client restarts between encounters sometimes; re-resolve.
        match find_window_by_title(&self.title) {
            Some(hwnd) => {
                self.hwnd = hwnd;
                true
            }
            None => false,
        }
    }
}

impl GameWindow for Win32GameWindow {
    fn title(&self) -> &str {
        &self.title
    }

    fn activate(&mut self) -> Result<()> {
        if !self.revalidate() {
            bail!("window '{}' is gone", self.title);
        }
        unsafe {
            let _ = SetForegroundWindow(self.hwnd);
        }
        std::thread::sleep(Duration::from_millis(500));
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        if !self.revalidate() {
            return Ok(None);
        }
        let Some(region) = client_region(self.hwnd) else {
            return Ok(None);
        };
        match capture_client_area(self.hwnd, region) {
            Ok(img) => Ok(Some(Frame {
                image: DynamicImage::ImageRgb8(img),
                region,
            })),
            Err(e) => {
                tracing::warn!("capture failed: {e:#}");
                Ok(None)
            }
        }
    }
}

fn virtual_key(key: Key) -> Option<VIRTUAL_KEY> {
    match key {
        Key::Left => Some(VK_LEFT),
        Key::Right => Some(VK_RIGHT),
        Key::Up => Some(VK_UP),
        Key::Down => Some(VK_DOWN),
        Key::Enter => Some(VK_RETURN),
        Key::Escape => Some(VK_ESCAPE),
        Key::Char(c) => {
            let mut buf = [0u16; 2];
            let encoded = c.encode_utf16(&mut buf);
            if encoded.len() != 1 {
                return None;
            }
            let scan = unsafe { VkKeyScanW(encoded[0]) };
            if scan == -1 {
                None
            } else {
                Some(VIRTUAL_KEY((scan & 0xFF) as u16))
            }
        }
    }
}

fn send_key(vk: VIRTUAL_KEY, up: bool) {
    let input = INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: 0,
                dwFlags: if up { KEYEVENTF_KEYUP } else { KEYBD_EVENT_FLAGS(0) },
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    unsafe {
        SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
    }
}

fn send_mouse_button(flags: windows::Win32::UI::Input::KeyboardAndMouse::MOUSE_EVENT_FLAGS) {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    unsafe {
        SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
    }
}

pub struct Win32Input;

impl Win32Input {
    pub fn new() -> Self {
        Self
    }
}

impl Input for Win32Input {
    fn move_cursor(&mut self, point: Point) {
        unsafe {
            if SetCursorPos(point.x, point.y).is_err() {
                tracing::warn!("SetCursorPos({}, {}) failed", point.x, point.y);
            }
        }
        // Let the cursor settle before any click lands.
        std::thread::sleep(Duration::from_millis(20));
    }

    fn click(&mut self, count: u32, interval: Duration) {
        for i in 0..count {
            send_mouse_button(MOUSEEVENTF_LEFTDOWN);
            std::thread::sleep(Duration::from_millis(20));
            send_mouse_button(MOUSEEVENTF_LEFTUP);
            if i + 1 < count {
                std::thread::sleep(interval);
            }
        }
    }

    fn press(&mut self, key: Key) {
        if let Some(vk) = virtual_key(key) {
            send_key(vk, false);
            send_key(vk, true);
        } else {
            tracing::warn!("no virtual key for {key:?}");
        }
    }

    fn hold(&mut self, key: Key) {
        if let Some(vk) = virtual_key(key) {
            send_key(vk, false);
        }
    }

    fn release(&mut self, key: Key) {
        if let Some(vk) = virtual_key(key) {
            send_key(vk, true);
        }
    }
}

pub struct Win32LauncherDriver {
    dialog: Option<HWND>,
}

impl Win32LauncherDriver {
    pub fn new() -> Self {
        Self { dialog: None }
    }

    fn dialog(&self) -> Result<HWND> {
        self.dialog
            .filter(|h| unsafe { IsWindow(*h) }.as_bool())
            .ok_or_else(|| anyhow!("launcher dialog not connected"))
    }

    fn find_child(&self, class: &str, title: Option<&str>, index: usize) -> Result<HWND> {
        let parent = self.dialog()?;
        let class_w = wide(class);
        let title_w = title.map(wide);
        let title_ptr = title_w
            .as_ref()
            .map(|t| PCWSTR(t.as_ptr()))
            .unwrap_or(PCWSTR::null());

        let mut child = HWND(0);
        for _ in 0..=index {
            child = unsafe { FindWindowExW(parent, child, PCWSTR(class_w.as_ptr()), title_ptr) };
            if child.0 == 0 {
                bail!("launcher control {class}[{index}] not found");
            }
        }
        Ok(child)
    }

    fn find_pid(&self, name: &str) -> Option<u32> {
        let target = name.to_ascii_lowercase();
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).ok()?;
            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };
            let mut pid = None;
            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    let len = entry
                        .szExeFile
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szExeFile.len());
                    let exe = String::from_utf16_lossy(&entry.szExeFile[..len]);
                    if exe.to_ascii_lowercase() == target {
                        pid = Some(entry.th32ProcessID);
                        break;
                    }
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }
            let _ = CloseHandle(snapshot);
            pid
        }
    }
}

impl LauncherDriver for Win32LauncherDriver {
    fn launch(&mut self, executable: &Path, args: &[String]) -> Result<()> {
        if !executable.exists() {
            bail!("path '{}' does not exist", executable.display());
        }
        std::process::Command::new(executable)
            .args(args)
            .spawn()
            .with_context(|| format!("failed to launch '{}'", executable.display()))?;
        Ok(())
    }

    fn is_process_running(&mut self, name: &str) -> bool {
        self.find_pid(name).is_some()
    }

    fn terminate_process(&mut self, name: &str) {
        let Some(pid) = self.find_pid(name) else {
            return;
        };
        unsafe {
            if let Ok(handle) = OpenProcess(PROCESS_TERMINATE, false, pid) {
                if TerminateProcess(handle, 1).is_err() {
                    tracing::warn!("failed to terminate {name} (pid {pid})");
                }
                let _ = CloseHandle(handle);
            }
        }
    }

    fn connect_launcher(&mut self) -> Result<()> {
        let class = wide(DIALOG_CLASS);
        let title = wide(LAUNCHER_TITLE);
        let hwnd = unsafe { FindWindowW(PCWSTR(class.as_ptr()), PCWSTR(title.as_ptr())) };
        if hwnd.0 == 0 {
            bail!("launcher login dialog not found");
        }
        self.dialog = Some(hwnd);
        Ok(())
    }

    fn enter_credentials(&mut self, username: &str, password: &str) -> Result<()> {
        let user_field = self.find_child("Edit", None, 0)?;
        let pass_field = self.find_child("Edit", None, 1)?;
        for (field, text) in [(user_field, username), (pass_field, password)] {
            let text = wide(text);
            unsafe {
                SendMessageW(
                    field,
                    WM_SETTEXT,
                    WPARAM(0),
                    LPARAM(text.as_ptr() as isize),
                );
            }
        }
        Ok(())
    }

    fn click_login(&mut self) -> Result<()> {
        let button = self.find_child("Button", Some("Login"), 0)?;
        unsafe {
            SendMessageW(button, BM_CLICK, WPARAM(0), LPARAM(0));
        }
        Ok(())
    }

    fn read_patch_progress(&mut self) -> Option<u32> {
        // The launcher has two progress bars; the patch bar is the second.
        let bar = self.find_child("msctls_progress32", None, 1).ok()?;
        let pos = unsafe { SendMessageW(bar, PBM_GETPOS, WPARAM(0), LPARAM(0)) }.0;
        if (0..=100).contains(&pos) {
            Some(pos as u32)
        } else {
            None
        }
    }

    fn click_play(&mut self) -> Result<()> {
        let button = self.find_child("Button", Some("PLAY!"), 0)?;
        unsafe {
            SendMessageW(button, BM_CLICK, WPARAM(0), LPARAM(0));
        }
        Ok(())
    }

    fn work_area(&mut self) -> Option<(u32, u32, u32)> {
        unsafe {
            let screen_w = GetSystemMetrics(SM_CXSCREEN);
            let screen_h = GetSystemMetrics(SM_CYSCREEN);
            let mut work = RECT::default();
            SystemParametersInfoW(
                SPI_GETWORKAREA,
                0,
                Some(&mut work as *mut _ as *mut _),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
            .ok()?;
            if screen_w <= 0 || screen_h <= 0 {
                return None;
            }
            let taskbar = (screen_h - work.bottom).max(0) as u32;
            Some((screen_w as u32, screen_h as u32, taskbar))
        }
    }

    fn position_client_window(
        &mut self,
        title: &str,
        account: &str,
        position: (i32, i32),
    ) -> Result<()> {
        let hwnd =
            find_window_by_title(title).ok_or_else(|| anyhow!("window '{title}' not found"))?;
        let (screen_w, screen_h, taskbar) = self
            .work_area()
            .ok_or_else(|| anyhow!("failed to read screen work area"))?;

        let mut rect = RECT::default();
        unsafe {
            GetWindowRect(hwnd, &mut rect).context("failed to read window rect")?;
        }
        let window_w = (rect.right - rect.left).max(0) as u32;
        let window_h = (rect.bottom - rect.top).max(0) as u32;

        let (x, y) = login::resolve_position(
            position,
            (screen_w, screen_h),
            (window_w, window_h),
            taskbar,
        );

        unsafe {
            MoveWindow(hwnd, x, y, window_w as i32, window_h as i32, true)
                .context("failed to move window")?;
            let account_w = wide(account);
            SetWindowTextW(hwnd, PCWSTR(account_w.as_ptr()))
                .context("failed to retitle window")?;
        }
        Ok(())
    }
}
