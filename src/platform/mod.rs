pub mod stub;

#[cfg(target_os = "windows")]
pub mod windows;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::locator::Frame;
use crate::target::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Enter,
    Escape,
    Char(char),
}

/// Handle to the game client window.
pub trait GameWindow {
    fn title(&self) -> &str;

    fn activate(&mut self) -> Result<()>;

    /// Capture a still of the client area together with its current screen
    /// region. `Ok(None)` means the window is momentarily unavailable
    /// (closed, minimized, or mid-move); the caller skips the iteration.
    fn capture(&mut self) -> Result<Option<Frame>>;
}

/// Input injection primitives. Implementations log and swallow OS-level
/// failures; a missed click is indistinguishable from a missed match and the
/// loop recovers on the next iteration either way.
pub trait Input {
    fn move_cursor(&mut self, point: Point);

    /// Issue `count` clicks at the current cursor position, `interval` apart.
    fn click(&mut self, count: u32, interval: Duration);

    fn press(&mut self, key: Key);

    /// Begin holding a key until `release` is called.
    fn hold(&mut self, key: Key);

    fn release(&mut self, key: Key);
}

/// Launcher/login automation capabilities consumed by the login flow.
pub trait LauncherDriver {
    fn launch(&mut self, executable: &Path, args: &[String]) -> Result<()>;

    fn is_process_running(&mut self, name: &str) -> bool;

    fn terminate_process(&mut self, name: &str);

    /// Locate the launcher login dialog. Errors while the dialog is not
    /// (yet) present; the caller retries a bounded number of times.
    fn connect_launcher(&mut self) -> Result<()>;

    fn enter_credentials(&mut self, username: &str, password: &str) -> Result<()>;

    fn click_login(&mut self) -> Result<()>;

    /// Patch progress in percent (0..=100), or `None` when it cannot be read.
    fn read_patch_progress(&mut self) -> Option<u32>;

    fn click_play(&mut self) -> Result<()>;

    /// (screen_width, screen_height, taskbar_height).
    fn work_area(&mut self) -> Option<(u32, u32, u32)>;

    /// Move the client window to `position` (edge coordinates resolved
    /// against the work area) and retitle it with the account name.
    fn position_client_window(
        &mut self,
        title: &str,
        account: &str,
        position: (i32, i32),
    ) -> Result<()>;
}

impl GameWindow for Box<dyn GameWindow> {
    fn title(&self) -> &str {
        (**self).title()
    }

    fn activate(&mut self) -> Result<()> {
        (**self).activate()
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        (**self).capture()
    }
}

impl Input for Box<dyn Input> {
    fn move_cursor(&mut self, point: Point) {
        (**self).move_cursor(point)
    }

    fn click(&mut self, count: u32, interval: Duration) {
        (**self).click(count, interval)
    }

    fn press(&mut self, key: Key) {
        (**self).press(key)
    }

    fn hold(&mut self, key: Key) {
        (**self).hold(key)
    }

    fn release(&mut self, key: Key) {
        (**self).release(key)
    }
}

/// Find the game window by title on the current platform.
pub fn connect_game_window(title: &str) -> Result<Box<dyn GameWindow>> {
    #[cfg(target_os = "windows")]
    {
        return Ok(Box::new(windows::Win32GameWindow::find(title)?));
    }
    #[cfg(not(target_os = "windows"))]
    {
        Ok(Box::new(stub::StubGameWindow::new(title)))
    }
}

pub fn system_input() -> Box<dyn Input> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(windows::Win32Input::new());
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(stub::StubInput)
    }
}

pub fn launcher_driver() -> Box<dyn LauncherDriver> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(windows::Win32LauncherDriver::new());
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(stub::StubLauncherDriver)
    }
}
