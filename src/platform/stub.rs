//! Logging stand-ins for platforms without window automation support.
//! Every call traces what would have happened and reports "unavailable"
//! where a real answer is required, so the binaries stay runnable as a
//! dry-run on any OS.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};

use super::{GameWindow, Input, Key, LauncherDriver};
use crate::locator::Frame;
use crate::target::Point;

pub struct StubGameWindow {
    title: String,
}

impl StubGameWindow {
    pub fn new(title: &str) -> Self {
        tracing::warn!("no window automation on this platform, using stub for '{title}'");
        Self {
            title: title.to_string(),
        }
    }
}

impl GameWindow for StubGameWindow {
    fn title(&self) -> &str {
        &self.title
    }

    fn activate(&mut self) -> Result<()> {
        tracing::info!("stub: activate('{}')", self.title);
        Ok(())
    }

    fn capture(&mut self) -> Result<Option<Frame>> {
        tracing::debug!("stub: capture('{}') -> unavailable", self.title);
        Ok(None)
    }
}

pub struct StubInput;

impl Input for StubInput {
    fn move_cursor(&mut self, point: Point) {
        tracing::info!("stub: move_cursor({}, {})", point.x, point.y);
    }

    fn click(&mut self, count: u32, interval: Duration) {
        tracing::info!("stub: click(count={count}, interval={interval:?})");
    }

    fn press(&mut self, key: Key) {
        tracing::info!("stub: press({key:?})");
    }

    fn hold(&mut self, key: Key) {
        tracing::info!("stub: hold({key:?})");
    }

    fn release(&mut self, key: Key) {
        tracing::info!("stub: release({key:?})");
    }
}

pub struct StubLauncherDriver;

impl LauncherDriver for StubLauncherDriver {
    fn launch(&mut self, executable: &Path, args: &[String]) -> Result<()> {
        tracing::info!("stub: launch({}, {args:?})", executable.display());
        Ok(())
    }

    fn is_process_running(&mut self, name: &str) -> bool {
        tracing::debug!("stub: is_process_running({name}) -> false");
        false
    }

    fn terminate_process(&mut self, name: &str) {
        tracing::info!("stub: terminate_process({name})");
    }

    fn connect_launcher(&mut self) -> Result<()> {
        Err(anyhow!("launcher automation is not supported on this platform"))
    }

    fn enter_credentials(&mut self, username: &str, _password: &str) -> Result<()> {
        tracing::info!("stub: enter_credentials({username}, ***)");
        Ok(())
    }

    fn click_login(&mut self) -> Result<()> {
        tracing::info!("stub: click_login()");
        Ok(())
    }

    fn read_patch_progress(&mut self) -> Option<u32> {
        None
    }

    fn click_play(&mut self) -> Result<()> {
        tracing::info!("stub: click_play()");
        Ok(())
    }

    fn work_area(&mut self) -> Option<(u32, u32, u32)> {
        None
    }

    fn position_client_window(
        &mut self,
        title: &str,
        account: &str,
        position: (i32, i32),
    ) -> Result<()> {
        tracing::info!("stub: position_client_window({title}, {account}, {position:?})");
        Ok(())
    }
}
