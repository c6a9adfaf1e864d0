//! Launcher login automation: start the launcher (directly or through
//! Steam), fill in credentials, wait out the patcher, press play, then park
//! the client window at its configured screen position.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::config::{Account, Config};
use crate::platform::LauncherDriver;

pub const LAUNCHER_PROCESS: &str = "WizardLauncher.exe";
pub const CLIENT_PROCESS: &str = "WizardGraphicalClient.exe";
/// Steam app id of the game, for `-applaunch`.
pub const STEAM_APP_ID: &str = "799960";

const CONNECT_ATTEMPTS: usize = 10;
const PROCESS_WAIT_ATTEMPTS: usize = 60;
const PROGRESS_READ_ATTEMPTS: usize = 3;
/// Patching a fresh install can take a long while; bail eventually anyway.
const PATCH_POLL_ATTEMPTS: usize = 3600;

/// Parse a comma-separated, 1-based account selection ("1,3"). Empty input
/// or "all" selects everything. Returns 0-based indices in input order,
/// deduplicated; out-of-range and non-numeric entries are dropped.
pub fn parse_selection(input: &str, count: usize) -> Vec<usize> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        return (0..count).collect();
    }
    let mut selected = Vec::new();
    for part in trimmed.split(',') {
        let Ok(number) = part.trim().parse::<usize>() else {
            continue;
        };
        if number == 0 || number > count {
            continue;
        }
        let index = number - 1;
        if !selected.contains(&index) {
            selected.push(index);
        }
    }
    selected
}

/// Resolve a configured window position against the actual screen and window
/// sizes. A coordinate equal to the screen extent means "flush against that
/// edge"; the bottom edge additionally clears the taskbar.
pub fn resolve_position(
    target: (i32, i32),
    screen: (u32, u32),
    window: (u32, u32),
    taskbar: u32,
) -> (i32, i32) {
    let (screen_w, screen_h) = (screen.0 as i32, screen.1 as i32);
    let (window_w, window_h) = (window.0 as i32, window.1 as i32);

    let x = if target.0 >= screen_w {
        (screen_w - window_w).max(0)
    } else {
        target.0
    };
    let y = if target.1 >= screen_h {
        (screen_h - window_h - taskbar as i32).max(0)
    } else {
        target.1
    };
    (x, y)
}

pub struct LoginFlow<'a, D: LauncherDriver + ?Sized> {
    driver: &'a mut D,
    poll_interval: Duration,
}

impl<'a, D: LauncherDriver + ?Sized> LoginFlow<'a, D> {
    pub fn new(driver: &'a mut D) -> Self {
        Self {
            driver,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Log every selected account in, one at a time. A failure for one
    /// account is logged and the next account is attempted anyway.
    pub fn run(&mut self, config: &Config, accounts: &[Account]) -> Result<()> {
        if accounts.is_empty() {
            bail!("no accounts selected");
        }
        for (index, account) in accounts.iter().enumerate() {
            tracing::info!("logging in '{}'", account.username());
            if let Err(e) = self.login_account(config, account, index) {
                tracing::error!("login failed for '{}': {e:#}", account.username());
            }
        }
        Ok(())
    }

    fn login_account(&mut self, config: &Config, account: &Account, index: usize) -> Result<()> {
        self.launch(config)?;

        if !self.wait_for_process(LAUNCHER_PROCESS, true) {
            bail!("launcher process never appeared");
        }
        self.connect_launcher()?;

        self.driver
            .enter_credentials(account.username(), account.password())
            .context("failed to fill in credentials")?;
        self.driver.click_login().context("failed to press login")?;

        self.wait_for_patcher(config)?;
        self.driver.click_play().context("failed to press play")?;

        if !self.wait_for_process(LAUNCHER_PROCESS, false) {
            tracing::warn!("launcher still running after play, continuing anyway");
        }
        if !self.wait_for_process(CLIENT_PROCESS, true) {
            bail!("game client never appeared");
        }
        // Give the client window time to exist before moving it.
        std::thread::sleep(self.poll_interval * 5);

        if config.enable_window_positioning && !config.window_positions.is_empty() {
            let position = config.window_positions[index % config.window_positions.len()];
            if let Err(e) = self.driver.position_client_window(
                &config.window_title,
                account.username(),
                position,
            ) {
                tracing::warn!("failed to position client window: {e:#}");
            }
        }

        tracing::info!("'{}' is in", account.username());
        Ok(())
    }

    fn launch(&mut self, config: &Config) -> Result<()> {
        if config.enable_steam {
            let steam = config
                .steam_exe_path
                .as_ref()
                .ok_or_else(|| anyhow!("steam_exe_path is not configured"))?;
            self.driver
                .launch(steam, &["-applaunch".into(), STEAM_APP_ID.into()])
        } else {
            let wizard = config
                .wizard_exe_path
                .as_ref()
                .ok_or_else(|| anyhow!("wizard_exe_path is not configured"))?;
            self.driver.launch(wizard, &[])
        }
    }

    fn connect_launcher(&mut self) -> Result<()> {
        // The login dialog appears a beat after the process does.
        let mut last = None;
        for _ in 0..CONNECT_ATTEMPTS {
            match self.driver.connect_launcher() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last = Some(e);
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
        Err(last.unwrap_or_else(|| anyhow!("launcher dialog not found")))
            .context("could not connect to the launcher dialog")
    }

    /// Poll the patch progress bar until it reports 100%. An unreadable bar
    /// is retried a few times; if it stays unreadable the launcher is in a
    /// bad state and gets torn down so the next account starts clean.
    fn wait_for_patcher(&mut self, config: &Config) -> Result<()> {
        let mut last_reported = None;
        for _ in 0..PATCH_POLL_ATTEMPTS {
            let Some(progress) = self.read_progress_with_retries() else {
                tracing::error!("patch progress unreadable, restarting the launcher");
                self.driver.terminate_process(LAUNCHER_PROCESS);
                self.wait_for_process(LAUNCHER_PROCESS, false);
                bail!("patch progress unreadable");
            };
            if config.progress_logging && last_reported != Some(progress) {
                tracing::info!("patching: {progress}%");
                last_reported = Some(progress);
            }
            if progress >= 100 {
                return Ok(());
            }
            std::thread::sleep(self.poll_interval);
        }
        bail!("patcher did not finish in time");
    }

    fn read_progress_with_retries(&mut self) -> Option<u32> {
        for attempt in 0..PROGRESS_READ_ATTEMPTS {
            if let Some(progress) = self.driver.read_patch_progress() {
                return Some(progress);
            }
            if attempt + 1 < PROGRESS_READ_ATTEMPTS {
                std::thread::sleep(self.poll_interval);
            }
        }
        None
    }

    /// Wait until `name` is (or is no longer) running. Returns false on
    /// timeout.
    fn wait_for_process(&mut self, name: &str, should_run: bool) -> bool {
        for _ in 0..PROCESS_WAIT_ATTEMPTS {
            if self.driver.is_process_running(name) == should_run {
                return true;
            }
            std::thread::sleep(self.poll_interval);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_parse_selection_variants() {
        assert_eq!(parse_selection("", 3), vec![0, 1, 2]);
        assert_eq!(parse_selection("all", 3), vec![0, 1, 2]);
        assert_eq!(parse_selection("2", 3), vec![1]);
        assert_eq!(parse_selection("3, 1", 3), vec![2, 0]);
        assert_eq!(parse_selection("1,1,2", 3), vec![0, 1]);
        // Out-of-range and junk entries are dropped.
        assert_eq!(parse_selection("0,4,x,2", 3), vec![1]);
    }

    #[test]
    fn test_resolve_position_passthrough_and_edges() {
        let screen = (1920, 1080);
        let window = (800, 600);
        assert_eq!(resolve_position((0, 0), screen, window, 40), (0, 0));
        assert_eq!(resolve_position((100, 50), screen, window, 40), (100, 50));
        // Coordinates at the screen extent snap flush to that edge.
        assert_eq!(resolve_position((1920, 0), screen, window, 40), (1120, 0));
        assert_eq!(resolve_position((0, 1080), screen, window, 40), (0, 440));
    }

    #[test]
    fn test_resolve_position_never_negative() {
        // Window larger than the screen still lands on screen.
        assert_eq!(resolve_position((1920, 1080), (1920, 1080), (2000, 1200), 40), (0, 0));
    }

    /// Scripted launcher driver. Records every call; behavior is driven by
    /// the scripted fields.
    struct FakeDriver {
        calls: Vec<String>,
        connect_failures: usize,
        progress: VecDeque<Option<u32>>,
        launcher_running: bool,
        client_running: bool,
    }

    impl FakeDriver {
        fn new(connect_failures: usize, progress: Vec<Option<u32>>) -> Self {
            Self {
                calls: Vec::new(),
                connect_failures,
                progress: progress.into(),
                launcher_running: false,
                client_running: false,
            }
        }

        fn called(&self, prefix: &str) -> bool {
            self.calls.iter().any(|c| c.starts_with(prefix))
        }
    }

    impl LauncherDriver for FakeDriver {
        fn launch(&mut self, executable: &Path, args: &[String]) -> Result<()> {
            self.calls
                .push(format!("launch({}, {args:?})", executable.display()));
            self.launcher_running = true;
            Ok(())
        }

        fn is_process_running(&mut self, name: &str) -> bool {
            match name {
                LAUNCHER_PROCESS => self.launcher_running,
                CLIENT_PROCESS => self.client_running,
                _ => false,
            }
        }

        fn terminate_process(&mut self, name: &str) {
            self.calls.push(format!("terminate({name})"));
            if name == LAUNCHER_PROCESS {
                self.launcher_running = false;
            }
        }

        fn connect_launcher(&mut self) -> Result<()> {
            self.calls.push("connect".into());
            if self.connect_failures > 0 {
                self.connect_failures -= 1;
                bail!("dialog not up yet");
            }
            Ok(())
        }

        fn enter_credentials(&mut self, username: &str, _password: &str) -> Result<()> {
            self.calls.push(format!("credentials({username})"));
            Ok(())
        }

        fn click_login(&mut self) -> Result<()> {
            self.calls.push("login".into());
            Ok(())
        }

        fn read_patch_progress(&mut self) -> Option<u32> {
            self.progress.pop_front().unwrap_or(Some(100))
        }

        fn click_play(&mut self) -> Result<()> {
            self.calls.push("play".into());
            // Pressing play hands off to the client and closes the launcher.
            self.launcher_running = false;
            self.client_running = true;
            Ok(())
        }

        fn work_area(&mut self) -> Option<(u32, u32, u32)> {
            Some((1920, 1080, 40))
        }

        fn position_client_window(
            &mut self,
            title: &str,
            account: &str,
            position: (i32, i32),
        ) -> Result<()> {
            self.calls
                .push(format!("position({title}, {account}, {position:?})"));
            Ok(())
        }
    }

    fn test_config() -> Config {
        serde_json::from_str(
            r#"{
                "school": "fire",
                "wizard_exe_path": "/games/Wizard101.exe",
                "window_positions": [[0, 0], [800, 0]]
            }"#,
        )
        .unwrap()
    }

    fn flow(driver: &mut FakeDriver) -> LoginFlow<'_, FakeDriver> {
        LoginFlow::new(driver).with_poll_interval(Duration::ZERO)
    }

    #[test]
    fn test_happy_path_calls_in_order() {
        let mut driver = FakeDriver::new(1, vec![Some(0), Some(57), Some(100)]);
        let accounts = vec![Account("alice".into(), "pw".into())];

        flow(&mut driver).run(&test_config(), &accounts).unwrap();

        let order: Vec<&str> = driver
            .calls
            .iter()
            .map(|c| c.split('(').next().unwrap())
            .collect();
        assert_eq!(
            order,
            vec!["launch", "connect", "connect", "credentials", "login", "play", "position"]
        );
        assert!(driver.called("credentials(alice)"));
        assert!(driver.called("position(Wizard101, alice, (0, 0))"));
    }

    #[test]
    fn test_accounts_cycle_through_window_positions() {
        let mut driver = FakeDriver::new(0, vec![]);
        let accounts = vec![
            Account("alice".into(), "pw".into()),
            Account("bob".into(), "pw".into()),
            Account("carol".into(), "pw".into()),
        ];

        flow(&mut driver).run(&test_config(), &accounts).unwrap();

        assert!(driver.called("position(Wizard101, alice, (0, 0))"));
        assert!(driver.called("position(Wizard101, bob, (800, 0))"));
        // Third account wraps around to the first position.
        assert!(driver.called("position(Wizard101, carol, (0, 0))"));
    }

    #[test]
    fn test_unreadable_progress_tears_down_the_launcher() {
        let mut driver = FakeDriver::new(0, vec![None, None, None]);
        let accounts = vec![Account("alice".into(), "pw".into())];

        // The account fails but run() itself succeeds (it moves on).
        flow(&mut driver).run(&test_config(), &accounts).unwrap();

        assert!(driver.called(&format!("terminate({LAUNCHER_PROCESS})")));
        assert!(!driver.called("play"));
    }

    #[test]
    fn test_steam_launch_uses_applaunch() {
        let mut config = test_config();
        config.enable_steam = true;
        config.steam_exe_path = Some(PathBuf::from("/steam/steam.exe"));
        let mut driver = FakeDriver::new(0, vec![]);
        let accounts = vec![Account("alice".into(), "pw".into())];

        flow(&mut driver).run(&config, &accounts).unwrap();

        assert!(driver.called(&format!(
            "launch(/steam/steam.exe, [\"-applaunch\", \"{STEAM_APP_ID}\"]"
        )));
    }

    #[test]
    fn test_missing_executable_path_is_an_error() {
        let mut config = test_config();
        config.wizard_exe_path = None;
        let mut driver = FakeDriver::new(0, vec![]);
        let accounts = vec![Account("alice".into(), "pw".into())];

        // Per-account failure is swallowed; nothing past launch may happen.
        flow(&mut driver).run(&config, &accounts).unwrap();
        assert!(driver.calls.is_empty());
    }

    #[test]
    fn test_no_accounts_is_an_error() {
        let mut driver = FakeDriver::new(0, vec![]);
        assert!(flow(&mut driver).run(&test_config(), &[]).is_err());
    }
}
