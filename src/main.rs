use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use wizfarmer::combat::CombatLoop;
use wizfarmer::config::Config;
use wizfarmer::locator::{Locator, Scratch};
use wizfarmer::{platform, press_enter_to_exit};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        tracing::error!("fatal: {e:#}");
        // Keep the console window open so the error can be read when the
        // binary was double-clicked.
        press_enter_to_exit();
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".into());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    let lists = config
        .priority_lists()
        .context("failed to resolve spell priorities")?;

    tracing::info!(
        "wizfarmer starting, school: {}, spells: {:?}, window: '{}'",
        lists.school,
        lists.spells,
        config.window_title,
    );

    let scratch = Scratch::new()?;
    let locator = Locator::new(&config.assets_dir, scratch);

    let mut window = platform::connect_game_window(&config.window_title)
        .context("failed to find the game window")?;
    window
        .activate()
        .context("failed to focus the game window")?;
    let input = platform::system_input();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            tracing::info!("shutdown requested");
            running.store(false, Ordering::SeqCst);
        })
        .context("failed to install the interrupt handler")?;
    }

    let mut combat = CombatLoop::new(
        window,
        input,
        locator,
        lists,
        config.idle_interval(),
        config.engaged_interval(),
    );
    combat.run(&running)
}
