//! Log configured accounts into the game through the launcher, optionally
//! asking which accounts to start this run.

use std::io::Write;

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use wizfarmer::config::{Account, Config};
use wizfarmer::login::{LoginFlow, parse_selection};
use wizfarmer::{platform, press_enter_to_exit};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        tracing::error!("fatal: {e:#}");
        press_enter_to_exit();
        std::process::exit(1);
    }
    press_enter_to_exit();
}

fn run() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".into());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    if config.accounts.is_empty() {
        bail!("no accounts configured");
    }

    let accounts = if config.enable_account_selection {
        select_accounts(&config.accounts)?
    } else {
        config.accounts.clone()
    };

    let mut driver = platform::launcher_driver();
    LoginFlow::new(driver.as_mut()).run(&config, &accounts)
}

fn select_accounts(accounts: &[Account]) -> Result<Vec<Account>> {
    println!("Configured accounts:");
    for (i, account) in accounts.iter().enumerate() {
        println!("  {}: {}", i + 1, account.username());
    }
    print!("Accounts to start (comma-separated, empty for all): ");
    std::io::stdout().flush().context("failed to flush stdout")?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("failed to read selection")?;

    let selected: Vec<Account> = parse_selection(&input, accounts.len())
        .into_iter()
        .map(|i| accounts[i].clone())
        .collect();
    if selected.is_empty() {
        bail!("selection matched no accounts");
    }
    Ok(selected)
}
