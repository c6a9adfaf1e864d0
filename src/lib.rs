pub mod combat;
pub mod config;
pub mod locator;
pub mod login;
pub mod platform;
pub mod target;

use std::io::Write;

/// Block on Enter before exiting so the message stays readable when the
/// program was started outside a persistent terminal.
pub fn press_enter_to_exit() {
    print!("Press Enter to exit...");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}
