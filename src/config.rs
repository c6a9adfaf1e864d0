use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Category holding enchant templates (`assets/sun/<name>.png`).
pub const ENCHANT_CATEGORY: &str = "sun";
/// Category holding buff/aura templates (`assets/star/<name>.png`).
pub const AURA_CATEGORY: &str = "star";
/// Category holding fixed UI controls (combat indicators, latency dialog).
pub const UI_CATEGORY: &str = "ui";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("no spell priority list configured for school '{0}'")]
    MissingSchool(String),
}

/// One launcher account, stored as `["username", "password"]` in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct Account(pub String, pub String);

impl Account {
    pub fn username(&self) -> &str {
        &self.0
    }

    pub fn password(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_window_title")]
    pub window_title: String,

    /// Active spell school; selects which `spell_priority` entry drives the
    /// cast phase.
    #[serde(default)]
    pub school: String,

    /// Root directory holding `<category>/<name>.png` templates.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Ordered element names per category. First on-screen hit wins.
    #[serde(default)]
    pub spell_priority: HashMap<String, Vec<String>>,

    /// Seconds between polls while nothing is happening.
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,

    /// Seconds between polls while engaged in combat.
    #[serde(default = "default_engaged_poll_secs")]
    pub engaged_poll_secs: u64,

    // Login-flow settings (autologin binary).
    #[serde(default)]
    pub accounts: Vec<Account>,

    #[serde(default)]
    pub wizard_exe_path: Option<PathBuf>,

    #[serde(default)]
    pub steam_exe_path: Option<PathBuf>,

    #[serde(default)]
    pub enable_account_selection: bool,

    #[serde(default)]
    pub enable_steam: bool,

    #[serde(default = "default_true")]
    pub enable_window_positioning: bool,

    /// Screen positions the client windows cycle through, `[x, y]` pairs.
    /// A coordinate equal to the screen edge means "flush against that edge".
    #[serde(default = "default_window_positions")]
    pub window_positions: Vec<(i32, i32)>,

    #[serde(default = "default_true")]
    pub progress_logging: bool,
}

/// Priority lists resolved for the configured school.
#[derive(Debug, Clone)]
pub struct PriorityLists {
    pub school: String,
    pub spells: Vec<String>,
    pub enchants: Vec<String>,
    pub auras: Vec<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Resolve the priority lists for the configured school. A missing entry
    /// for the school itself is fatal; missing enchant/aura lists degrade to
    /// empty (those phases simply never fire).
    pub fn priority_lists(&self) -> Result<PriorityLists, ConfigError> {
        let spells = self
            .spell_priority
            .get(&self.school)
            .cloned()
            .ok_or_else(|| ConfigError::MissingSchool(self.school.clone()))?;

        let enchants = self.optional_list(ENCHANT_CATEGORY);
        let auras = self.optional_list(AURA_CATEGORY);

        Ok(PriorityLists {
            school: self.school.clone(),
            spells,
            enchants,
            auras,
        })
    }

    fn optional_list(&self, category: &str) -> Vec<String> {
        match self.spell_priority.get(category) {
            Some(list) => list.clone(),
            None => {
                tracing::warn!("no '{category}' priority list configured, phase disabled");
                Vec::new()
            }
        }
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_secs)
    }

    pub fn engaged_interval(&self) -> Duration {
        Duration::from_secs(self.engaged_poll_secs)
    }
}

fn default_window_title() -> String {
    "Wizard101".into()
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_idle_poll_secs() -> u64 {
    5
}

fn default_engaged_poll_secs() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_window_positions() -> Vec<(i32, i32)> {
    vec![(0, 0)]
}
