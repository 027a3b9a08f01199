//! Configuration for the display layer
//!
//! Loaded from TOML. Every section has defaults, so an empty file (or no
//! file at all) gives a working configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::{DisplayTarget, RegistrationMode};
use crate::poll::DEFAULT_THREAD_NAME;

/// Longest accepted look-ahead delay
pub const MAX_LOOK_AHEAD_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    /// Which compositor to talk to and what to bind
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Event poll thread settings
    #[serde(default)]
    pub events: EventConfig,

    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Socket name or path; unset means `WAYLAND_DISPLAY`
    pub display: Option<String>,

    pub registration: RegistrationMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Start the poll thread as part of initialization
    pub start_processing: bool,

    /// Schedule a second round-trip shortly after start
    pub look_ahead: bool,

    pub look_ahead_delay_ms: u64,

    pub thread_name: String,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            start_processing: true,
            look_ahead: true,
            look_ahead_delay_ms: 100,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl EventConfig {
    /// Delay of the look-ahead round-trip, if enabled
    pub fn look_ahead_delay(&self) -> Option<Duration> {
        self.look_ahead
            .then(|| Duration::from_millis(self.look_ahead_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    pub debug: bool,
}

impl DisplayConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: DisplayConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.events.look_ahead_delay_ms > MAX_LOOK_AHEAD_DELAY_MS {
            anyhow::bail!(
                "Invalid look_ahead_delay_ms: must be at most {}",
                MAX_LOOK_AHEAD_DELAY_MS
            );
        }

        if self.events.thread_name.trim().is_empty() {
            anyhow::bail!("Invalid thread_name: must not be empty");
        }

        if let Some(display) = &self.connection.display {
            if display.contains('\0') {
                anyhow::bail!("Invalid display name: contains a NUL byte");
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    pub fn display_target(&self) -> DisplayTarget {
        DisplayTarget::from_name(self.connection.display.as_deref())
    }
}

/// Expand a leading `~` to `$HOME`
fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
