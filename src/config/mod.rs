pub mod prefs;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backend: the vending server on its stock port
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the vending backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Number of vending slots (buttons 1..=slots)
    #[serde(default = "default_slots")]
    pub slots: u8,

    /// How long a success message stays before reverting to "Ready to vend"
    #[serde(default = "default_success_revert_ms")]
    pub success_revert_ms: u64,

    /// Max lines kept in the communication log view
    #[serde(default = "default_log_window")]
    pub log_window: usize,

    #[serde(default)]
    pub intervals: PollIntervals,

    #[serde(default)]
    pub panels: Panels,

    /// Hex colour overrides, e.g. `online = "#a6da95"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeOverrides>,
}

/// Poll periods in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollIntervals {
    #[serde(default = "default_status_ms")]
    pub status_ms: u64,
    #[serde(default = "default_mode_ms")]
    pub mode_ms: u64,
    #[serde(default = "default_devices_ms")]
    pub devices_ms: u64,
    #[serde(default = "default_log_ms")]
    pub log_ms: u64,
}

/// Optional panels. The slot buttons and the connectivity indicator are
/// always shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panels {
    #[serde(default = "default_true")]
    pub connection: bool,
    #[serde(default = "default_true")]
    pub monitor: bool,
    #[serde(default = "default_true")]
    pub devices: bool,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThemeOverrides {
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub online: Option<String>,
    #[serde(default)]
    pub offline: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub text_dim: Option<String>,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_slots() -> u8 {
    5
}
fn default_success_revert_ms() -> u64 {
    3000
}
fn default_log_window() -> usize {
    crate::monitor::LOG_WINDOW
}
fn default_status_ms() -> u64 {
    10_000
}
fn default_mode_ms() -> u64 {
    5_000
}
fn default_devices_ms() -> u64 {
    8_000
}
fn default_log_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_ms: default_request_timeout_ms(),
            slots: default_slots(),
            success_revert_ms: default_success_revert_ms(),
            log_window: default_log_window(),
            intervals: PollIntervals::default(),
            panels: Panels::default(),
            theme: None,
        }
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            status_ms: default_status_ms(),
            mode_ms: default_mode_ms(),
            devices_ms: default_devices_ms(),
            log_ms: default_log_ms(),
        }
    }
}

impl Default for Panels {
    fn default() -> Self {
        Self {
            connection: true,
            monitor: true,
            devices: true,
            debug: false,
        }
    }
}

impl AppConfig {
    /// `~/.config/vendpanel`, created on demand
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("vendpanel");

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!("Could not create config directory: {}", e);
        }

        Ok(config_dir)
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from file, or create default
    pub fn load() -> Result<Self> {
        let path = match Self::config_path() {
            Ok(p) => p,
            Err(_) => return Ok(AppConfig::default()),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => return Ok(config.sanitized()),
                    Err(e) => {
                        // Keep the user's file; just run on defaults
                        tracing::warn!("Failed to parse config: {}", e);
                        return Ok(AppConfig::default());
                    }
                },
                Err(e) => tracing::warn!("Failed to read config: {}", e),
            }
        }

        let config = AppConfig::default();
        let _ = config.save_to(path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Clamp values that would break the UI or hammer the backend
    fn sanitized(mut self) -> Self {
        self.slots = self.slots.clamp(1, 9);
        self.log_window = self.log_window.max(1);
        self.intervals.status_ms = self.intervals.status_ms.max(250);
        self.intervals.mode_ms = self.intervals.mode_ms.max(250);
        self.intervals.devices_ms = self.intervals.devices_ms.max(250);
        self.intervals.log_ms = self.intervals.log_ms.max(100);
        if self.backend_url.trim().is_empty() {
            self.backend_url = default_backend_url();
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn success_revert(&self) -> Duration {
        Duration::from_millis(self.success_revert_ms)
    }
}

impl PollIntervals {
    pub fn status(&self) -> Duration {
        Duration::from_millis(self.status_ms)
    }
    pub fn mode(&self) -> Duration {
        Duration::from_millis(self.mode_ms)
    }
    pub fn devices(&self) -> Duration {
        Duration::from_millis(self.devices_ms)
    }
    pub fn log(&self) -> Duration {
        Duration::from_millis(self.log_ms)
    }
}
