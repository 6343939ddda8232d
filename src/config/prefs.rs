//! Slot display names, persisted as one small JSON object.
//!
//! The file holds `{"2": "Soda", "5": "Chips"}`. Slots without an entry
//! show their default `Slot N` label. Reading never fails loudly: a missing
//! or broken file just means "no custom names".

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Fixed file name inside the config directory
pub const SLOT_NAMES_FILE: &str = "slot_names.json";

/// slot id -> display name
pub type SlotNames = BTreeMap<u8, String>;

pub fn default_label(slot: u8) -> String {
    format!("Slot {}", slot)
}

#[derive(Debug, Clone)]
pub struct PrefStore {
    path: PathBuf,
}

impl PrefStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the standard config directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::at(crate::config::AppConfig::config_dir()?.join(SLOT_NAMES_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Trim names, drop empty ones, and overwrite the stored mapping.
    /// Returns what was actually written.
    pub fn save(&self, names: &SlotNames) -> Result<SlotNames> {
        let cleaned: SlotNames = names
            .iter()
            .filter_map(|(slot, name)| {
                let name = name.trim();
                (!name.is_empty()).then(|| (*slot, name.to_string()))
            })
            .collect();

        // JSON object keys are strings: {"2": "Soda"}
        let wire: BTreeMap<String, &String> =
            cleaned.iter().map(|(slot, name)| (slot.to_string(), name)).collect();
        std::fs::write(&self.path, serde_json::to_string(&wire)?)?;

        tracing::debug!("Saved {} slot name(s) to {}", cleaned.len(), self.path.display());
        Ok(cleaned)
    }

    /// Read the stored mapping. Absent, empty, or malformed → empty map.
    pub fn load(&self) -> SlotNames {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SlotNames::new(),
            Err(e) => {
                tracing::warn!("Could not read saved slot names: {}", e);
                return SlotNames::new();
            }
        };

        if content.trim().is_empty() {
            return SlotNames::new();
        }

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Could not load saved slot names: {}", e);
                return SlotNames::new();
            }
        };

        raw.into_iter()
            .filter_map(|(key, value)| {
                let slot = key.trim().parse::<u8>().ok()?;
                let name = value.as_str()?.trim();
                (!name.is_empty()).then(|| (slot, name.to_string()))
            })
            .collect()
    }
}
