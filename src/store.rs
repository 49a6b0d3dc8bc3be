//! Persistence for presets and auto-reset settings.
//!
//! The core only depends on the two traits; the JSON implementations read
//! and write files compatible with the original controller's
//! `presets.json` / `reset_settings.json`, creating defaults on first use.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Dc310sError, Result};
use crate::preset::Preset;
use crate::telemetry::ResetPolicy;

/// Key-value persistence for named presets.
pub trait PresetStore {
    /// All saved presets, keyed by name.
    fn load_all(&self) -> Result<BTreeMap<String, Preset>>;

    /// Save a preset under `name`, overwriting any existing entry.
    fn save(&mut self, name: &str, preset: Preset) -> Result<()>;
}

/// Persistence for the auto-reset policy selections.
pub trait PolicyStore {
    /// The saved policy.
    fn load(&self) -> Result<ResetPolicy>;

    /// Persist the policy.
    fn save(&mut self, policy: &ResetPolicy) -> Result<()>;
}

/// The presets shipped on first run.
pub fn default_presets() -> BTreeMap<String, Preset> {
    BTreeMap::from([
        (
            "USB Power Supply".to_string(),
            Preset {
                voltage: 5.0,
                current: 3.0,
            },
        ),
        (
            "Lead Acid Battery".to_string(),
            Preset {
                voltage: 13.7,
                current: 3.0,
            },
        ),
    ])
}

/// File-backed preset store (`presets.json` format).
pub struct JsonPresetStore {
    path: PathBuf,
}

impl JsonPresetStore {
    /// A store backed by the given file; created with defaults on first
    /// load if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonPresetStore { path: path.into() }
    }

    fn write_all(&self, presets: &BTreeMap<String, Preset>) -> Result<()> {
        let text = serde_json::to_string_pretty(presets)?;
        fs::write(&self.path, text).map_err(Dc310sError::StoreIo)
    }
}

impl PresetStore for JsonPresetStore {
    fn load_all(&self) -> Result<BTreeMap<String, Preset>> {
        if !self.path.exists() {
            let presets = default_presets();
            self.write_all(&presets)?;
            return Ok(presets);
        }
        let text = fs::read_to_string(&self.path).map_err(Dc310sError::StoreIo)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&mut self, name: &str, preset: Preset) -> Result<()> {
        let mut presets = self.load_all()?;
        presets.insert(name.to_string(), preset);
        self.write_all(&presets)
    }
}

/// File-backed policy store (`reset_settings.json` format).
pub struct JsonPolicyStore {
    path: PathBuf,
}

impl JsonPolicyStore {
    /// A store backed by the given file; created with the default policy
    /// on first load if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonPolicyStore { path: path.into() }
    }

    fn save_to_disk(&self, policy: &ResetPolicy) -> Result<()> {
        let text = serde_json::to_string_pretty(policy)?;
        fs::write(&self.path, text).map_err(Dc310sError::StoreIo)
    }
}

impl PolicyStore for JsonPolicyStore {
    fn load(&self) -> Result<ResetPolicy> {
        if !self.path.exists() {
            let policy = ResetPolicy::default();
            self.save_to_disk(&policy)?;
            return Ok(policy);
        }
        let text = fs::read_to_string(&self.path).map_err(Dc310sError::StoreIo)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&mut self, policy: &ResetPolicy) -> Result<()> {
        self.save_to_disk(policy)
    }
}

/// In-memory preset store for tests and filesystem-free embedders.
#[derive(Debug, Default)]
pub struct MemoryPresetStore {
    presets: BTreeMap<String, Preset>,
}

impl MemoryPresetStore {
    /// An empty in-memory store.
    pub fn new() -> Self {
        MemoryPresetStore::default()
    }
}

impl PresetStore for MemoryPresetStore {
    fn load_all(&self) -> Result<BTreeMap<String, Preset>> {
        Ok(self.presets.clone())
    }

    fn save(&mut self, name: &str, preset: Preset) -> Result<()> {
        self.presets.insert(name.to_string(), preset);
        Ok(())
    }
}
