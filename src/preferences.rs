//! Persisted user preferences: currently just the mode to open in.

use crate::catalog::CHROMATIC_MODE_NAME;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub default_mode: Option<String>,
}

impl Preferences {
    /// Load from a JSON file. Returns None if the file is absent or malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(p) => {
                info!("Loaded preferences from {:?}", path);
                Some(p)
            }
            Err(e) => {
                warn!("Failed to parse preferences file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Preferences saved to {:?}", path);
        Ok(())
    }

    pub fn default_mode_or_chromatic(&self) -> &str {
        self.default_mode.as_deref().unwrap_or(CHROMATIC_MODE_NAME)
    }
}
