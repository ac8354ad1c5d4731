use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::canvas::BrushConfig;
use crate::ops::ai::DEFAULT_MODEL;
use crate::ops::prompt::PresetCategory;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No configuration directory available on this system")]
    NoConfigDir,
    #[error("Could not write settings to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistent user preferences.
///
/// Stored as JSON in the OS config directory:
///   Linux:   ~/.config/RenderAI/settings.json
///   Windows: %APPDATA%\RenderAI\settings.json
///   macOS:   ~/Library/Application Support/RenderAI/settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub model_id: String,
    /// Empty = fall back to the environment.
    pub api_key: String,
    /// Rules appended to every prompt.
    pub style_memory: String,
    pub brush_size: f32,
    /// RGBA, unmultiplied.
    pub brush_color: [u8; 4],
    pub max_mask_steps: usize,
    pub preset_category: PresetCategory,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
            style_memory: String::new(),
            brush_size: 30.0,
            brush_color: [255, 0, 0, 255],
            max_mask_steps: 50,
            preset_category: PresetCategory::Exterior,
        }
    }
}

impl AppSettings {
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("RenderAI").join("settings.json"))
    }

    /// Load from the default location. A missing or unreadable file yields
    /// defaults; nothing here fails the launch.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log_warn!("No config directory; using default settings");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                log_warn!("Could not read settings {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(settings) => settings,
            Err(e) => {
                log_warn!("Settings file {} is corrupt ({}); using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Write via a sibling temp file and rename, so a crash never leaves a
    /// half-written settings file behind.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;
        Ok(())
    }

    pub fn brush(&self) -> BrushConfig {
        BrushConfig {
            size: self.brush_size.max(1.0),
            color: image::Rgba(self.brush_color),
        }
    }

    pub fn set_brush(&mut self, brush: BrushConfig) {
        self.brush_size = brush.size;
        self.brush_color = brush.color.0;
    }

    /// Configured key, if any (environment lookup happens in the client).
    pub fn configured_key(&self) -> Option<String> {
        let key = self.api_key.trim();
        (!key.is_empty()).then(|| key.to_string())
    }
}
