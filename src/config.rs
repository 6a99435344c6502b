//! Previewer configuration persistence
//!
//! Stores user preferences in `~/.config/vtl-preview/config.yaml`

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::EngineOptions;

/// Previewer configuration that persists across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Fail on unresolved references instead of rendering them literally
    pub strict_references: bool,
    /// Make `$format_date(fmt)` available to templates
    pub format_date_helper: bool,
    /// Submit a render after every edit instead of waiting for a trigger
    pub render_on_edit: bool,
    /// Re-run inline validation after every edit
    pub validate_on_edit: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            strict_references: false,
            format_date_helper: true,
            render_on_edit: false,
            validate_on_edit: true,
        }
    }
}

impl PreviewConfig {
    /// Load config from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = crate::config_paths::config_file() else {
            tracing::debug!("No config directory available, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load config from an explicit path, or return defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to disk
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> Result<(), String> {
        let path = crate::config_paths::config_file()
            .ok_or_else(|| "No config directory available".to_string())?;
        self.save_to(&path)
    }

    /// Save config to an explicit path, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, content)
            .map_err(|e| format!("Failed to write config to {}: {}", path.display(), e))?;

        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Engine settings derived from this config
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            strict_references: self.strict_references,
            helpers: self.format_date_helper,
        }
    }
}
