//! Plugin settings loader.
//!
//! Loads per-plugin settings from JSON files in the plugin directory.

use super::schema::PluginSettings;
use crate::error::{MeshError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Loads and caches plugin settings.
#[derive(Debug, Clone)]
pub struct PluginSettingsLoader {
    /// Directory containing plugin JSON files.
    plugin_dir: PathBuf,
    settings: HashMap<String, PluginSettings>,
}

impl PluginSettingsLoader {
    /// Read every `*.json` file in `plugin_dir`.
    ///
    /// A missing directory yields an empty loader. Files that fail to parse are
    /// logged and skipped.
    pub fn new(plugin_dir: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self {
            plugin_dir: plugin_dir.as_ref().to_path_buf(),
            settings: HashMap::new(),
        };
        loader.reload()?;
        Ok(loader)
    }

    /// Reload all settings from disk.
    pub fn reload(&mut self) -> Result<usize> {
        self.settings.clear();

        if !self.plugin_dir.is_dir() {
            debug!(
                "Plugin directory {} does not exist; using defaults",
                self.plugin_dir.display()
            );
            return Ok(0);
        }

        let entries = std::fs::read_dir(&self.plugin_dir).map_err(|e| MeshError::Io {
            message: format!(
                "Failed to read plugin directory {}: {}",
                self.plugin_dir.display(),
                e
            ),
            source: Some(e),
        })?;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();

            // Only process .json files
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }

            match load_settings_file(&path) {
                Ok(settings) => {
                    info!("Loaded settings for {}", settings.name);
                    self.settings.insert(settings.name.clone(), settings);
                }
                Err(e) => {
                    warn!("Failed to load plugin settings from {}: {}", path.display(), e);
                }
            }
        }

        debug!(
            "Loaded {} settings file(s) from {}",
            self.settings.len(),
            self.plugin_dir.display()
        );
        Ok(self.settings.len())
    }

    /// Settings for `name`, or defaults when there is no file for it.
    pub fn get(&self, name: &str) -> PluginSettings {
        self.settings
            .get(name)
            .cloned()
            .unwrap_or_else(|| PluginSettings::defaults_for(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.settings.contains_key(name)
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn count(&self) -> usize {
        self.settings.len()
    }
}

fn load_settings_file(path: &Path) -> Result<PluginSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| MeshError::Io {
        message: format!("Failed to read {}: {}", path.display(), e),
        source: Some(e),
    })?;

    let mut settings: PluginSettings =
        serde_json::from_str(&content).map_err(|e| MeshError::Json {
            message: format!("Failed to parse {}: {}", path.display(), e),
            source: Some(e),
        })?;

    if settings.name.is_empty() {
        settings.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(String::from)
            .ok_or_else(|| MeshError::Config {
                message: format!("Cannot derive a plugin name from {}", path.display()),
            })?;
    }

    Ok(settings)
}
