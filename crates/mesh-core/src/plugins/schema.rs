//! Per-plugin settings schema.
//!
//! One JSON file per plugin, named `<plugin-name>.json`:
//!
//! ```json
//! {
//!   "enabled": true,
//!   "tickIntervalMs": 500,
//!   "options": { "language": "fr" }
//! }
//! ```

use crate::message::Payload;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one plugin process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    /// Plugin name. Defaults to the file stem.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Pause between tick cycles, overriding the runtime default.
    #[serde(default, alias = "tick_interval_ms", skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,
    /// Free-form options interpreted by the plugin itself.
    #[serde(default)]
    pub options: Payload,
}

fn default_enabled() -> bool {
    true
}

impl PluginSettings {
    /// Defaults for a plugin without a settings file.
    pub fn defaults_for(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            tick_interval_ms: None,
            options: Payload::new(),
        }
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }

    /// String option lookup.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// Duration option given in milliseconds.
    pub fn option_millis(&self, key: &str) -> Option<Duration> {
        self.options
            .get(key)
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
    }
}
