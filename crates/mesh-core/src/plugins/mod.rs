//! Per-plugin settings files.
//!
//! The loader's plugin directory holds one JSON file per plugin. Settings are
//! optional: a plugin without a file runs with defaults.

mod loader;
mod schema;

pub use loader::PluginSettingsLoader;
pub use schema::PluginSettings;
