//! Built-in plugins by name.

use crate::cli::Cli;
use crate::fortune::Fortune;
use crate::french_fortune::FrenchFortune;
use crate::tester::Tester;
use mesh_core::{PluginRuntimeBuilder, PluginSettings};

/// Names accepted by [`create`].
const AVAILABLE: &[&str] = &["cli", "fortune", "french-fortune", "tester"];

/// Installs one named plugin into a runtime builder.
pub trait PluginFactory: Send {
    fn name(&self) -> &str;

    fn install(self: Box<Self>, builder: PluginRuntimeBuilder) -> PluginRuntimeBuilder;
}

struct Installer<F> {
    name: &'static str,
    install: F,
}

impl<F> PluginFactory for Installer<F>
where
    F: FnOnce(PluginRuntimeBuilder) -> PluginRuntimeBuilder + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    fn install(self: Box<Self>, builder: PluginRuntimeBuilder) -> PluginRuntimeBuilder {
        (self.install)(builder)
    }
}

fn installer<F>(name: &'static str, install: F) -> Box<dyn PluginFactory>
where
    F: FnOnce(PluginRuntimeBuilder) -> PluginRuntimeBuilder + Send + 'static,
{
    Box::new(Installer { name, install })
}

/// Look up a built-in plugin. Returns `None` for unknown names.
pub fn create(name: &str, settings: &PluginSettings) -> Option<Box<dyn PluginFactory>> {
    let factory = match name {
        "cli" => {
            let cli = Cli::from_settings(settings);
            installer("cli", move |b| b.plugin(cli))
        }
        "fortune" => {
            let fortune = Fortune::from_settings(settings);
            installer("fortune", move |b| b.plugin(fortune))
        }
        "french-fortune" => installer("french-fortune", |b| b.plugin(FrenchFortune)),
        "tester" => {
            let tester = Tester::from_settings(settings);
            installer("tester", move |b| b.plugin(tester))
        }
        _ => return None,
    };
    Some(factory)
}

/// Every name [`create`] recognises.
pub fn available() -> &'static [&'static str] {
    AVAILABLE
}
