//! Mesh Plugins - built-in plugins for the assistant device mesh.
//!
//! Each plugin is selectable by name through [`registry::create`], which is
//! how the `mesh-loader` binary picks what to run.
//!
//! # Modules
//!
//! - `fortune` - serves `grab_a_message`
//! - `french_fortune` - serves `parley` by asking `fortune` for a message
//! - `tester` - one-shot client that sends `parley` and logs the answer
//! - `cli` - forwards stdin lines to the coordinator as `dispatch` calls
//! - `registry` - plugin name to factory lookup

pub mod cli;
pub mod fortune;
pub mod french_fortune;
pub mod registry;
pub mod tester;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use cli::Cli;
pub use fortune::{Fortune, FortuneMessage};
pub use french_fortune::FrenchFortune;
pub use registry::{available, create, PluginFactory};
pub use tester::Tester;
