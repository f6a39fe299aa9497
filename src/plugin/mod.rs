pub mod manifest;
pub mod registry;
pub mod runtime;

pub use registry::PluginRegistry;
