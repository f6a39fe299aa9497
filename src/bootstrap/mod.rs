//! Dependency bootstrap: probe the dependency, install it in the background
//! when it is missing or too old, and activate the real extension exactly
//! once it is usable.

pub mod coordinator;
pub mod install;
pub mod legacy;
pub mod poller;
pub mod state;
pub mod version;

pub use coordinator::{BootstrapCoordinator, BootstrapStart};
pub use legacy::LegacyMigrator;
pub use state::{DependencyState, OneShot};
