//! The extension as the host sees it.
//!
//! [`class_factory`] hands the host a placeholder right away; the real
//! downloader is attached once the dependency bootstrap reports ready.

pub mod downloader;

use std::time::Duration;

use crate::host::Host;
use crate::host::timers::TimerAction;

pub use downloader::GeoParquetDownloader;

const LEGACY_CHECK_DELAY: Duration = Duration::from_millis(100);

/// Host-facing extension lifecycle.
pub trait Extension {
    fn init_gui(&mut self, host: &mut Host);
    fn unload(&mut self, host: &mut Host);
}

/// Entry point: returns immediately and schedules the dependency bootstrap
/// for the next tick.
pub fn class_factory(host: &mut Host) -> ExtensionShim {
    host.timers
        .single_shot(Duration::ZERO, TimerAction::EnsureDependency);
    ExtensionShim::default()
}

/// Stands in for the real extension until its dependency is usable.
#[derive(Debug, Default)]
pub struct ExtensionShim {
    real: Option<GeoParquetDownloader>,
}

impl ExtensionShim {
    pub fn is_activated(&self) -> bool {
        self.real.is_some()
    }

    pub fn real_mut(&mut self) -> Option<&mut GeoParquetDownloader> {
        self.real.as_mut()
    }

    /// Build and attach the real extension. Calling it again is a no-op.
    pub fn activate_real(&mut self, host: &mut Host) {
        if self.real.is_some() {
            tracing::debug!("real extension already attached");
            return;
        }

        let mut real = GeoParquetDownloader::new();
        real.init_gui(host);
        host.message_bar
            .push_success("Success", "Plugin fully loaded with all functionalities");
        tracing::info!("real extension loaded and UI initialized");
        self.real = Some(real);
    }
}

impl Extension for ExtensionShim {
    fn init_gui(&mut self, host: &mut Host) {
        host.message_bar.push_info(
            "Info",
            "Plugin is loading… Please wait while dependencies install.",
        );
        host.timers
            .single_shot(LEGACY_CHECK_DELAY, TimerAction::CheckLegacyPlugin);
    }

    fn unload(&mut self, host: &mut Host) {
        if let Some(mut real) = self.real.take() {
            real.unload(host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host_in;
    use std::time::Instant;

    #[test]
    fn factory_arms_bootstrap_and_init_arms_legacy_check() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _rx) = host_in(dir.path());

        let mut shim = class_factory(&mut host);
        assert!(!shim.is_activated());
        shim.init_gui(&mut host);

        let due = host.timers.take_due(Instant::now() + Duration::from_secs(1));
        assert!(matches!(
            due.as_slice(),
            [TimerAction::EnsureDependency, TimerAction::CheckLegacyPlugin]
        ));
        assert_eq!(host.message_bar.len(), 1);
    }

    #[test]
    fn activation_is_idempotent_and_unload_detaches() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _rx) = host_in(dir.path());
        let mut shim = ExtensionShim::default();

        shim.activate_real(&mut host);
        shim.activate_real(&mut host);
        assert!(shim.is_activated());
        assert_eq!(host.toolbar().len(), 1);

        shim.unload(&mut host);
        assert!(!shim.is_activated());
        assert!(host.toolbar().is_empty());
    }
}
