use std::path::{Path, PathBuf};

use crate::error::BootstrapError;
use crate::host::Host;
use crate::host::settings::plugin_enabled_key;
use crate::model::config::AppConfig;

const DISABLED_SUFFIX: &str = "_disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    NotInstalled,
    Deactivated { notified: bool },
}

/// Retires the previous, differently packaged deployment of the extension so
/// its toolbar buttons don't show up twice.
#[derive(Debug, Clone)]
pub struct LegacyMigrator {
    plugins_dir: PathBuf,
    name: String,
    notice_title: String,
    notice_text: String,
}

impl LegacyMigrator {
    pub fn new(plugins_dir: PathBuf, name: impl Into<String>) -> Self {
        Self {
            plugins_dir,
            name: name.into(),
            notice_title: String::new(),
            notice_text: String::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.plugins_dir(), config.legacy.plugin_name.clone())
            .with_notice(&config.legacy.notice_title, &config.legacy.notice_text)
    }

    pub fn with_notice(mut self, title: &str, text: &str) -> Self {
        self.notice_title = title.to_string();
        self.notice_text = text.to_string();
        self
    }

    fn legacy_dir(&self) -> PathBuf {
        self.plugins_dir.join(&self.name)
    }

    fn disabled_dir(&self) -> PathBuf {
        self.plugins_dir.join(format!("{}{DISABLED_SUFFIX}", self.name))
    }

    pub fn check_and_migrate(&self, host: &mut Host) -> MigrationOutcome {
        if !self.legacy_dir().exists() {
            return MigrationOutcome::NotInstalled;
        }
        tracing::info!("Found old plugin directory, handling migration");

        let notified = host.plugins.is_active(&self.name);
        if notified {
            tracing::info!("Old plugin is active, showing migration dialog");
            host.show_information(&self.notice_title, &self.notice_text);
        } else {
            tracing::info!("Old plugin exists but is not active");
        }

        self.deactivate(host);
        MigrationOutcome::Deactivated { notified }
    }

    /// Best effort throughout: every failure is logged and the remaining
    /// steps still run.
    fn deactivate(&self, host: &mut Host) {
        tracing::info!("Deactivating old plugin");

        host.settings.set_value(plugin_enabled_key(&self.name), false);
        if let Err(err) = host.settings.sync() {
            let err = BootstrapError::LegacySettingsFailed {
                name: self.name.clone(),
                reason: format!("{err:#}"),
            };
            tracing::warn!("{err}");
        }

        if host.plugins.is_active(&self.name) {
            match host.plugins.unload_plugin(&self.name) {
                Ok(()) => tracing::info!("Unloaded old plugin"),
                Err(reason) => {
                    let err = BootstrapError::LegacyUnloadFailed {
                        name: self.name.clone(),
                        reason,
                    };
                    tracing::warn!("{err}");
                }
            }
        }

        if let Err(err) = rename_if_free(&self.legacy_dir(), &self.disabled_dir()) {
            tracing::warn!("{err}");
        }
    }
}

fn rename_if_free(from: &Path, to: &Path) -> Result<(), BootstrapError> {
    if !from.exists() || to.exists() {
        return Ok(());
    }

    std::fs::rename(from, to).map_err(|source| BootstrapError::LegacyRenameFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    tracing::info!("Renamed old plugin directory");
    Ok(())
}
