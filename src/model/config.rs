use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bootstrap::version::Version;

const DEFAULTS: &str = include_str!("../../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub host: HostConfig,
    pub dependency: DependencyConfig,
    pub polling: PollingConfig,
    pub legacy: LegacyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub log_filter: String,
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub plugins_dir: Option<PathBuf>,
    #[serde(default)]
    pub settings_file: Option<PathBuf>,
    pub message_timeout_secs: u64,
    pub max_active_tasks: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependencyConfig {
    /// Import name of the dependency, also used as the package name for the installer.
    pub module: String,
    pub display_name: String,
    pub min_version: String,
    /// The interpreter the host runs extensions with.
    pub interpreter: PathBuf,
    pub package_manager: String,
    /// Directory name of the extension under the plugin root; its `ext-libs`
    /// folder is searched before site-packages.
    pub extension_name: String,
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyConfig {
    pub plugin_name: String,
    pub notice_title: String,
    pub notice_text: String,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let mut config = Self::defaults()?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "gpq") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                let user_str = fs::read_to_string(&config_path)
                    .with_context(|| format!("reading {}", config_path.display()))?;
                config = toml::from_str(&user_str)
                    .with_context(|| format!("parsing {}", config_path.display()))?;
            }
        }

        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded defaults, without any user overrides.
    pub fn defaults() -> Result<Self> {
        Ok(toml::from_str(DEFAULTS)?)
    }

    fn expand_paths(&mut self) -> Result<()> {
        let home = dirs_home();
        let expand = |path: &Path| -> Result<PathBuf> {
            let text = path.to_string_lossy();
            if !text.starts_with('~') {
                return Ok(path.to_path_buf());
            }
            let home = home
                .as_ref()
                .ok_or_else(|| anyhow!("cannot determine home directory"))?;
            Ok(PathBuf::from(text.replacen('~', &home.to_string_lossy(), 1)))
        };

        if let Some(dir) = self.host.plugins_dir.take() {
            self.host.plugins_dir = Some(expand(&dir)?);
        }
        if let Some(file) = self.host.settings_file.take() {
            self.host.settings_file = Some(expand(&file)?);
        }
        self.dependency.search_paths = self
            .dependency
            .search_paths
            .iter()
            .map(|p| expand(p))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if Version::parse(&self.dependency.min_version).is_none() {
            return Err(anyhow!(
                "dependency.min_version is not a version: {}",
                self.dependency.min_version
            ));
        }
        if self.dependency.module.trim().is_empty() {
            return Err(anyhow!("dependency.module must not be empty"));
        }
        Ok(())
    }

    pub fn plugins_dir(&self) -> PathBuf {
        if let Some(dir) = &self.host.plugins_dir {
            return dir.clone();
        }

        if let Some(project_dirs) = directories::ProjectDirs::from("", "", "gpq") {
            return project_dirs.data_dir().join("plugins");
        }

        PathBuf::from(".gpq-plugins")
    }

    pub fn settings_path(&self) -> PathBuf {
        if let Some(file) = &self.host.settings_file {
            return file.clone();
        }

        if let Some(project_dirs) = directories::ProjectDirs::from("", "", "gpq") {
            return project_dirs.config_dir().join("settings.toml");
        }

        PathBuf::from(".gpq-settings.toml")
    }

    pub fn min_version(&self) -> Version {
        Version::parse(&self.dependency.min_version).unwrap_or(Version::new(1, 1, 0))
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.host.message_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.general.tick_ms.max(1))
    }

    /// Library directories bundled with the extension, searched ahead of the
    /// interpreter's own site-packages.
    pub fn dependency_search_paths(&self) -> Vec<PathBuf> {
        let ext_libs = self
            .plugins_dir()
            .join(&self.dependency.extension_name)
            .join("ext-libs");
        let mut paths = vec![ext_libs.join(&self.dependency.module), ext_libs];
        paths.extend(self.dependency.search_paths.iter().cloned());
        paths
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
