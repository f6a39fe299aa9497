use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::host::settings::{SettingsStore, plugin_enabled_key};
use crate::plugin::manifest::PluginId;
use crate::plugin::runtime::{PluginRuntime, PluginStatus};

/// Plugins installed under the host's plugin root, keyed by directory name.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    root: PathBuf,
    runtimes: BTreeMap<PluginId, PluginRuntime>,
}

impl PluginRegistry {
    pub fn discover(root: PathBuf) -> Self {
        let mut registry = Self {
            root,
            runtimes: BTreeMap::new(),
        };

        let entries = match fs::read_dir(&registry.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!("no plugins at {}: {err}", registry.root.display());
                return registry;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !path.join("metadata.toml").is_file() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };

            let id = PluginId::new(name);
            registry
                .runtimes
                .entry(id.clone())
                .or_insert_with(|| PluginRuntime::discover(id, path));
        }

        registry
    }

    /// Load and start every plugin the user has switched on.
    pub fn start_enabled(&mut self, settings: &SettingsStore) {
        let enabled: Vec<String> = self
            .runtimes
            .keys()
            .filter(|id| settings.bool_value(&plugin_enabled_key(id.as_str())) == Some(true))
            .map(|id| id.0.clone())
            .collect();

        for name in enabled {
            let result = self.load_plugin(&name).and_then(|()| self.start_plugin(&name));
            if let Err(err) = result {
                tracing::warn!("plugin {name} failed to start: {err}");
            }
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.runtimes
            .get(&PluginId::new(name))
            .is_some_and(PluginRuntime::is_started)
    }

    pub fn load_plugin(&mut self, name: &str) -> Result<(), String> {
        self.runtime_mut(name)?.load()
    }

    pub fn start_plugin(&mut self, name: &str) -> Result<(), String> {
        self.runtime_mut(name)?.start()
    }

    pub fn unload_plugin(&mut self, name: &str) -> Result<(), String> {
        self.runtime_mut(name)?.unload()
    }

    pub fn plugin_count(&self) -> usize {
        self.runtimes.len()
    }

    pub fn list_notifications(&self) -> Vec<String> {
        if self.runtimes.is_empty() {
            return vec![format!("plugins: none installed in {}", self.root.display())];
        }

        self.runtimes
            .values()
            .map(|runtime| {
                let status = match runtime.status() {
                    PluginStatus::Discovered => "inactive".to_string(),
                    PluginStatus::Loaded => "loaded".to_string(),
                    PluginStatus::Started => "active".to_string(),
                    PluginStatus::Error(err) => format!("error: {err}"),
                };

                let summary = runtime
                    .manifest
                    .as_ref()
                    .and_then(|manifest| manifest.description.as_deref())
                    .map(|description| format!(" {description}"))
                    .unwrap_or_default();

                format!(
                    "plugin {} [{status}]{summary} ({})",
                    runtime.display_name(),
                    runtime.root_dir.display()
                )
            })
            .collect()
    }

    fn runtime_mut(&mut self, name: &str) -> Result<&mut PluginRuntime, String> {
        self.runtimes
            .get_mut(&PluginId::new(name))
            .ok_or_else(|| format!("unknown plugin: {name}"))
    }
}
