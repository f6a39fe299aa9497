use std::fs;
use std::path::{Path, PathBuf};

use crate::plugin::manifest::{PluginId, PluginManifest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    Discovered,
    Loaded,
    Started,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct PluginRuntime {
    pub id: PluginId,
    pub root_dir: PathBuf,
    pub manifest: Option<PluginManifest>,
    pub status: PluginStatus,
}

impl PluginRuntime {
    pub fn discover(id: PluginId, root_dir: PathBuf) -> Self {
        match Self::read_manifest(&root_dir) {
            Ok(manifest) => Self {
                id,
                root_dir,
                manifest: Some(manifest),
                status: PluginStatus::Discovered,
            },
            Err(err) => Self {
                id,
                root_dir,
                manifest: None,
                status: PluginStatus::Error(err),
            },
        }
    }

    pub fn status(&self) -> &PluginStatus {
        &self.status
    }

    pub fn is_started(&self) -> bool {
        self.status == PluginStatus::Started
    }

    pub fn display_name(&self) -> String {
        self.manifest
            .as_ref()
            .map(|manifest| manifest.name.clone())
            .unwrap_or_else(|| self.id.0.clone())
    }

    fn read_manifest(root_dir: &Path) -> Result<PluginManifest, String> {
        let manifest_path = root_dir.join("metadata.toml");
        let raw = fs::read_to_string(&manifest_path)
            .map_err(|err| format!("{}: {err}", manifest_path.display()))?;

        toml::from_str::<PluginManifest>(&raw)
            .map_err(|err| format!("{}: {err}", manifest_path.display()))
    }

    pub fn load(&mut self) -> Result<(), String> {
        if matches!(self.status, PluginStatus::Loaded | PluginStatus::Started) {
            return Ok(());
        }

        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| "missing plugin metadata".to_string())?;

        if !self.root_dir.is_dir() {
            let err = format!("plugin directory vanished: {}", self.root_dir.display());
            self.status = PluginStatus::Error(err.clone());
            return Err(err);
        }

        tracing::debug!(
            "loaded plugin {} {} from {}",
            manifest.name,
            manifest.version,
            manifest.entry
        );
        self.status = PluginStatus::Loaded;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), String> {
        match self.status {
            PluginStatus::Started => Ok(()),
            PluginStatus::Loaded => {
                self.status = PluginStatus::Started;
                Ok(())
            }
            PluginStatus::Discovered => Err(format!("plugin {} is not loaded", self.id.0)),
            PluginStatus::Error(ref err) => Err(err.clone()),
        }
    }

    pub fn unload(&mut self) -> Result<(), String> {
        match self.status {
            PluginStatus::Loaded | PluginStatus::Started => {
                self.status = PluginStatus::Discovered;
                Ok(())
            }
            PluginStatus::Discovered => Err(format!("plugin {} is not loaded", self.id.0)),
            PluginStatus::Error(ref err) => Err(err.clone()),
        }
    }
}
