use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Flat key/value settings persisted as TOML, e.g. `"PythonPlugins/name" = false`.
///
/// Writes stay in memory until [`SettingsStore::sync`].
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    values: BTreeMap<String, toml::Value>,
    dirty: bool,
}

impl SettingsStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading settings {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing settings {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values,
            dirty: false,
        })
    }

    pub fn value(&self, key: &str) -> Option<&toml::Value> {
        self.values.get(key)
    }

    pub fn bool_value(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(toml::Value::as_bool)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.values.insert(key.into(), value.into());
        self.dirty = true;
    }

    #[cfg(test)]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flush to disk through a temp file so a crash never leaves half a file.
    pub fn sync(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let text = toml::to_string(&self.values)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            file.write_all(text.as_bytes())?;
            file.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;

        self.dirty = false;
        Ok(())
    }
}

/// Settings key holding whether the named plugin may be loaded.
pub fn plugin_enabled_key(name: &str) -> String {
    format!("PythonPlugins/{name}")
}
