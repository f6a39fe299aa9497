use serde::Deserialize;

/// Directory name of a plugin under the plugin root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `metadata.toml` at the root of a plugin directory.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_entry")]
    pub entry: String,
}

fn default_entry() -> String {
    "__init__.py".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_defaults_to_package_init() {
        let manifest: PluginManifest =
            toml::from_str("name = \"GeoParquet Downloader\"\nversion = \"0.6.0\"\n").unwrap();
        assert_eq!(manifest.entry, "__init__.py");
        assert!(manifest.description.is_none());
    }
}
