//! Dependency version gate and the import probe behind it.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^v?(\d+)\.(\d+)(?:\.(\d+))?(?:\.\d+)*(?:\.?(?:dev|a|b|rc|post)\d*)*(?:[-+][0-9A-Za-z.+\-]*)?$",
    )
    .expect("valid version regex")
});

/// Numeric release triple. Pre-release and local suffixes are accepted when
/// parsing but do not take part in ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `1.2`, `1.2.3`, `v1.2.3`, `1.2.3.4`, `1.2.0.dev1`, `1.2.3rc1`, `1.2.3+local`.
    /// Release parts past the third are accepted and dropped.
    /// Returns `None` for anything else, including components that overflow.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(raw.trim())?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = match caps.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Satisfied(Version),
    Missing,
    /// Installed but below the minimum, or reporting a version we can't read.
    TooOld { found: String },
}

/// Asks the environment which version of the dependency is importable.
pub trait DependencyProbe: Send + Sync {
    /// `None` when the import fails.
    fn installed_version(&self) -> Option<String>;

    /// Forget anything cached so the next probe sees a fresh install.
    fn invalidate_caches(&self);
}

/// Probes by importing the module in a child interpreter.
#[derive(Debug)]
pub struct PythonProbe {
    interpreter: PathBuf,
    module: String,
    search_paths: Vec<PathBuf>,
    cache: Mutex<Option<Option<String>>>,
}

impl PythonProbe {
    pub fn new(interpreter: PathBuf, module: impl Into<String>, search_paths: Vec<PathBuf>) -> Self {
        Self {
            interpreter,
            module: module.into(),
            search_paths,
            cache: Mutex::new(None),
        }
    }

    fn python_path(&self) -> Option<OsString> {
        let existing = std::env::var_os("PYTHONPATH");
        let mut paths: Vec<PathBuf> = self.search_paths.clone();
        if let Some(existing) = &existing {
            paths.extend(std::env::split_paths(existing));
        }
        if paths.is_empty() {
            return None;
        }
        std::env::join_paths(paths).ok()
    }

    fn import(&self) -> Option<String> {
        let script = format!(
            "import sys, {m}; sys.stdout.write(str({m}.__version__))",
            m = self.module
        );
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(python_path) = self.python_path() {
            command.env("PYTHONPATH", python_path);
        }

        let output = match command.output() {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    "could not run {} to probe {}: {err}",
                    self.interpreter.display(),
                    self.module
                );
                return None;
            }
        };

        if !output.status.success() {
            return None;
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Some(version)
    }
}

impl DependencyProbe for PythonProbe {
    fn installed_version(&self) -> Option<String> {
        if let Some(cached) = self.cache.lock().ok().and_then(|cache| cache.clone()) {
            return cached;
        }

        let found = self.import();
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(found.clone());
        }
        found
    }

    fn invalidate_caches(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }
}

pub struct VersionGate {
    probe: Arc<dyn DependencyProbe>,
    module: String,
    minimum: Version,
}

impl VersionGate {
    pub fn new(probe: Arc<dyn DependencyProbe>, module: impl Into<String>, minimum: Version) -> Self {
        Self {
            probe,
            module: module.into(),
            minimum,
        }
    }

    pub fn minimum(&self) -> Version {
        self.minimum
    }

    pub fn check(&self) -> Verdict {
        let Some(found) = self.probe.installed_version() else {
            tracing::warn!("{} not found, attempting to install", self.module);
            return Verdict::Missing;
        };

        let verdict = judge(&found, self.minimum);
        match &verdict {
            Verdict::Satisfied(version) => {
                tracing::info!("{} {version} already installed", self.module);
            }
            Verdict::TooOld { found } => {
                tracing::warn!(
                    "{} {found} found but needs upgrade to {}+",
                    self.module,
                    self.minimum
                );
            }
            Verdict::Missing => {}
        }
        verdict
    }
}

/// Compare a reported version against the minimum. Unreadable versions count
/// as too old so they get reinstalled.
pub fn judge(found: &str, minimum: Version) -> Verdict {
    match Version::parse(found) {
        Some(version) if version >= minimum => Verdict::Satisfied(version),
        _ => Verdict::TooOld {
            found: found.to_string(),
        },
    }
}
