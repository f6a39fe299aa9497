//! Error types for the dependency bootstrap.

use std::path::PathBuf;

use crate::host::tasks::{SubmitError, TaskDisposed};

/// Everything that can go wrong between probing the dependency and
/// activating the real extension.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("{name} is not installed")]
    DependencyMissing { name: String },

    #[error("{name} {found} found but needs upgrade to {required}+")]
    DependencyTooOld {
        name: String,
        found: String,
        required: String,
    },

    #[error("Pip install failed: `{command}` exited with {status}{}", stderr_suffix(.stderr))]
    InstallCommandFailed {
        command: String,
        status: String,
        stderr: Option<String>,
    },

    #[error("Failed to install/upgrade {name}: {source}")]
    InstallationFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("installation of {name} was cancelled")]
    Cancelled { name: String },

    #[error("Failed to install/upgrade {name}: {source}")]
    SchedulerSubmissionFailed {
        name: String,
        #[source]
        source: SubmitError,
    },

    #[error(transparent)]
    TaskDisposed(#[from] TaskDisposed),

    #[error("failed to unload legacy plugin {name}: {reason}")]
    LegacyUnloadFailed { name: String, reason: String },

    #[error("error renaming plugin folder {}: {source}", .from.display())]
    LegacyRenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist disabled flag for {name}: {reason}")]
    LegacySettingsFailed { name: String, reason: String },
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(text) if !text.is_empty() => format!(": {text}"),
        _ => String::new(),
    }
}
