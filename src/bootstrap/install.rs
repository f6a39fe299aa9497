use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::bootstrap::version::DependencyProbe;
use crate::error::BootstrapError;
use crate::host::Host;
use crate::host::message_bar::WidgetId;
use crate::host::tasks::{CancelToken, Task};

use super::OneShot;

const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => HostOs::Windows,
            "macos" => HostOs::MacOs,
            _ => HostOs::Other,
        }
    }
}

/// Picks the interpreter that owns the package environment the host loads
/// extensions from.
#[derive(Debug, Clone)]
pub struct InterpreterResolver {
    os: HostOs,
    interpreter: PathBuf,
}

impl InterpreterResolver {
    pub fn new(os: HostOs, interpreter: PathBuf) -> Self {
        Self { os, interpreter }
    }

    pub fn resolve(&self) -> PathBuf {
        let bin_dir = self
            .interpreter
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        match self.os {
            HostOs::Windows => bin_dir.join("python.exe"),
            HostOs::MacOs => [
                bin_dir.join("python3"),
                bin_dir.join("bin").join("python3"),
                bin_dir.join("Resources").join("python").join("bin").join("python3"),
            ]
            .into_iter()
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| self.interpreter.clone()),
            HostOs::Other => self.interpreter.clone(),
        }
    }
}

/// What to install and with which tool.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub resolver: InterpreterResolver,
    pub package_manager: String,
    pub package: String,
    pub display_name: String,
}

impl InstallPlan {
    fn command_line(&self, interpreter: &Path) -> String {
        format!(
            "{} -m {} install --user {}",
            interpreter.display(),
            self.package_manager,
            self.package
        )
    }
}

/// Installs the dependency on a worker thread, then reports back on the UI
/// thread and fires the activation continuation on success.
pub struct InstallTask {
    description: String,
    plan: InstallPlan,
    probe: Arc<dyn DependencyProbe>,
    progress: Option<WidgetId>,
    success: bool,
    message: String,
    error: Option<BootstrapError>,
    on_complete: OneShot,
}

impl InstallTask {
    pub fn new(plan: InstallPlan, probe: Arc<dyn DependencyProbe>, on_complete: OneShot) -> Self {
        Self {
            description: format!("Installing {}", plan.display_name),
            plan,
            probe,
            progress: None,
            success: false,
            message: String::new(),
            error: None,
            on_complete,
        }
    }

    /// The progress widget this attempt owns and must dismiss when done.
    pub fn with_progress(mut self, widget: WidgetId) -> Self {
        self.progress = Some(widget);
        self
    }

    #[cfg(test)]
    pub fn success(&self) -> bool {
        self.success
    }

    #[cfg(test)]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[cfg(test)]
    pub fn error(&self) -> Option<&BootstrapError> {
        self.error.as_ref()
    }

    fn install(&self, cancel: &CancelToken) -> Result<(), BootstrapError> {
        if cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled {
                name: self.plan.package.clone(),
            });
        }

        let interpreter = self.plan.resolver.resolve();
        let command_line = self.plan.command_line(&interpreter);
        tracing::info!("running {command_line}");

        let output = Command::new(&interpreter)
            .args(["-m", &self.plan.package_manager, "install", "--user"])
            .arg(&self.plan.package)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BootstrapError::InstallationFailed {
                name: self.plan.package.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr
                .lines()
                .filter(|line| !line.trim().is_empty())
                .collect::<Vec<_>>();
            let tail = tail[tail.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ");
            return Err(BootstrapError::InstallCommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: (!tail.is_empty()).then_some(tail),
            });
        }

        Ok(())
    }
}

impl Task for InstallTask {
    fn description(&self) -> &str {
        &self.description
    }

    fn run(&mut self, cancel: &CancelToken) -> bool {
        tracing::info!("Starting {} installation...", self.plan.display_name);

        match self.install(cancel) {
            Ok(()) => {
                self.probe.invalidate_caches();
                self.success = true;
                // Cosmetic only: the exit code already decided the outcome.
                self.message = match self.probe.installed_version() {
                    Some(version) => {
                        format!("{} {version} installed successfully", self.plan.display_name)
                    }
                    None => format!("{} installed successfully", self.plan.display_name),
                };
            }
            Err(err) => {
                match &err {
                    BootstrapError::InstallCommandFailed { .. } => {
                        tracing::warn!("Installation failed with error: {err}");
                    }
                    _ => tracing::error!("Installation failed with error: {err:?}"),
                }
                self.success = false;
                self.message = err.to_string();
                self.error = Some(err);
            }
        }

        self.success
    }

    fn finished(mut self: Box<Self>, result: bool, host: &mut Host) {
        if let Some(widget) = self.progress.take() {
            host.message_bar.dismiss(widget);
        }

        if result && self.success {
            host.message_bar.push_success("Success", &self.message);
            tracing::info!("{}", self.message);

            let waiters = host.dependency.mark_ready();
            self.on_complete.fire(host);
            for mut waiter in waiters {
                waiter.fire(host);
            }
        } else {
            if self.message.is_empty() {
                self.message = format!("Failed to install/upgrade {}", self.plan.package);
            }
            host.message_bar.push_critical("Error", &self.message);
            match &self.error {
                Some(err) => tracing::error!("{} install attempt failed: {err:?}", self.plan.display_name),
                None => tracing::error!("{}", self.message),
            }
            host.dependency.mark_failed();
        }
    }
}
