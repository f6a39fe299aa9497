use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::Duration;

use crate::bootstrap::install::{HostOs, InstallPlan, InstallTask, InterpreterResolver};
use crate::bootstrap::poller::StatusPoller;
use crate::bootstrap::version::{DependencyProbe, PythonProbe, Verdict, Version, VersionGate};
use crate::error::BootstrapError;
use crate::host::Host;
use crate::host::tasks::TaskScheduler;
use crate::model::config::AppConfig;

use super::OneShot;

/// How a call to [`BootstrapCoordinator::ensure_ready`] was resolved.
#[derive(Debug)]
pub enum BootstrapStart {
    /// Readiness was already set; the continuation ran.
    AlreadyReady,
    /// The installed version passed the gate; the continuation ran.
    Satisfied(String),
    /// An install is already pending; the continuation will run with it.
    Joined,
    /// An install was submitted. The host must arm the poller after
    /// `initial_delay`.
    Installing {
        poller: StatusPoller,
        initial_delay: Duration,
    },
}

pub struct BootstrapCoordinator {
    gate: VersionGate,
    plan: InstallPlan,
    probe: Arc<dyn DependencyProbe>,
    initial_delay: Duration,
    interval: Duration,
}

impl BootstrapCoordinator {
    pub fn new(
        probe: Arc<dyn DependencyProbe>,
        plan: InstallPlan,
        minimum: Version,
        initial_delay: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            gate: VersionGate::new(Arc::clone(&probe), plan.package.clone(), minimum),
            plan,
            probe,
            initial_delay,
            interval,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let dependency = &config.dependency;
        let resolver = InterpreterResolver::new(HostOs::current(), dependency.interpreter.clone());
        let probe = Arc::new(PythonProbe::new(
            resolver.resolve(),
            dependency.module.clone(),
            config.dependency_search_paths(),
        ));
        let plan = InstallPlan {
            resolver,
            package_manager: dependency.package_manager.clone(),
            package: dependency.module.clone(),
            display_name: dependency.display_name.clone(),
        };

        Self::new(
            probe,
            plan,
            config.min_version(),
            Duration::from_millis(config.polling.initial_delay_ms),
            Duration::from_millis(config.polling.interval_ms),
        )
    }

    pub fn display_name(&self) -> &str {
        &self.plan.display_name
    }

    /// Make sure the dependency is usable, then run `on_ready`.
    ///
    /// Never blocks on the install: when one is needed the task is handed
    /// to `scheduler` and the returned poller watches it.
    pub fn ensure_ready(
        &self,
        mut on_ready: OneShot,
        host: &mut Host,
        scheduler: &mut dyn TaskScheduler,
    ) -> Result<BootstrapStart, BootstrapError> {
        if host.dependency.is_ready() {
            on_ready.fire(host);
            return Ok(BootstrapStart::AlreadyReady);
        }

        if let Some(task) = host.dependency.pending_task() {
            tracing::info!("install already pending ({task:?}), waiting for it");
            host.dependency.add_waiter(on_ready);
            return Ok(BootstrapStart::Joined);
        }

        let reason = match self.gate.check() {
            Verdict::Satisfied(version) => {
                let waiters = host.dependency.mark_ready();
                on_ready.fire(host);
                for mut waiter in waiters {
                    waiter.fire(host);
                }
                return Ok(BootstrapStart::Satisfied(version.to_string()));
            }
            Verdict::Missing => BootstrapError::DependencyMissing {
                name: self.plan.package.clone(),
            },
            Verdict::TooOld { found } => BootstrapError::DependencyTooOld {
                name: self.plan.package.clone(),
                found,
                required: self.gate.minimum().to_string(),
            },
        };
        tracing::warn!("{reason}, attempting to install/upgrade");

        self.start_install(on_ready, host, scheduler)
    }

    fn start_install(
        &self,
        on_ready: OneShot,
        host: &mut Host,
        scheduler: &mut dyn TaskScheduler,
    ) -> Result<BootstrapStart, BootstrapError> {
        let widget = host
            .message_bar
            .push_progress(&format!("Installing {}...", self.plan.display_name));

        let task = InstallTask::new(self.plan.clone(), Arc::clone(&self.probe), on_ready)
            .with_progress(widget);

        let id = match scheduler.add_task(Box::new(task)) {
            Ok(id) => id,
            Err(source) => {
                host.message_bar.dismiss(widget);
                let err = BootstrapError::SchedulerSubmissionFailed {
                    name: self.plan.package.clone(),
                    source,
                };
                host.message_bar.push_critical("Error", &err.to_string());
                tracing::error!(
                    "Failed to setup task with error: {err} ({err:?})\nTraceback: {}",
                    Backtrace::force_capture()
                );
                return Err(err);
            }
        };

        host.dependency.mark_installing(id);
        Ok(BootstrapStart::Installing {
            poller: StatusPoller::new(id, self.interval),
            initial_delay: self.initial_delay,
        })
    }
}
