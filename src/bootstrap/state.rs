use std::fmt;

use crate::host::Host;
use crate::host::tasks::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    #[default]
    Start,
    Installing(TaskId),
    Ready,
    Failed,
}

impl Readiness {
    pub fn label(&self) -> &'static str {
        match self {
            Readiness::Start => "checking",
            Readiness::Installing(_) => "installing",
            Readiness::Ready => "ready",
            Readiness::Failed => "failed",
        }
    }
}

/// Whether the dependency is usable in this process. Only the bootstrap
/// module moves it forward; everything else reads it.
#[derive(Debug, Default)]
pub struct DependencyState {
    readiness: Readiness,
    waiters: Vec<OneShot>,
}

impl DependencyState {
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn pending_task(&self) -> Option<TaskId> {
        match self.readiness {
            Readiness::Installing(id) => Some(id),
            _ => None,
        }
    }

    pub(in crate::bootstrap) fn mark_installing(&mut self, task: TaskId) {
        self.readiness = Readiness::Installing(task);
    }

    /// Returns the continuations that joined while the install was pending;
    /// the caller fires them once it holds the host again.
    #[must_use]
    pub(in crate::bootstrap) fn mark_ready(&mut self) -> Vec<OneShot> {
        self.readiness = Readiness::Ready;
        std::mem::take(&mut self.waiters)
    }

    pub(in crate::bootstrap) fn mark_failed(&mut self) {
        self.readiness = Readiness::Failed;
        if !self.waiters.is_empty() {
            tracing::warn!(
                "dropping {} pending activation(s) after failed install",
                self.waiters.len()
            );
            self.waiters.clear();
        }
    }

    pub(in crate::bootstrap) fn add_waiter(&mut self, waiter: OneShot) {
        self.waiters.push(waiter);
    }
}

type Continuation = Box<dyn FnOnce(&mut Host) + Send>;

/// A continuation that runs at most once; later fires are no-ops.
pub struct OneShot(Option<Continuation>);

impl OneShot {
    pub fn new(f: impl FnOnce(&mut Host) + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A continuation that does nothing, for callers with no follow-up.
    #[cfg(test)]
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }

    /// Returns true if this call ran the continuation.
    pub fn fire(&mut self, host: &mut Host) -> bool {
        match self.0.take() {
            Some(f) => {
                f(host);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for OneShot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OneShot")
            .field(&if self.is_armed() { "armed" } else { "spent" })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host_in;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn one_shot_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _rx) = host_in(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut once = OneShot::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(once.is_armed());
        assert!(once.fire(&mut host));
        assert!(!once.fire(&mut host));
        assert!(!once.is_armed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_drops_waiters() {
        let mut state = DependencyState::default();
        state.add_waiter(OneShot::noop());
        state.mark_failed();
        assert_eq!(state.readiness(), Readiness::Failed);
        assert!(state.mark_ready().is_empty());
        assert!(state.is_ready());
    }
}
