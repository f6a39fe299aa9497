//! Background task scheduler.
//!
//! Task bodies run on worker threads; completions come back to the UI thread
//! as [`Msg::TaskFinished`] and are delivered with [`TaskManager::complete`],
//! which is the only place `Task::finished` is called.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::host::Host;
use crate::msg::Msg;

new_key_type! {
    pub struct TaskId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    /// Terminal, whether the task succeeded or not.
    Complete,
}

/// Returned when a task handle outlives the task it pointed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task {0:?} no longer exists")]
pub struct TaskDisposed(pub TaskId);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("task manager is shutting down")]
    ShuttingDown,
}

/// Cooperative cancellation flag shared between the scheduler and a task body.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Task: Send {
    fn description(&self) -> &str;

    /// Runs on a worker thread. Must not touch host state.
    fn run(&mut self, cancel: &CancelToken) -> bool;

    /// Runs on the UI thread once `run` has returned.
    fn finished(self: Box<Self>, result: bool, host: &mut Host);
}

/// The scheduler surface extensions see.
pub trait TaskScheduler {
    fn add_task(&mut self, task: Box<dyn Task>) -> Result<TaskId, SubmitError>;

    /// Start a queued task now, ignoring the concurrency limit.
    fn trigger_task(&mut self, id: TaskId) -> Result<(), TaskDisposed>;

    fn status(&self, id: TaskId) -> Result<TaskStatus, TaskDisposed>;
}

/// A finished task body travelling back to the UI thread.
pub struct TaskCompletion {
    id: TaskId,
    result: bool,
    task: Box<dyn Task>,
}

impl TaskCompletion {
    #[cfg(test)]
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl fmt::Debug for TaskCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCompletion")
            .field("id", &self.id)
            .field("result", &self.result)
            .field("task", &self.task.description())
            .finish()
    }
}

type TaskSlot = Arc<Mutex<Option<Box<dyn Task>>>>;

struct TaskEntry {
    description: String,
    status: TaskStatus,
    body: TaskSlot,
    cancel: CancelToken,
    completed_at: Option<Instant>,
}

pub struct TaskManager {
    tasks: SlotMap<TaskId, TaskEntry>,
    queue: VecDeque<TaskId>,
    running: usize,
    max_active: usize,
    retention: Duration,
    done_tx: mpsc::Sender<Msg>,
    accepting: bool,
}

impl TaskManager {
    pub fn new(max_active: usize, done_tx: mpsc::Sender<Msg>) -> Self {
        Self {
            tasks: SlotMap::with_key(),
            queue: VecDeque::new(),
            running: 0,
            max_active: max_active.max(1),
            retention: Duration::from_secs(5),
            done_tx,
            accepting: true,
        }
    }

    #[cfg(test)]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn count(&self) -> usize {
        self.tasks.len()
    }

    pub fn active_count(&self) -> usize {
        self.running
    }

    /// Hand a completed body its `finished` call and free its worker slot.
    pub fn complete(&mut self, completion: TaskCompletion, host: &mut Host) {
        let TaskCompletion { id, result, task } = completion;

        match self.tasks.get_mut(id) {
            Some(entry) if entry.status == TaskStatus::Running => {
                entry.status = TaskStatus::Complete;
                entry.completed_at = Some(Instant::now());
                self.running = self.running.saturating_sub(1);
            }
            _ => {
                tracing::warn!("completion for unknown task {id:?} ({})", task.description());
            }
        }

        tracing::debug!("task {} finished: {result}", task.description());
        task.finished(result, host);
        self.pump();
    }

    /// Refuse new work and ask every live task to stop.
    pub fn shutdown(&mut self) {
        self.accepting = false;
        for entry in self.tasks.values() {
            if entry.status != TaskStatus::Complete {
                entry.cancel.cancel();
            }
        }
    }

    /// Forget completed tasks older than the retention window.
    pub fn prune(&mut self, now: Instant) {
        let retention = self.retention;
        self.tasks.retain(|_, entry| {
            entry
                .completed_at
                .is_none_or(|done| now.duration_since(done) < retention)
        });
    }

    fn pump(&mut self) {
        while self.running < self.max_active {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            self.start(id);
        }
    }

    fn start(&mut self, id: TaskId) {
        self.queue.retain(|queued| *queued != id);

        let Some(entry) = self.tasks.get_mut(id) else {
            return;
        };
        if entry.status != TaskStatus::Queued {
            return;
        }

        entry.status = TaskStatus::Running;
        self.running += 1;

        let slot = Arc::clone(&entry.body);
        let cancel = entry.cancel.clone();
        let tx = self.done_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("task: {}", entry.description))
            .spawn({
                let slot = Arc::clone(&slot);
                let tx = tx.clone();
                move || {
                    let taken = slot.lock().ok().and_then(|mut guard| guard.take());
                    let Some(mut task) = taken else {
                        return;
                    };
                    let result = task.run(&cancel);
                    let _ = tx.send(Msg::TaskFinished(TaskCompletion { id, result, task }));
                }
            });

        if let Err(err) = spawned {
            tracing::error!("failed to spawn worker for {}: {err}", entry.description);
            // The body never left the slot; report it as a failed run.
            let taken = slot.lock().ok().and_then(|mut guard| guard.take());
            if let Some(task) = taken {
                let _ = tx.send(Msg::TaskFinished(TaskCompletion {
                    id,
                    result: false,
                    task,
                }));
            }
        }
    }
}

impl TaskScheduler for TaskManager {
    fn add_task(&mut self, task: Box<dyn Task>) -> Result<TaskId, SubmitError> {
        if !self.accepting {
            return Err(SubmitError::ShuttingDown);
        }

        let description = task.description().to_string();
        let id = self.tasks.insert(TaskEntry {
            description: description.clone(),
            status: TaskStatus::Queued,
            body: Arc::new(Mutex::new(Some(task))),
            cancel: CancelToken::default(),
            completed_at: None,
        });
        self.queue.push_back(id);
        tracing::info!("task added: {description}");

        self.pump();
        Ok(id)
    }

    fn trigger_task(&mut self, id: TaskId) -> Result<(), TaskDisposed> {
        if !self.tasks.contains_key(id) {
            return Err(TaskDisposed(id));
        }
        self.start(id);
        Ok(())
    }

    fn status(&self, id: TaskId) -> Result<TaskStatus, TaskDisposed> {
        self.tasks
            .get(id)
            .map(|entry| entry.status)
            .ok_or(TaskDisposed(id))
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::host_in;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::Receiver;

    /// Blocks its worker until the gate sender is dropped or signalled.
    struct GatedTask {
        name: String,
        gate: Option<mpsc::Receiver<()>>,
        finished: Arc<AtomicUsize>,
        saw_cancel: Arc<AtomicBool>,
    }

    impl GatedTask {
        fn new(name: &str, finished: &Arc<AtomicUsize>) -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            (
                Self {
                    name: name.to_string(),
                    gate: Some(rx),
                    finished: Arc::clone(finished),
                    saw_cancel: Arc::new(AtomicBool::new(false)),
                },
                tx,
            )
        }
    }

    impl Task for GatedTask {
        fn description(&self) -> &str {
            &self.name
        }

        fn run(&mut self, cancel: &CancelToken) -> bool {
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
            self.saw_cancel.store(cancel.is_cancelled(), Ordering::SeqCst);
            true
        }

        fn finished(self: Box<Self>, _result: bool, _host: &mut Host) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn next_completion(rx: &Receiver<Msg>) -> TaskCompletion {
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).expect("completion") {
                Msg::TaskFinished(completion) => return completion,
                _ => continue,
            }
        }
    }

    #[test]
    fn respects_concurrency_limit_until_triggered() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _host_rx) = host_in(dir.path());
        let (tx, rx) = mpsc::channel();
        let mut manager = TaskManager::new(1, tx);
        let finished = Arc::new(AtomicUsize::new(0));

        let (first, first_gate) = GatedTask::new("first", &finished);
        let (second, second_gate) = GatedTask::new("second", &finished);
        let a = manager.add_task(Box::new(first)).unwrap();
        let b = manager.add_task(Box::new(second)).unwrap();

        assert_eq!(manager.status(a), Ok(TaskStatus::Running));
        assert_eq!(manager.status(b), Ok(TaskStatus::Queued));

        manager.trigger_task(b).unwrap();
        assert_eq!(manager.status(b), Ok(TaskStatus::Running));
        assert_eq!(manager.active_count(), 2);

        drop(first_gate);
        drop(second_gate);
        for _ in 0..2 {
            let completion = next_completion(&rx);
            manager.complete(completion, &mut host);
        }

        assert_eq!(manager.status(a), Ok(TaskStatus::Complete));
        assert_eq!(manager.status(b), Ok(TaskStatus::Complete));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn queued_task_starts_when_slot_frees() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _host_rx) = host_in(dir.path());
        let (tx, rx) = mpsc::channel();
        let mut manager = TaskManager::new(1, tx);
        let finished = Arc::new(AtomicUsize::new(0));

        let (first, first_gate) = GatedTask::new("first", &finished);
        let (second, second_gate) = GatedTask::new("second", &finished);
        manager.add_task(Box::new(first)).unwrap();
        let b = manager.add_task(Box::new(second)).unwrap();

        drop(first_gate);
        let completion = next_completion(&rx);
        manager.complete(completion, &mut host);
        assert_eq!(manager.status(b), Ok(TaskStatus::Running));

        drop(second_gate);
        let completion = next_completion(&rx);
        assert_eq!(completion.id(), b);
        manager.complete(completion, &mut host);
    }

    #[test]
    fn pruned_tasks_report_disposed() {
        let dir = tempfile::tempdir().unwrap();
        let (mut host, _host_rx) = host_in(dir.path());
        let (tx, rx) = mpsc::channel();
        let mut manager = TaskManager::new(2, tx).with_retention(Duration::ZERO);
        let finished = Arc::new(AtomicUsize::new(0));

        let (task, gate) = GatedTask::new("short", &finished);
        let id = manager.add_task(Box::new(task)).unwrap();
        drop(gate);
        manager.complete(next_completion(&rx), &mut host);

        manager.prune(Instant::now());
        assert_eq!(manager.status(id), Err(TaskDisposed(id)));
        assert_eq!(manager.trigger_task(id), Err(TaskDisposed(id)));
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn shutdown_rejects_and_cancels() {
        let (tx, rx) = mpsc::channel();
        let mut manager = TaskManager::new(1, tx);
        let finished = Arc::new(AtomicUsize::new(0));

        let (task, gate) = GatedTask::new("long", &finished);
        let saw_cancel = Arc::clone(&task.saw_cancel);
        manager.add_task(Box::new(task)).unwrap();

        manager.shutdown();
        let (late, _late_gate) = GatedTask::new("late", &finished);
        assert_eq!(
            manager.add_task(Box::new(late)).err(),
            Some(SubmitError::ShuttingDown)
        );

        drop(gate);
        let _ = next_completion(&rx);
        assert!(saw_cancel.load(Ordering::SeqCst));
    }
}
