use std::time::Duration;

use crate::host::tasks::{TaskId, TaskScheduler, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    /// Poll again after the given delay.
    Rearm(Duration),
    Stop,
}

/// Watches one background task from the UI thread. Each call to
/// [`StatusPoller::poll`] is a single non-blocking step; the host re-arms it
/// on its timer queue.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    task: TaskId,
    interval: Duration,
    triggers: u32,
    polls: u32,
}

impl StatusPoller {
    pub fn new(task: TaskId, interval: Duration) -> Self {
        Self {
            task,
            interval,
            triggers: 0,
            polls: 0,
        }
    }

    #[cfg(test)]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// How many times the poller had to kick a queued task.
    #[cfg(test)]
    pub fn triggers(&self) -> u32 {
        self.triggers
    }

    #[cfg(test)]
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn poll(&mut self, scheduler: &mut dyn TaskScheduler) -> PollStep {
        self.polls += 1;

        let status = match scheduler.status(self.task) {
            Ok(status) => status,
            Err(disposed) => {
                tracing::debug!("{disposed}, stopping status checks");
                return PollStep::Stop;
            }
        };

        match status {
            TaskStatus::Queued => {
                tracing::debug!("task still queued, retriggering");
                if let Err(disposed) = scheduler.trigger_task(self.task) {
                    tracing::info!("failed to trigger task: {disposed}");
                    return PollStep::Stop;
                }
                self.triggers += 1;
                PollStep::Rearm(self.interval)
            }
            TaskStatus::Running => PollStep::Rearm(self.interval),
            TaskStatus::Complete => {
                tracing::info!(
                    "task completed after {} status checks ({} triggers)",
                    self.polls,
                    self.triggers
                );
                PollStep::Stop
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::host::tasks::{SubmitError, Task, TaskDisposed};
    use slotmap::SlotMap;
    use std::collections::VecDeque;

    /// Scheduler that replays a scripted sequence of statuses, then reports
    /// the task as disposed.
    pub(crate) struct ScriptedScheduler {
        pub id: TaskId,
        pub statuses: VecDeque<TaskStatus>,
        pub triggers: u32,
        pub status_calls: u32,
        pub added: Vec<Box<dyn Task>>,
        pub reject: bool,
    }

    impl ScriptedScheduler {
        pub(crate) fn new(statuses: &[TaskStatus]) -> Self {
            let mut keys: SlotMap<TaskId, ()> = SlotMap::with_key();
            Self {
                id: keys.insert(()),
                statuses: statuses.iter().copied().collect(),
                triggers: 0,
                status_calls: 0,
                added: Vec::new(),
                reject: false,
            }
        }
    }

    impl TaskScheduler for ScriptedScheduler {
        fn add_task(&mut self, task: Box<dyn Task>) -> Result<TaskId, SubmitError> {
            if self.reject {
                return Err(SubmitError::ShuttingDown);
            }
            self.added.push(task);
            Ok(self.id)
        }

        fn trigger_task(&mut self, id: TaskId) -> Result<(), TaskDisposed> {
            if self.statuses.is_empty() {
                return Err(TaskDisposed(id));
            }
            self.triggers += 1;
            Ok(())
        }

        fn status(&self, id: TaskId) -> Result<TaskStatus, TaskDisposed> {
            self.statuses.front().copied().ok_or(TaskDisposed(id))
        }
    }

    /// Drive a poller to completion the way the host's timer loop does, with
    /// the scheduler advancing one scripted status per poll.
    fn drive(poller: &mut StatusPoller, scheduler: &mut ScriptedScheduler) -> Vec<PollStep> {
        let mut steps = Vec::new();
        loop {
            scheduler.status_calls += 1;
            let step = poller.poll(scheduler);
            steps.push(step);
            scheduler.statuses.pop_front();
            if step == PollStep::Stop || steps.len() > 100 {
                return steps;
            }
        }
    }

    #[test]
    fn retriggers_while_queued_then_stops_on_complete() {
        let mut scheduler = ScriptedScheduler::new(&[
            TaskStatus::Queued,
            TaskStatus::Queued,
            TaskStatus::Complete,
            TaskStatus::Running,
        ]);
        let mut poller = StatusPoller::new(scheduler.id, Duration::from_millis(1000));

        let steps = drive(&mut poller, &mut scheduler);

        let second = Duration::from_millis(1000);
        assert_eq!(
            steps,
            vec![PollStep::Rearm(second), PollStep::Rearm(second), PollStep::Stop]
        );
        assert_eq!(scheduler.triggers, 2);
        assert_eq!(poller.triggers(), 2);
        assert_eq!(scheduler.status_calls, 3, "no poll after Complete");
    }

    #[test]
    fn running_rearms_without_trigger() {
        let mut scheduler = ScriptedScheduler::new(&[
            TaskStatus::Running,
            TaskStatus::Running,
            TaskStatus::Complete,
        ]);
        let mut poller = StatusPoller::new(scheduler.id, Duration::from_millis(250));

        let steps = drive(&mut poller, &mut scheduler);

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], PollStep::Rearm(Duration::from_millis(250)));
        assert_eq!(scheduler.triggers, 0);
    }

    #[test]
    fn disposed_task_stops_silently() {
        let mut scheduler = ScriptedScheduler::new(&[]);
        let mut poller = StatusPoller::new(scheduler.id, Duration::from_millis(1000));

        assert_eq!(poller.poll(&mut scheduler), PollStep::Stop);
        assert_eq!(poller.polls(), 1);
        assert_eq!(scheduler.triggers, 0);
    }
}
