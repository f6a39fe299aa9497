use std::time::{Duration, Instant};

use crate::bootstrap::poller::StatusPoller;

/// Work the host runs on the UI thread once a timer comes due.
#[derive(Debug)]
pub enum TimerAction {
    EnsureDependency,
    CheckLegacyPlugin,
    PollTask(StatusPoller),
}

/// Single-shot timers, fired from the tick handler.
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<(Instant, u64, TimerAction)>,
    seq: u64,
}

impl TimerQueue {
    pub fn single_shot(&mut self, delay: Duration, action: TimerAction) {
        self.single_shot_at(Instant::now() + delay, action);
    }

    pub fn single_shot_at(&mut self, deadline: Instant, action: TimerAction) {
        self.entries.push((deadline, self.seq, action));
        self.seq += 1;
    }

    /// Remove and return every action due at `now`, earliest first. Timers
    /// with equal deadlines fire in the order they were armed.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerAction> {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(deadline, _, _)| *deadline <= now);
        self.entries = pending;

        due.sort_by_key(|(deadline, seq, _)| (*deadline, *seq));
        due.into_iter().map(|(_, _, action)| action).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_then_arm_order() {
        let mut timers = TimerQueue::default();
        let now = Instant::now();
        timers.single_shot_at(now + Duration::from_millis(100), TimerAction::CheckLegacyPlugin);
        timers.single_shot_at(now, TimerAction::EnsureDependency);
        timers.single_shot_at(now + Duration::from_secs(60), TimerAction::CheckLegacyPlugin);

        let due = timers.take_due(now + Duration::from_millis(100));
        assert!(matches!(
            due.as_slice(),
            [TimerAction::EnsureDependency, TimerAction::CheckLegacyPlugin]
        ));
        assert_eq!(timers.len(), 1);
        assert!(timers.take_due(now).is_empty());
    }
}
