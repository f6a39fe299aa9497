use std::collections::VecDeque;
use std::time::{Duration, Instant};

const MAX_WIDGETS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Critical,
}

impl Level {
    pub fn label(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Success => "OK",
            Level::Warning => "WARN",
            Level::Critical => "ERROR",
        }
    }
}

/// Handle for a widget pushed onto the bar, used to dismiss exactly that widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetId(u64);

#[derive(Debug, Clone)]
pub struct Message {
    pub id: WidgetId,
    pub title: String,
    pub text: String,
    pub level: Level,
    /// Indeterminate progress indicator attached to the message.
    pub progress: bool,
    pub created: Instant,
}

impl Message {
    fn sticky(&self) -> bool {
        self.progress || self.level == Level::Critical
    }
}

/// The host's notification surface.
#[derive(Debug)]
pub struct MessageBar {
    widgets: VecDeque<Message>,
    timeout: Duration,
    next_id: u64,
}

impl MessageBar {
    pub fn new(timeout: Duration) -> Self {
        Self {
            widgets: VecDeque::new(),
            timeout,
            next_id: 0,
        }
    }

    pub fn push_info(&mut self, title: &str, text: &str) -> WidgetId {
        self.push(title, text, Level::Info, false)
    }

    pub fn push_success(&mut self, title: &str, text: &str) -> WidgetId {
        self.push(title, text, Level::Success, false)
    }

    pub fn push_warning(&mut self, title: &str, text: &str) -> WidgetId {
        self.push(title, text, Level::Warning, false)
    }

    pub fn push_critical(&mut self, title: &str, text: &str) -> WidgetId {
        self.push(title, text, Level::Critical, false)
    }

    /// Push a message carrying an indeterminate progress indicator. It stays
    /// until dismissed.
    pub fn push_progress(&mut self, text: &str) -> WidgetId {
        self.push("", text, Level::Info, true)
    }

    /// Remove one widget. Returns false if it was already gone.
    pub fn dismiss(&mut self, id: WidgetId) -> bool {
        let before = self.widgets.len();
        self.widgets.retain(|message| message.id != id);
        self.widgets.len() != before
    }

    pub fn clear_widgets(&mut self) {
        self.widgets.clear();
    }

    /// Drop non-sticky messages older than the timeout.
    pub fn expire(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.widgets
            .retain(|message| message.sticky() || now.duration_since(message.created) < timeout);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.widgets.iter()
    }

    #[cfg(test)]
    pub fn has_progress(&self) -> bool {
        self.widgets.iter().any(|message| message.progress)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    fn push(&mut self, title: &str, text: &str, level: Level, progress: bool) -> WidgetId {
        let id = WidgetId(self.next_id);
        self.next_id += 1;

        self.widgets.push_back(Message {
            id,
            title: title.to_string(),
            text: text.to_string(),
            level,
            progress,
            created: Instant::now(),
        });

        while self.widgets.len() > MAX_WIDGETS {
            // Evict the oldest widget that isn't a live progress indicator.
            match self.widgets.iter().position(|message| !message.progress) {
                Some(index) => {
                    self.widgets.remove(index);
                }
                None => {
                    self.widgets.pop_front();
                }
            }
        }

        id
    }
}
