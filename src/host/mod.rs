//! Services the host exposes to extensions running inside it.
//!
//! Everything here lives on the UI thread. Background work goes through
//! [`tasks::TaskManager`], which hands completions back over the UI channel.

pub mod message_bar;
pub mod settings;
pub mod tasks;
pub mod timers;

use std::collections::VecDeque;
use std::sync::mpsc;

use anyhow::Result;

use crate::bootstrap::DependencyState;
use crate::model::config::AppConfig;
use crate::msg::Msg;
use crate::plugin::PluginRegistry;

use message_bar::MessageBar;
use settings::SettingsStore;
use timers::TimerQueue;

/// A blocking informational dialog; the host shows one at a time and keeps
/// the UI modal until it is dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub title: String,
    pub text: String,
}

/// A toolbar button contributed by an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolbarAction {
    pub id: String,
    pub label: String,
}

pub struct Host {
    pub message_bar: MessageBar,
    pub settings: SettingsStore,
    pub plugins: PluginRegistry,
    pub timers: TimerQueue,
    pub dependency: DependencyState,
    dialogs: VecDeque<Dialog>,
    toolbar: Vec<ToolbarAction>,
    events: mpsc::Sender<Msg>,
}

impl Host {
    pub fn new(config: &AppConfig, events: mpsc::Sender<Msg>) -> Result<Self> {
        let settings = SettingsStore::open(config.settings_path())?;
        let mut plugins = PluginRegistry::discover(config.plugins_dir());
        plugins.start_enabled(&settings);

        Ok(Self {
            message_bar: MessageBar::new(config.message_timeout()),
            settings,
            plugins,
            timers: TimerQueue::default(),
            dependency: DependencyState::default(),
            dialogs: VecDeque::new(),
            toolbar: Vec::new(),
            events,
        })
    }

    /// Queue a message for the UI loop. Delivery happens after the current
    /// update returns, which is what extensions rely on for deferred work.
    pub fn post(&self, msg: Msg) {
        if self.events.send(msg).is_err() {
            tracing::debug!("event loop is gone, dropping message");
        }
    }

    pub fn show_information(&mut self, title: impl Into<String>, text: impl Into<String>) {
        self.dialogs.push_back(Dialog {
            title: title.into(),
            text: text.into(),
        });
    }

    pub fn active_dialog(&self) -> Option<&Dialog> {
        self.dialogs.front()
    }

    pub fn dismiss_dialog(&mut self) -> Option<Dialog> {
        self.dialogs.pop_front()
    }

    #[cfg(test)]
    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    pub fn add_toolbar_action(&mut self, id: impl Into<String>, label: impl Into<String>) {
        let id = id.into();
        if self.toolbar.iter().any(|action| action.id == id) {
            tracing::warn!("toolbar action {id} registered twice, ignoring");
            return;
        }
        self.toolbar.push(ToolbarAction {
            id,
            label: label.into(),
        });
    }

    pub fn remove_toolbar_action(&mut self, id: &str) {
        self.toolbar.retain(|action| action.id != id);
    }

    pub fn toolbar(&self) -> &[ToolbarAction] {
        &self.toolbar
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::Path;

    /// A host rooted in `dir`, with the receiving end of its UI channel.
    pub fn host_in(dir: &Path) -> (Host, mpsc::Receiver<Msg>) {
        let config = config_in(dir);
        let (tx, rx) = mpsc::channel();
        let host = Host::new(&config, tx).expect("host");
        (host, rx)
    }

    pub fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::defaults().expect("defaults");
        config.host.plugins_dir = Some(dir.join("plugins"));
        config.host.settings_file = Some(dir.join("settings.toml"));
        config
    }
}
