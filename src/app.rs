use std::sync::mpsc;
use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crate::bootstrap::legacy::MigrationOutcome;
use crate::bootstrap::poller::PollStep;
use crate::bootstrap::{BootstrapCoordinator, BootstrapStart, LegacyMigrator, OneShot};
use crate::extension::{Extension, ExtensionShim, class_factory};
use crate::host::Host;
use crate::host::message_bar::{Level, Message};
use crate::host::tasks::{TaskManager, TaskScheduler};
use crate::host::timers::TimerAction;
use crate::model::config::AppConfig;
use crate::model::mode::Mode;
use crate::msg::Msg;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

pub struct App {
    pub mode: Mode,
    pub host: Host,
    tasks: TaskManager,
    coordinator: BootstrapCoordinator,
    /// Taken by the first legacy check; later checks are no-ops.
    migrator: Option<LegacyMigrator>,
    extension: ExtensionShim,
    command_input: String,
    pub should_quit: bool,
    spinner: usize,
}

impl App {
    pub fn new(config: &AppConfig, event_tx: mpsc::Sender<Msg>) -> Result<Self> {
        let mut host = Host::new(config, event_tx.clone())?;
        let tasks = TaskManager::new(config.host.max_active_tasks, event_tx);
        let coordinator = BootstrapCoordinator::from_config(config);
        let migrator = Some(LegacyMigrator::from_config(config));

        let mut extension = class_factory(&mut host);
        extension.init_gui(&mut host);

        Ok(Self {
            mode: Mode::Normal,
            host,
            tasks,
            coordinator,
            migrator,
            extension,
            command_input: String::new(),
            should_quit: false,
            spinner: 0,
        })
    }

    /// Stop background work and detach the extension before exit.
    pub fn shutdown(&mut self) {
        self.tasks.shutdown();
        self.extension.unload(&mut self.host);
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key),
            Msg::Tick => self.handle_tick(),
            Msg::TaskFinished(completion) => self.tasks.complete(completion, &mut self.host),
            Msg::ExtensionReady => self.extension.activate_real(&mut self.host),
            Msg::Quit => self.should_quit = true,
            Msg::Resize(width, height) => tracing::debug!("terminal resized to {width}x{height}"),
        }

        if self.host.active_dialog().is_some() && self.mode != Mode::Dialog {
            self.mode = Mode::Dialog;
        }
        Ok(())
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();
        self.spinner = self.spinner.wrapping_add(1);
        self.host.message_bar.expire(now);
        self.tasks.prune(now);

        for action in self.host.timers.take_due(now) {
            self.run_timer(action);
        }
    }

    fn run_timer(&mut self, action: TimerAction) {
        match action {
            TimerAction::EnsureDependency => self.ensure_dependency(),
            TimerAction::CheckLegacyPlugin => match self.migrator.take() {
                Some(migrator) => match migrator.check_and_migrate(&mut self.host) {
                    MigrationOutcome::NotInstalled => tracing::debug!("no legacy plugin installed"),
                    MigrationOutcome::Deactivated { notified } => {
                        tracing::info!("legacy plugin deactivated (user notified: {notified})");
                    }
                },
                None => tracing::debug!("legacy check already ran"),
            },
            TimerAction::PollTask(mut poller) => match poller.poll(&mut self.tasks) {
                PollStep::Rearm(delay) => self
                    .host
                    .timers
                    .single_shot(delay, TimerAction::PollTask(poller)),
                PollStep::Stop => {}
            },
        }
    }

    fn ensure_dependency(&mut self) {
        let on_ready = OneShot::new(|host: &mut Host| host.post(Msg::ExtensionReady));

        match self
            .coordinator
            .ensure_ready(on_ready, &mut self.host, &mut self.tasks)
        {
            Ok(BootstrapStart::Installing {
                poller,
                initial_delay,
            }) => self
                .host
                .timers
                .single_shot(initial_delay, TimerAction::PollTask(poller)),
            Ok(BootstrapStart::Satisfied(version)) => {
                tracing::info!("{} {version} available", self.coordinator.display_name());
            }
            Ok(start) => tracing::debug!("bootstrap: {start:?}"),
            // Already on the message bar; the user retries with :reload.
            Err(err) => tracing::warn!("bootstrap attempt ended: {err}"),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match self.mode {
            Mode::Normal => self.handle_key_normal(key),
            Mode::Command => self.handle_key_command(key),
            Mode::Dialog => self.handle_key_dialog(key),
        }
    }

    fn handle_key_normal(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(':') => {
                self.command_input.clear();
                self.mode = Mode::Command;
            }
            KeyCode::Char('q') => self.should_quit = true,
            _ => {}
        }
    }

    fn handle_key_command(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.command_input.clear();
                self.mode = Mode::Normal;
            }
            KeyCode::Enter => {
                let command = std::mem::take(&mut self.command_input);
                self.mode = Mode::Normal;
                self.handle_command(&command);
            }
            KeyCode::Backspace => {
                self.command_input.pop();
            }
            KeyCode::Char(ch) => self.command_input.push(ch),
            _ => {}
        }
    }

    fn handle_key_dialog(&mut self, key: KeyEvent) {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            self.host.dismiss_dialog();
            if self.host.active_dialog().is_none() {
                self.mode = Mode::Normal;
            }
        }
    }

    fn handle_command(&mut self, command: &str) {
        let command = command.trim();
        if command.is_empty() {
            return;
        }

        let notifications = match command {
            "help" => vec![
                "commands: deps | reload | plugins.list (pl.list) | messages.clear | gpq | q"
                    .to_string(),
            ],
            "deps" => vec![self.dependency_report()],
            "reload" => {
                self.reload_extension();
                vec!["extension: reloaded".to_string()]
            }
            "plugins.list" | "pl.list" => self.host.plugins.list_notifications(),
            "messages.clear" => {
                self.host.message_bar.clear_widgets();
                Vec::new()
            }
            "gpq" => match self.extension.real_mut() {
                Some(real) => {
                    real.run(&mut self.host);
                    Vec::new()
                }
                None => vec!["GeoParquet Downloader is still loading".to_string()],
            },
            "q" | "quit" => {
                self.host.post(Msg::Quit);
                Vec::new()
            }
            other => {
                self.host
                    .message_bar
                    .push_warning("", &format!("unknown command: {other}"));
                Vec::new()
            }
        };

        for notification in notifications {
            self.host.message_bar.push_info("", &notification);
        }
    }

    fn dependency_report(&self) -> String {
        let readiness = self.host.dependency.readiness();
        let mut report = format!(
            "{}: {}",
            self.coordinator.display_name(),
            readiness.label()
        );
        if let Some(Ok(status)) = self
            .host
            .dependency
            .pending_task()
            .map(|task| self.tasks.status(task))
        {
            report.push_str(&format!(" (task {status:?})"));
        }
        report
    }

    /// Tear the extension down and run the entry point again. A ready
    /// dependency short-circuits straight to activation.
    fn reload_extension(&mut self) {
        self.extension.unload(&mut self.host);
        self.extension = class_factory(&mut self.host);
        self.extension.init_gui(&mut self.host);
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // toolbar
                Constraint::Min(1),    // message bar
                Constraint::Length(1), // status bar
            ])
            .split(frame.area());

        self.render_toolbar(frame, chunks[0]);
        self.render_messages(frame, chunks[1]);
        self.render_status_bar(frame, chunks[2]);

        match self.mode {
            Mode::Command => self.render_command_overlay(frame),
            Mode::Dialog => self.render_dialog(frame),
            Mode::Normal => {}
        }
    }

    fn render_toolbar(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(
            " gpq ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        )];

        for action in self.host.toolbar() {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(
                format!("[{}]", action.label),
                Style::default().fg(Color::Cyan),
            ));
        }

        let bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(15, 15, 24)));
        frame.render_widget(bar, area);
    }

    fn render_messages(&self, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = self
            .host
            .message_bar
            .iter()
            .map(|message| self.message_line(message))
            .collect();

        let body = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().title(" Messages ").borders(Borders::ALL));
        frame.render_widget(body, area);
    }

    fn message_line(&self, message: &Message) -> Line<'static> {
        if message.progress {
            let frame = SPINNER[self.spinner % SPINNER.len()];
            return Line::from(vec![
                Span::styled(format!(" {frame} "), Style::default().fg(Color::Yellow)),
                Span::raw(message.text.clone()),
            ]);
        }

        let color = match message.level {
            Level::Info => Color::Blue,
            Level::Success => Color::Green,
            Level::Warning => Color::Yellow,
            Level::Critical => Color::Red,
        };

        let mut spans = vec![Span::styled(
            format!(" {:<5} ", message.level.label()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )];
        if !message.title.is_empty() {
            spans.push(Span::styled(
                format!("{}: ", message.title),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        }
        spans.push(Span::raw(message.text.clone()));
        Line::from(spans)
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let mode_style = match self.mode {
            Mode::Normal => Style::default()
                .fg(Color::Black)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
            Mode::Command => Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            Mode::Dialog => Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        };

        let mode_span = Span::styled(format!(" {} ", self.mode.label()), mode_style);
        let info = Span::styled(
            format!(
                " {}  | tasks {}/{} | plugins {} ",
                self.dependency_report(),
                self.tasks.active_count(),
                self.tasks.count(),
                self.host.plugins.plugin_count(),
            ),
            Style::default().fg(Color::Gray).bg(Color::DarkGray),
        );

        let bar = Line::from(vec![mode_span, info]);
        let status = Paragraph::new(bar).style(Style::default().bg(Color::DarkGray));
        frame.render_widget(status, area);
    }

    fn render_command_overlay(&self, frame: &mut Frame) {
        let area = centered_rect(70, 20, frame.area());
        frame.render_widget(Clear, area);

        let prompt = Paragraph::new(format!(":{}", self.command_input)).block(
            Block::default()
                .title(" Command ")
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
        frame.render_widget(prompt, area);

        let cursor_x = area.x + 2 + self.command_input.len() as u16;
        let cursor_y = area.y + 1;
        frame.set_cursor_position((cursor_x, cursor_y));
    }

    fn render_dialog(&self, frame: &mut Frame) {
        let Some(dialog) = self.host.active_dialog() else {
            return;
        };

        let area = centered_rect(70, 50, frame.area());
        frame.render_widget(Clear, area);

        let mut lines: Vec<Line> = dialog
            .text
            .lines()
            .map(|line| Line::from(line.to_string()))
            .collect();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "[Enter] OK",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )));

        let body = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .title(format!(" {} ", dialog.title))
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Rgb(15, 15, 24))),
        );
        frame.render_widget(body, area);
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bootstrap::state::Readiness;
    use crate::host::test_support::config_in;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;

    /// An interpreter that fails the import until `-m pip install` has run,
    /// then reports version 1.2.3.
    fn stub_interpreter(dir: &Path, installed: bool) -> std::path::PathBuf {
        let marker = dir.join("installed");
        if installed {
            std::fs::write(&marker, "").unwrap();
        }
        let script = dir.join("python-stub");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 marker='{marker}'\n\
                 if [ \"$1\" = \"-c\" ]; then\n\
                 \t[ -f \"$marker\" ] || exit 1\n\
                 \tprintf '1.2.3'\n\
                 \texit 0\n\
                 fi\n\
                 if [ \"$1\" = \"-m\" ]; then\n\
                 \ttouch \"$marker\"\n\
                 \texit 0\n\
                 fi\n\
                 exit 2\n",
                marker = marker.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn app_with(dir: &Path, installed: bool) -> (App, mpsc::Receiver<Msg>) {
        let mut config = config_in(dir);
        config.dependency.interpreter = stub_interpreter(dir, installed);
        let (tx, rx) = mpsc::channel();
        (App::new(&config, tx).unwrap(), rx)
    }

    /// Run the event loop until `done` holds or ten seconds pass.
    fn pump_until(app: &mut App, rx: &mpsc::Receiver<Msg>, done: impl Fn(&App) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(app) && Instant::now() < deadline {
            app.update(Msg::Tick).unwrap();
            while let Ok(msg) = rx.try_recv() {
                app.update(msg).unwrap();
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Keep ticking for a fixed stretch of time.
    fn pump_for(app: &mut App, rx: &mpsc::Receiver<Msg>, span: Duration) {
        let until = Instant::now() + span;
        pump_until(app, rx, |_| Instant::now() >= until);
    }

    #[test]
    fn installs_missing_dependency_then_attaches_real_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, rx) = app_with(dir.path(), false);

        pump_until(&mut app, &rx, |app| app.extension.is_activated());

        assert!(app.extension.is_activated());
        assert_eq!(app.host.dependency.readiness(), Readiness::Ready);
        assert!(dir.path().join("installed").exists(), "installer ran");
        assert!(!app.host.message_bar.has_progress());
        assert!(
            app.host
                .message_bar
                .iter()
                .any(|m| m.level == Level::Success && m.text == "DuckDB 1.2.3 installed successfully")
        );
        assert_eq!(app.host.toolbar().len(), 1);
        assert_eq!(app.tasks.active_count(), 0);
    }

    #[test]
    fn satisfied_dependency_activates_without_install() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, rx) = app_with(dir.path(), true);

        pump_until(&mut app, &rx, |app| app.extension.is_activated());

        assert!(app.extension.is_activated());
        assert_eq!(app.tasks.count(), 0);
        assert!(!app.host.message_bar.iter().any(|m| m.progress));
    }

    #[test]
    fn reload_after_ready_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, rx) = app_with(dir.path(), true);
        pump_until(&mut app, &rx, |app| app.extension.is_activated());

        app.handle_command("reload");
        assert!(!app.extension.is_activated());
        pump_until(&mut app, &rx, |app| app.extension.is_activated());

        assert!(app.extension.is_activated());
        assert_eq!(app.tasks.count(), 0);
        assert_eq!(app.host.toolbar().len(), 1, "no duplicate toolbar buttons");
    }

    #[test]
    fn legacy_check_runs_once_per_process() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        let legacy = plugins.join("qgis_plugin_gpq_downloader");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(
            legacy.join("metadata.toml"),
            "name = \"GeoParquet Downloader\"\nversion = \"0.6.0\"\n",
        )
        .unwrap();
        // Occupied rename target keeps the old directory in place.
        std::fs::create_dir_all(plugins.join("qgis_plugin_gpq_downloader_disabled")).unwrap();

        let (mut app, rx) = app_with(dir.path(), true);
        pump_until(&mut app, &rx, |app| {
            app.migrator.is_none() && app.extension.is_activated()
        });
        let settings = dir.path().join("settings.toml");
        assert!(settings.exists(), "first check disables the old plugin");
        std::fs::remove_file(&settings).unwrap();

        app.handle_command("reload");
        pump_for(&mut app, &rx, Duration::from_millis(300));

        assert!(app.extension.is_activated());
        assert!(legacy.exists());
        assert!(!settings.exists(), "reload must not migrate again");
        assert_eq!(app.host.dialog_count(), 0);
    }

    #[test]
    fn unknown_command_warns() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _rx) = app_with(dir.path(), true);

        app.handle_command("frobnicate");

        let last = app.host.message_bar.iter().last().unwrap();
        assert_eq!(last.level, Level::Warning);
        assert_eq!(last.text, "unknown command: frobnicate");
    }

    #[test]
    fn failed_install_reports_and_stays_unready() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        let script = dir.path().join("python-broken");
        std::fs::write(&script, "#!/bin/sh\necho 'network unreachable' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        config.dependency.interpreter = script;
        let (tx, rx) = mpsc::channel();
        let mut app = App::new(&config, tx).unwrap();

        pump_until(&mut app, &rx, |app| {
            app.host.dependency.readiness() == Readiness::Failed
        });

        assert_eq!(app.host.dependency.readiness(), Readiness::Failed);
        assert!(!app.extension.is_activated());
        assert!(!app.host.message_bar.has_progress());
        assert!(
            app.host
                .message_bar
                .iter()
                .any(|m| m.level == Level::Critical && m.text.contains("network unreachable"))
        );
    }

    #[test]
    fn migration_dialog_takes_over_input_until_dismissed() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, rx) = app_with(dir.path(), true);
        app.host.show_information("Update", "old plugin disabled");
        app.update(Msg::Tick).unwrap();
        assert_eq!(app.mode, Mode::Dialog);

        app.update(Msg::Key(KeyEvent::from(KeyCode::Char(':')))).unwrap();
        assert_eq!(app.mode, Mode::Dialog);
        app.update(Msg::Key(KeyEvent::from(KeyCode::Enter))).unwrap();
        assert_eq!(app.mode, Mode::Normal);
        drop(rx);
    }
}
