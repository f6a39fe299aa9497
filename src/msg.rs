use crossterm::event::KeyEvent;

use crate::host::tasks::TaskCompletion;

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Input events (raw)
    Key(KeyEvent),
    Resize(u16, u16),

    // -- Background work
    /// A task body returned on its worker; deliver `finished` on the UI thread.
    TaskFinished(TaskCompletion),

    // -- Extension lifecycle
    /// The dependency is usable; attach the real extension.
    ExtensionReady,

    // -- System
    Tick,
    Quit,
}
