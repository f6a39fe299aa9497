/// Application interaction modes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    /// Normal mode: watch messages, `:` opens the palette.
    #[default]
    Normal,
    /// Command palette (`:` prefix).
    Command,
    /// A blocking dialog is up; input goes to it until dismissed.
    Dialog,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Command => "COMMAND",
            Mode::Dialog => "DIALOG",
        }
    }
}
