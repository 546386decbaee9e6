use std::io::{self, IsTerminal};

/// Reports whether the standard streams are attached to a terminal.
pub trait TerminalClient {
    /// Whether stdout is a terminal.
    fn stdout_is_terminal(&self) -> bool;

    /// Whether stderr is a terminal.
    fn stderr_is_terminal(&self) -> bool;
}

/// Terminal client backed by the process's real streams.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}
