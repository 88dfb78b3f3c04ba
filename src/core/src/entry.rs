//! Termination entry points and the signals they raise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A globally reachable callable that is expected to terminate the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// `exit`, the polite exit builtin
    Exit,
    /// `quit`, alias of `exit`
    Quit,
    /// `sys.exit`: raise termination with a code
    SysExit,
    /// `os._exit`: immediate process termination
    OsExit,
}

impl EntryPoint {
    /// Every entry point the guard intercepts. All four are patched together.
    pub const ALL: [EntryPoint; 4] = [
        EntryPoint::Exit,
        EntryPoint::Quit,
        EntryPoint::SysExit,
        EntryPoint::OsExit,
    ];

    /// Slot name in the host termination namespace.
    pub fn slot(&self) -> &'static str {
        match self {
            EntryPoint::Exit => "exit",
            EntryPoint::Quit => "quit",
            EntryPoint::SysExit => "sys.exit",
            EntryPoint::OsExit => "os._exit",
        }
    }

    /// Whether the guard may create this slot when the host never had it.
    ///
    /// `exit`/`quit` are conveniences the guard can shadow freely; the
    /// others only make sense if the host actually provides them.
    pub fn may_synthesize(&self) -> bool {
        matches!(self, EntryPoint::Exit | EntryPoint::Quit)
    }

    /// Whether a front end keeps its own user-visible copy of this entry point.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, EntryPoint::Exit | EntryPoint::Quit)
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slot())
    }
}

impl std::str::FromStr for EntryPoint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EntryPoint::ALL
            .into_iter()
            .find(|e| e.slot() == s)
            .ok_or_else(|| format!("unknown entry point: '{}'", s))
    }
}

/// The optional argument of a termination call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExitArg {
    /// No argument: status 0
    #[default]
    None,
    /// Integer status
    Code(i32),
    /// Message: printed to stderr, status 1
    Message(String),
}

impl ExitArg {
    /// Process status this argument maps to.
    pub fn status(&self) -> i32 {
        match self {
            ExitArg::None => 0,
            ExitArg::Code(code) => *code,
            ExitArg::Message(_) => 1,
        }
    }
}

impl From<i32> for ExitArg {
    fn from(code: i32) -> Self {
        ExitArg::Code(code)
    }
}

impl From<Option<i32>> for ExitArg {
    fn from(code: Option<i32>) -> Self {
        code.map(ExitArg::Code).unwrap_or(ExitArg::None)
    }
}

/// Non-local outcome of invoking a termination entry point.
///
/// Entry points never return normally; callers propagate this with `?`
/// until the console loop decides what to do with it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExitSignal {
    /// A real termination request unwinding towards the loop
    #[error("exit requested with status {code}")]
    Exit { code: i32 },

    /// A guarded call refused while untrusted
    #[error("{entry}() is disabled in this console")]
    Blocked { entry: EntryPoint },

    /// The front end's interactive exit request was refused
    #[error("interactive exit is disabled in this console")]
    InteractiveBlocked,
}

impl ExitSignal {
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            ExitSignal::Blocked { .. } | ExitSignal::InteractiveBlocked
        )
    }
}

/// Result of calling a termination entry point.
pub type ExitResult = std::result::Result<std::convert::Infallible, ExitSignal>;
