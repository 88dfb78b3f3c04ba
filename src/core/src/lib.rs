//! Console Guard Core - Guarded Termination for Embedded Consoles
//!
//! Keeps an interactive console from closing its host process when a user
//! types an ordinary termination command, while still letting sanctioned
//! operations (running a script file) terminate for real.

pub mod config;
pub mod entry;
pub mod error;
pub mod frontend;
mod guard;
pub mod lock;
pub mod namespace;
pub mod registry;
pub mod trust;

// Re-export commonly used types
pub use config::{FrontEndConfig, GuardConfig, LogLevel};
pub use entry::{EntryPoint, ExitArg, ExitResult, ExitSignal};
pub use error::{GuardError, Result};
pub use frontend::{
    AskExitHook, AttachOutcome, FileRunner, FrontEnd, FrontEndId, HookSlot, RunError, RunRequest,
    RunnerKind,
};
pub use guard::{BlockedAttempt, INTERACTIVE_EXIT, JOURNAL_CAPACITY};
pub use lock::{ExitLock, GuardSnapshot, InstallReport};
pub use namespace::{ExitBinding, HostRunners, Namespace, ProcessTerminator, Terminator};
pub use registry::{OriginalBinding, TerminationRegistry};
pub use trust::{TrustMode, TrustScope, TrustState};

/// Console Guard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
