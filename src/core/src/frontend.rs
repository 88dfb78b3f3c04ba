//! Front-End Adapter contract.
//!
//! A front end is described by the capabilities it exposes: a replaceable
//! interactive-exit hook, replaceable file runners, and a user execution
//! namespace. Any of them may be missing; the adapter skips what is absent.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entry::ExitSignal;
use crate::error::GuardError;
use crate::namespace::Namespace;

/// Identity of one front-end instance.
pub type FrontEndId = Uuid;

/// Front-end hook fired when the user asks to leave (e.g. end-of-input).
pub type AskExitHook = dyn Fn() -> Result<(), ExitSignal> + Send + Sync;

/// Front-end operation executing a file or module for the user.
pub type FileRunner = dyn Fn(RunRequest) -> Result<(), RunError> + Send + Sync;

/// Kind of run operation a front end offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// Execute a script file
    ExecFile,
    /// Execute a notebook-style file (cells separated by markers)
    ExecNotebook,
    /// Execute a module located by name
    RunModule,
}

impl RunnerKind {
    pub const ALL: [RunnerKind; 3] = [
        RunnerKind::ExecFile,
        RunnerKind::ExecNotebook,
        RunnerKind::RunModule,
    ];
}

impl std::fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerKind::ExecFile => write!(f, "exec_file"),
            RunnerKind::ExecNotebook => write!(f, "exec_notebook"),
            RunnerKind::RunModule => write!(f, "run_module"),
        }
    }
}

/// What to run, and with which arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// File path or module name
    pub target: String,
    /// Arguments exposed to the script; `argv[0]` is the target
    pub argv: Vec<String>,
}

impl RunRequest {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            argv: vec![target.clone()],
            target,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.argv.extend(args);
        self
    }
}

/// Why a run did not complete normally.
#[derive(Error, Debug)]
pub enum RunError {
    /// The script invoked a termination entry point
    #[error(transparent)]
    Signal(#[from] ExitSignal),

    /// The script could not be loaded or failed
    #[error(transparent)]
    Failed(#[from] GuardError),
}

/// A replaceable hook cell.
pub struct HookSlot<F: ?Sized> {
    current: RwLock<Option<Arc<F>>>,
}

impl<F: ?Sized> HookSlot<F> {
    pub fn new(hook: Arc<F>) -> Self {
        Self {
            current: RwLock::new(Some(hook)),
        }
    }

    pub fn empty() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    pub fn get(&self) -> Option<Arc<F>> {
        self.current.read().clone()
    }

    /// Install `hook`, returning the one it replaced.
    pub fn replace(&self, hook: Arc<F>) -> Option<Arc<F>> {
        self.current.write().replace(hook)
    }

    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }
}

impl<F: ?Sized> Default for HookSlot<F> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Capability set of an interactive front end.
pub trait FrontEnd: Send + Sync {
    /// Stable identity of this instance
    fn instance_id(&self) -> FrontEndId;

    /// Human-readable name for logs
    fn name(&self) -> &str {
        "frontend"
    }

    /// Hook fired when the user asks to exit, if the front end has one
    fn exit_hook(&self) -> Option<&HookSlot<AskExitHook>>;

    /// Run operations the front end offers
    fn file_runners(&self) -> Vec<(RunnerKind, &HookSlot<FileRunner>)>;

    /// Namespace holding the user-visible `exit`/`quit`, if separate
    fn user_namespace(&self) -> Option<&Namespace> {
        None
    }
}

/// Result of attaching to a front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AttachOutcome {
    /// No front end was available
    Absent,
    /// Attachment is turned off in configuration
    Disabled,
    /// This instance was attached earlier
    AlreadyAttached,
    /// Hooks are now wrapped
    Attached {
        exit_hook: bool,
        runners: Vec<RunnerKind>,
        user_bindings: usize,
    },
    /// Attachment failed; the core guard is unaffected
    Failed { reason: String },
}
