//! Console Guard Shell - Interactive Console Front End
//!
//! A small read-evaluate console whose exit hook, file runners and user
//! namespace can be wrapped by `console_guard_core::ExitLock`.

pub mod console;
pub mod script;

pub use console::{Console, LoopControl, RearmHook};
pub use script::{parse_line, parse_notebook, parse_script, Call, Literal};
