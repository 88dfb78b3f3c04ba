//! Console Guard CLI - Interactive console with guarded termination.

pub mod commands;
pub mod output;
