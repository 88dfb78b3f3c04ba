//! CLI command definitions and dispatch.

mod repl;
mod run;
mod state;
mod version;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console_guard_core::{ExitLock, GuardConfig, Namespace, ProcessTerminator};
use console_guard_shell::Console;

/// Console Guard: an interactive console that cannot close its host by accident.
#[derive(Parser)]
#[command(name = "console-guard", version, about)]
pub struct Cli {
    /// Configuration file (default: ~/.console-guard/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Start an interactive console
    Repl(repl::ReplArgs),
    /// Run a script and exit with its status
    Run(run::RunArgs),
    /// Install the guard and show what it patched
    State(state::StateArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Load `path`, or the default configuration file.
pub fn load_config(path: Option<&Path>) -> Result<GuardConfig> {
    match path {
        Some(path) => GuardConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => GuardConfig::load_default().context("failed to load default config"),
    }
}

/// A console over the process's termination namespace, with the lock
/// installed before the console exists and attached once it does.
pub(crate) struct GuardedConsole {
    pub lock: ExitLock,
    pub console: Console,
}

pub(crate) fn guarded_console(config: &GuardConfig, guard: bool) -> GuardedConsole {
    let host = Arc::new(Namespace::host_defaults(Arc::new(ProcessTerminator)));
    let lock = ExitLock::new(host.clone(), config.clone());
    let console = Console::new(host, config);

    if guard {
        let report = lock.install(None);
        if !report.is_complete() {
            tracing::warn!(failed = ?report.failed, "Exit lock only partially installed");
        }
        let report = lock.install(Some(&console));
        tracing::debug!(front_end = ?report.front_end, "Front-end attachment");

        let rearm = lock.clone();
        console.set_rearm(Arc::new(move || {
            rearm.install(None);
        }));
    }

    GuardedConsole { lock, console }
}

/// Dispatch a parsed CLI to the appropriate command handler.
///
/// Returns the process exit status.
pub fn dispatch(cli: Cli, config: GuardConfig) -> Result<i32> {
    match cli.command {
        Command::Repl(args) => repl::execute(args, config),
        Command::Run(args) => run::execute(args, config),
        Command::State(args) => state::execute(args, config),
        Command::Version(args) => version::execute(args),
    }
}
