//! `console-guard run` command: run a script with sanctioned termination.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console_guard_core::GuardConfig;
use console_guard_shell::LoopControl;

#[derive(Args)]
pub struct RunArgs {
    /// Script file to run
    pub script: PathBuf,

    /// Arguments passed to the script
    #[arg(last = true)]
    pub args: Vec<String>,
}

pub fn execute(args: RunArgs, config: GuardConfig) -> Result<i32> {
    let session = super::guarded_console(&config, true);
    tracing::info!(script = %args.script.display(), "Running script");

    match session.console.run_file(&args.script, args.args) {
        LoopControl::Exit(code) => Ok(code),
        LoopControl::Continue => Ok(0),
    }
}
