//! `console-guard repl` command: the interactive console.

use std::io::{BufRead, IsTerminal, Write};

use anyhow::Result;
use clap::Args;
use console_guard_core::GuardConfig;
use console_guard_shell::LoopControl;

#[derive(Args)]
pub struct ReplArgs {
    /// Leave termination unguarded
    #[arg(long)]
    pub no_guard: bool,

    /// Prompt shown before each line
    #[arg(long, default_value = ">>> ")]
    pub prompt: String,
}

pub fn execute(args: ReplArgs, config: GuardConfig) -> Result<i32> {
    let session = super::guarded_console(&config, !args.no_guard);
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut line = String::new();

    loop {
        if interactive {
            print!("{}", args.prompt);
            std::io::stdout().flush()?;
        }

        line.clear();
        let control = if stdin.lock().read_line(&mut line)? == 0 {
            match session.console.handle_eof() {
                // A refused exit on a terminal keeps the console open; piped
                // input has nothing left to read.
                LoopControl::Continue if interactive => continue,
                LoopControl::Continue => LoopControl::Exit(0),
                exit => exit,
            }
        } else {
            session.console.feed_line(&line)
        };

        if let LoopControl::Exit(code) = control {
            tracing::debug!(status = code, "Console session ended");
            return Ok(code);
        }
    }
}
