//! `console-guard version` command.

use anyhow::Result;
use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub fn execute(_args: VersionArgs) -> Result<i32> {
    println!("console-guard version {}", console_guard_core::VERSION);
    Ok(0)
}
