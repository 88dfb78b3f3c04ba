//! `console-guard state` command: install the guard on a fresh console and
//! report what happened.

use anyhow::Result;
use clap::Args;
use console_guard_core::{AttachOutcome, GuardConfig, GuardSnapshot, InstallReport};
use serde::Serialize;

use crate::output;

#[derive(Args)]
pub struct StateArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StateReport {
    install: InstallReport,
    snapshot: GuardSnapshot,
}

pub fn execute(args: StateArgs, config: GuardConfig) -> Result<i32> {
    let session = super::guarded_console(&config, true);
    let report = StateReport {
        install: session.lock.install(Some(&session.console)),
        snapshot: session.lock.snapshot(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render(&report));
    }
    Ok(0)
}

fn render(report: &StateReport) -> String {
    let snapshot = &report.snapshot;
    let front_end = match &report.install.front_end {
        Some(AttachOutcome::Attached { .. }) | Some(AttachOutcome::AlreadyAttached) => "attached",
        Some(AttachOutcome::Disabled) => "disabled",
        Some(AttachOutcome::Failed { .. }) => "failed",
        Some(AttachOutcome::Absent) | None => "absent",
    };

    let mut table = output::new_table(&["KEY", "VALUE"]);
    table.add_row(vec!["installed", output::yes_no(snapshot.installed)]);
    table.add_row(vec!["trusted", output::yes_no(snapshot.trusted)]);
    table.add_row(vec!["guarded".to_string(), output::format_entries(&snapshot.guarded)]);
    table.add_row(vec!["captured".to_string(), output::format_entries(&snapshot.captured)]);
    table.add_row(vec!["front end", front_end]);
    table.add_row(vec![
        "blocked attempts".to_string(),
        snapshot.blocked_attempts.len().to_string(),
    ]);
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fresh_install() {
        let session = super::super::guarded_console(&GuardConfig::default(), true);
        let report = StateReport {
            install: session.lock.install(Some(&session.console)),
            snapshot: session.lock.snapshot(),
        };

        assert!(report.install.already_installed);
        let text = render(&report);
        assert!(text.contains("exit, quit, sys.exit, os._exit"));
        assert!(text.contains("attached"));
    }

    #[test]
    fn test_state_report_serializes() {
        let session = super::super::guarded_console(&GuardConfig::default(), true);
        let report = StateReport {
            install: session.lock.install(None),
            snapshot: session.lock.snapshot(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["snapshot"]["installed"], true);
        assert_eq!(json["install"]["front_end"]["outcome"], "absent");
    }
}
