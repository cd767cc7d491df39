//! `rollsheet notify ...` and `rollsheet resync`: roster events for the daemon.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use rollsheet_core::RosterMember;
use rollsheet_daemon::{request_event, BindingSummary, DaemonRequest};

/// Deliver a roster event to the running daemon.
#[derive(Subcommand, Debug)]
pub enum NotifyCommand {
    /// A member joined a list.
    Added(MemberArgs),

    /// A member's row content changed within a list.
    Updated(MemberArgs),

    /// A member left a list.
    Removed {
        /// Roster list id.
        list: String,
        /// Id of the member that left.
        member_id: String,
    },

    /// A member's profile changed; update every list they are on.
    Changed {
        /// Member JSON file, or `-` for stdin.
        member: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct MemberArgs {
    /// Roster list id.
    pub list: String,

    /// Member JSON file, or `-` for stdin.
    pub member: PathBuf,
}

/// Rewrite one binding's mirror from the roster.
#[derive(Args, Debug)]
pub struct ResyncArgs {
    /// Roster list id.
    pub list: String,

    /// Binding id, as shown by `binding list`.
    pub binding: String,
}

impl ResyncArgs {
    pub fn run(self) -> Result<()> {
        let request = DaemonRequest {
            list: Some(self.list),
            binding: Some(self.binding),
            ..DaemonRequest::new("resync")
        };
        deliver(&request)
    }
}

pub fn run(cmd: NotifyCommand) -> Result<()> {
    let request = match cmd {
        NotifyCommand::Added(args) => DaemonRequest {
            list: Some(args.list),
            member: Some(read_member(&args.member)?),
            ..DaemonRequest::new("member_added")
        },
        NotifyCommand::Updated(args) => DaemonRequest {
            list: Some(args.list),
            member: Some(read_member(&args.member)?),
            ..DaemonRequest::new("member_updated")
        },
        NotifyCommand::Removed { list, member_id } => DaemonRequest {
            list: Some(list),
            member_id: Some(member_id),
            ..DaemonRequest::new("member_removed")
        },
        NotifyCommand::Changed { member } => DaemonRequest {
            member: Some(read_member(&member)?),
            ..DaemonRequest::new("member_changed")
        },
    };
    deliver(&request)
}

fn read_member(path: &Path) -> Result<RosterMember> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read member JSON from stdin")?;
        raw
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    let member: RosterMember = serde_json::from_str(&raw)
        .with_context(|| format!("invalid member JSON in {}", path.display()))?;
    if member.id.as_str().is_empty() {
        bail!("member JSON in {} has no id", path.display());
    }
    Ok(member)
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "")]
    marker: String,
    #[tabled(rename = "binding")]
    binding: String,
    #[tabled(rename = "mirror")]
    mirror: String,
    #[tabled(rename = "result")]
    detail: String,
}

fn deliver(request: &DaemonRequest) -> Result<()> {
    let home = super::home()?;
    let data = request_event(&home, request)
        .with_context(|| format!("daemon rejected '{}'", request.cmd))?;
    let summaries: Vec<BindingSummary> =
        serde_json::from_value(data).context("unexpected daemon response")?;

    if summaries.is_empty() {
        println!("No bindings affected.");
        return Ok(());
    }

    let failed = summaries.iter().filter(|s| s.outcome == "failed").count();
    let rows: Vec<_> = summaries
        .into_iter()
        .map(|s| SummaryRow {
            marker: marker(&s),
            binding: s.binding,
            mirror: s.mirror,
            detail: s.detail,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if failed > 0 {
        bail!("{failed} binding(s) failed");
    }
    Ok(())
}

fn marker(summary: &BindingSummary) -> String {
    match summary.outcome.as_str() {
        "applied" if summary.change.as_ref().is_some_and(|c| c.mutated()) => {
            "■".green().bold().to_string()
        }
        "applied" => "■".dimmed().to_string(),
        "unlinked" => "■".yellow().bold().to_string(),
        _ => "■".red().bold().to_string(),
    }
}
