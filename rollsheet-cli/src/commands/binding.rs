//! `rollsheet binding add|list|remove`

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use rollsheet_core::{
    BindingId, BindingRegistry, CredentialRef, ListId, MirrorId, RegistryError, SyncBinding,
};

/// Manage list-to-mirror bindings.
#[derive(Subcommand, Debug)]
pub enum BindingCommand {
    /// Bind a list to an existing spreadsheet.
    Add(AddArgs),

    /// Show registered bindings.
    List(ListArgs),

    /// Delete a binding. The spreadsheet itself is left alone.
    Remove {
        /// Binding id, as shown by `binding list`.
        binding: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Roster list id.
    pub list: String,

    /// Spreadsheet id of the mirror.
    pub mirror: String,

    /// Credential reference the mirror is written with.
    #[arg(long, short = 'o')]
    pub owner: String,

    /// Numeric id of the sheet tab holding the mirror.
    #[arg(long, default_value_t = 0)]
    pub tab: i64,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only bindings of this list.
    #[arg(long)]
    pub list: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(cmd: BindingCommand) -> Result<()> {
    let registry = BindingRegistry::open_at(&super::home()?);
    match cmd {
        BindingCommand::Add(args) => add(&registry, args),
        BindingCommand::List(args) => list(&registry, args),
        BindingCommand::Remove { binding } => remove(&registry, binding),
    }
}

fn add(registry: &BindingRegistry, args: AddArgs) -> Result<()> {
    let binding = match registry.create(
        ListId::from(args.list),
        MirrorId::from(args.mirror),
        args.tab,
        CredentialRef::from(args.owner),
    ) {
        Ok(binding) => binding,
        Err(err @ RegistryError::DuplicateBinding { .. }) => bail!(err),
        Err(err) => return Err(err).context("failed to save binding"),
    };

    println!(
        "✓ Bound list '{}' to mirror '{}'",
        binding.list, binding.mirror
    );
    println!("  Binding id: {}", binding.id);
    Ok(())
}

#[derive(Tabled)]
struct BindingRow {
    #[tabled(rename = "binding")]
    id: String,
    #[tabled(rename = "list")]
    list: String,
    #[tabled(rename = "mirror")]
    mirror: String,
    #[tabled(rename = "tab")]
    tab: i64,
    #[tabled(rename = "owner")]
    owner: String,
    #[tabled(rename = "created")]
    created: String,
}

#[derive(Serialize)]
struct BindingJson<'a> {
    id: &'a str,
    list: &'a str,
    mirror: &'a str,
    sheet_tab: i64,
    owner: &'a str,
    created_at: String,
}

fn list(registry: &BindingRegistry, args: ListArgs) -> Result<()> {
    let bindings = match args.list {
        Some(list) => registry.find_by_list(&ListId::from(list)),
        None => registry.list_all(),
    }
    .context("failed to load binding registry")?;

    if args.json {
        let rows: Vec<_> = bindings
            .iter()
            .map(|b| BindingJson {
                id: b.id.as_str(),
                list: b.list.as_str(),
                mirror: b.mirror.as_str(),
                sheet_tab: b.sheet_tab,
                owner: b.owner.as_str(),
                created_at: b.created_at.to_rfc3339(),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("failed to render bindings JSON")?
        );
        return Ok(());
    }

    if bindings.is_empty() {
        println!("No bindings registered.");
        println!("Run: rollsheet binding add <list> <mirror> --owner <credential>");
        return Ok(());
    }

    let rows: Vec<_> = bindings.iter().map(table_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn table_row(binding: &SyncBinding) -> BindingRow {
    BindingRow {
        id: binding.id.to_string(),
        list: binding.list.to_string(),
        mirror: binding.mirror.to_string(),
        tab: binding.sheet_tab,
        owner: binding.owner.to_string(),
        created: format_age(binding),
    }
}

fn format_age(binding: &SyncBinding) -> String {
    let age = Utc::now().signed_duration_since(binding.created_at);
    if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn remove(registry: &BindingRegistry, binding: String) -> Result<()> {
    let id = BindingId::from(binding);
    let removed = registry
        .remove(&id)
        .with_context(|| format!("failed to remove binding '{id}'"))?;
    if removed {
        println!("✓ Removed binding '{id}'");
    } else {
        println!("No binding '{id}'; nothing to remove.");
    }
    Ok(())
}
