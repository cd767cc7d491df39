//! `rollsheet init [--force]`

use anyhow::{Context, Result};
use clap::Args;

use rollsheet_core::{config::config_path_at, SyncConfig};

/// Write the default configuration file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration with the defaults.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let path = config_path_at(&home);
        if path.exists() && !self.force {
            println!("Configuration already exists: {}", path.display());
            println!("Use --force to reset it to the defaults.");
            return Ok(());
        }

        let written = SyncConfig::default()
            .save_at(&home)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("✓ Wrote default configuration to {}", written.display());
        Ok(())
    }
}
