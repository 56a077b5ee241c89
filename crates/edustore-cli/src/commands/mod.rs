// Subcommands of the `edustore` binary.

pub mod admin;
pub mod migrate;
pub mod product;
pub mod secret;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use colored::Colorize;

use edustore_core::db::adapter::SchemaStatus;
use edustore_core::{Adapter, EduStoreOptions, Schema};
use edustore_sqlx::SqlxAdapter;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "edustore.toml";

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file (default: ./edustore.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Database URL; overrides the file and DATABASE_URL
    #[arg(long)]
    pub database_url: Option<String>,
}

impl ConfigArgs {
    /// Options from the config file (or defaults) with the environment overlaid.
    /// Not validated: commands that do not sign tokens need no secret.
    pub fn read_options(&self) -> Result<EduStoreOptions, Box<dyn std::error::Error>> {
        let mut options = match self.config_path() {
            Some(path) => read_file(&path)?,
            None => EduStoreOptions::default(),
        };
        options.apply_env();
        if let Some(url) = &self.database_url {
            options.database_url = url.clone();
        }
        Ok(options)
    }

    fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        }
    }
}

fn read_file(path: &Path) -> Result<EduStoreOptions, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    println!("{} Loading config from {}", "●".cyan(), path.display());
    Ok(EduStoreOptions::from_toml_str(&raw)?)
}

/// Connect and make sure every table exists.
pub async fn connect(
    options: &EduStoreOptions,
) -> Result<(Arc<SqlxAdapter>, SchemaStatus), Box<dyn std::error::Error>> {
    let adapter = Arc::new(SqlxAdapter::connect(&options.database_url).await?);
    let status = adapter.create_schema(&Schema::edustore()).await?;
    Ok((adapter, status))
}
