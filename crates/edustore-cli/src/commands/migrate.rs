// `edustore migrate`: create the EduStore tables.
//
// Table creation is idempotent (`CREATE TABLE IF NOT EXISTS`), so running it
// against an up-to-date database changes nothing.

use clap::Args;
use colored::Colorize;

use edustore_core::db::adapter::SchemaStatus;
use edustore_core::db::schema::Table;
use edustore_core::Schema;
use edustore_sqlx::create_statements;

use super::{connect, CliResult, ConfigArgs};

#[derive(Args)]
pub struct MigrateArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Print the DDL instead of running it
    #[arg(long)]
    print: bool,
}

pub async fn run(args: MigrateArgs) -> CliResult {
    let schema = Schema::edustore();

    if args.print {
        println!("{}", render_ddl(&schema));
        return Ok(());
    }

    let options = args.config.read_options()?;
    println!("{} Database: {}", "●".cyan(), redact(&options.database_url));

    println!();
    println!("{}", "The migration covers the following tables:".bold());
    for table in &schema.tables {
        println!("  {} {}", "→".magenta(), describe(table));
    }
    println!();

    let (adapter, status) = connect(&options).await?;
    adapter.close().await;

    println!("{} {}", "✔".green(), summarize(&status));
    println!("{}", "Migration was completed successfully!".green());
    Ok(())
}

/// Status line for one schema run.
fn summarize(status: &SchemaStatus) -> String {
    match status {
        SchemaStatus::UpToDate => "Schema is up to date".to_string(),
        SchemaStatus::Applied { statements } => {
            format!("Applied {} statement(s)", statements.len())
        }
    }
}

fn render_ddl(schema: &Schema) -> String {
    let mut ddl = create_statements(schema).join(";\n\n");
    ddl.push_str(";\n");
    ddl
}

fn describe(table: &Table) -> String {
    let unique = table.fields.iter().filter(|(_, f)| f.unique).count();
    let references = table
        .fields
        .iter()
        .filter(|(_, f)| f.references.is_some())
        .count();
    format!(
        "{} ({} fields, {} unique, {} FK)",
        table.name.yellow(),
        table.fields.len(),
        unique,
        references
    )
}

/// Hide the password of a connection URL.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let creds = &url[scheme_end + 3..at];
            match creds.split_once(':') {
                Some((user, _)) => format!("{}{user}:***{}", &url[..scheme_end + 3], &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}
