use clap::{Parser, Subcommand};

mod commands;

/// EduStore: OTP sign-in, orders and downloads for an educational storefront
#[derive(Parser)]
#[command(name = "edustore", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(commands::serve::ServeArgs),

    /// Create the database tables
    Migrate(commands::migrate::MigrateArgs),

    /// Generate a random secret for EDUSTORE_SECRET
    Secret,

    /// Create a SUPERADMIN account, or promote an existing one
    CreateSuperadmin(commands::admin::CreateSuperadminArgs),

    /// Add a product to the catalog
    AddProduct(commands::product::AddProductArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Migrate(args) => commands::migrate::run(args).await,
        Commands::Secret => commands::secret::run(),
        Commands::CreateSuperadmin(args) => commands::admin::run(args).await,
        Commands::AddProduct(args) => commands::product::run(args).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", colored::Colorize::red("error:"), e);
        std::process::exit(1);
    }
}
