// `edustore add-product`: put a product in the catalog.

use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;

use edustore::{AdapterStore, Store};
use edustore_core::db::models::Product;
use edustore_core::utils::{generate_id, now_millis};

use super::{connect, CliResult, ConfigArgs};

#[derive(Args)]
pub struct AddProductArgs {
    #[command(flatten)]
    config: ConfigArgs,

    #[arg(long)]
    title: String,

    #[arg(long)]
    category: String,

    /// Unit price in the store currency
    #[arg(long)]
    price: f64,

    /// Location of the downloadable file
    #[arg(long)]
    file_path: Option<String>,
}

pub async fn run(args: AddProductArgs) -> CliResult {
    let product = build_product(&args, now_millis())?;
    let options = args.config.read_options()?;
    let (adapter, _) = connect(&options).await?;
    let store = AdapterStore::new(adapter.clone());

    let result = store.create_product(&product).await;
    adapter.close().await;
    let product = result?;

    println!(
        "{} Added {} at {:.2} ({})",
        "✔".green(),
        product.title.yellow(),
        product.price,
        product.id.dimmed()
    );
    Ok(())
}

fn build_product(args: &AddProductArgs, now: DateTime<Utc>) -> Result<Product, String> {
    let title = args.title.trim();
    let category = args.category.trim();
    if title.is_empty() || category.is_empty() {
        return Err("title and category must not be empty".into());
    }
    if !args.price.is_finite() || args.price < 0.0 {
        return Err(format!("invalid price: {}", args.price));
    }

    Ok(Product {
        id: generate_id(),
        title: title.to_string(),
        category: category.to_string(),
        price: (args.price * 100.0).round() / 100.0,
        file_path: args
            .file_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
        created_at: now,
        updated_at: now,
    })
}
