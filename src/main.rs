use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use resale_catalog::{
    AppConfig, ScrapedItem, ShopType,
    models::ListingFilter,
    store::SqliteCatalogStore,
    web::{self, AppState},
};

#[derive(Debug, Parser)]
#[command(name = "resale-catalog")]
#[command(about = "Catalog reconciliation and resale profit tracking", version)]
struct Cli {
    /// Directory holding default.toml and its overrides
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Merge a scraped JSON batch into one shop's catalog
    Reconcile {
        #[arg(long)]
        shop_type: String,
        #[arg(long)]
        shop_name: String,
        /// JSON array of scraped items
        #[arg(long)]
        input: PathBuf,
    },
    /// Print enriched listings as JSON
    Listings {
        #[arg(long)]
        shop_type: Option<String>,
        #[arg(long)]
        shop_name: Option<String>,
        #[arg(long)]
        include_hidden: bool,
    },
    /// Print dashboard aggregates as JSON
    Dashboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config_dir)
        .with_context(|| format!("failed to load config from {}", cli.config_dir.display()))?;
    let _log_guard = resale_catalog::logging::init(&config.logging)?;

    let command = cli.command.unwrap_or(Commands::Serve);
    let metrics = if config.metrics.enabled && matches!(command, Commands::Serve) {
        Some(PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let store = SqliteCatalogStore::connect(&config.database).await?;
    store.migrate().await?;
    let state = AppState::new(Arc::new(store), config, metrics);

    match command {
        Commands::Serve => {
            info!("Starting resale catalog service");
            web::serve(state).await?;
        }
        Commands::Migrate => {
            info!("Migrations applied");
        }
        Commands::Reconcile {
            shop_type,
            shop_name,
            input,
        } => {
            let shop_type: ShopType = shop_type.parse()?;
            let raw = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let items: Vec<ScrapedItem> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of items", input.display()))?;

            let report = state.engine.reconcile(shop_type, &shop_name, items).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Listings {
            shop_type,
            shop_name,
            include_hidden,
        } => {
            let filter = ListingFilter {
                shop_type: shop_type.as_deref().map(str::parse::<ShopType>).transpose()?,
                shop_name,
                include_hidden,
                ..Default::default()
            };
            let rows = state.catalog.list_enriched(&filter).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Dashboard => {
            let summary = state.catalog.dashboard().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
