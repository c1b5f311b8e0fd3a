//! surugaya-sync - Suruga-ya wishlist synchronizer and Letao cart client

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use surugaya_sync::catalog::PurposeCategory;
use surugaya_sync::commands::{
    CartAction, CartCommand, CatalogAction, CatalogCommand, SyncAction, SyncCommand,
};
use surugaya_sync::config::{Config, OutputFormat};
use surugaya_sync::letao::AddToCartRequest;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "surugaya-sync",
    version,
    about = "Suruga-ya wishlist synchronizer and Letao cart client",
    long_about = "Tracks Suruga-ya listings through a FlareSolverr proxy, classifies them into series by keyword rules, and adds selected items to a Letao cart."
)]
struct Cli {
    /// FlareSolverr endpoint (e.g., http://localhost:8191/v1)
    #[arg(long, global = true, env = "SURUGA_PROXY")]
    proxy: Option<String>,

    /// Path to the catalog store
    #[arg(long, global = true, env = "SURUGA_STORE")]
    store: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh every tracked listing and reclassify the catalog
    Sync {
        /// Abort the run after this many minutes
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },

    /// Refresh a single tracked listing
    Scrape { url: String },

    /// Start tracking a listing and take its first snapshot
    #[command(alias = "add")]
    Track { url: String },

    /// Stop tracking a listing
    #[command(alias = "rm")]
    Untrack { url: String },

    /// Show stored snapshots
    #[command(alias = "ls")]
    List,

    /// Show which series a title maps to
    Classify { title: String },

    /// Manage keyword rules
    #[command(subcommand)]
    Mapping(MappingCommands),

    /// Show or change the category of a listing
    Category {
        url: String,

        /// personal, gift, resale or unclassified
        #[arg(long)]
        purpose: Option<PurposeCategory>,

        /// Series name; an empty value clears it
        #[arg(long)]
        series: Option<String>,
    },

    /// Add items to the Letao cart
    #[command(subcommand)]
    Cart(CartCommands),
}

#[derive(Subcommand)]
enum MappingCommands {
    /// Add a keyword rule
    Add {
        /// Text to look for in listing titles
        japanese_key: String,

        /// Series name assigned on match
        chinese_name: String,
    },

    /// List keyword rules
    List,

    /// Remove every rule producing a series name
    Remove { chinese_name: String },
}

#[derive(Subcommand)]
enum CartCommands {
    /// Add one item
    Add {
        #[arg(long)]
        url: String,

        #[arg(long)]
        title: String,

        /// Unit price in yen; commas are ignored
        #[arg(long)]
        price: String,

        /// Listing id, used to derive the image when --image-url is absent
        #[arg(long, default_value = "")]
        product_id: String,

        #[arg(long, default_value = "")]
        image_url: String,

        #[arg(long, default_value = "")]
        spec: String,

        #[arg(long, default_value = "1")]
        quantity: String,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Add every item in a JSON file
    Batch { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(format) = cli.format {
        config.format = format;
    }
    if let Some(proxy) = cli.proxy {
        config.proxy.endpoint = proxy;
    }
    if let Some(store) = cli.store {
        config.store_path = Some(store);
    }

    let output = match cli.command {
        Commands::Sync { timeout_minutes } => {
            SyncCommand::new(config).execute(&SyncAction::Run { timeout_minutes }).await?
        }
        Commands::Scrape { url } => SyncCommand::new(config).execute(&SyncAction::Scrape { url }).await?,
        Commands::Track { url } => SyncCommand::new(config).execute(&SyncAction::Track { url }).await?,
        Commands::Untrack { url } => {
            SyncCommand::new(config).execute(&SyncAction::Untrack { url }).await?
        }
        Commands::List => SyncCommand::new(config).execute(&SyncAction::List).await?,

        Commands::Classify { title } => {
            CatalogCommand::new(config).execute(&CatalogAction::Classify { title }).await?
        }
        Commands::Mapping(mapping) => {
            let action = match mapping {
                MappingCommands::Add { japanese_key, chinese_name } => {
                    CatalogAction::AddMapping { japanese_key, chinese_name }
                }
                MappingCommands::List => CatalogAction::ListMappings,
                MappingCommands::Remove { chinese_name } => {
                    CatalogAction::RemoveMapping { chinese_name }
                }
            };
            CatalogCommand::new(config).execute(&action).await?
        }
        Commands::Category { url, purpose, series } => {
            CatalogCommand::new(config).execute(&CatalogAction::Category { url, purpose, series }).await?
        }

        Commands::Cart(cart) => {
            let action = match cart {
                CartCommands::Add {
                    url,
                    title,
                    price,
                    product_id,
                    image_url,
                    spec,
                    quantity,
                    comment,
                } => CartAction::Add(AddToCartRequest {
                    url,
                    image_url,
                    product_id,
                    title,
                    spec,
                    unit_price: price,
                    quantity,
                    comment,
                }),
                CartCommands::Batch { file } => CartAction::Batch(CartCommand::load_batch(&file).await?),
            };
            CartCommand::new(config).execute(&action).await?
        }
    };

    println!("{}", output);
    Ok(())
}
