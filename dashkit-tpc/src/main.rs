//! dashkit-tpc - TPCreator command line
//!
//! Runs template-tile propagation against a dashkit database:
//! - `process`: feed one report instance's tags to the TPCreator
//! - `suggest`: print the suggested UISpec for a tag list
//! - `sync-sizes`: resize the derived tiles of a master
//! - `derived`: list the derived tiles of a master

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dashkit_common::config::load_config;
use dashkit_common::db::init_database;
use dashkit_common::events::EventBus;
use dashkit_tpc::tags::suggest_uispec;
use dashkit_tpc::{Backend, ReportInstance, TileStore, Tpcreator};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for dashkit-tpc
#[derive(Parser, Debug)]
#[command(name = "dashkit-tpc")]
#[command(about = "Template-tile propagation for dashkit dashboards")]
#[command(version)]
struct Args {
    /// Config file (overrides DASHKIT_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file (overrides the config file)
    #[arg(long, env = "DASHKIT_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the TPCreator for a report instance
    Process {
        #[arg(long)]
        owner: Uuid,
        #[arg(long)]
        report: Uuid,
        /// Tags of the report instance
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Promote the first tile of each family to master
        #[arg(long)]
        make_first_master: bool,
    },
    /// Print the suggested UISpec for tags as JSON
    Suggest {
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Resize derived tiles to their master's size
    SyncSizes {
        #[arg(long)]
        dashboard: Uuid,
        #[arg(long)]
        master: Uuid,
    },
    /// List derived tiles of a master
    Derived {
        #[arg(long)]
        dashboard: Uuid,
        #[arg(long)]
        master: Uuid,
        /// Order by tag values instead of position
        #[arg(long)]
        sort: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Suggest needs no database or logging
    if let Command::Suggest { tags } = &args.command {
        println!("{}", serde_json::to_string_pretty(&suggest_uispec(tags))?);
        return Ok(());
    }

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Database: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;
    let backend = Backend::sqlite(pool);
    let events = EventBus::new(100);
    let tpcreator = Tpcreator::new(backend.clone(), events, config.tpcreator.clone());

    match args.command {
        Command::Process {
            owner,
            report,
            tags,
            make_first_master,
        } => {
            let instance = ReportInstance::new(owner, report, tags);
            let results = tpcreator
                .handle_tpcreator(owner, report, &instance, make_first_master)
                .await
                .context("TPCreator failed")?;
            for lmr in &results {
                println!(
                    "dashboard {}: {} new tile(s), layout {}",
                    lmr.new_layout.dashboard_id,
                    lmr.new_tiles.len(),
                    lmr.new_layout
                        .layout_id
                        .map(|id| id.to_string())
                        .unwrap_or_default()
                );
            }
            info!("Modified {} layout(s)", results.len());
        }
        Command::SyncSizes { dashboard, master } => {
            let master = load_tile(&backend, dashboard, master).await?;
            match tpcreator.sync_derived_sizes(&master, None).await? {
                Some(lmr) if lmr.layout_changed() => println!("Sizes synchronized"),
                _ => println!("Sizes already match"),
            }
        }
        Command::Derived {
            dashboard,
            master,
            sort,
        } => {
            let master = load_tile(&backend, dashboard, master).await?;
            let ids = tpcreator
                .select_tpcreated_tile_ids(&master, None, sort)
                .await?
                .unwrap_or_default();
            for id in ids {
                println!("{}", id);
            }
        }
        Command::Suggest { .. } => {}
    }

    Ok(())
}

async fn load_tile(backend: &Backend, dashboard_id: Uuid, tile_id: Uuid) -> Result<dashkit_tpc::Tile> {
    let Some(tile) = backend.tiles.select_tile(dashboard_id, tile_id).await? else {
        bail!("Tile {} not found in dashboard {}", tile_id, dashboard_id);
    };
    Ok(tile)
}
