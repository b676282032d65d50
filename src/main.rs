//! Binary entrypoint for the Moodgrove CLI.
//!
//! Commands:
//! - `init` - write a starter `moodgrove.toml`
//! - `status` - print a JSON summary of the store and activity counters
//! - `sweep` - run one spawn/expiry sweep and exit
//! - `watch` - keep sweeping on the configured interval until Ctrl-C
//! - `tree <user>` - show a user's tree, progress and fruit
//! - `inventory <user>` - show a user's fruit holdings
//! - `market <user>` - list offers the user could accept
//!
//! See the library crate docs for module-level details: `moodgrove::`.
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde_json::json;

use moodgrove::config::Config;
use moodgrove::grove::{sweep, GroveStore, GroveStoreBuilder, SweepScheduler};
use moodgrove::metrics;

#[derive(Parser)]
#[command(name = "moodgrove")]
#[command(about = "Tree growth and fruit economy engine for mood journaling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "moodgrove.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that run against an opened store.
#[derive(Subcommand)]
enum StoreCommand {
    /// Show store status and statistics
    Status,
    /// Run a single sweep (spawn due fruit, expire stale trades)
    Sweep,
    /// Sweep periodically until interrupted
    Watch,
    /// Show a user's tree
    Tree {
        /// User id
        user: String,
    },
    /// Show a user's fruit inventory
    Inventory {
        /// User id
        user: String,
    },
    /// Browse open trade offers visible to a user
    Market {
        /// User id
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            // No config exists yet, so log with defaults
            init_logging(&None, cli.verbose);
            info!("Initializing new Moodgrove configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            Ok(())
        }
        Commands::Store(command) => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            run_command(command, &config).await
        }
    }
}

async fn run_command(command: StoreCommand, config: &Config) -> Result<()> {
    let store = open_store(config)?;

    match command {
        StoreCommand::Status => {
            let counts = store.counts();
            let summary = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "data_dir": config.storage.data_dir,
                "store": counts,
                "public_trees": store.list_public_trees()?.len(),
                "live_trades": store.live_trade_count_at(Utc::now())?,
                "metrics": metrics::snapshot(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        StoreCommand::Sweep => {
            let stats = sweep(&store)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StoreCommand::Watch => {
            run_watch(&store, config.sweeper.interval_secs).await?;
        }
        StoreCommand::Tree { user } => {
            let tree = store.tree_for_user(&user)?;
            let progress = tree.progress(&store.rules().growth.stages);
            let cooldown = store.check_in_status(&tree.id)?;
            let view = json!({
                "tree": tree,
                "progress": progress,
                "can_check_in": cooldown.allowed,
                "check_in_available_in_secs": cooldown.remaining.num_seconds(),
                "uncollected_fruits": store.uncollected_fruits(&tree.id)?,
                "recent_check_ins": store.check_in_history(&tree.id, 5)?,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        StoreCommand::Inventory { user } => {
            let holdings = store.inventory_for(&user)?;
            println!("{}", serde_json::to_string_pretty(&holdings)?);
        }
        StoreCommand::Market { user } => {
            let offers = store.browse(&user)?;
            println!("{}", serde_json::to_string_pretty(&offers)?);
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<GroveStore> {
    let rules = config.rules()?;
    let store = GroveStoreBuilder::new(&config.storage.data_dir)
        .with_rules(rules)
        .open()?;
    Ok(store)
}

async fn run_watch(store: &GroveStore, interval_secs: u64) -> Result<()> {
    let mut scheduler = SweepScheduler::new(interval_secs);
    let mut ticker = tokio::time::interval(scheduler.interval().to_std()?);
    info!("Sweeping every {}s; press Ctrl-C to stop", scheduler.interval().num_seconds());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scheduler.run_if_due(store, Utc::now()) {
                    if e.is_retryable() {
                        warn!("Sweep failed, will retry next tick: {}", e);
                    } else {
                        error!("Sweep failed: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping after {} sweep(s)", scheduler.runs());
                break;
            }
        }
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when someone is watching it
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
