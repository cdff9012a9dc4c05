use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use nuntius::{Dispatcher, MemoryStore, Poller, Registry};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod consumers;
mod feed;

use config::Config;
use feed::Input;

const DEFAULT_CONFIG: &str = "nuntius.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Defaults to `nuntius.toml` when present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding `log.level` from the configuration.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch newline-delimited change envelopes.
    Run {
        /// Input file, or `-` for stdin.
        #[arg(short, long, default_value = "-")]
        input: String,
    },
    /// Validate the configuration and consumer registrations, then exit.
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(DEFAULT_CONFIG.as_ref(), false)?,
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("nuntius={level},nuntius_core={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = Arc::new(MemoryStore::new());
    let registry = build_registry(&store, &config)?;

    match cli.command {
        Command::Run { input } => run(registry, store, &config, Input::from(input.as_str())),
        Command::Check => {
            for consumer in registry.consumers() {
                info!(
                    consumer = consumer.name(),
                    table = consumer.table(),
                    triggers = %consumer.triggers(),
                    "registered"
                );
            }
            info!(
                tables = registry.tables().count(),
                consumers = registry.len(),
                "configuration is valid"
            );
            Ok(())
        }
    }
}

fn build_registry(store: &Arc<MemoryStore>, config: &Config) -> Result<Arc<Registry>> {
    let mut builder = Registry::builder();
    consumers::register(&mut builder, store, &config.store)
        .context("failed to register consumers")?;
    Ok(Arc::new(builder.freeze()))
}

fn run(
    registry: Arc<Registry>,
    store: Arc<MemoryStore>,
    config: &Config,
    input: Input,
) -> Result<()> {
    info!(?input, consumers = registry.len(), "starting");

    let dispatcher = Dispatcher::with_unit_of_work(registry, Arc::clone(&store));
    let poller = Poller::new(dispatcher).with_policy(config.poller.on_malformed.into());

    let (batches, reader) = feed::spawn(
        input,
        config.feed.batch_size,
        config.feed.channel_capacity,
    )?;

    let result = poller.run(&batches);
    // Disconnect so a reader blocked on a full channel can exit.
    drop(batches);

    let stats = reader
        .join()
        .map_err(|_| anyhow!("feed reader panicked"))??;
    let report = result?;

    info!(
        records = stats.records,
        batches = stats.batches,
        %report,
        cached = store.len(),
        "feed drained"
    );

    Ok(())
}
