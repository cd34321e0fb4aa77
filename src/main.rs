use anyhow::{bail, Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ez_monitor::cli::{Cli, Commands, ConfigCommands, SamplerArgs, ServeArgs, VERSION_WITH_BUILD};
use ez_monitor::core::sources::default_sources;
use ez_monitor::core::{HostFacts, MetricCategory, Sampler, SamplerConfig, SnapshotStore};
use ez_monitor::utils::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.unwrap_or_default() {
        Commands::Serve(args) => {
            let config = AppConfig::load(cli.config.as_deref())?;
            handle_serve(config, args).await?;
        }
        Commands::Once { pretty, sampler } => {
            let config = AppConfig::load(cli.config.as_deref())?;
            handle_once(config, sampler, pretty).await?;
        }
        Commands::Config { command } => {
            handle_config(cli.config, command)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "ez_monitor=debug,tower_http=debug"
    } else {
        "ez_monitor=info,tower_http=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// File configuration with command-line overrides applied
fn sampler_config(config: &AppConfig, overrides: &SamplerArgs) -> Result<SamplerConfig> {
    let mut sampler = config.sampler_config().context("Invalid sampler configuration")?;
    overrides.apply(&mut sampler).context("Invalid sampler override")?;
    Ok(sampler)
}

fn build_sampler(config: SamplerConfig, store: SnapshotStore) -> Result<Sampler> {
    let sources = default_sources(&config);
    Ok(Sampler::new(config, store, sources)?)
}

async fn collect_facts() -> Result<HostFacts> {
    tokio::task::spawn_blocking(HostFacts::collect)
        .await
        .context("Host facts collection failed")
}

// ============================================================================
// serve
// ============================================================================

#[cfg(feature = "server")]
async fn handle_serve(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    use ez_monitor::server::{self, AppState};

    args.apply(&mut config.server);
    let sampler_config = sampler_config(&config, &args.sampler)?;

    info!("ez-monitor {}", VERSION_WITH_BUILD);

    let store = SnapshotStore::new();
    let facts = collect_facts().await?;
    info!(
        host = facts.hostname.as_deref().unwrap_or("unknown"),
        cpu = %facts.cpu.brand,
        cores = facts.cpu.logical_cores,
        "host facts collected"
    );

    let sampler = build_sampler(sampler_config.clone(), store.clone())?;
    let sampler_task = sampler.spawn();

    let state = AppState::new(store, facts, sampler_config);
    let result = server::run(
        state,
        &config.server.host,
        config.server.port,
        config.server.cors,
        shutdown_signal(),
    )
    .await;

    sampler_task.abort();
    info!("ez-monitor stopped");
    result
}

#[cfg(not(feature = "server"))]
async fn handle_serve(_config: AppConfig, _args: ServeArgs) -> Result<()> {
    bail!("ez-monitor was built without the `server` feature; use `ez-monitor once` instead")
}

#[cfg(feature = "server")]
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// once
// ============================================================================

async fn handle_once(config: AppConfig, overrides: SamplerArgs, pretty: bool) -> Result<()> {
    let sampler_config = sampler_config(&config, &overrides)?;

    // Throughput needs two counter samples, so wait for the slowest counter category
    let settle = MetricCategory::ALL
        .iter()
        .filter(|category| category.is_counter())
        .filter_map(|category| sampler_config.intervals.get(category).copied())
        .max()
        .unwrap_or(sampler_config.base_interval);

    let store = SnapshotStore::new();
    let mut sampler = build_sampler(sampler_config, store.clone())?;

    sampler.tick().await;
    tokio::time::sleep(settle.max(Duration::from_millis(100))).await;
    sampler.tick().await;

    let snapshot = store.read();
    if snapshot.is_empty() {
        bail!("No metrics could be collected");
    }

    let json = if pretty {
        serde_json::to_string_pretty(&*snapshot)?
    } else {
        serde_json::to_string(&*snapshot)?
    };
    println!("{}", json);

    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn handle_config(explicit: Option<std::path::PathBuf>, command: ConfigCommands) -> Result<()> {
    let path = match &explicit {
        Some(path) => path.clone(),
        None => AppConfig::config_path()?,
    };

    match command {
        ConfigCommands::Show => {
            let config = AppConfig::load(explicit.as_deref())?;
            config.sampler_config().context("Invalid sampler configuration")?;
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::default().save(&path)?;
            println!("✓ Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}
