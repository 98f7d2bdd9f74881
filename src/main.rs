// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! MachinaEar edge agent
//!
//! Runs on a Raspberry Pi class device next to a machine:
//! - pairs with the dashboard through a short pairing code
//! - scores sound for anomalies (microphone + model, or a digital sound sensor)
//! - buffers every result locally and syncs when online

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use machinaear_agent::{
    build_info, build_sensor, Agent, Config, Database, DeviceIdentity, HttpBackend, HttpProbe,
    PairingMachine, SensingMode, NAME, VERSION,
};

/// MachinaEar - acoustic anomaly detection edge agent
#[derive(Parser, Debug)]
#[command(name = "machinaear-agent")]
#[command(author = "MachinaEar Project")]
#[command(version = VERSION)]
#[command(about = "Acoustic anomaly detection agent with offline buffering and backend sync")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Directory for the local event database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Sensing mode: audio, gpio or simulated
    #[arg(long)]
    mode: Option<String>,

    /// Forget the paired identity and pair again
    #[arg(long)]
    reset: bool,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Print local state and exit
    #[arg(long)]
    status: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging; RUST_LOG wins over flags and config
    let level = if args.trace {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(args.debug || args.trace)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let build = build_info();
    info!("{} agent v{} ({}/{})", NAME, build.version, build.os, build.target);
    if !build.features.is_empty() {
        info!("   Features: {}", build.features.join(", "));
    }

    // Override with command line args
    if let Some(api_url) = args.api_url {
        config.backend.api_base_url = api_url;
    }
    if let Some(data_dir) = args.data_dir {
        config.set_data_dir(data_dir);
    }
    if let Some(mode) = args.mode.as_deref() {
        config.mode = mode.parse::<SensingMode>()?;
    }
    config.validate().context("invalid configuration")?;

    info!("Configuration loaded from {:?}", config_path);
    info!("Backend: {}", config.backend.api_base_url);

    let rt = tokio::runtime::Runtime::new()?;

    if args.status {
        return rt.block_on(print_status(&config));
    }

    rt.block_on(run_agent(config, args.reset, args.duration))
}

async fn run_agent(config: Config, reset: bool, duration: Option<u64>) -> Result<()> {
    let store = Arc::new(Database::open(&config)?);
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let probe = Arc::new(HttpProbe::new(&config.backend));
    let sensor = build_sensor(&config, None)?;

    let mut agent = Agent::new(
        &config,
        store,
        backend,
        probe,
        sensor,
        DeviceIdentity::detect(),
    )?;

    if reset {
        agent.reset_identity()?;
    }

    let stop = agent.stop_handle();

    if let Some(secs) = duration {
        let stop = stop.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            info!("Run duration of {}s reached", secs);
            stop.stop();
        });
    }

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received, finishing current step...");
                stop.stop();
            }
        });
    }

    info!("   Press Ctrl+C to shutdown");
    let stats = agent.run().await?;
    info!(
        "Pushed {} live updates, {} heartbeats, {} sensing failures",
        stats.pushes, stats.heartbeats, stats.sensing_failures
    );

    Ok(())
}

async fn print_status(config: &Config) -> Result<()> {
    let store = Arc::new(Database::open(config)?);
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let pairing = PairingMachine::load(store.clone(), backend, DeviceIdentity::detect())?;
    let stats = store.stats()?;

    println!("Database:        {}", store.path().display());
    println!("Pairing state:   {}", pairing.state());
    match pairing.credentials() {
        Some(credentials) => println!("Device id:       {}", credentials.device_id),
        None => {
            if let Some(code) = pairing.pairing_code() {
                println!("Pairing code:    {}", code);
            }
        }
    }
    println!("MAC address:     {}", pairing.identity().mac_address);
    println!("Hostname:        {}", pairing.identity().hostname);
    println!("Events:          {}", stats.total_events);
    println!("  anomalies:     {}", stats.anomalies);
    println!("  not yet synced: {}", stats.unsynced_events);

    if stats.unsynced_events > 0 && pairing.credentials().is_none() {
        warn!("Buffered events will sync once the device is paired");
    }

    Ok(())
}
