use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lsnmpvs::agent::AgentServer;
use lsnmpvs::config::Config;
use lsnmpvs::mib::Mib;
use lsnmpvs::sampler::Sampler;
use lsnmpvs::stats::Stats;

fn main() -> Result<()> {
    let config_path = get_config_path();
    let (config, created) = load_or_create_config(&config_path)?;

    init_logging(&config.logging.level)?;

    info!("L-SNMPvS agent v{}", env!("CARGO_PKG_VERSION"));
    if created {
        warn!("configuration file not found at {}, created an example", config_path.display());
        warn!("edit it and restart the agent");
    } else {
        info!("loaded configuration from {}", config_path.display());
    }

    info!("Configuration:");
    info!("  Service address: {}", config.agent.bind_address);
    info!("  Notification address: {}", config.agent.notification_bind_address);
    info!("  Device id: {}", config.agent.device_id);
    info!("  Sensors: {}", config.agent.sensors.len());
    info!("  Beacon period: {}s", config.agent.beacon_period_secs);

    let mib = Arc::new(Mib::new(&config.agent));
    let stats = Arc::new(Stats::new());
    let running = Arc::new(AtomicBool::new(true));

    let running_handler = Arc::clone(&running);
    let ctrl_c_count = Arc::new(AtomicU8::new(0));
    let count_clone = Arc::clone(&ctrl_c_count);

    ctrlc::set_handler(move || {
        let count = count_clone.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            warn!("Ctrl+C received. Press again within 5 seconds to stop the agent.");

            let count_disarm = Arc::clone(&count_clone);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_secs(5));
                let current = count_disarm.load(Ordering::SeqCst);
                if current == 1 {
                    count_disarm.store(0, Ordering::SeqCst);
                    info!("Shutdown cancelled, agent continues running.");
                }
            });
        } else {
            warn!("Shutdown confirmed, stopping agent...");
            running_handler.store(false, Ordering::SeqCst);
            std::thread::spawn(|| {
                std::thread::sleep(std::time::Duration::from_secs(2));
                error!("Forced exit (shutdown timeout)");
                std::process::exit(0);
            });
        }
    })
    .context("failed to set Ctrl+C handler")?;

    let (tx, rx) = mpsc::channel();
    let poll_interval = std::time::Duration::from_millis(config.agent.sampler_poll_interval_ms);
    let sampler = Sampler::new(Arc::clone(&mib), poll_interval, tx, Arc::clone(&running));
    let _sampler_thread = sampler.start();

    let server = AgentServer::new(config, Arc::clone(&mib), Arc::clone(&stats), Arc::clone(&running));
    let server = Arc::new(server);

    let beacon_server = Arc::clone(&server);
    let beacon_thread = std::thread::spawn(move || {
        if let Err(e) = beacon_server.run_beacons(rx) {
            error!("beacon emitter error: {:#}", e);
        }
    });

    info!("Press Ctrl+C twice (within 5 seconds) to stop");

    let result = server.run_requests();
    let _ = beacon_thread.join();
    result
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

fn get_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        return PathBuf::from(&args[1]);
    }

    #[cfg(target_os = "linux")]
    return PathBuf::from("/etc/lsnmpvs/agent.toml");

    #[cfg(target_os = "windows")]
    return PathBuf::from("agent.toml");

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    return PathBuf::from("agent.toml");
}

/// Loads the config at `path`, or creates an example one if missing.
/// Returns whether a new file was created, since logging isn't set up
/// yet when this runs and the caller reports it once it is.
fn load_or_create_config(path: &PathBuf) -> Result<(Config, bool)> {
    if path.exists() {
        Ok((Config::from_file(path)?, false))
    } else {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("failed to create config directory")?;
            }
        }

        Config::create_example_config(path).context("failed to create example config")?;
        Ok((Config::from_file(path)?, true))
    }
}
