use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lsnmpvs::codec::Iid;
use lsnmpvs::config::Config;
use lsnmpvs::manager::{Beacon, BeaconKind, Manager};

/// Thin demo driver over the `Manager` library type: queries the device
/// group and the configured sensors, then watches beacons for a while.
/// A real UI frontend consumes `Manager::get`/`set`/`start_beacon_listener`
/// directly instead of this loop.
fn main() -> Result<()> {
    let config_path = get_config_path();
    let config_exists = config_path.exists();
    let config = if config_exists { Config::from_file(&config_path)? } else { Config::default() };

    init_logging(&config.logging.level)?;
    if !config_exists {
        warn!("no config at {}, using defaults", config_path.display());
    }

    let manager = Manager::connect(&config.manager, &config.security.shared_secret)
        .context("failed to connect to agent")?;

    let running = Arc::new(AtomicBool::new(true));
    let beacons: Arc<Mutex<Vec<Beacon>>> = Arc::new(Mutex::new(Vec::new()));
    let listener = manager.start_beacon_listener(
        config.manager.notification_port,
        Arc::clone(&running),
        Arc::clone(&beacons),
    )?;

    let device_iids: Vec<Iid> = ["1.1", "1.2", "1.3", "1.5", "1.7", "1.8"]
        .iter()
        .map(|s| Iid::parse(s).unwrap())
        .collect();
    let (values, errors) = manager.get(&device_iids)?;
    info!("device group:");
    for ((iid, value), error) in device_iids.iter().zip(values.iter()).zip(errors.iter()) {
        info!("  {} = {:?} (error {:?})", iid, value, error);
    }

    info!("listening for beacons for 10 seconds...");
    std::thread::sleep(Duration::from_secs(10));

    for beacon in beacons.lock().unwrap().drain(..) {
        match beacon.kind {
            BeaconKind::Global { mib_id, device_id, sensor_count, op_status } => {
                info!(
                    "global beacon from {}: mib_id={:?} device_id={:?} sensors={:?} status={:?}",
                    beacon.from, mib_id, device_id, sensor_count, op_status
                );
            }
            BeaconKind::SensorNotification { iid, reading } => {
                info!("sensor notification from {}: {} = {:?}", beacon.from, iid, reading);
            }
            BeaconKind::Unknown { iid_list, v_list } => {
                warn!("unknown beacon from {}: iids={:?} values={:?}", beacon.from, iid_list, v_list);
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    listener.join().ok();
    Ok(())
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
    PathBuf::from("manager.toml")
}
