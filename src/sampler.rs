//! Background sampling loop: polls every sensor at a high-resolution
//! interval and publishes notification PDUs over a channel for the
//! beacon emitter to drain and broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::codec::Iid;
use crate::mib::Mib;

/// A single sensor reading ready to go out as a notification PDU.
pub struct Notification {
    pub iid: Iid,
    pub reading: i64,
}

pub struct Sampler {
    mib: Arc<Mib>,
    poll_interval: Duration,
    tx: Sender<Notification>,
    running: Arc<AtomicBool>,
}

impl Sampler {
    pub fn new(mib: Arc<Mib>, poll_interval: Duration, tx: Sender<Notification>, running: Arc<AtomicBool>) -> Self {
        Sampler { mib, poll_interval, tx, running }
    }

    /// Runs the poll loop. Missed deadlines are not compensated — a late
    /// tick just samples immediately and moves on, no catch-up bursts.
    pub fn start(self) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            while self.running.load(Ordering::Relaxed) {
                for id in self.mib.sensor_ids() {
                    if !self.mib.sensor_due(&id) {
                        continue;
                    }
                    match self.mib.sample(&id) {
                        Ok(reading) => {
                            let Ok(index) = id.parse::<u16>() else { continue };
                            let notification = Notification { iid: Iid::new3(2, 3, index), reading };
                            let _ = self.tx.send(notification);
                            debug!(sensor = %id, reading, "sensor sampled");
                        }
                        Err(e) => debug!(sensor = %id, error = %e, "sample failed"),
                    }
                }
                std::thread::sleep(self.poll_interval);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, SensorDef};
    use std::sync::mpsc;

    fn test_config() -> AgentConfig {
        AgentConfig {
            bind_address: "0.0.0.0:1161".into(),
            notification_bind_address: "0.0.0.0:1163".into(),
            device_id: "Agent_001".into(),
            device_type: "Sensing Hub".into(),
            l_mib_id: 1,
            beacon_period_secs: 30,
            sampler_poll_interval_ms: 5,
            sensors: vec![SensorDef {
                id: "1".into(),
                sensor_type: "Temperature".into(),
                min: 0,
                max: 100,
                sampling_rate_tenths_hz: 100, // 10 Hz, due every tick
            }],
        }
    }

    #[test]
    fn emits_notifications_for_due_sensor() {
        let mib = Arc::new(Mib::new(&test_config()));
        let (tx, rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let sampler = Sampler::new(Arc::clone(&mib), Duration::from_millis(5), tx, Arc::clone(&running));
        let handle = sampler.start();

        let notification = rx.recv_timeout(Duration::from_secs(1)).expect("expected a notification");
        assert_eq!(notification.iid, Iid::new3(2, 3, 1));
        assert!((0..=100).contains(&notification.reading));

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
