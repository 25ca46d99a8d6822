//! Transport endpoint: the agent's request/response dispatcher and beacon
//! emitter, each bound to its own UDP socket.

use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::codec::{Absolute, ErrorCode, Pdu, PduType, Value};
use crate::config::Config;
use crate::framer;
use crate::mib::Mib;
use crate::sampler::Notification;
use crate::stats::Stats;

const MAX_DATAGRAM: usize = 4096;

fn now_timestamp() -> Absolute {
    use chrono::{Datelike, Timelike};
    let now = chrono::Local::now();
    Absolute {
        day: now.day() as u8,
        month: now.month() as u8,
        year: now.year() as u16,
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        second: now.second() as u8,
        millis: now.timestamp_subsec_millis() as u16,
    }
}

pub struct AgentServer {
    config: Config,
    mib: Arc<Mib>,
    stats: Arc<Stats>,
    key: [u8; 16],
    running: Arc<AtomicBool>,
    seen_ids: Mutex<HashMap<SocketAddr, VecDeque<u64>>>,
}

impl AgentServer {
    pub fn new(config: Config, mib: Arc<Mib>, stats: Arc<Stats>, running: Arc<AtomicBool>) -> Self {
        let key = framer::derive_key(&config.security.shared_secret);
        AgentServer { config, mib, stats, key, running, seen_ids: Mutex::new(HashMap::new()) }
    }

    /// Binds the service socket and runs the request/response loop until
    /// `running` is cleared. Blocks the calling thread.
    pub fn run_requests(&self) -> Result<()> {
        let socket = UdpSocket::bind(&self.config.agent.bind_address)
            .context("failed to bind agent service socket")?;
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .context("failed to set read timeout")?;
        info!("agent listening on {}", self.config.agent.bind_address);

        let mut buffer = [0u8; MAX_DATAGRAM];
        while self.running.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buffer) {
                Ok((size, addr)) => {
                    self.stats.requests_received.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self.handle_request(&socket, &buffer[..size], addr) {
                        warn!(%addr, error = %e, "error handling request");
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "socket receive error");
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        info!("agent request loop stopped");
        Ok(())
    }

    fn handle_request(&self, socket: &UdpSocket, datagram: &[u8], addr: SocketAddr) -> Result<()> {
        let plaintext = match framer::unframe(datagram, &self.key) {
            Ok(p) => p,
            Err(e) => {
                debug!(%addr, error = %e, raw = %hex::encode(datagram), "framer error, error code 1");
                self.stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        let request = match Pdu::decode(&plaintext) {
            Ok(p) => p,
            Err(e) => {
                debug!(%addr, error = %e, "tag/decode error, datagram dropped");
                self.stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        if self.is_duplicate(addr, request.msg_id) {
            self.stats.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
            let mut response = Pdu::new(PduType::Response, now_timestamp(), request.msg_id);
            response.e_list = vec![ErrorCode::DuplicateMessage];
            return self.send_response(socket, &response, addr);
        }

        let response = match request.msg_type {
            PduType::GetRequest => {
                let (values, errors) = self.mib.get(&request.iid_list);
                let mut response = Pdu::new(PduType::Response, now_timestamp(), request.msg_id);
                response.iid_list = request.iid_list;
                response.v_list = values;
                response.e_list = errors;
                response
            }
            PduType::SetRequest => {
                let mut response = Pdu::new(PduType::Response, now_timestamp(), request.msg_id);
                match self.mib.set(&request.iid_list, &request.v_list) {
                    Ok((values, errors)) => {
                        response.iid_list = request.iid_list;
                        response.v_list = values;
                        response.e_list = errors;
                    }
                    Err(_) => {
                        response.e_list = vec![ErrorCode::ListLengthMismatch];
                    }
                }
                response
            }
            PduType::Unknown => {
                let mut response = Pdu::new(PduType::Response, now_timestamp(), request.msg_id);
                response.e_list = vec![ErrorCode::UnknownType];
                response
            }
            PduType::Notification | PduType::Response => {
                // Requests arriving on the service socket are always
                // get/set; anything else is treated like an unknown type.
                let mut response = Pdu::new(PduType::Response, now_timestamp(), request.msg_id);
                response.e_list = vec![ErrorCode::UnknownType];
                response
            }
        };

        self.stats.requests_processed.fetch_add(1, Ordering::Relaxed);
        self.send_response(socket, &response, addr)
    }

    fn send_response(&self, socket: &UdpSocket, response: &Pdu, addr: SocketAddr) -> Result<()> {
        let encoded = response.encode().context("failed to encode response")?;
        let framed = framer::frame(&encoded, &self.key);
        socket.send_to(&framed, addr).context("failed to send response")?;
        Ok(())
    }

    fn is_duplicate(&self, addr: SocketAddr, msg_id: u64) -> bool {
        let mut seen = self.seen_ids.lock().unwrap();
        let window = self.config.security.duplicate_window;
        let entry = seen.entry(addr).or_insert_with(VecDeque::new);
        if entry.contains(&msg_id) {
            return true;
        }
        entry.push_back(msg_id);
        while entry.len() > window {
            entry.pop_front();
        }
        false
    }

    /// Runs the beacon emitter: drains sensor notifications as they
    /// arrive and emits a periodic global beacon. Both go out on the
    /// notification socket via broadcast.
    pub fn run_beacons(&self, notifications: Receiver<Notification>) -> Result<()> {
        let socket = UdpSocket::bind(&self.config.agent.notification_bind_address)
            .context("failed to bind notification socket")?;
        socket.set_broadcast(true).context("failed to enable broadcast")?;
        let broadcast_addr: SocketAddr = format!(
            "255.255.255.255:{}",
            self.config
                .agent
                .notification_bind_address
                .rsplit(':')
                .next()
                .unwrap_or("1163")
        )
        .parse()
        .context("invalid notification port")?;

        let mut last_beacon = Instant::now() - Duration::from_secs(u64::MAX / 2);
        while self.running.load(Ordering::Relaxed) {
            while let Ok(notification) = notifications.try_recv() {
                let mut pdu = Pdu::new(PduType::Notification, now_timestamp(), 0);
                pdu.iid_list = vec![notification.iid];
                pdu.v_list = vec![Value::Int(notification.reading)];
                self.broadcast(&socket, broadcast_addr, &pdu);
                self.stats.notifications_sent.fetch_add(1, Ordering::Relaxed);
            }

            let period = self.mib.beacon_period_secs();
            if period > 0 && last_beacon.elapsed() >= Duration::from_secs(period as u64) {
                let (iids, values) = self.mib.beacon_values();
                let mut pdu = Pdu::new(PduType::Notification, now_timestamp(), 0);
                pdu.iid_list = iids;
                pdu.v_list = values;
                self.broadcast(&socket, broadcast_addr, &pdu);
                self.stats.beacons_sent.fetch_add(1, Ordering::Relaxed);
                last_beacon = Instant::now();
            }

            std::thread::sleep(Duration::from_millis(200));
        }
        info!("beacon emitter stopped");
        Ok(())
    }

    fn broadcast(&self, socket: &UdpSocket, addr: SocketAddr, pdu: &Pdu) {
        match pdu.encode() {
            Ok(encoded) => {
                let framed = framer::frame(&encoded, &self.key);
                if let Err(e) = socket.send_to(&framed, addr) {
                    warn!(error = %e, "failed to broadcast PDU");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode outbound PDU"),
        }
    }

    pub fn mib(&self) -> &Arc<Mib> {
        &self.mib
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, SecurityConfig, LoggingConfig, ManagerConfig, SensorDef};

    fn test_config(bind: &str, notif: &str) -> Config {
        Config {
            agent: AgentConfig {
                bind_address: bind.to_string(),
                notification_bind_address: notif.to_string(),
                device_id: "Agent_001".into(),
                device_type: "Sensing Hub".into(),
                l_mib_id: 123,
                beacon_period_secs: 0,
                sampler_poll_interval_ms: 10,
                sensors: vec![SensorDef { id: "1".into(), sensor_type: "Temperature".into(), min: 0, max: 100, sampling_rate_tenths_hz: 10 }],
            },
            security: SecurityConfig { shared_secret: "hunter2".into(), duplicate_window: 4 },
            logging: LoggingConfig { level: "info".into() },
            manager: ManagerConfig::default(),
        }
    }

    #[test]
    fn duplicate_window_suppresses_repeat_msg_ids() {
        let config = test_config("127.0.0.1:0", "127.0.0.1:0");
        let mib = Arc::new(Mib::new(&config.agent));
        let agent = AgentServer::new(config, mib, Arc::new(Stats::new()), Arc::new(AtomicBool::new(true)));
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert!(!agent.is_duplicate(addr, 5));
        assert!(agent.is_duplicate(addr, 5));
        assert!(!agent.is_duplicate(addr, 6));
    }

    #[test]
    fn bad_tag_drops_without_response() {
        let config = test_config("127.0.0.1:0", "127.0.0.1:0");
        let mib = Arc::new(Mib::new(&config.agent));
        let stats = Arc::new(Stats::new());
        let key = framer::derive_key(&config.security.shared_secret);
        let agent = AgentServer::new(config, mib, Arc::clone(&stats), Arc::new(AtomicBool::new(true)));

        let mut pdu = Pdu::new(PduType::GetRequest, now_timestamp(), 1);
        pdu.iid_list = vec![crate::codec::Iid::parse("1.1").unwrap()];
        let mut encoded = pdu.encode().unwrap();
        encoded[0] = 0x00;
        let framed = framer::frame(&encoded, &key);

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        agent.handle_request(&socket, &framed, addr).unwrap();
        assert_eq!(stats.requests_rejected.load(Ordering::Relaxed), 1);
    }
}
