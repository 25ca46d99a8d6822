//! Manager-side client: sends get/set requests to an agent and listens
//! for beacons and sensor notifications in the background.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::codec::{Absolute, Iid, Pdu, PduType, Value};
use crate::config::ManagerConfig;
use crate::framer;

const RECV_BUFFER: usize = 4096;

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

/// The three shapes a received beacon can take, mirroring the
/// manager's original dispatch-by-iid-shape logic.
#[derive(Debug, Clone, PartialEq)]
pub enum BeaconKind {
    Global { mib_id: Value, device_id: Value, sensor_count: Value, op_status: Value },
    SensorNotification { iid: Iid, reading: Value },
    Unknown { iid_list: Vec<Iid>, v_list: Vec<Value> },
}

#[derive(Debug, Clone)]
pub struct Beacon {
    pub from: SocketAddr,
    pub kind: BeaconKind,
}

/// A request/response client plus a background beacon listener, talking
/// to a single agent. `message_counter` starts at a small random offset
/// so two managers racing the same agent don't collide on msg_id 0.
pub struct Manager {
    socket: UdpSocket,
    agent_addr: SocketAddr,
    key: [u8; 16],
    message_counter: AtomicU64,
}

impl Manager {
    pub fn connect(config: &ManagerConfig, shared_secret: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind manager request socket")?;
        socket
            .set_read_timeout(Some(Duration::from_secs(config.request_timeout_secs)))
            .context("failed to set request timeout")?;
        let agent_addr: SocketAddr = config
            .agent_address
            .parse()
            .context("invalid agent address")?;
        let key = framer::derive_key(shared_secret);
        let message_counter = AtomicU64::new(rand::random::<u64>() % 51);
        Ok(Manager { socket, agent_addr, key, message_counter })
    }

    fn next_msg_id(&self) -> u64 {
        self.message_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn send_request(&self, msg_type: PduType, iid_list: Vec<Iid>, v_list: Vec<Value>) -> Result<Pdu> {
        let mut pdu = Pdu::new(msg_type, now_timestamp(), self.next_msg_id());
        pdu.iid_list = iid_list;
        pdu.v_list = v_list;

        let encoded = pdu.encode().context("failed to encode request")?;
        let framed = framer::frame(&encoded, &self.key);
        self.socket
            .send_to(&framed, self.agent_addr)
            .context("failed to send request")?;

        let mut buf = [0u8; RECV_BUFFER];
        let (size, _) = self.socket.recv_from(&mut buf).context("no response from agent")?;
        let plaintext = framer::unframe(&buf[..size], &self.key).context("failed to unframe response")?;
        Pdu::decode(&plaintext).context("failed to decode response")
    }

    /// Fetches values for the given iids. Returns the response's v_list
    /// and e_list positionally aligned with `iids`.
    pub fn get(&self, iids: &[Iid]) -> Result<(Vec<Value>, Vec<crate::codec::ErrorCode>)> {
        let response = self.send_request(PduType::GetRequest, iids.to_vec(), Vec::new())?;
        Ok((response.v_list, response.e_list))
    }

    /// Sets values for the given iids, returning the echoed values and
    /// per-position error codes.
    pub fn set(&self, iids: &[Iid], values: &[Value]) -> Result<(Vec<Value>, Vec<crate::codec::ErrorCode>)> {
        let response = self.send_request(PduType::SetRequest, iids.to_vec(), values.to_vec())?;
        Ok((response.v_list, response.e_list))
    }

    pub fn configure_beacon_rate(&self, seconds: u32) -> Result<()> {
        let iids = vec![Iid::new2(1, 4)];
        self.set(&iids, &[Value::Int(seconds as i64)])?;
        Ok(())
    }

    pub fn reset_agent(&self) -> Result<()> {
        let iids = vec![Iid::new2(1, 9)];
        self.set(&iids, &[Value::Int(1)])?;
        Ok(())
    }

    /// Spawns the background beacon listener on its own broadcast-bound
    /// socket. Received beacons are decrypted with the manager's key,
    /// classified, and pushed onto `sink`.
    pub fn start_beacon_listener(
        &self,
        notification_port: u16,
        running: Arc<AtomicBool>,
        sink: Arc<Mutex<Vec<Beacon>>>,
    ) -> Result<std::thread::JoinHandle<()>> {
        let socket = UdpSocket::bind(("0.0.0.0", notification_port))
            .context("failed to bind beacon listener socket")?;
        socket
            .set_read_timeout(Some(Duration::from_secs(1)))
            .context("failed to set beacon listener timeout")?;
        let key = self.key;

        Ok(std::thread::spawn(move || {
            let mut buf = [0u8; RECV_BUFFER];
            while running.load(Ordering::Relaxed) {
                match socket.recv_from(&mut buf) {
                    Ok((size, addr)) => {
                        if let Some(beacon) = Self::classify(&buf[..size], addr, &key) {
                            sink.lock().unwrap().push(beacon);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                        continue;
                    }
                    Err(e) => warn!(error = %e, "beacon receive error"),
                }
            }
        }))
    }

    fn classify(datagram: &[u8], from: SocketAddr, key: &[u8; 16]) -> Option<Beacon> {
        let plaintext = match framer::unframe(datagram, key) {
            Ok(p) => p,
            Err(e) => {
                debug!(%from, error = %e, "framer error on beacon, dropping");
                return None;
            }
        };
        let pdu = Pdu::decode(&plaintext).ok()?;
        let kind = if pdu.iid_list.len() == 4
            && pdu.iid_list[0] == Iid::new2(1, 1)
            && pdu.iid_list[1] == Iid::new2(1, 2)
            && pdu.iid_list[2] == Iid::new2(1, 5)
            && pdu.iid_list[3] == Iid::new2(1, 8)
            && pdu.v_list.len() == 4
        {
            BeaconKind::Global {
                mib_id: pdu.v_list[0].clone(),
                device_id: pdu.v_list[1].clone(),
                sensor_count: pdu.v_list[2].clone(),
                op_status: pdu.v_list[3].clone(),
            }
        } else if pdu.iid_list.len() == 1 && pdu.iid_list[0].structure == 2 && pdu.iid_list[0].object == 3 {
            BeaconKind::SensorNotification {
                iid: pdu.iid_list[0].clone(),
                reading: pdu.v_list.first().cloned().unwrap_or(Value::Byte(0)),
            }
        } else {
            BeaconKind::Unknown { iid_list: pdu.iid_list.clone(), v_list: pdu.v_list.clone() }
        };
        debug!(%from, ?kind, "beacon received");
        Some(Beacon { from, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_global_beacon() {
        let key = framer::derive_key("test-secret");
        let mut pdu = Pdu::new(PduType::Notification, now_timestamp(), 0);
        pdu.iid_list = vec![Iid::new2(1, 1), Iid::new2(1, 2), Iid::new2(1, 5), Iid::new2(1, 8)];
        pdu.v_list = vec![
            Value::Int(123),
            Value::AsciiString("Agent_001".into()),
            Value::Int(2),
            Value::Int(1),
        ];
        let encoded = pdu.encode().unwrap();
        let framed = framer::frame(&encoded, &key);
        let beacon = Manager::classify(&framed, "127.0.0.1:1".parse().unwrap(), &key).unwrap();
        matches!(beacon.kind, BeaconKind::Global { .. });
    }

    #[test]
    fn classifies_sensor_notification() {
        let key = framer::derive_key("test-secret");
        let mut pdu = Pdu::new(PduType::Notification, now_timestamp(), 0);
        pdu.iid_list = vec![Iid::new3(2, 3, 1)];
        pdu.v_list = vec![Value::Int(42)];
        let encoded = pdu.encode().unwrap();
        let framed = framer::frame(&encoded, &key);
        let beacon = Manager::classify(&framed, "127.0.0.1:1".parse().unwrap(), &key).unwrap();
        match beacon.kind {
            BeaconKind::SensorNotification { iid, reading } => {
                assert_eq!(iid, Iid::new3(2, 3, 1));
                assert_eq!(reading, Value::Int(42));
            }
            other => panic!("expected sensor notification, got {:?}", other),
        }
    }

    #[test]
    fn classifies_unknown_beacon() {
        let key = framer::derive_key("test-secret");
        let mut pdu = Pdu::new(PduType::Notification, now_timestamp(), 0);
        pdu.iid_list = vec![Iid::new2(3, 1)];
        pdu.v_list = vec![Value::Int(1)];
        let encoded = pdu.encode().unwrap();
        let framed = framer::frame(&encoded, &key);
        let beacon = Manager::classify(&framed, "127.0.0.1:1".parse().unwrap(), &key).unwrap();
        matches!(beacon.kind, BeaconKind::Unknown { .. });
    }

    #[test]
    fn classify_drops_beacon_encrypted_with_wrong_key() {
        let key = framer::derive_key("test-secret");
        let other_key = framer::derive_key("different-secret");
        let mut pdu = Pdu::new(PduType::Notification, now_timestamp(), 0);
        pdu.iid_list = vec![Iid::new3(2, 3, 1)];
        pdu.v_list = vec![Value::Int(42)];
        let encoded = pdu.encode().unwrap();
        let framed = framer::frame(&encoded, &other_key);
        assert!(Manager::classify(&framed, "127.0.0.1:1".parse().unwrap(), &key).is_none());
    }
}
