use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level agent/manager configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub agent: AgentConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    /// Service port: request/response (ex: "0.0.0.0:1161").
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Notification port: beacons and sensor notifications.
    #[serde(default = "default_notification_bind_address")]
    pub notification_bind_address: String,

    #[serde(default = "default_device_id")]
    pub device_id: String,

    #[serde(default = "default_device_type")]
    pub device_type: String,

    #[serde(default = "default_l_mib_id")]
    pub l_mib_id: i64,

    /// Beacon period in seconds; 0 disables beacon emission.
    #[serde(default = "default_beacon_period_secs")]
    pub beacon_period_secs: u32,

    /// Sampler poll interval, milliseconds.
    #[serde(default = "default_sampler_poll_interval_ms")]
    pub sampler_poll_interval_ms: u64,

    pub sensors: Vec<SensorDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorDef {
    pub id: String,
    pub sensor_type: String,
    pub min: i64,
    pub max: i64,
    /// Sampling rate in tenths of Hz (so "1.0 Hz" is stored as `10`).
    pub sampling_rate_tenths_hz: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// Pre-shared key; the effective AES key is SHA-256(secret)[..16].
    pub shared_secret: String,

    /// How many recent message-ids to remember per peer for error-code-4
    /// duplicate suppression.
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ManagerConfig {
    #[serde(default = "default_agent_address")]
    pub agent_address: String,

    #[serde(default = "default_notification_port")]
    pub notification_port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_bind_address() -> String { "0.0.0.0:1161".to_string() }
fn default_notification_bind_address() -> String { "0.0.0.0:1163".to_string() }
fn default_device_id() -> String { "Agent_001".to_string() }
fn default_device_type() -> String { "Sensing Hub".to_string() }
fn default_l_mib_id() -> i64 { 1 }
fn default_beacon_period_secs() -> u32 { 30 }
fn default_sampler_poll_interval_ms() -> u64 { 10 }
fn default_duplicate_window() -> usize { 64 }
fn default_log_level() -> String { "info".to_string() }
fn default_agent_address() -> String { "127.0.0.1:1161".to_string() }
fn default_notification_port() -> u16 { 1163 }
fn default_request_timeout_secs() -> u64 { 5 }

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            agent_address: default_agent_address(),
            notification_port: default_notification_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig {
                bind_address: default_bind_address(),
                notification_bind_address: default_notification_bind_address(),
                device_id: default_device_id(),
                device_type: default_device_type(),
                l_mib_id: default_l_mib_id(),
                beacon_period_secs: default_beacon_period_secs(),
                sampler_poll_interval_ms: default_sampler_poll_interval_ms(),
                sensors: vec![
                    SensorDef {
                        id: "1".to_string(),
                        sensor_type: "temperature".to_string(),
                        min: 0,
                        max: 100,
                        sampling_rate_tenths_hz: 10,
                    },
                    SensorDef {
                        id: "2".to_string(),
                        sensor_type: "humidity".to_string(),
                        min: 0,
                        max: 100,
                        sampling_rate_tenths_hz: 1,
                    },
                ],
            },
            security: SecurityConfig {
                shared_secret: "change-me".to_string(),
                duplicate_window: default_duplicate_window(),
            },
            logging: LoggingConfig { level: default_log_level() },
            manager: ManagerConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let config: Config = toml::from_str(&content).context("failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path.as_ref(), content).context("failed to write config file")?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.agent.device_id.is_empty() {
            anyhow::bail!("agent.device_id must not be empty");
        }
        if self.security.shared_secret.is_empty() {
            anyhow::bail!("security.shared_secret must not be empty");
        }
        for sensor in &self.agent.sensors {
            if sensor.min > sensor.max {
                anyhow::bail!("sensor {} has min > max", sensor.id);
            }
        }
        Ok(())
    }

    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<()> {
        Config::default().to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.bind_address, "0.0.0.0:1161");
        assert_eq!(config.agent.notification_bind_address, "0.0.0.0:1163");
    }

    #[test]
    fn rejects_sensor_with_inverted_bounds() {
        let mut config = Config::default();
        config.agent.sensors[0].min = 100;
        config.agent.sensors[0].max = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_shared_secret() {
        let mut config = Config::default();
        config.security.shared_secret = String::new();
        assert!(config.validate().is_err());
    }
}
