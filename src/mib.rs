//! The in-memory Management Information Base: device group (1.x) and
//! sensor table (2.x), behind a single readers/writer lock.

use std::sync::RwLock;
use std::time::Instant;

use rand::Rng;

use crate::codec::timestamp::{Absolute, Elapsed};
use crate::codec::{ErrorCode, Iid, Timestamp, Value};
use crate::config::{AgentConfig, SensorDef};
use crate::error::MibError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Standby = 0,
    Normal = 1,
    Error = 2,
}

struct SensorRow {
    id: String,
    sensor_type: String,
    current: i64,
    min: i64,
    max: i64,
    last_sample: Option<Instant>,
    sampling_rate_tenths_hz: u32,
    boot_rate_tenths_hz: u32,
}

impl SensorRow {
    fn new(def: &SensorDef) -> Self {
        SensorRow {
            id: def.id.clone(),
            sensor_type: def.sensor_type.clone(),
            current: rand::thread_rng().gen_range(def.min..=def.max),
            min: def.min,
            max: def.max,
            last_sample: None,
            sampling_rate_tenths_hz: def.sampling_rate_tenths_hz,
            boot_rate_tenths_hz: def.sampling_rate_tenths_hz,
        }
    }

    fn time_since_last_sample(&self) -> Elapsed {
        match self.last_sample {
            None => Elapsed { days: 0, hours: 0, minutes: 0, seconds: 0, millis: 0 },
            Some(t) => Elapsed::from_duration(t.elapsed()),
        }
    }

    fn sample(&mut self) -> i64 {
        self.current = rand::thread_rng().gen_range(self.min..=self.max);
        self.last_sample = Some(Instant::now());
        self.current
    }
}

struct MibState {
    l_mib_id: i64,
    device_id: String,
    device_type: String,
    beacon_period_secs: u32,
    boot_beacon_period_secs: u32,
    op_status: OpStatus,
    sensors: Vec<SensorRow>,
    uptime_origin: Instant,
}

/// The agent's MIB: device group fields plus the sensor table, exposed
/// only through `get`/`set`/`sample`/`reset` — no direct field access
/// from outside this module.
pub struct Mib {
    state: RwLock<MibState>,
}

fn null_placeholder() -> Value {
    Value::Byte(0)
}

impl Mib {
    pub fn new(config: &AgentConfig) -> Self {
        let sensors = config.sensors.iter().map(SensorRow::new).collect();
        let state = MibState {
            l_mib_id: config.l_mib_id,
            device_id: config.device_id.clone(),
            device_type: config.device_type.clone(),
            beacon_period_secs: config.beacon_period_secs,
            boot_beacon_period_secs: config.beacon_period_secs,
            op_status: OpStatus::Normal,
            sensors,
            uptime_origin: Instant::now(),
        };
        Mib { state: RwLock::new(state) }
    }

    pub fn beacon_period_secs(&self) -> u32 {
        self.state.read().unwrap().beacon_period_secs
    }

    pub fn op_status(&self) -> OpStatus {
        self.state.read().unwrap().op_status
    }

    pub fn mark_error(&self) {
        self.state.write().unwrap().op_status = OpStatus::Error;
    }

    /// Sensor ids configured at boot, in table order — used by the
    /// sampler to know which rows to poll without holding the lock.
    pub fn sensor_ids(&self) -> Vec<String> {
        self.state.read().unwrap().sensors.iter().map(|s| s.id.clone()).collect()
    }

    pub fn sensor_due(&self, id: &str) -> bool {
        let state = self.state.read().unwrap();
        let Some(row) = state.sensors.iter().find(|s| s.id == id) else { return false };
        if row.sampling_rate_tenths_hz == 0 {
            return false;
        }
        let interval_secs = 10.0 / row.sampling_rate_tenths_hz as f64;
        match row.last_sample {
            None => true,
            Some(t) => t.elapsed().as_secs_f64() >= interval_secs,
        }
    }

    /// GET: returns values positionally aligned with `iids`. Unknown iids
    /// get a null placeholder value and error code 5 at that position.
    ///
    /// A batch that includes a `2.3.k` (SAMPLE-triggering) iid takes the
    /// write lock, since SAMPLE mutates; a batch that only reads device
    /// fields or sensor table columns takes a shared read lock, matching
    /// the "GETs take a shared view" discipline.
    pub fn get(&self, iids: &[Iid]) -> (Vec<Value>, Vec<ErrorCode>) {
        let triggers_sample = iids.iter().any(|iid| {
            matches!((iid.structure, iid.object, iid.index1, iid.index2), (2, 3, Some(_), None))
        });

        if triggers_sample {
            let mut state = self.state.write().unwrap();
            collect_get(iids, |iid| get_one(&mut state, iid))
        } else {
            let state = self.state.read().unwrap();
            collect_get(iids, |iid| get_one_ro(&state, iid))
        }
    }

    /// SET: mutates and echoes the new value for 1.4, 1.9, 2.7.k. Any
    /// other iid is rejected with error code 5 for that position; a
    /// well-formed value of the wrong domain is error code 7.
    pub fn set(&self, iids: &[Iid], values: &[Value]) -> Result<(Vec<Value>, Vec<ErrorCode>), MibError> {
        if iids.len() != values.len() {
            return Err(MibError::ListLengthMismatch { iid_len: iids.len(), v_len: values.len() });
        }
        let mut state = self.state.write().unwrap();
        let mut out_values = Vec::with_capacity(iids.len());
        let mut errors = Vec::with_capacity(iids.len());
        for (iid, value) in iids.iter().zip(values.iter()) {
            match set_one(&mut state, iid, value) {
                SetOutcome::Ok(v) => {
                    out_values.push(v);
                    errors.push(ErrorCode::None);
                }
                SetOutcome::UnknownIid => {
                    out_values.push(null_placeholder());
                    errors.push(ErrorCode::InvalidIid);
                }
                SetOutcome::BadValue => {
                    out_values.push(null_placeholder());
                    errors.push(ErrorCode::UnsupportedValue);
                }
            }
        }
        Ok((out_values, errors))
    }

    /// SAMPLE: draws a uniform reading in `[min,max]` for `id` and
    /// updates current reading + last-sample time. Returns the new
    /// reading.
    pub fn sample(&self, id: &str) -> Result<i64, MibError> {
        let mut state = self.state.write().unwrap();
        let row = state
            .sensors
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| MibError::NoSuchSensor(id.to_string()))?;
        Ok(row.sample())
    }

    /// Reset: reinitializes the uptime clock, beacon period, and every
    /// sensor's sampling rate to their boot-configured values; rows are
    /// not destroyed. Re-enters `Normal` operational status.
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        state.beacon_period_secs = state.boot_beacon_period_secs;
        state.uptime_origin = Instant::now();
        state.op_status = OpStatus::Normal;
        for row in state.sensors.iter_mut() {
            row.sampling_rate_tenths_hz = row.boot_rate_tenths_hz;
        }
    }

    /// The IID-list + values for a global beacon: `{1.1,1.2,1.5,1.8}`.
    pub fn beacon_values(&self) -> (Vec<Iid>, Vec<Value>) {
        let state = self.state.read().unwrap();
        let iids = vec![
            Iid::new2(1, 1),
            Iid::new2(1, 2),
            Iid::new2(1, 5),
            Iid::new2(1, 8),
        ];
        let values = iids.iter().map(|iid| get_one_ro(&state, iid).unwrap()).collect();
        (iids, values)
    }
}

enum SetOutcome {
    Ok(Value),
    UnknownIid,
    BadValue,
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int(n) => Some(*n),
        Value::Byte(b) => Some(*b as i64),
        _ => None,
    }
}

/// Collects a GET batch's values/errors, positionally aligned with
/// `iids`, given a per-iid resolver over whatever lock was taken.
fn collect_get<'a>(
    iids: &'a [Iid],
    mut resolve: impl FnMut(&'a Iid) -> Result<Value, MibError>,
) -> (Vec<Value>, Vec<ErrorCode>) {
    let mut values = Vec::with_capacity(iids.len());
    let mut errors = Vec::with_capacity(iids.len());
    for iid in iids {
        match resolve(iid) {
            Ok(v) => {
                values.push(v);
                errors.push(ErrorCode::None);
            }
            Err(_) => {
                values.push(null_placeholder());
                errors.push(ErrorCode::InvalidIid);
            }
        }
    }
    (values, errors)
}

/// Mutating GET path: handles everything [`get_one_ro`] does, plus
/// `2.3.k` which triggers a SAMPLE and so needs the write lock.
fn get_one(state: &mut MibState, iid: &Iid) -> Result<Value, MibError> {
    if let (2, 3, Some(idx), None) = (iid.structure, iid.object, iid.index1, iid.index2) {
        let id = idx.to_string();
        let row = state
            .sensors
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| MibError::NoSuchSensor(id.clone()))?;
        return Ok(Value::Int(row.sample()));
    }
    get_one_ro(state, iid)
}

/// Read-only GET path: device fields and sensor table columns, none of
/// which mutate state. Does not handle `2.3.k` (SAMPLE) — that always
/// goes through [`get_one`] under the write lock.
fn get_one_ro(state: &MibState, iid: &Iid) -> Result<Value, MibError> {
    match (iid.structure, iid.object, iid.index1, iid.index2) {
        (1, 1, None, None) => Ok(Value::Int(state.l_mib_id)),
        (1, 2, None, None) => Ok(Value::AsciiString(state.device_id.clone())),
        (1, 3, None, None) => Ok(Value::AsciiString(state.device_type.clone())),
        (1, 4, None, None) => Ok(Value::Int(state.beacon_period_secs as i64)),
        (1, 5, None, None) => Ok(Value::Int(state.sensors.len() as i64)),
        (1, 6, None, None) => Ok(Value::Timestamp(Timestamp::Absolute(current_timestamp()))),
        (1, 7, None, None) => {
            Ok(Value::Timestamp(Timestamp::Elapsed(Elapsed::from_duration(state.uptime_origin.elapsed()))))
        }
        (1, 8, None, None) => Ok(Value::Int(state.op_status as i64)),
        (1, 9, None, None) => Ok(Value::Int(0)),
        (2, col @ (1 | 2 | 4 | 5 | 6 | 7), Some(idx), None) => {
            let id = idx.to_string();
            let row = state
                .sensors
                .iter()
                .find(|s| s.id == id)
                .ok_or_else(|| MibError::NoSuchSensor(id.clone()))?;
            Ok(match col {
                1 => Value::AsciiString(format!("Sensor_{}", row.id)),
                2 => Value::AsciiString(row.sensor_type.clone()),
                4 => Value::Int(row.min),
                5 => Value::Int(row.max),
                6 => Value::Timestamp(Timestamp::Elapsed(row.time_since_last_sample())),
                7 => Value::Int(row.sampling_rate_tenths_hz as i64),
                _ => unreachable!(),
            })
        }
        _ => Err(MibError::UnknownIid(iid.to_string())),
    }
}

fn set_one(state: &mut MibState, iid: &Iid, value: &Value) -> SetOutcome {
    match (iid.structure, iid.object, iid.index1, iid.index2) {
        (1, 4, None, None) => match value_as_i64(value) {
            Some(n) if n >= 0 => {
                state.beacon_period_secs = n as u32;
                SetOutcome::Ok(Value::Int(n))
            }
            _ => SetOutcome::BadValue,
        },
        (1, 9, None, None) => match value_as_i64(value) {
            Some(1) => {
                reset_locked(state);
                SetOutcome::Ok(Value::Int(1))
            }
            Some(n) => SetOutcome::Ok(Value::Int(n)),
            None => SetOutcome::BadValue,
        },
        (2, 7, Some(idx), None) => {
            let id = idx.to_string();
            match value_as_i64(value) {
                Some(n) if n >= 0 => {
                    match state.sensors.iter_mut().find(|s| s.id == id) {
                        Some(row) => {
                            row.sampling_rate_tenths_hz = n as u32;
                            SetOutcome::Ok(Value::Int(n))
                        }
                        None => SetOutcome::UnknownIid,
                    }
                }
                _ => SetOutcome::BadValue,
            }
        }
        _ => SetOutcome::UnknownIid,
    }
}

fn reset_locked(state: &mut MibState) {
    state.beacon_period_secs = state.boot_beacon_period_secs;
    state.uptime_origin = Instant::now();
    state.op_status = OpStatus::Normal;
    for row in state.sensors.iter_mut() {
        row.sampling_rate_tenths_hz = row.boot_rate_tenths_hz;
    }
}

fn current_timestamp() -> Absolute {
    let now = chrono::Local::now();
    use chrono::{Datelike, Timelike};
    Absolute {
        day: now.day() as u8,
        month: now.month() as u8,
        year: now.year() as u16,
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        second: now.second() as u8,
        millis: (now.timestamp_subsec_millis()) as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorDef;

    fn test_config() -> AgentConfig {
        AgentConfig {
            bind_address: "0.0.0.0:1161".into(),
            notification_bind_address: "0.0.0.0:1163".into(),
            device_id: "Agent_001".into(),
            device_type: "Sensing Hub".into(),
            l_mib_id: 123,
            beacon_period_secs: 30,
            sampler_poll_interval_ms: 10,
            sensors: vec![
                SensorDef { id: "1".into(), sensor_type: "Temperature".into(), min: 0, max: 100, sampling_rate_tenths_hz: 10 },
                SensorDef { id: "2".into(), sensor_type: "Humidity".into(), min: -50, max: 50, sampling_rate_tenths_hz: 1 },
            ],
        }
    }

    #[test]
    fn get_device_group_fields() {
        let mib = Mib::new(&test_config());
        let iids = vec![Iid::parse("1.1").unwrap(), Iid::parse("1.2").unwrap(), Iid::parse("1.3").unwrap()];
        let (values, errors) = mib.get(&iids);
        assert_eq!(values, vec![
            Value::Int(123),
            Value::AsciiString("Agent_001".into()),
            Value::AsciiString("Sensing Hub".into()),
        ]);
        assert!(errors.iter().all(|e| *e == ErrorCode::None));
    }

    #[test]
    fn set_beacon_rate() {
        let mib = Mib::new(&test_config());
        let iids = vec![Iid::parse("1.4").unwrap()];
        let (values, errors) = mib.set(&iids, &[Value::Int(60)]).unwrap();
        assert_eq!(values, vec![Value::Int(60)]);
        assert_eq!(errors, vec![ErrorCode::None]);
        assert_eq!(mib.beacon_period_secs(), 60);
    }

    #[test]
    fn unknown_iid_gets_null_and_error5() {
        let mib = Mib::new(&test_config());
        let iids = vec![Iid::parse("9.9").unwrap()];
        let (values, errors) = mib.get(&iids);
        assert_eq!(values, vec![Value::Byte(0)]);
        assert_eq!(errors, vec![ErrorCode::InvalidIid]);
    }

    #[test]
    fn sensor_min_le_current_le_max_after_sample() {
        let mib = Mib::new(&test_config());
        for _ in 0..20 {
            let reading = mib.sample("2").unwrap();
            assert!((-50..=50).contains(&reading));
        }
    }

    #[test]
    fn reset_restarts_uptime_and_beacon_rate() {
        let mib = Mib::new(&test_config());
        mib.set(&[Iid::parse("1.4").unwrap()], &[Value::Int(99)]).unwrap();
        assert_eq!(mib.beacon_period_secs(), 99);
        std::thread::sleep(std::time::Duration::from_millis(20));
        let (before, _) = mib.get(&[Iid::parse("1.7").unwrap()]);
        mib.set(&[Iid::parse("1.9").unwrap()], &[Value::Int(1)]).unwrap();
        let (after, _) = mib.get(&[Iid::parse("1.7").unwrap()]);
        assert_eq!(mib.beacon_period_secs(), 30);
        if let (Value::Timestamp(Timestamp::Elapsed(b)), Value::Timestamp(Timestamp::Elapsed(a))) =
            (&before[0], &after[0])
        {
            let before_ms = (b.days as u64 * 86_400_000) + b.seconds as u64 * 1000 + b.millis as u64;
            let after_ms = (a.days as u64 * 86_400_000) + a.seconds as u64 * 1000 + a.millis as u64;
            assert!(after_ms < before_ms + 1);
        } else {
            panic!("expected elapsed timestamps");
        }
    }

    #[test]
    fn reset_field_always_reads_zero() {
        let mib = Mib::new(&test_config());
        let (values, _) = mib.get(&[Iid::parse("1.9").unwrap()]);
        assert_eq!(values, vec![Value::Int(0)]);
    }
}
