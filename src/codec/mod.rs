//! The wire PDU: fixed 23-byte header plus four variable-length lists.

pub mod error_list;
pub mod iid;
pub mod timestamp;
pub mod value;

pub use error_list::ErrorCode;
pub use iid::Iid;
pub use timestamp::{Absolute, Elapsed, Timestamp};
pub use value::{Untyped, Value};

use crate::error::CodecError;

pub const TAG: &[u8; 8] = b"LSNMPv2\0";
const HEADER_LEN: usize = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest = 0,
    SetRequest = 1,
    Notification = 2,
    Response = 3,
    Unknown = 4,
}

impl PduType {
    fn from_u8(b: u8) -> Self {
        match b {
            0 => PduType::GetRequest,
            1 => PduType::SetRequest,
            2 => PduType::Notification,
            3 => PduType::Response,
            _ => PduType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub msg_type: PduType,
    pub timestamp: Absolute,
    pub msg_id: u64,
    pub iid_list: Vec<Iid>,
    pub v_list: Vec<Value>,
    pub t_list: Vec<Timestamp>,
    pub e_list: Vec<ErrorCode>,
}

fn encode_timestamp_list(list: &[Timestamp]) -> Result<Vec<u8>, CodecError> {
    if list.len() > 255 {
        return Err(CodecError::AutoDetectFailed(format!("T-list of {} exceeds 255", list.len())));
    }
    let mut out = vec![list.len() as u8];
    for ts in list {
        out.push(match ts {
            Timestamp::Absolute(_) => 0b0001_0000,
            Timestamp::Elapsed(_) => 0b0001_0001,
        });
        out.extend_from_slice(&ts.to_bytes());
    }
    Ok(out)
}

fn decode_timestamp_list(buf: &[u8]) -> Result<(Vec<Timestamp>, &[u8]), CodecError> {
    if buf.is_empty() {
        return Ok((Vec::new(), buf));
    }
    let count = buf[0];
    let mut rest = &buf[1..];
    let mut items = Vec::new();
    for _ in 0..count {
        if rest.len() < 7 {
            return Ok((items, &[]));
        }
        let body: [u8; 6] = rest[1..7].try_into().unwrap();
        let ts = match rest[0] {
            0b0001_0000 => Timestamp::Absolute(Absolute::from_bytes(&body)),
            0b0001_0001 => Timestamp::Elapsed(Elapsed::from_bytes(&body)),
            _ => return Ok((items, &[])),
        };
        items.push(ts);
        rest = &rest[7..];
    }
    Ok((items, rest))
}

impl Pdu {
    pub fn new(msg_type: PduType, timestamp: Absolute, msg_id: u64) -> Self {
        Pdu {
            msg_type,
            timestamp,
            msg_id,
            iid_list: Vec::new(),
            v_list: Vec::new(),
            t_list: Vec::new(),
            e_list: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(TAG);
        out.push(self.msg_type as u8);
        out.extend_from_slice(&self.timestamp.to_bytes());
        out.extend_from_slice(&self.msg_id.to_be_bytes());
        out.extend(Iid::encode_list(&self.iid_list)?);
        out.extend(Value::encode_list(&self.v_list)?);
        out.extend(encode_timestamp_list(&self.t_list)?);
        out.extend(ErrorCode::encode_list(&self.e_list)?);
        Ok(out)
    }

    /// Decodes a PDU. A bad tag is fatal (error code 2); a bad element
    /// inside a list is tolerated by the list decoders themselves.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated { needed: HEADER_LEN, available: buf.len() });
        }
        if &buf[0..8] != TAG {
            return Err(CodecError::InvalidTag);
        }
        let msg_type = PduType::from_u8(buf[8]);
        let ts_body: [u8; 6] = buf[9..15].try_into().unwrap();
        let timestamp = Absolute::from_bytes(&ts_body);
        let msg_id = u64::from_be_bytes(buf[15..23].try_into().unwrap());

        let rest = &buf[HEADER_LEN..];
        let (iid_list, rest) = Iid::decode_list(rest)?;
        let (v_list, rest) = Value::decode_list(rest)?;
        let (t_list, rest) = decode_timestamp_list(rest)?;
        let (e_list, rest) = ErrorCode::decode_list(rest)?;
        let _ = rest;

        Ok(Pdu { msg_type, timestamp, msg_id, iid_list, v_list, t_list, e_list })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_timestamp() -> Absolute {
        Absolute { day: 13, month: 11, year: 2025, hour: 23, minute: 5, second: 51, millis: 478 }
    }

    #[test]
    fn tag_constancy() {
        let pdu = Pdu::new(PduType::GetRequest, sample_timestamp(), 1);
        let bytes = pdu.encode().unwrap();
        assert_eq!(&bytes[0..8], TAG);
    }

    #[test]
    fn roundtrip_get_request() {
        let mut pdu = Pdu::new(PduType::GetRequest, sample_timestamp(), 7);
        pdu.iid_list = vec![Iid::parse("1.1").unwrap(), Iid::parse("1.2").unwrap()];
        let bytes = pdu.encode().unwrap();
        let back = Pdu::decode(&bytes).unwrap();
        assert_eq!(back, pdu);
    }

    #[test]
    fn get_device_response_roundtrips() {
        let mut pdu = Pdu::new(PduType::Response, sample_timestamp(), 42);
        pdu.iid_list = vec![
            Iid::parse("1.1").unwrap(),
            Iid::parse("1.2").unwrap(),
            Iid::parse("1.3").unwrap(),
        ];
        pdu.v_list = vec![
            Value::Int(123),
            Value::AsciiString("Agent_001".into()),
            Value::AsciiString("Sensing Hub".into()),
        ];
        let bytes = pdu.encode().unwrap();
        let back = Pdu::decode(&bytes).unwrap();
        assert_eq!(back.msg_id, 42);
        assert_eq!(back.v_list, pdu.v_list);
    }

    #[test]
    fn bad_tag_is_fatal() {
        let mut pdu = Pdu::new(PduType::GetRequest, sample_timestamp(), 1);
        pdu.iid_list = vec![Iid::parse("1.1").unwrap()];
        let mut bytes = pdu.encode().unwrap();
        bytes[0] = 0x00;
        assert_eq!(Pdu::decode(&bytes), Err(CodecError::InvalidTag));
    }

    #[test]
    fn unknown_type_byte_decodes_as_unknown() {
        let mut pdu = Pdu::new(PduType::GetRequest, sample_timestamp(), 1);
        let mut bytes = pdu.encode().unwrap();
        bytes[8] = 0x7F;
        let back = Pdu::decode(&bytes).unwrap();
        assert_eq!(back.msg_type, PduType::Unknown);
        pdu.msg_type = PduType::Unknown;
    }

    #[test]
    fn trailing_bytes_empty_for_well_formed_pdu() {
        let mut pdu = Pdu::new(PduType::Response, sample_timestamp(), 1);
        pdu.e_list = vec![ErrorCode::None];
        let bytes = pdu.encode().unwrap();
        let decoded_len_ok = Pdu::decode(&bytes).is_ok();
        assert!(decoded_len_ok);
    }
}
