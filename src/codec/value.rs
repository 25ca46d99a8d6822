//! The `Value` tagged union and its discriminator-byte wire encoding.

use super::iid::Iid;
use super::timestamp::{Absolute, Elapsed, Timestamp};
use crate::error::CodecError;

const TAG_BYTE: u8 = 0b0000_0000;
const TAG_BSTR_SHORT: u8 = 0b0000_0001;
const TAG_BSTR_LONG: u8 = 0b0000_0010;
const TAG_INT_BASE: u8 = 0b0000_0100;
const TAG_INTSEQ_BASE: u8 = 0b0000_1000;
const TAG_TS_ABS: u8 = 0b0001_0000;
const TAG_TS_ELAPSED: u8 = 0b0001_0001;
const TAG_ASCII: u8 = 0b0010_0000;
const TAG_EXT_ASCII: u8 = 0b0010_0001;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(u8),
    ByteString(Vec<u8>),
    Int(i64),
    IntSeq(Vec<i64>),
    Timestamp(Timestamp),
    AsciiString(String),
    ExtAsciiString(String),
    Iid(Iid),
}

/// Raw input accepted by [`Value::from_untyped`], the best-fit constructor
/// used only at system edges (SET values typed in by a manager operator).
#[derive(Debug, Clone)]
pub enum Untyped {
    Str(String),
    Bytes(Vec<u8>),
    IntList(Vec<i64>),
}

fn int_width(n: i64) -> usize {
    if (i8::MIN as i64..=i8::MAX as i64).contains(&n) {
        1
    } else if (i16::MIN as i64..=i16::MAX as i64).contains(&n) {
        2
    } else if (i32::MIN as i64..=i32::MAX as i64).contains(&n) {
        4
    } else {
        8
    }
}

fn width_index(width: usize) -> u8 {
    match width {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => unreachable!("int width is always 1/2/4/8"),
    }
}

fn encode_int_be(n: i64, width: usize) -> Vec<u8> {
    let full = n.to_be_bytes();
    full[8 - width..].to_vec()
}

fn decode_int_be(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    buf.fill(fill);
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    i64::from_be_bytes(buf)
}

fn is_extended_ascii(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xFF)
}

impl Value {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Value::Byte(b) => Ok(vec![TAG_BYTE, *b]),
            Value::ByteString(bytes) => {
                if bytes.len() <= 255 {
                    let mut out = vec![TAG_BSTR_SHORT, bytes.len() as u8];
                    out.extend_from_slice(bytes);
                    Ok(out)
                } else if bytes.len() <= 65535 {
                    let mut out = vec![TAG_BSTR_LONG];
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(bytes);
                    Ok(out)
                } else {
                    Err(CodecError::AutoDetectFailed(format!(
                        "byte string of {} bytes exceeds 65535",
                        bytes.len()
                    )))
                }
            }
            Value::Int(n) => {
                let width = int_width(*n);
                let mut out = vec![TAG_INT_BASE + width_index(width)];
                out.extend(encode_int_be(*n, width));
                Ok(out)
            }
            Value::IntSeq(items) => {
                if items.len() > 65535 {
                    return Err(CodecError::AutoDetectFailed(format!(
                        "integer sequence of {} elements exceeds 65535",
                        items.len()
                    )));
                }
                let width = items.iter().map(|n| int_width(*n)).max().unwrap_or(1);
                let ss = width_index(width);
                let k = if items.len() <= 255 { 0u8 } else { 1u8 };
                let mut out = vec![TAG_INTSEQ_BASE | (k << 2) | ss];
                if k == 0 {
                    out.push(items.len() as u8);
                } else {
                    out.extend_from_slice(&(items.len() as u16).to_be_bytes());
                }
                for n in items {
                    out.extend(encode_int_be(*n, width));
                }
                Ok(out)
            }
            Value::Timestamp(Timestamp::Absolute(a)) => {
                let mut out = vec![TAG_TS_ABS];
                out.extend_from_slice(&a.to_bytes());
                Ok(out)
            }
            Value::Timestamp(Timestamp::Elapsed(e)) => {
                let mut out = vec![TAG_TS_ELAPSED];
                out.extend_from_slice(&e.to_bytes());
                Ok(out)
            }
            Value::AsciiString(s) => {
                if !s.is_ascii() {
                    return Err(CodecError::InvalidStringEncoding);
                }
                encode_tagged_string(TAG_ASCII, s.as_bytes())
            }
            Value::ExtAsciiString(s) => {
                if !is_extended_ascii(s) {
                    return Err(CodecError::InvalidStringEncoding);
                }
                let bytes: Vec<u8> = s.chars().map(|c| c as u8).collect();
                encode_tagged_string(TAG_EXT_ASCII, &bytes)
            }
            Value::Iid(iid) => Ok(iid.encode()),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        if buf.is_empty() {
            return Err(CodecError::Truncated { needed: 1, available: 0 });
        }
        let tag = buf[0];
        if tag & 0b1111_1100 == 0b0100_0000 {
            let (iid, used) = Iid::decode(buf)?;
            return Ok((Value::Iid(iid), used));
        }
        match tag {
            TAG_BYTE => {
                require(buf, 2)?;
                Ok((Value::Byte(buf[1]), 2))
            }
            TAG_BSTR_SHORT => {
                require(buf, 2)?;
                let len = buf[1] as usize;
                require(buf, 2 + len)?;
                Ok((Value::ByteString(buf[2..2 + len].to_vec()), 2 + len))
            }
            TAG_BSTR_LONG => {
                require(buf, 3)?;
                let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
                require(buf, 3 + len)?;
                Ok((Value::ByteString(buf[3..3 + len].to_vec()), 3 + len))
            }
            t if (TAG_INT_BASE..TAG_INT_BASE + 4).contains(&t) => {
                let width = 1usize << (t - TAG_INT_BASE);
                require(buf, 1 + width)?;
                let n = decode_int_be(&buf[1..1 + width]);
                Ok((Value::Int(n), 1 + width))
            }
            t if (TAG_INTSEQ_BASE..TAG_INTSEQ_BASE + 8).contains(&t) => {
                let k = (t >> 2) & 1;
                let ss = t & 0b11;
                let width = [1usize, 2, 4, 8][ss as usize];
                let header_len = if k == 0 { 1 } else { 2 };
                require(buf, 1 + header_len)?;
                let count = if k == 0 {
                    buf[1] as usize
                } else {
                    u16::from_be_bytes([buf[1], buf[2]]) as usize
                };
                let body_start = 1 + header_len;
                require(buf, body_start + count * width)?;
                let mut items = Vec::with_capacity(count);
                for i in 0..count {
                    let start = body_start + i * width;
                    items.push(decode_int_be(&buf[start..start + width]));
                }
                Ok((Value::IntSeq(items), body_start + count * width))
            }
            TAG_TS_ABS => {
                require(buf, 7)?;
                let body: [u8; 6] = buf[1..7].try_into().unwrap();
                Ok((Value::Timestamp(Timestamp::Absolute(Absolute::from_bytes(&body))), 7))
            }
            TAG_TS_ELAPSED => {
                require(buf, 7)?;
                let body: [u8; 6] = buf[1..7].try_into().unwrap();
                Ok((Value::Timestamp(Timestamp::Elapsed(Elapsed::from_bytes(&body))), 7))
            }
            TAG_ASCII => {
                let (s, used) = decode_tagged_string(buf)?;
                Ok((Value::AsciiString(s), used))
            }
            TAG_EXT_ASCII => {
                let (s, used) = decode_tagged_string(buf)?;
                Ok((Value::ExtAsciiString(s), used))
            }
            other => Err(CodecError::InvalidValueTag(other)),
        }
    }

    /// Encodes a `count:u8` + concatenated-values list. Strict: the first
    /// value that fails to encode aborts the whole call.
    pub fn encode_list(values: &[Value]) -> Result<Vec<u8>, CodecError> {
        if values.len() > 255 {
            return Err(CodecError::AutoDetectFailed(format!("list of {} exceeds 255", values.len())));
        }
        let mut out = vec![values.len() as u8];
        for v in values {
            out.extend(v.encode()?);
        }
        Ok(out)
    }

    /// Decodes a `count:u8` + concatenated-values list, tolerantly.
    pub fn decode_list(buf: &[u8]) -> Result<(Vec<Value>, &[u8]), CodecError> {
        if buf.is_empty() {
            return Ok((Vec::new(), buf));
        }
        let count = buf[0];
        let mut rest = &buf[1..];
        let mut items = Vec::new();
        for _ in 0..count {
            match Value::decode(rest) {
                Ok((v, used)) => {
                    items.push(v);
                    rest = &rest[used..];
                }
                Err(_) => return Ok((items, &[])),
            }
        }
        Ok((items, rest))
    }

    /// Best-fit constructor from loosely typed input, trying IID, then
    /// timestamp, then integer, then string in that order. Fails if no
    /// rule matches.
    pub fn from_untyped(input: Untyped) -> Result<Value, CodecError> {
        match input {
            Untyped::Bytes(b) => Ok(Value::ByteString(b)),
            Untyped::IntList(v) => Ok(Value::IntSeq(v)),
            Untyped::Str(s) => {
                let dot_parts: Vec<&str> = s.split('.').collect();
                if (2..=4).contains(&dot_parts.len())
                    && dot_parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
                {
                    if let Ok(iid) = Iid::parse(&s) {
                        return Ok(Value::Iid(iid));
                    }
                }
                let colon_parts = s.split(':').count();
                if colon_parts == 7 {
                    if let Ok(a) = Absolute::parse(&s) {
                        return Ok(Value::Timestamp(Timestamp::Absolute(a)));
                    }
                }
                if colon_parts == 5 {
                    if let Ok(e) = Elapsed::parse(&s) {
                        return Ok(Value::Timestamp(Timestamp::Elapsed(e)));
                    }
                }
                if let Ok(n) = s.parse::<i64>() {
                    return Ok(Value::Int(n));
                }
                if s.is_ascii() {
                    return Ok(Value::AsciiString(s));
                }
                if is_extended_ascii(&s) {
                    return Ok(Value::ExtAsciiString(s));
                }
                Err(CodecError::AutoDetectFailed(s))
            }
        }
    }
}

fn require(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        Err(CodecError::Truncated { needed, available: buf.len() })
    } else {
        Ok(())
    }
}

fn encode_tagged_string(tag: u8, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if bytes.len() > 65535 {
        return Err(CodecError::InvalidStringEncoding);
    }
    let mut out = vec![tag];
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(out)
}

fn decode_tagged_string(buf: &[u8]) -> Result<(String, usize), CodecError> {
    require(buf, 3)?;
    let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
    require(buf, 3 + len)?;
    let s: String = buf[3..3 + len].iter().map(|&b| b as char).collect();
    Ok((s, 3 + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip() {
        let v = Value::Byte(200);
        let bytes = v.encode().unwrap();
        assert_eq!(bytes, vec![0x00, 200]);
        let (back, used) = Value::decode(&bytes).unwrap();
        assert_eq!(back, v);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn min_width_encoding() {
        assert_eq!(Value::Int(100).encode().unwrap()[0], TAG_INT_BASE);
        assert_eq!(Value::Int(30000).encode().unwrap()[0], TAG_INT_BASE + 1);
        assert_eq!(Value::Int(100_000).encode().unwrap()[0], TAG_INT_BASE + 2);
        assert_eq!(Value::Int(i64::MAX).encode().unwrap()[0], TAG_INT_BASE + 3);
    }

    #[test]
    fn int_roundtrip_negative() {
        let v = Value::Int(-42);
        let bytes = v.encode().unwrap();
        let (back, _) = Value::decode(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn intseq_roundtrip() {
        let v = Value::IntSeq(vec![1, 2, 300, -4]);
        let bytes = v.encode().unwrap();
        let (back, used) = Value::decode(&bytes).unwrap();
        assert_eq!(back, v);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn ascii_string_roundtrip() {
        let v = Value::AsciiString("Agent_001".to_string());
        let bytes = v.encode().unwrap();
        let (back, _) = Value::decode(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn iid_value_roundtrip() {
        let v = Value::Iid(Iid::parse("2.3.7").unwrap());
        let bytes = v.encode().unwrap();
        let (back, _) = Value::decode(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn auto_detect_int_dotted_timestamp() {
        assert!(matches!(
            Value::from_untyped(Untyped::Str("2.3.7".into())).unwrap(),
            Value::Iid(_)
        ));
        assert!(matches!(
            Value::from_untyped(Untyped::Str("42".into())).unwrap(),
            Value::Int(42)
        ));
        assert!(matches!(
            Value::from_untyped(Untyped::Str("0:0:1:30:0".into())).unwrap(),
            Value::Timestamp(Timestamp::Elapsed(_))
        ));
    }

    #[test]
    fn value_list_tolerant_decode() {
        let mut buf = vec![2u8];
        buf.extend(Value::Byte(1).encode().unwrap());
        buf.push(0xFF); // invalid discriminator
        let (items, rest) = Value::decode_list(&buf).unwrap();
        assert_eq!(items, vec![Value::Byte(1)]);
        assert!(rest.is_empty());
    }
}
