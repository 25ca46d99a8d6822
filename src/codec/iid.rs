//! Instance identifiers: `S.O[.I1[.I2]]`, 1-5 bytes on the wire.

use crate::error::CodecError;
use std::fmt;

const TAG_2PART: u8 = 0b0100_0000;
const TAG_3PART: u8 = 0b0100_0001;
const TAG_4PART: u8 = 0b0100_0011;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iid {
    pub structure: u8,
    pub object: u8,
    pub index1: Option<u16>,
    pub index2: Option<u16>,
}

impl Iid {
    pub fn new2(structure: u8, object: u8) -> Self {
        Iid { structure, object, index1: None, index2: None }
    }

    pub fn new3(structure: u8, object: u8, index1: u16) -> Self {
        Iid { structure, object, index1: Some(index1), index2: None }
    }

    pub fn new4(structure: u8, object: u8, index1: u16, index2: u16) -> Self {
        Iid { structure, object, index1: Some(index1), index2: Some(index2) }
    }

    /// Parses a dotted string like `"2.3.7"` into an `Iid`.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(CodecError::IidShape(s.to_string()));
        }
        let nums: Result<Vec<u32>, _> = parts.iter().map(|p| p.parse::<u32>()).collect();
        let nums = nums.map_err(|_| CodecError::IidShape(s.to_string()))?;
        let structure = nums[0];
        let object = nums[1];
        if !(1..=255).contains(&structure) || !(1..=255).contains(&object) {
            return Err(CodecError::IidStructureObjectRange(structure as u16, object as u16));
        }
        let index1 = nums.get(2).copied();
        let index2 = nums.get(3).copied();
        if let Some(i1) = index1 {
            if i1 > 65535 {
                return Err(CodecError::IidShape(s.to_string()));
            }
        }
        if let (Some(i1), Some(i2)) = (index1, index2) {
            if i2 > 65535 {
                return Err(CodecError::IidShape(s.to_string()));
            }
            if i2 < i1 {
                return Err(CodecError::IidIndexOrder(i2 as u16, i1 as u16));
            }
        }
        Ok(Iid {
            structure: structure as u8,
            object: object as u8,
            index1: index1.map(|v| v as u16),
            index2: index2.map(|v| v as u16),
        })
    }

    fn tag(&self) -> u8 {
        match (self.index1, self.index2) {
            (None, None) => TAG_2PART,
            (Some(_), None) => TAG_3PART,
            (Some(_), Some(_)) => TAG_4PART,
            (None, Some(_)) => unreachable!("index2 without index1"),
        }
    }

    pub fn encoded_len(&self) -> usize {
        2 + self.index1.map_or(0, |_| 2) + self.index2.map_or(0, |_| 2)
    }

    /// Encodes tag byte + body (`S`, `O`, then 0/1/2 big-endian `u16` indices).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.encoded_len());
        out.push(self.tag());
        out.push(self.structure);
        out.push(self.object);
        if let Some(i1) = self.index1 {
            out.extend_from_slice(&i1.to_be_bytes());
        }
        if let Some(i2) = self.index2 {
            out.extend_from_slice(&i2.to_be_bytes());
        }
        out
    }

    /// Decodes a tagged IID, returning the value and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        if buf.is_empty() {
            return Err(CodecError::Truncated { needed: 1, available: 0 });
        }
        let tag = buf[0];
        if tag & 0b1111_1100 != 0b0100_0000 {
            return Err(CodecError::InvalidIidShape(tag));
        }
        let n_indices = match tag & 0b0000_0011 {
            0b00 => 0,
            0b01 => 1,
            0b11 => 2,
            _ => return Err(CodecError::InvalidIidShape(tag)),
        };
        let needed = 1 + 2 + 2 * n_indices;
        if buf.len() < needed {
            return Err(CodecError::Truncated { needed, available: buf.len() });
        }
        let structure = buf[1];
        let object = buf[2];
        let index1 = if n_indices >= 1 {
            Some(u16::from_be_bytes([buf[3], buf[4]]))
        } else {
            None
        };
        let index2 = if n_indices >= 2 {
            Some(u16::from_be_bytes([buf[5], buf[6]]))
        } else {
            None
        };
        Ok((Iid { structure, object, index1, index2 }, needed))
    }

    /// Encodes a `count:u8` + concatenated-IIDs list. Strict: the first
    /// invalid IID aborts the whole call.
    pub fn encode_list(iids: &[Iid]) -> Result<Vec<u8>, CodecError> {
        if iids.len() > 255 {
            return Err(CodecError::IidShape(format!("list of {} exceeds 255", iids.len())));
        }
        let mut out = vec![iids.len() as u8];
        for iid in iids {
            out.extend(iid.encode());
        }
        Ok(out)
    }

    /// Decodes a `count:u8` + concatenated-IIDs list, tolerantly: the first
    /// malformed element stops the list (and consumes the rest of `buf`,
    /// since per-element framing gives no way to resynchronize).
    pub fn decode_list(buf: &[u8]) -> Result<(Vec<Iid>, &[u8]), CodecError> {
        if buf.is_empty() {
            // A prior list's corruption already discarded everything after
            // it; there is no count byte left to read, so recover as empty.
            return Ok((Vec::new(), buf));
        }
        let count = buf[0];
        let mut rest = &buf[1..];
        let mut items = Vec::new();
        for _ in 0..count {
            match Iid::decode(rest) {
                Ok((iid, used)) => {
                    items.push(iid);
                    rest = &rest[used..];
                }
                Err(_) => return Ok((items, &[])),
            }
        }
        Ok((items, rest))
    }
}

impl fmt::Display for Iid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.structure, self.object)?;
        if let Some(i1) = self.index1 {
            write!(f, ".{}", i1)?;
        }
        if let Some(i2) = self.index2 {
            write!(f, ".{}", i2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_2part() {
        let iid = Iid::parse("1.4").unwrap();
        let bytes = iid.encode();
        assert_eq!(bytes, vec![TAG_2PART, 1, 4]);
        let (back, used) = Iid::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(back, iid);
    }

    #[test]
    fn roundtrip_3part() {
        let iid = Iid::parse("2.3.7").unwrap();
        let bytes = iid.encode();
        assert_eq!(bytes, vec![TAG_3PART, 2, 3, 0, 7]);
        let (back, _) = Iid::decode(&bytes).unwrap();
        assert_eq!(back, iid);
    }

    #[test]
    fn roundtrip_4part() {
        let iid = Iid::parse("2.9.1.5").unwrap();
        let bytes = iid.encode();
        assert_eq!(bytes, vec![TAG_4PART, 2, 9, 0, 1, 0, 5]);
        let (back, _) = Iid::decode(&bytes).unwrap();
        assert_eq!(back, iid);
    }

    #[test]
    fn rejects_index2_below_index1() {
        assert!(Iid::parse("2.9.5.1").is_err());
    }

    #[test]
    fn rejects_bad_shape_byte() {
        let buf = [0b0100_0010, 1, 2];
        assert!(matches!(Iid::decode(&buf), Err(CodecError::InvalidIidShape(_))));
    }

    #[test]
    fn tolerant_list_stops_at_first_bad_element() {
        let mut buf = vec![2u8];
        buf.extend(Iid::new2(1, 1).encode());
        buf.push(0b0100_0010); // malformed second element
        let (items, rest) = Iid::decode_list(&buf).unwrap();
        assert_eq!(items, vec![Iid::new2(1, 1)]);
        assert!(rest.is_empty());
    }

    #[test]
    fn list_roundtrip() {
        let iids = vec![Iid::new2(1, 1), Iid::new3(2, 3, 7), Iid::new4(2, 9, 1, 5)];
        let bytes = Iid::encode_list(&iids).unwrap();
        let (back, rest) = Iid::decode_list(&bytes).unwrap();
        assert_eq!(back, iids);
        assert!(rest.is_empty());
    }
}
