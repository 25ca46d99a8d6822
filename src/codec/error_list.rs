//! Error codes and the flat E-list of a PDU.

use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    None = 0,
    DecodeError = 1,
    TagError = 2,
    UnknownType = 3,
    DuplicateMessage = 4,
    InvalidIid = 5,
    UnknownValueType = 6,
    UnsupportedValue = 7,
    ListLengthMismatch = 8,
}

impl ErrorCode {
    pub fn from_u8(b: u8) -> Self {
        match b {
            0 => ErrorCode::None,
            1 => ErrorCode::DecodeError,
            2 => ErrorCode::TagError,
            3 => ErrorCode::UnknownType,
            4 => ErrorCode::DuplicateMessage,
            5 => ErrorCode::InvalidIid,
            6 => ErrorCode::UnknownValueType,
            7 => ErrorCode::UnsupportedValue,
            _ => ErrorCode::ListLengthMismatch,
        }
    }

    pub fn encode_list(codes: &[ErrorCode]) -> Result<Vec<u8>, CodecError> {
        if codes.len() > 255 {
            return Err(CodecError::AutoDetectFailed(format!("E-list of {} exceeds 255", codes.len())));
        }
        let mut out = vec![codes.len() as u8];
        out.extend(codes.iter().map(|c| *c as u8));
        Ok(out)
    }

    /// Decodes a `count:u8` + 1-byte-per-code list. Every byte value is a
    /// valid code (0-8 map onto known variants, anything else maps to
    /// [`ErrorCode::ListLengthMismatch`] per [`ErrorCode::from_u8`]'s
    /// catch-all), but a truncated count is still a malformed list: this
    /// decodes as many complete codes as are actually present and treats
    /// the rest as absent, like the other list decoders.
    pub fn decode_list(buf: &[u8]) -> Result<(Vec<ErrorCode>, &[u8]), CodecError> {
        if buf.is_empty() {
            return Ok((Vec::new(), buf));
        }
        let count = buf[0] as usize;
        if buf.len() < 1 + count {
            let codes = buf[1..].iter().map(|&b| ErrorCode::from_u8(b)).collect();
            return Ok((codes, &[]));
        }
        let codes = buf[1..1 + count].iter().map(|&b| ErrorCode::from_u8(b)).collect();
        Ok((codes, &buf[1 + count..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let codes = vec![ErrorCode::None, ErrorCode::InvalidIid, ErrorCode::TagError];
        let bytes = ErrorCode::encode_list(&codes).unwrap();
        let (back, rest) = ErrorCode::decode_list(&bytes).unwrap();
        assert_eq!(back, codes);
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_count_decodes_what_is_present() {
        let buf = vec![5u8, ErrorCode::TagError as u8, ErrorCode::InvalidIid as u8];
        let (codes, rest) = ErrorCode::decode_list(&buf).unwrap();
        assert_eq!(codes, vec![ErrorCode::TagError, ErrorCode::InvalidIid]);
        assert!(rest.is_empty());
    }
}
