use thiserror::Error;

/// Errors raised while encoding or decoding a PDU or one of its fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid protocol tag")]
    InvalidTag,

    #[error("unexpected end of buffer: needed {needed}, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid IID shape byte: {0:#010b}")]
    InvalidIidShape(u8),

    #[error("IID structure/object out of range: {0}.{1}")]
    IidStructureObjectRange(u16, u16),

    #[error("IID index2 ({0}) must be >= index1 ({1})")]
    IidIndexOrder(u16, u16),

    #[error("IID must have 2 to 4 dot-separated parts: {0}")]
    IidShape(String),

    #[error("invalid value discriminator byte: {0:#010b}")]
    InvalidValueTag(u8),

    #[error("string is not valid ASCII/extended-ASCII")]
    InvalidStringEncoding,

    #[error("value could not be auto-detected from input: {0}")]
    AutoDetectFailed(String),

    #[error("integer sequence has mixed or unsupported element widths")]
    HeterogeneousSequence,
}

/// Errors raised while framing (encrypting/decrypting) a datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramerError {
    #[error("ciphertext length {0} is not a multiple of the block size")]
    BadBlockLength(usize),

    #[error("PKCS7 unpadding failed")]
    BadPadding,

    #[error("datagram is shorter than one block")]
    TooShort,
}

/// Errors raised by the MIB while servicing a GET/SET/SAMPLE.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MibError {
    #[error("unknown or invalid IID: {0}")]
    UnknownIid(String),

    #[error("value unsupported for IID {0}")]
    UnsupportedValue(String),

    #[error("V-list length ({v_len}) disagrees with IID-list length ({iid_len})")]
    ListLengthMismatch { iid_len: usize, v_len: usize },

    #[error("no sensor at index {0}")]
    NoSuchSensor(String),
}
