//! Datagram framing: AES-128-ECB with PKCS7 padding over every PDU.
//!
//! ECB and the lack of a MAC are known weaknesses kept intentionally —
//! see the open question in `DESIGN.md`.

use aes::Aes128;
use ecb::cipher::block_padding::Pkcs7;
use ecb::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use sha2::{Digest, Sha256};

use crate::error::FramerError;

type Encryptor = ecb::Encryptor<Aes128>;
type Decryptor = ecb::Decryptor<Aes128>;

const BLOCK_SIZE: usize = 16;

/// Derives the effective 16-byte key from a shared secret: the first 16
/// bytes of SHA-256(secret).
pub fn derive_key(shared_secret: &str) -> [u8; 16] {
    let digest = Sha256::digest(shared_secret.as_bytes());
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// Pads `pdu_bytes` to a 16-byte boundary with PKCS7 and encrypts with
/// AES-128-ECB under `key`.
pub fn frame(pdu_bytes: &[u8], key: &[u8; 16]) -> Vec<u8> {
    let encryptor = Encryptor::new(key.into());
    encryptor.encrypt_padded_vec_mut::<Pkcs7>(pdu_bytes)
}

/// Decrypts and unpads a datagram. Errors are fatal for that datagram
/// (error code 1) and never propagate further.
pub fn unframe(datagram: &[u8], key: &[u8; 16]) -> Result<Vec<u8>, FramerError> {
    if datagram.is_empty() {
        return Err(FramerError::TooShort);
    }
    if datagram.len() % BLOCK_SIZE != 0 {
        return Err(FramerError::BadBlockLength(datagram.len()));
    }
    let decryptor = Decryptor::new(key.into());
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(datagram)
        .map_err(|_| FramerError::BadPadding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = derive_key("hunter2");
        let pdu = b"LSNMPv2\0hello world, this is a PDU body".to_vec();
        let framed = frame(&pdu, &key);
        assert_eq!(framed.len() % BLOCK_SIZE, 0);
        let back = unframe(&framed, &key).unwrap();
        assert_eq!(back, pdu);
    }

    #[test]
    fn wrong_key_fails_to_unpad() {
        let key_a = derive_key("hunter2");
        let key_b = derive_key("different-secret");
        let framed = frame(b"some pdu bytes here", &key_a);
        assert!(unframe(&framed, &key_b).is_err());
    }

    #[test]
    fn bad_block_length_is_rejected() {
        let key = derive_key("hunter2");
        let bad = vec![0u8; 17];
        assert_eq!(unframe(&bad, &key), Err(FramerError::BadBlockLength(17)));
    }

    #[test]
    fn key_derivation_is_16_bytes_of_sha256() {
        let key = derive_key("hunter2");
        let full = Sha256::digest(b"hunter2");
        assert_eq!(&key[..], &full[..16]);
    }
}
