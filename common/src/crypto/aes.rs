//! Functionality related to AES encryption.

use crate::wire::KeySizeInBits;
use crate::{km_err, try_to_vec, Error};
use alloc::vec::Vec;

/// Size of an AES block in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Size of an AES-OCB nonce in bytes.
pub const OCB_NONCE_SIZE: usize = 12;

/// Largest authentication tag AES-OCB produces, in bytes.
pub const OCB_MAX_TAG_SIZE: usize = 16;

/// Largest chunk length accepted for AES-OCB operations.
pub const MAX_CHUNK_LENGTH: u32 = 64 * 1024;

/// AES variant.
#[derive(Clone, Copy)]
pub enum Variant {
    Aes128,
    Aes192,
    Aes256,
}

impl Variant {
    /// Determine the variant from a key size.
    pub fn new(key_size: KeySizeInBits) -> Result<Self, Error> {
        match key_size.0 {
            128 => Ok(Variant::Aes128),
            192 => Ok(Variant::Aes192),
            256 => Ok(Variant::Aes256),
            sz => Err(km_err!(UnsupportedKeySize, "AES keys must be 128/192/256 bits not {}", sz)),
        }
    }
}

/// An AES-128, AES-192 or AES-256 key.
#[derive(Clone, PartialEq, Eq)]
pub enum Key {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl Key {
    /// Create a new [`Key`] from raw data, which must be 16, 24 or 32 bytes
    /// long.
    pub fn new(data: Vec<u8>) -> Result<Self, Error> {
        match data.len() {
            16 => Ok(Key::Aes128(data.try_into().unwrap())), // safe: len checked
            24 => Ok(Key::Aes192(data.try_into().unwrap())), // safe: len checked
            32 => Ok(Key::Aes256(data.try_into().unwrap())), // safe: len checked
            l => Err(km_err!(UnsupportedKeySize, "AES keys must be 16, 24 or 32 bytes not {}", l)),
        }
    }

    /// Create a new [`Key`] from raw data, which must be 16, 24 or 32 bytes
    /// long.
    pub fn new_from(data: &[u8]) -> Result<Self, Error> {
        Key::new(try_to_vec(data)?)
    }

    /// The raw key bytes.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Key::Aes128(k) => &k[..],
            Key::Aes192(k) => &k[..],
            Key::Aes256(k) => &k[..],
        }
    }

    /// Indicate the size of the key in bits.
    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits(match self {
            Key::Aes128(_) => 128,
            Key::Aes192(_) => 192,
            Key::Aes256(_) => 256,
        })
    }
}

/// Mode of a (non-OCB) AES cipher operation.  Associated value is the IV.
#[derive(Clone, Copy, Debug)]
pub enum CipherMode {
    EcbNoPadding,
    EcbPkcs7Padding,
    CbcNoPadding { nonce: [u8; BLOCK_SIZE] },
    CbcPkcs7Padding { nonce: [u8; BLOCK_SIZE] },
    Cfb { nonce: [u8; BLOCK_SIZE] },
    Ofb { nonce: [u8; BLOCK_SIZE] },
}
