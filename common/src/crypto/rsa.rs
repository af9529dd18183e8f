//! Functionality related to RSA.

use crate::wire::Digest;
use alloc::vec::Vec;
use zeroize::ZeroizeOnDrop;

/// Overhead for PKCS#1 v1.5 signature padding of undigested messages.
pub const PKCS1_UNDIGESTED_SIGNATURE_PADDING_OVERHEAD: usize = 11;

/// Overhead for PKCS#1 v1.5 encryption padding.
pub const PKCS1_ENCRYPT_PADDING_OVERHEAD: usize = 11;

/// Overhead for OAEP encryption padding with the default SHA-1 digests:
/// `2 * digest_len + 2`.
pub const OAEP_PADDING_OVERHEAD: usize = 42;

/// Minimum PSS salt size in bytes.
pub const PSS_MIN_SALT_SIZE: usize = 8;

/// Default key size for generated RSA keys, in bits.
pub const DEFAULT_KEY_SIZE: u32 = 2048;

/// Default public exponent for generated RSA keys.
pub const DEFAULT_EXPONENT: u64 = 65537;

/// An RSA key, held as a DER-encoded PKCS#1 `RSAPrivateKey`.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

/// RSA signature mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode {
    NoPadding,
    Pkcs1_1_5Padding(Digest),
    PssPadding(Digest),
}

/// RSA encryption/decryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMode {
    OaepPadding,
    Pkcs1_1_5Padding,
}
