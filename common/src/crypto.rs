//! Abstractions and related types for accessing cryptographic primitives and
//! related functionality.

use crate::wire::{Algorithm, KeySizeInBits};
use crate::Error;
use alloc::vec::Vec;

pub mod aes;
pub mod ec;
pub mod hmac;
pub mod rsa;

mod traits;
pub use traits::*;

/// Milliseconds since the Unix epoch.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MillisecondsSinceEpoch(pub u64);

/// Direction of a symmetric cipher operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymmetricOperation {
    Encrypt,
    Decrypt,
}

/// Plaintext key material, typed by algorithm.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Rsa(rsa::Key),
    Ec(ec::Key),
    Aes(aes::Key),
    Hmac(hmac::Key),
}

impl KeyMaterial {
    /// The algorithm this key is for.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyMaterial::Rsa(_) => Algorithm::Rsa,
            KeyMaterial::Ec(_) => Algorithm::Ec,
            KeyMaterial::Aes(_) => Algorithm::Aes,
            KeyMaterial::Hmac(_) => Algorithm::Hmac,
        }
    }

    /// The raw secret bytes, as sealed into a key blob: a DER-encoded
    /// private key for the asymmetric algorithms, the key bytes themselves
    /// for the symmetric ones.
    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            KeyMaterial::Rsa(key) => &key.0,
            KeyMaterial::Ec(key) => &key.der,
            KeyMaterial::Aes(key) => key.bytes(),
            KeyMaterial::Hmac(key) => &key.0,
        }
    }

    /// Rebuild key material from raw blob contents, given the algorithm (and
    /// key size, which determines the curve for EC keys) recovered from the
    /// blob's authorization sets.
    pub fn from_raw(
        algorithm: Algorithm,
        key_size: KeySizeInBits,
        data: Vec<u8>,
    ) -> Result<Self, Error> {
        Ok(match algorithm {
            Algorithm::Rsa => KeyMaterial::Rsa(rsa::Key(data)),
            Algorithm::Ec => {
                let curve = ec::Curve::from_key_size(key_size)?;
                KeyMaterial::Ec(ec::Key { curve, der: data })
            }
            Algorithm::Aes => KeyMaterial::Aes(aes::Key::new(data)?),
            Algorithm::Hmac => KeyMaterial::Hmac(hmac::Key(data)),
            Algorithm::Dsa => {
                return Err(crate::km_err!(UnsupportedAlgorithm, "no DSA key support"))
            }
        })
    }
}
