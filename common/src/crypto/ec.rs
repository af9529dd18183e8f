//! Functionality related to elliptic curve keys and signing.

use crate::wire::KeySizeInBits;
use crate::{km_err, Error};
use alloc::vec::Vec;
use zeroize::ZeroizeOnDrop;

/// Default key size for generated EC keys, in bits.
pub const DEFAULT_KEY_SIZE: u32 = 224;

/// Supported NIST curves, addressed by key size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Curve {
    P192,
    P224,
    P256,
    P384,
    P521,
}

impl Curve {
    /// Map a key size onto the curve of that size.
    pub fn from_key_size(key_size: KeySizeInBits) -> Result<Self, Error> {
        match key_size.0 {
            192 => Ok(Curve::P192),
            224 => Ok(Curve::P224),
            256 => Ok(Curve::P256),
            384 => Ok(Curve::P384),
            521 => Ok(Curve::P521),
            sz => Err(km_err!(UnsupportedKeySize, "no curve with {} bit keys", sz)),
        }
    }

    /// The key size for this curve.
    pub fn key_size(&self) -> KeySizeInBits {
        KeySizeInBits(match self {
            Curve::P192 => 192,
            Curve::P224 => 224,
            Curve::P256 => 256,
            Curve::P384 => 384,
            Curve::P521 => 521,
        })
    }

    /// Size of a curve coordinate in bytes.  Undigested signing input beyond
    /// this length is ignored.
    pub fn coord_len(&self) -> usize {
        match self {
            Curve::P192 => 24,
            Curve::P224 => 28,
            Curve::P256 => 32,
            Curve::P384 => 48,
            Curve::P521 => 66,
        }
    }
}

/// An EC key on a known curve, held as a DER-encoded SEC1 `ECPrivateKey`
/// (with the curve parameters included).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key {
    #[zeroize(skip)]
    pub curve: Curve,
    pub der: Vec<u8>,
}
