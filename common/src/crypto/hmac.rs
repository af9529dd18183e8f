//! Functionality related to HMAC.

use crate::wire::KeySizeInBits;
use crate::{km_err, Error};
use alloc::vec::Vec;
use zeroize::ZeroizeOnDrop;

/// An HMAC key.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

impl Key {
    /// Indicate the size of the key in bits.
    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits((self.0.len() * 8) as u32)
    }
}

/// Check whether a key size is a valid HMAC key size: byte-granular, with
/// sane bounds.
pub fn valid_key_size(key_size: KeySizeInBits) -> Result<(), Error> {
    if key_size.0 % 8 != 0 || key_size.0 < 8 || key_size.0 > 1024 {
        return Err(km_err!(UnsupportedKeySize, "HMAC key size {} invalid", key_size.0));
    }
    Ok(())
}
