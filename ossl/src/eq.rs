//! Constant-time comparison based on OpenSSL.

use dkm_common::crypto;

/// [`crypto::ConstTimeEq`] implementation based on `CRYPTO_memcmp`.
#[derive(Clone, Default)]
pub struct OsslEq;

impl crypto::ConstTimeEq for OsslEq {
    fn eq(&self, left: &[u8], right: &[u8]) -> bool {
        left.len() == right.len() && openssl::memcmp::eq(left, right)
    }
}
