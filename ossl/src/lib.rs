//! Implementations of [`dkm_common::crypto`] traits based on OpenSSL.

use dkm_wire::{Digest, ErrorCode};
use openssl::hash::MessageDigest;

pub mod aes;
pub mod clock;
pub mod ec;
pub mod eq;
pub mod hmac;
pub mod rng;
pub mod rsa;

/// Map an OpenSSL `ErrorStack` into an [`ErrorCode`] value.  No per-reason
/// mapping is attempted; provider-specific reasons must not leak out of the
/// module.
pub fn map_openssl_errstack(_errs: &openssl::error::ErrorStack) -> ErrorCode {
    ErrorCode::UnknownError
}

/// Macro to auto-generate error mapping around invocations of `openssl`
/// methods.  An invocation like:
///
/// ```ignore
/// let x = ossl!(y.func(a, b))?;
/// ```
///
/// will map to:
///
/// ```ignore
/// let x = y.func(a, b).map_err(openssl_err!("failed to perform: y.func(a, b)"))?;
/// ```
#[macro_export]
macro_rules! ossl {
    { $e:expr } => {
        $e.map_err($crate::openssl_err!(concat!("failed to perform: ", stringify!($e))))
    }
}

/// Macro to emit a closure that builds a [`dkm_common::Error`] instance from
/// an openssl `ErrorStack` together with a format-like message.
#[macro_export]
macro_rules! openssl_err {
    { $($arg:tt)+ } => {
        |e| dkm_common::Error::Km(
            $crate::map_openssl_errstack(&e),
            format!("{}:{}: {}: {:?}", file!(), line!(), format_args!($($arg)+), e)
        )
    };
}

/// Translate a [`Digest`] into an OpenSSL [`MessageDigest`].
pub(crate) fn digest_into_openssl(digest: Digest) -> Option<MessageDigest> {
    match digest {
        Digest::None => None,
        Digest::Md5 => Some(MessageDigest::md5()),
        Digest::Sha1 => Some(MessageDigest::sha1()),
        Digest::Sha224 => Some(MessageDigest::sha224()),
        Digest::Sha256 => Some(MessageDigest::sha256()),
        Digest::Sha384 => Some(MessageDigest::sha384()),
        Digest::Sha512 => Some(MessageDigest::sha512()),
    }
}
