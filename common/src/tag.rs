//! Helper functionality for working with tags and parameter sets.

use crate::wire::{AuthorizationSet, Digest, KeyParam};
use crate::{km_err, try_to_vec, Error};

/// Macro to retrieve the (single) value of a tag in a collection of
/// `KeyParam`s.  There can be only one.
#[macro_export]
macro_rules! get_tag_value {
    { $params:expr, $variant:ident, $err:expr } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(v.clone());
                }
            }
            match count {
                0 => Err($crate::km_verr!($err, "missing tag {}", stringify!($variant))),
                1 => Ok(result.unwrap()),  /* safe: count=1 => exists */
                _ => Err($crate::km_verr!($err, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to retrieve the value of an optional single-valued tag in a
/// collection of `KeyParam`s.  It may or may not be present, but multiple
/// instances of the tag are assumed to be invalid.
#[macro_export]
macro_rules! get_opt_tag_value {
    { $params:expr, $variant:ident } => {
        {
            let mut result = None;
            let mut count = 0;
            for param in $params {
                if let $crate::wire::KeyParam::$variant(v) = param {
                    count += 1;
                    result = Some(v);
                }
            }
            match count {
                0 => Ok(None),
                1 => Ok(Some(result.unwrap())),  /* safe: count=1 => exists */
                _ => Err($crate::km_err!(InvalidTag, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to retrieve a `bool` tag value, returning `false` if the tag is
/// absent.
#[macro_export]
macro_rules! get_bool_tag_value {
    { $params:expr, $variant:ident } => {
        {
            let mut count = 0;
            for param in $params {
                if let $crate::wire::KeyParam::$variant = param {
                    count += 1;
                }
            }
            match count {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err($crate::km_err!(InvalidTag, "duplicate tag {}", stringify!($variant))),
            }
        }
    }
}

/// Macro to check whether a collection of `KeyParam`s holds a value matching
/// the given value.
#[macro_export]
macro_rules! contains_tag_value {
    { $params:expr, $variant:ident, $value:expr } => {
        {
            let mut found = false;
            for param in $params {
                if let $crate::wire::KeyParam::$variant(v) = param {
                    if *v == $value {
                        found = true;
                    }
                }
            }
            found
        }
    }
}

/// Build the hidden authorizations that bind a key blob to its client:
/// `APPLICATION_ID` and `APPLICATION_DATA` if present in the request
/// parameters, plus the deployment's root of trust.
pub fn hidden(params: &AuthorizationSet, root_of_trust: &[u8]) -> Result<AuthorizationSet, Error> {
    let mut result = AuthorizationSet::new();
    if let Some(app_id) = get_opt_tag_value!(params, ApplicationId)? {
        result.push_back(KeyParam::ApplicationId(try_to_vec(app_id)?))?;
    }
    if let Some(app_data) = get_opt_tag_value!(params, ApplicationData)? {
        result.push_back(KeyParam::ApplicationData(try_to_vec(app_data)?))?;
    }
    result.push_back(KeyParam::RootOfTrust(try_to_vec(root_of_trust)?))?;
    Ok(result)
}

/// Length of a digest's output in bytes.
pub fn digest_len(digest: Digest) -> Result<usize, Error> {
    match digest {
        Digest::Md5 => Ok(16),
        Digest::Sha1 => Ok(20),
        Digest::Sha224 => Ok(28),
        Digest::Sha256 => Ok(32),
        Digest::Sha384 => Ok(48),
        Digest::Sha512 => Ok(64),
        Digest::None => Err(km_err!(UnsupportedDigest, "no digest length for DIGEST_NONE")),
    }
}
