//! HMAC operations.

use super::{Operation, OperationFactory};
use crate::keys::Key;
use alloc::boxed::Box;
use alloc::vec::Vec;
use dkm_common::crypto::{self, AccumulatingOperation, KeyMaterial};
use dkm_common::{get_opt_tag_value, get_tag_value, km_err, tag, Error};
use dkm_wire::{AuthorizationSet, Digest, ErrorCode, Purpose};

/// Factory for HMAC sign and verify operations.
pub(crate) struct HmacFactory {
    pub(crate) purpose: Purpose,
}

impl OperationFactory for HmacFactory {
    fn supported_digests(&self) -> &'static [Digest] {
        &[Digest::Sha1, Digest::Sha224, Digest::Sha256, Digest::Sha384, Digest::Sha512]
    }

    fn create_operation(
        &self,
        imp: &mut crypto::Implementation<'_>,
        key: &Key,
        params: &AuthorizationSet,
        _out_params: &mut AuthorizationSet,
    ) -> Result<Box<dyn Operation>, Error> {
        let hmac_key = match &key.material {
            KeyMaterial::Hmac(k) => k.clone(),
            _ => return Err(km_err!(IncompatibleAlgorithm, "not an HMAC key")),
        };
        // The digest is a property of the key, not of the individual
        // operation.
        let digest =
            get_tag_value!(&key.characteristics, Digest, ErrorCode::UnsupportedDigest)?;
        if !self.supported_digests().contains(&digest) {
            return Err(km_err!(UnsupportedDigest, "HMAC digest {:?} not supported", digest));
        }
        let digest_len = tag::digest_len(digest)?;

        Ok(match self.purpose {
            Purpose::Sign => {
                let mac_length = get_mac_length(key, params)?;
                Box::new(HmacSignOperation {
                    inner: imp.hmac.begin(hmac_key, digest)?,
                    mac_length,
                    digest_len,
                })
            }
            _ => Box::new(HmacVerifyOperation {
                inner: imp.hmac.begin(hmac_key, digest)?,
                digest_len,
            }),
        })
    }
}

/// Resolve the MAC length in bytes for a signing operation: required in the
/// `begin` parameters, and consistent with the key's own value when the key
/// carries one.  The upper bound (the digest length) is checked at `finish`.
fn get_mac_length(key: &Key, params: &AuthorizationSet) -> Result<usize, Error> {
    let mac_length = get_tag_value!(params, MacLength, ErrorCode::UnsupportedMacLength)?;
    if let Some(key_value) = get_opt_tag_value!(&key.characteristics, MacLength)? {
        if *key_value != mac_length {
            return Err(km_err!(
                UnsupportedMacLength,
                "MAC length {} not authorized by key",
                mac_length
            ));
        }
    }
    if mac_length == 0 {
        return Err(km_err!(UnsupportedMacLength, "zero MAC length"));
    }
    Ok(mac_length as usize)
}

struct HmacSignOperation {
    inner: Box<dyn AccumulatingOperation>,
    mac_length: usize,
    digest_len: usize,
}

impl Operation for HmacSignOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        self.inner.update(input)?;
        Ok((input.len(), Vec::new()))
    }

    fn finish(
        self: Box<Self>,
        _imp: &crypto::Implementation<'_>,
        _signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let this = *self;
        if this.mac_length > this.digest_len {
            return Err(km_err!(
                UnsupportedMacLength,
                "MAC length {} exceeds digest length {}",
                this.mac_length,
                this.digest_len
            ));
        }
        let mut mac = this.inner.finish()?;
        mac.truncate(this.mac_length);
        Ok(mac)
    }
}

struct HmacVerifyOperation {
    inner: Box<dyn AccumulatingOperation>,
    digest_len: usize,
}

impl Operation for HmacVerifyOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        self.inner.update(input)?;
        Ok((input.len(), Vec::new()))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let this = *self;
        let signature = match signature {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Err(km_err!(VerificationFailed, "no signature provided")),
        };
        if signature.len() > this.digest_len {
            return Err(km_err!(
                InvalidInputLength,
                "{} byte signature exceeds digest length {}",
                signature.len(),
                this.digest_len
            ));
        }
        let mac = this.inner.finish()?;
        if imp.compare.eq(&mac[..signature.len()], signature) {
            Ok(Vec::new())
        } else {
            Err(km_err!(VerificationFailed, "HMAC verify failed"))
        }
    }
}
