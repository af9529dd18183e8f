//! RSA operations.  All input is accumulated through `update`; the
//! cryptographic work happens at `finish`.

use super::{resolve_digest, resolve_padding, Operation, OperationFactory};
use crate::keys::Key;
use alloc::boxed::Box;
use alloc::vec::Vec;
use dkm_common::crypto::{self, rsa, KeyMaterial};
use dkm_common::{get_tag_value, km_err, tag, Error, FallibleAllocExt};
use dkm_wire::{AuthorizationSet, Digest, ErrorCode, PaddingMode, Purpose};

/// Factory for RSA sign and verify operations.
pub(crate) struct RsaSignVerifyFactory {
    pub(crate) purpose: Purpose,
}

impl OperationFactory for RsaSignVerifyFactory {
    fn supported_digests(&self) -> &'static [Digest] {
        &[Digest::None, Digest::Sha256]
    }
    fn supported_paddings(&self) -> &'static [PaddingMode] {
        &[PaddingMode::None, PaddingMode::RsaPkcs115Sign, PaddingMode::RsaPss]
    }

    fn create_operation(
        &self,
        _imp: &mut crypto::Implementation<'_>,
        key: &Key,
        params: &AuthorizationSet,
        _out_params: &mut AuthorizationSet,
    ) -> Result<Box<dyn Operation>, Error> {
        let rsa_key = rsa_key(key)?;
        let digest = resolve_digest(self, key, params)?;
        let padding = resolve_padding(self, key, params)?;
        let mode = match (padding, digest) {
            (PaddingMode::None, Digest::None) => rsa::SignMode::NoPadding,
            (PaddingMode::None, d) => {
                return Err(km_err!(
                    IncompatibleDigest,
                    "digest {:?} requires a padding mode",
                    d
                ));
            }
            (PaddingMode::RsaPkcs115Sign, d) => rsa::SignMode::Pkcs1_1_5Padding(d),
            (PaddingMode::RsaPss, Digest::None) => {
                return Err(km_err!(UnsupportedDigest, "PSS requires a digest"));
            }
            (PaddingMode::RsaPss, d) => rsa::SignMode::PssPadding(d),
            (p, _) => return Err(km_err!(UnsupportedPaddingMode, "padding {:?} for sign", p)),
        };
        let key_size_bits =
            get_tag_value!(&key.characteristics, KeySize, ErrorCode::UnsupportedKeySize)?.0;

        Ok(match self.purpose {
            Purpose::Sign => Box::new(RsaSignOperation {
                key: rsa_key,
                mode,
                key_size_bits,
                data: Vec::new(),
            }),
            _ => Box::new(RsaVerifyOperation {
                key: rsa_key,
                mode,
                key_size_bits,
                data: Vec::new(),
            }),
        })
    }
}

/// Factory for RSA encrypt and decrypt operations.
pub(crate) struct RsaCryptFactory {
    pub(crate) purpose: Purpose,
}

impl OperationFactory for RsaCryptFactory {
    fn supported_paddings(&self) -> &'static [PaddingMode] {
        &[PaddingMode::RsaOaep, PaddingMode::RsaPkcs115Encrypt]
    }

    fn create_operation(
        &self,
        _imp: &mut crypto::Implementation<'_>,
        key: &Key,
        params: &AuthorizationSet,
        _out_params: &mut AuthorizationSet,
    ) -> Result<Box<dyn Operation>, Error> {
        let rsa_key = rsa_key(key)?;
        let padding = resolve_padding(self, key, params)?;
        let mode = match padding {
            PaddingMode::RsaOaep => rsa::CryptMode::OaepPadding,
            PaddingMode::RsaPkcs115Encrypt => rsa::CryptMode::Pkcs1_1_5Padding,
            p => return Err(km_err!(UnsupportedPaddingMode, "padding {:?} for crypt", p)),
        };
        let key_size_bits =
            get_tag_value!(&key.characteristics, KeySize, ErrorCode::UnsupportedKeySize)?.0;

        Ok(Box::new(RsaCryptOperation {
            key: rsa_key,
            mode,
            purpose: self.purpose,
            key_size_bits,
            data: Vec::new(),
        }))
    }
}

fn rsa_key(key: &Key) -> Result<rsa::Key, Error> {
    match &key.material {
        KeyMaterial::Rsa(k) => Ok(k.clone()),
        _ => Err(km_err!(IncompatibleAlgorithm, "not an RSA key")),
    }
}

struct RsaSignOperation {
    key: rsa::Key,
    mode: rsa::SignMode,
    key_size_bits: u32,
    data: Vec<u8>,
}

impl Operation for RsaSignOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        self.data.try_extend_from_slice(input)?;
        Ok((input.len(), Vec::new()))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        _signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let modulus_len = (self.key_size_bits / 8) as usize;
        match self.mode {
            rsa::SignMode::NoPadding => {
                if self.data.len() != modulus_len {
                    return Err(km_err!(
                        InvalidInputLength,
                        "raw sign needs {} bytes, got {}",
                        modulus_len,
                        self.data.len()
                    ));
                }
            }
            rsa::SignMode::Pkcs1_1_5Padding(Digest::None) => {
                if self.data.len() + rsa::PKCS1_UNDIGESTED_SIGNATURE_PADDING_OVERHEAD
                    > modulus_len
                {
                    return Err(km_err!(
                        InvalidInputLength,
                        "{} bytes too long for undigested PKCS1 with {} byte modulus",
                        self.data.len(),
                        modulus_len
                    ));
                }
            }
            rsa::SignMode::PssPadding(digest) => check_pss_headroom(self.key_size_bits, digest)?,
            rsa::SignMode::Pkcs1_1_5Padding(_) => {}
        }
        imp.rsa.sign(&self.key, self.mode, &self.data)
    }
}

struct RsaVerifyOperation {
    key: rsa::Key,
    mode: rsa::SignMode,
    key_size_bits: u32,
    data: Vec<u8>,
}

impl Operation for RsaVerifyOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        self.data.try_extend_from_slice(input)?;
        Ok((input.len(), Vec::new()))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let signature =
            signature.ok_or_else(|| km_err!(VerificationFailed, "no signature provided"))?;
        let modulus_len = (self.key_size_bits / 8) as usize;
        match self.mode {
            rsa::SignMode::NoPadding => {
                if self.data.len() != modulus_len {
                    return Err(km_err!(
                        InvalidInputLength,
                        "raw verify needs {} bytes, got {}",
                        modulus_len,
                        self.data.len()
                    ));
                }
                if signature.len() != self.data.len() {
                    return Err(km_err!(VerificationFailed, "signature length mismatch"));
                }
            }
            rsa::SignMode::PssPadding(digest) => check_pss_headroom(self.key_size_bits, digest)?,
            rsa::SignMode::Pkcs1_1_5Padding(_) => {}
        }
        imp.rsa.verify(&self.key, self.mode, &self.data, signature)?;
        Ok(Vec::new())
    }
}

/// PSS needs room in the modulus for the digest plus salt: the key must have
/// at least ten bytes of headroom over the digest.
fn check_pss_headroom(key_size_bits: u32, digest: Digest) -> Result<(), Error> {
    let digest_bits = tag::digest_len(digest)? * 8;
    if (key_size_bits as usize) < digest_bits + 10 * 8 {
        return Err(km_err!(
            IncompatibleDigest,
            "{} bit modulus too small for PSS with {} bit digest",
            key_size_bits,
            digest_bits
        ));
    }
    Ok(())
}

struct RsaCryptOperation {
    key: rsa::Key,
    mode: rsa::CryptMode,
    purpose: Purpose,
    key_size_bits: u32,
    data: Vec<u8>,
}

impl Operation for RsaCryptOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        self.data.try_extend_from_slice(input)?;
        Ok((input.len(), Vec::new()))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        _signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let modulus_len = (self.key_size_bits / 8) as usize;
        match self.purpose {
            Purpose::Encrypt => {
                let overhead = match self.mode {
                    rsa::CryptMode::OaepPadding => rsa::OAEP_PADDING_OVERHEAD,
                    rsa::CryptMode::Pkcs1_1_5Padding => rsa::PKCS1_ENCRYPT_PADDING_OVERHEAD,
                };
                if self.data.len() + overhead > modulus_len {
                    return Err(km_err!(
                        InvalidInputLength,
                        "{} byte plaintext too long for {:?} with {} byte modulus",
                        self.data.len(),
                        self.mode,
                        modulus_len
                    ));
                }
                imp.rsa.encrypt(&self.key, self.mode, &self.data)
            }
            _ => imp.rsa.decrypt(&self.key, self.mode, &self.data),
        }
    }
}
