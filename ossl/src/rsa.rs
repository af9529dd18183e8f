//! RSA implementation based on OpenSSL.

use crate::{digest_into_openssl, openssl_err, ossl};
use dkm_common::crypto::{rsa, KeyMaterial, Rng};
use dkm_common::{crypto, km_err, vec_try, Error};
use dkm_wire::{Digest, KeySizeInBits, RsaExponent};
use openssl::pkey::{PKey, Private};
use openssl::rsa::Padding;
use openssl::sign::RsaPssSaltlen;

/// Smallest allowed public exponent.
const MIN_RSA_EXPONENT: u64 = 3;

/// [`crypto::Rsa`] implementation based on OpenSSL.
pub struct OsslRsa;

fn private_key(key: &rsa::Key) -> Result<openssl::rsa::Rsa<Private>, Error> {
    ossl!(openssl::rsa::Rsa::private_key_from_der(&key.0))
}

fn private_pkey(key: &rsa::Key) -> Result<PKey<Private>, Error> {
    let rsa_key = private_key(key)?;
    ossl!(PKey::from_rsa(rsa_key))
}

impl crypto::Rsa for OsslRsa {
    fn generate_key(
        &self,
        _rng: &mut dyn Rng,
        key_size: KeySizeInBits,
        pub_exponent: RsaExponent,
    ) -> Result<KeyMaterial, Error> {
        // Reject obviously-wrong exponents before handing off.
        if pub_exponent.0 < MIN_RSA_EXPONENT || pub_exponent.0 % 2 != 1 {
            return Err(km_err!(InvalidArgument, "invalid public exponent {}", pub_exponent.0));
        }
        let exponent = openssl::bn::BigNum::from_slice(&pub_exponent.0.to_be_bytes())
            .map_err(openssl_err!("failed to create BigNum for exponent {:?}", pub_exponent))?;
        let rsa_key = openssl::rsa::Rsa::generate_with_e(key_size.0, &exponent).map_err(
            openssl_err!("failed to generate RSA key size {:?} exponent {:?}", key_size, pub_exponent),
        )?;
        let der = ossl!(rsa_key.private_key_to_der())?;
        Ok(KeyMaterial::Rsa(rsa::Key(der)))
    }

    fn import_pkcs8_key(
        &self,
        data: &[u8],
    ) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error> {
        let pkey = PKey::private_key_from_pkcs8(data)
            .map_err(|e| km_err!(InvalidArgument, "failed to parse PKCS#8 data: {:?}", e))?;
        let rsa_key = pkey
            .rsa()
            .map_err(|_e| km_err!(IncompatibleAlgorithm, "PKCS#8 key is not an RSA key"))?;
        let key_size = KeySizeInBits(rsa_key.n().num_bits() as u32);
        let exponent = bn_to_u64(rsa_key.e())?;
        let der = ossl!(rsa_key.private_key_to_der())?;
        Ok((KeyMaterial::Rsa(rsa::Key(der)), key_size, RsaExponent(exponent)))
    }

    fn subject_public_key_info(&self, key: &rsa::Key) -> Result<Vec<u8>, Error> {
        let pkey = private_pkey(key)?;
        ossl!(pkey.public_key_to_der())
    }

    fn sign(&self, key: &rsa::Key, mode: rsa::SignMode, data: &[u8]) -> Result<Vec<u8>, Error> {
        match mode {
            rsa::SignMode::NoPadding => {
                let rsa_key = private_key(key)?;
                let mut buf = vec_try![0; rsa_key.size() as usize]?;
                ossl!(rsa_key.private_encrypt(data, &mut buf, Padding::NONE))?;
                Ok(buf)
            }
            rsa::SignMode::Pkcs1_1_5Padding(Digest::None) => {
                let rsa_key = private_key(key)?;
                let mut buf = vec_try![0; rsa_key.size() as usize]?;
                ossl!(rsa_key.private_encrypt(data, &mut buf, Padding::PKCS1))?;
                Ok(buf)
            }
            rsa::SignMode::Pkcs1_1_5Padding(digest) => {
                let md = digest_into_openssl(digest)
                    .ok_or_else(|| km_err!(UnsupportedDigest, "no digest for mode {:?}", mode))?;
                let pkey = private_pkey(key)?;
                let mut signer = ossl!(openssl::sign::Signer::new(md, &pkey))?;
                ossl!(signer.set_rsa_padding(Padding::PKCS1))?;
                ossl!(signer.update(data))?;
                ossl!(signer.sign_to_vec())
            }
            rsa::SignMode::PssPadding(digest) => {
                let md = digest_into_openssl(digest)
                    .ok_or_else(|| km_err!(UnsupportedDigest, "PSS requires a digest"))?;
                let pkey = private_pkey(key)?;
                let mut signer = ossl!(openssl::sign::Signer::new(md, &pkey))?;
                ossl!(signer.set_rsa_padding(Padding::PKCS1_PSS))?;
                ossl!(signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH))?;
                ossl!(signer.update(data))?;
                ossl!(signer.sign_to_vec())
            }
        }
    }

    fn verify(
        &self,
        key: &rsa::Key,
        mode: rsa::SignMode,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        match mode {
            rsa::SignMode::NoPadding | rsa::SignMode::Pkcs1_1_5Padding(Digest::None) => {
                let rsa_key = private_key(key)?;
                let padding = match mode {
                    rsa::SignMode::NoPadding => Padding::NONE,
                    _ => Padding::PKCS1,
                };
                let mut buf = vec_try![0; rsa_key.size() as usize]?;
                let len = rsa_key
                    .public_decrypt(signature, &mut buf, padding)
                    .map_err(|e| km_err!(VerificationFailed, "public decrypt failed: {:?}", e))?;
                buf.truncate(len);
                let eq = crate::eq::OsslEq;
                if crypto::ConstTimeEq::eq(&eq, &buf, data) {
                    Ok(())
                } else {
                    Err(km_err!(VerificationFailed, "recovered message mismatch"))
                }
            }
            rsa::SignMode::Pkcs1_1_5Padding(digest) | rsa::SignMode::PssPadding(digest) => {
                let md = digest_into_openssl(digest)
                    .ok_or_else(|| km_err!(UnsupportedDigest, "no digest for mode {:?}", mode))?;
                let pkey = private_pkey(key)?;
                let mut verifier = ossl!(openssl::sign::Verifier::new(md, &pkey))?;
                match mode {
                    rsa::SignMode::PssPadding(_) => {
                        ossl!(verifier.set_rsa_padding(Padding::PKCS1_PSS))?;
                        ossl!(verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH))?;
                    }
                    _ => ossl!(verifier.set_rsa_padding(Padding::PKCS1))?,
                }
                ossl!(verifier.update(data))?;
                match verifier.verify(signature) {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(km_err!(VerificationFailed, "signature mismatch")),
                    Err(e) => Err(km_err!(VerificationFailed, "verify failed: {:?}", e)),
                }
            }
        }
    }

    fn encrypt(
        &self,
        key: &rsa::Key,
        mode: rsa::CryptMode,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let rsa_key = private_key(key)?;
        let padding = match mode {
            rsa::CryptMode::OaepPadding => Padding::PKCS1_OAEP,
            rsa::CryptMode::Pkcs1_1_5Padding => Padding::PKCS1,
        };
        let mut buf = vec_try![0; rsa_key.size() as usize]?;
        let len = ossl!(rsa_key.public_encrypt(data, &mut buf, padding))?;
        buf.truncate(len);
        Ok(buf)
    }

    fn decrypt(
        &self,
        key: &rsa::Key,
        mode: rsa::CryptMode,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let rsa_key = private_key(key)?;
        let padding = match mode {
            rsa::CryptMode::OaepPadding => Padding::PKCS1_OAEP,
            rsa::CryptMode::Pkcs1_1_5Padding => Padding::PKCS1,
        };
        let mut buf = vec_try![0; rsa_key.size() as usize]?;
        // Decryption failure reports no detail, so no padding oracle is
        // exposed.
        let len = rsa_key
            .private_decrypt(data, &mut buf, padding)
            .map_err(|e| km_err!(UnknownError, "private decrypt failed: {:?}", e))?;
        buf.truncate(len);
        Ok(buf)
    }
}

/// Convert a (small) `BigNum` to a `u64`.
fn bn_to_u64(bn: &openssl::bn::BigNumRef) -> Result<u64, Error> {
    let bytes = bn.to_vec();
    if bytes.len() > 8 {
        return Err(km_err!(UnsupportedKeySize, "public exponent too large ({} bytes)", bytes.len()));
    }
    let mut val = 0u64;
    for b in bytes {
        val = (val << 8) | b as u64;
    }
    Ok(val)
}
