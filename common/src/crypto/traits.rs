//! Traits representing abstractions of cryptographic functionality.

use super::{aes, ec, hmac, rsa, KeyMaterial, MillisecondsSinceEpoch, SymmetricOperation};
use crate::wire::{Digest, KeySizeInBits, RsaExponent};
use crate::{km_err, vec_try, Error};
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Combined collection of trait implementations that must be provided.
pub struct Implementation<'a> {
    /// Random number generator.
    pub rng: &'a mut dyn Rng,

    /// A constant-time equality implementation.
    pub compare: &'a dyn ConstTimeEq,

    /// A wall clock, used only to stamp `CREATION_DATETIME`.
    pub clock: &'a dyn Clock,

    /// AES implementation.
    pub aes: &'a dyn Aes,

    /// RSA implementation.
    pub rsa: &'a dyn Rsa,

    /// EC implementation.
    pub ec: &'a dyn Ec,

    /// HMAC implementation.
    pub hmac: &'a dyn Hmac,
}

/// Abstraction of a random number generator that is cryptographically secure
/// and which accepts additional entropy to be mixed in.
pub trait Rng {
    /// Mix the provided data into the generator's pool, without crediting it.
    fn add_entropy(&mut self, data: &[u8]);
    /// Generate random data.
    fn fill_bytes(&mut self, dest: &mut [u8]);
    /// Return a random `u64` value.
    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }
}

/// Abstraction of constant-time comparisons, for use in cryptographic
/// contexts where timing attacks need to be avoided.
pub trait ConstTimeEq {
    /// Indicate whether arguments are the same.
    fn eq(&self, left: &[u8], right: &[u8]) -> bool;
    /// Indicate whether arguments are different.
    fn ne(&self, left: &[u8], right: &[u8]) -> bool {
        !self.eq(left, right)
    }
}

/// Abstraction of a wall clock.
pub trait Clock {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> MillisecondsSinceEpoch;
}

/// Abstraction of AES functionality.
pub trait Aes {
    /// Generate an AES key.  The default implementation fills with random
    /// data.
    fn generate_key(
        &self,
        rng: &mut dyn Rng,
        variant: aes::Variant,
    ) -> Result<KeyMaterial, Error> {
        Ok(match variant {
            aes::Variant::Aes128 => {
                let mut key = [0; 16];
                rng.fill_bytes(&mut key[..]);
                KeyMaterial::Aes(aes::Key::Aes128(key))
            }
            aes::Variant::Aes192 => {
                let mut key = [0; 24];
                rng.fill_bytes(&mut key[..]);
                KeyMaterial::Aes(aes::Key::Aes192(key))
            }
            aes::Variant::Aes256 => {
                let mut key = [0; 32];
                rng.fill_bytes(&mut key[..]);
                KeyMaterial::Aes(aes::Key::Aes256(key))
            }
        })
    }

    /// Import an AES key, also returning the key size in bits.
    fn import_key(&self, data: &[u8]) -> Result<(KeyMaterial, KeySizeInBits), Error> {
        let aes_key = aes::Key::new_from(data)?;
        let key_size = aes_key.size();
        Ok((KeyMaterial::Aes(aes_key), key_size))
    }

    /// Create an AES cipher operation for one of the streaming block modes.
    /// For no-padding modes the caller enforces whole-block input.
    fn begin(
        &self,
        key: aes::Key,
        mode: aes::CipherMode,
        dir: SymmetricOperation,
    ) -> Result<Box<dyn EmittingOperation>, Error>;

    /// One-shot AES-OCB seal of `plaintext` with explicit nonce and
    /// associated data, returning `ciphertext ‖ tag` with a tag of
    /// `tag_len` bytes.
    fn ocb_seal(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::OCB_NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
        tag_len: usize,
    ) -> Result<Vec<u8>, Error>;

    /// One-shot AES-OCB open of `ciphertext ‖ tag`.  Tag mismatch fails with
    /// `VERIFICATION_FAILED`.
    fn ocb_open(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::OCB_NONCE_SIZE],
        aad: &[u8],
        ct_and_tag: &[u8],
        tag_len: usize,
    ) -> Result<Vec<u8>, Error>;
}

/// Abstraction of HMAC functionality.
pub trait Hmac {
    /// Generate an HMAC key.
    fn generate_key(
        &self,
        rng: &mut dyn Rng,
        key_size: KeySizeInBits,
    ) -> Result<KeyMaterial, Error> {
        hmac::valid_key_size(key_size)?;
        let key_len = (key_size.0 / 8) as usize;
        let mut key = vec_try![0; key_len]?;
        rng.fill_bytes(&mut key);
        Ok(KeyMaterial::Hmac(hmac::Key(key)))
    }

    /// Import an HMAC key, also returning the key size in bits.
    fn import_key(&self, data: &[u8]) -> Result<(KeyMaterial, KeySizeInBits), Error> {
        let hmac_key = hmac::Key(crate::try_to_vec(data)?);
        let key_size = hmac_key.size();
        hmac::valid_key_size(key_size)?;
        Ok((KeyMaterial::Hmac(hmac_key), key_size))
    }

    /// Create an HMAC operation.  Implementations can assume that `digest` is
    /// not [`Digest::None`].
    fn begin(
        &self,
        key: hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;
}

/// Abstraction of RSA functionality.
pub trait Rsa {
    /// Generate an RSA key.
    fn generate_key(
        &self,
        rng: &mut dyn Rng,
        key_size: KeySizeInBits,
        pub_exponent: RsaExponent,
    ) -> Result<KeyMaterial, Error>;

    /// Import an RSA key in PKCS#8 format, also returning the key size in
    /// bits and the public exponent.
    fn import_pkcs8_key(
        &self,
        data: &[u8],
    ) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error>;

    /// Return the public key as a DER-encoded X.509 `SubjectPublicKeyInfo`.
    fn subject_public_key_info(&self, key: &rsa::Key) -> Result<Vec<u8>, Error>;

    /// Sign `data` (the complete message) in the given mode.
    fn sign(&self, key: &rsa::Key, mode: rsa::SignMode, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Verify `signature` over `data`; mismatch is `VERIFICATION_FAILED`.
    fn verify(
        &self,
        key: &rsa::Key,
        mode: rsa::SignMode,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error>;

    /// Encrypt `data` in the given mode.
    fn encrypt(&self, key: &rsa::Key, mode: rsa::CryptMode, data: &[u8])
        -> Result<Vec<u8>, Error>;

    /// Decrypt `data` in the given mode.
    fn decrypt(&self, key: &rsa::Key, mode: rsa::CryptMode, data: &[u8])
        -> Result<Vec<u8>, Error>;
}

/// Abstraction of EC functionality.  Signing is always over the raw message
/// (`DIGEST=NONE`); inputs longer than the curve coordinate are truncated.
pub trait Ec {
    /// Generate an EC key for a NIST curve.
    fn generate_key(&self, rng: &mut dyn Rng, curve: ec::Curve) -> Result<KeyMaterial, Error>;

    /// Import an EC key in PKCS#8 format, also returning the curve.
    fn import_pkcs8_key(&self, data: &[u8]) -> Result<(KeyMaterial, ec::Curve), Error>;

    /// Return the public key as a DER-encoded X.509 `SubjectPublicKeyInfo`.
    fn subject_public_key_info(&self, key: &ec::Key) -> Result<Vec<u8>, Error>;

    /// Sign `data`, returning an ASN.1 DER-encoded ECDSA signature.
    fn sign(&self, key: &ec::Key, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Verify a DER-encoded signature; mismatch is `VERIFICATION_FAILED`.
    fn verify(&self, key: &ec::Key, data: &[u8], signature: &[u8]) -> Result<(), Error>;
}

/// Abstraction of an in-progress operation that emits data as it progresses.
pub trait EmittingOperation {
    /// Update operation with data.
    fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Complete operation, consuming `self`.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error>;
}

/// Abstraction of an in-progress operation that only emits data when it
/// completes.
pub trait AccumulatingOperation {
    /// Update operation with data.
    fn update(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Complete operation, consuming `self`.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error>;
}

/// Fill `nonce_len` bytes of nonce, either from a caller-provided value (which
/// must have the right length) or from the RNG.
pub fn nonce(
    nonce_len: usize,
    caller_nonce: Option<&Vec<u8>>,
    rng: &mut dyn Rng,
) -> Result<Vec<u8>, Error> {
    match caller_nonce {
        Some(n) => {
            if n.len() != nonce_len {
                return Err(km_err!(
                    InvalidArgument,
                    "want {} byte nonce, got {}",
                    nonce_len,
                    n.len()
                ));
            }
            crate::try_to_vec(n)
        }
        None => {
            let mut n = vec_try![0; nonce_len]?;
            rng.fill_bytes(&mut n);
            Ok(n)
        }
    }
}
