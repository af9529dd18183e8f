//! Key blob manipulation functionality.
//!
//! A key blob is the sole durable representation of a key outside the
//! module.  The private key material is sealed with AES-OCB under the
//! module's master key; the enforced and unenforced authorization sets
//! travel in the clear (so they remain inspectable) but are mixed into the
//! associated data together with the caller-binding hidden set, so any
//! modification breaks the authentication tag.

use crate::crypto::{aes, Aes};
use crate::wire::{Algorithm, AuthorizationSet, ErrorCode, KeySizeInBits, Message};
use crate::{get_tag_value, km_err, Error, FallibleAllocExt};
use alloc::vec::Vec;
use log::error;
use zeroize::ZeroizeOnDrop;

/// Size of the nonce used when sealing key material.
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag on a sealed blob.
pub const TAG_SIZE: usize = 16;

mod wire_form {
    use crate::wire::{AuthorizationSet, Error, Message};
    use alloc::vec::Vec;
    use dkm_derive::Message;

    /// Serialized form of a key blob:
    /// `nonce ‖ enforced ‖ unenforced ‖ len(ct) ‖ ct ‖ tag`.
    #[derive(Clone, PartialEq, Eq, Debug, Message)]
    pub struct KeyBlob {
        pub nonce: [u8; super::NONCE_SIZE],
        pub enforced: AuthorizationSet,
        pub unenforced: AuthorizationSet,
        pub encrypted_key_material: Vec<u8>,
        pub tag: [u8; super::TAG_SIZE],
    }
}
pub use wire_form::KeyBlob;

impl KeyBlob {
    /// Parse a serialized blob.  Any inconsistency maps to
    /// `INVALID_KEY_BLOB`; nothing more specific is ever reported.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        Self::from_slice(data).map_err(|_e| km_err!(InvalidKeyBlob, "failed to parse key blob"))
    }

    /// The key's algorithm, recoverable without unsealing.
    pub fn algorithm(&self) -> Result<Algorithm, Error> {
        get_tag_value!(&self.enforced, Algorithm, ErrorCode::UnsupportedAlgorithm)
            .or_else(|_e| get_tag_value!(&self.unenforced, Algorithm, ErrorCode::UnsupportedAlgorithm))
    }

    /// The key's size in bits, recoverable without unsealing.
    pub fn key_size(&self) -> Result<KeySizeInBits, Error> {
        get_tag_value!(&self.enforced, KeySize, ErrorCode::UnsupportedKeySize)
            .or_else(|_e| get_tag_value!(&self.unenforced, KeySize, ErrorCode::UnsupportedKeySize))
    }
}

/// An unsealed key blob.
#[derive(ZeroizeOnDrop)]
pub struct PlaintextKeyBlob {
    #[zeroize(skip)]
    pub enforced: AuthorizationSet,
    #[zeroize(skip)]
    pub unenforced: AuthorizationSet,
    pub key_material: Vec<u8>,
}

impl core::fmt::Debug for PlaintextKeyBlob {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlaintextKeyBlob")
            .field("enforced", &self.enforced)
            .field("unenforced", &self.unenforced)
            .field("key_material", &"<redacted>")
            .finish()
    }
}

/// The associated data binding a blob's visible sets and its hidden set into
/// the seal.
fn associated_data(
    enforced: &AuthorizationSet,
    unenforced: &AuthorizationSet,
    hidden: &AuthorizationSet,
) -> Result<Vec<u8>, Error> {
    let mut aad = Vec::new();
    aad.try_reserve(
        enforced.serialized_size() + unenforced.serialized_size() + hidden.serialized_size(),
    )
    .map_err(|_e| Error::Wire(crate::wire::Error::AllocationFailed))?;
    enforced.serialize_into(&mut aad)?;
    unenforced.serialize_into(&mut aad)?;
    hidden.serialize_into(&mut aad)?;
    Ok(aad)
}

/// Seal key material into a serialized blob under the master key.
pub fn seal(
    aes: &dyn Aes,
    master_key: &aes::Key,
    nonce: [u8; NONCE_SIZE],
    key_material: &[u8],
    enforced: &AuthorizationSet,
    unenforced: &AuthorizationSet,
    hidden: &AuthorizationSet,
) -> Result<Vec<u8>, Error> {
    let aad = associated_data(enforced, unenforced, hidden)?;
    let mut ct_and_tag = aes.ocb_seal(master_key, &nonce, &aad, key_material, TAG_SIZE)?;
    if ct_and_tag.len() < TAG_SIZE {
        return Err(km_err!(UnknownError, "sealed material too short"));
    }
    let tag_offset = ct_and_tag.len() - TAG_SIZE;
    let tag: [u8; TAG_SIZE] =
        ct_and_tag[tag_offset..].try_into().unwrap(/* safe: length checked */);
    ct_and_tag.truncate(tag_offset);

    let blob = KeyBlob {
        nonce,
        enforced: enforced.clone(),
        unenforced: unenforced.clone(),
        encrypted_key_material: ct_and_tag,
        tag,
    };
    Ok(blob.to_vec()?)
}

/// Unseal a serialized blob.  The caller-supplied hidden set participates in
/// the associated data, so a blob sealed for one client context will not
/// unseal in another.  All failures collapse to `INVALID_KEY_BLOB`.
pub fn unseal(
    aes: &dyn Aes,
    master_key: &aes::Key,
    data: &[u8],
    hidden: &AuthorizationSet,
) -> Result<PlaintextKeyBlob, Error> {
    let blob = KeyBlob::parse(data)?;
    let aad = associated_data(&blob.enforced, &blob.unenforced, hidden)?;

    let mut ct_and_tag = Vec::new();
    ct_and_tag.try_extend_from_slice(&blob.encrypted_key_material)?;
    ct_and_tag.try_extend_from_slice(&blob.tag)?;

    let key_material =
        aes.ocb_open(master_key, &blob.nonce, &aad, &ct_and_tag, TAG_SIZE).map_err(|e| {
            error!("key blob failed to authenticate: {:?}", e);
            km_err!(InvalidKeyBlob, "key blob did not authenticate")
        })?;

    Ok(PlaintextKeyBlob { enforced: blob.enforced, unenforced: blob.unenforced, key_material })
}
