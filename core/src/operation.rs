//! In-flight operation management: the operation table, the factory registry
//! and the per-operation state machine contract.

use crate::keys::Key;
use crate::Keystore;
use alloc::boxed::Box;
use alloc::vec::Vec;
use dkm_common::{
    contains_tag_value, crypto, get_opt_tag_value, km_err, Error,
};
use dkm_wire::{
    Algorithm, AuthorizationSet, BlockMode, Digest, PaddingMode, Purpose,
};
use log::error;

pub(crate) mod aes;
pub(crate) mod ec;
pub(crate) mod hmac;
pub(crate) mod rsa;

/// Attempts at drawing a fresh non-zero operation handle before concluding
/// the RNG is broken.
const MAX_HANDLE_ATTEMPTS: usize = 16;

/// Newtype for operation handles.  Zero is a reserved sentinel and never
/// allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpHandle(pub u64);

/// An in-flight operation.  `begin` constructs one; `update` feeds it;
/// `finish` consumes it; abort is simply dropping it.
pub trait Operation {
    /// Feed input, returning the number of bytes consumed and any output
    /// produced.
    fn update(
        &mut self,
        imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error>;

    /// Complete the operation, consuming it.  Verification operations take
    /// the signature to check here.
    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error>;
}

/// Per-(algorithm, purpose) factory for operations.  A factory advertises the
/// parameter values it can handle and validates the resolved parameters
/// against the key's authorizations before constructing an operation.
pub trait OperationFactory {
    fn supported_block_modes(&self) -> &'static [BlockMode] {
        &[]
    }
    fn supported_paddings(&self) -> &'static [PaddingMode] {
        &[]
    }
    fn supported_digests(&self) -> &'static [Digest] {
        &[]
    }

    /// Build an operation for `key` from the `begin` parameters.  Parameters
    /// the caller must persist (such as a generated IV) are appended to
    /// `out_params`.
    fn create_operation(
        &self,
        imp: &mut crypto::Implementation<'_>,
        key: &Key,
        params: &AuthorizationSet,
        out_params: &mut AuthorizationSet,
    ) -> Result<Box<dyn Operation>, Error>;
}

static RSA_SIGN_FACTORY: rsa::RsaSignVerifyFactory =
    rsa::RsaSignVerifyFactory { purpose: Purpose::Sign };
static RSA_VERIFY_FACTORY: rsa::RsaSignVerifyFactory =
    rsa::RsaSignVerifyFactory { purpose: Purpose::Verify };
static RSA_ENCRYPT_FACTORY: rsa::RsaCryptFactory =
    rsa::RsaCryptFactory { purpose: Purpose::Encrypt };
static RSA_DECRYPT_FACTORY: rsa::RsaCryptFactory =
    rsa::RsaCryptFactory { purpose: Purpose::Decrypt };
static EC_SIGN_FACTORY: ec::EcdsaFactory = ec::EcdsaFactory { purpose: Purpose::Sign };
static EC_VERIFY_FACTORY: ec::EcdsaFactory = ec::EcdsaFactory { purpose: Purpose::Verify };
static AES_ENCRYPT_FACTORY: aes::AesFactory = aes::AesFactory { purpose: Purpose::Encrypt };
static AES_DECRYPT_FACTORY: aes::AesFactory = aes::AesFactory { purpose: Purpose::Decrypt };
static HMAC_SIGN_FACTORY: hmac::HmacFactory = hmac::HmacFactory { purpose: Purpose::Sign };
static HMAC_VERIFY_FACTORY: hmac::HmacFactory = hmac::HmacFactory { purpose: Purpose::Verify };

/// Registry mapping `(algorithm, purpose)` to an operation factory, built
/// once at module construction.
pub struct OperationFactoryRegistry {
    entries: Vec<(Algorithm, Purpose, &'static dyn OperationFactory)>,
}

impl OperationFactoryRegistry {
    pub fn new() -> Result<Self, Error> {
        use dkm_common::FallibleAllocExt;
        let mut entries: Vec<(Algorithm, Purpose, &'static dyn OperationFactory)> = Vec::new();
        entries.try_push((Algorithm::Rsa, Purpose::Sign, &RSA_SIGN_FACTORY))?;
        entries.try_push((Algorithm::Rsa, Purpose::Verify, &RSA_VERIFY_FACTORY))?;
        entries.try_push((Algorithm::Rsa, Purpose::Encrypt, &RSA_ENCRYPT_FACTORY))?;
        entries.try_push((Algorithm::Rsa, Purpose::Decrypt, &RSA_DECRYPT_FACTORY))?;
        entries.try_push((Algorithm::Ec, Purpose::Sign, &EC_SIGN_FACTORY))?;
        entries.try_push((Algorithm::Ec, Purpose::Verify, &EC_VERIFY_FACTORY))?;
        entries.try_push((Algorithm::Aes, Purpose::Encrypt, &AES_ENCRYPT_FACTORY))?;
        entries.try_push((Algorithm::Aes, Purpose::Decrypt, &AES_DECRYPT_FACTORY))?;
        entries.try_push((Algorithm::Hmac, Purpose::Sign, &HMAC_SIGN_FACTORY))?;
        entries.try_push((Algorithm::Hmac, Purpose::Verify, &HMAC_VERIFY_FACTORY))?;
        Ok(Self { entries })
    }

    pub fn get(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Option<&'static dyn OperationFactory> {
        self.entries
            .iter()
            .find(|(alg, purp, _)| *alg == algorithm && *purp == purpose)
            .map(|(_, _, f)| *f)
    }
}

/// Resolve the digest for an operation: from the `begin` parameters, absent
/// meaning `NONE`.  The result must be one the factory handles and one the
/// key authorizes.
pub(crate) fn resolve_digest(
    factory: &dyn OperationFactory,
    key: &Key,
    params: &AuthorizationSet,
) -> Result<Digest, Error> {
    let digest = match get_opt_tag_value!(params, Digest)? {
        Some(d) => *d,
        None => Digest::None,
    };
    if !factory.supported_digests().contains(&digest) {
        return Err(km_err!(UnsupportedDigest, "digest {:?} not supported", digest));
    }
    if !contains_tag_value!(&key.characteristics, Digest, digest) {
        return Err(km_err!(UnsupportedDigest, "digest {:?} not authorized by key", digest));
    }
    Ok(digest)
}

/// Resolve the padding mode for an operation, as [`resolve_digest`] does for
/// digests.
pub(crate) fn resolve_padding(
    factory: &dyn OperationFactory,
    key: &Key,
    params: &AuthorizationSet,
) -> Result<PaddingMode, Error> {
    let padding = match get_opt_tag_value!(params, Padding)? {
        Some(p) => *p,
        None => PaddingMode::None,
    };
    if !factory.supported_paddings().contains(&padding) {
        return Err(km_err!(UnsupportedPaddingMode, "padding {:?} not supported", padding));
    }
    if !contains_tag_value!(&key.characteristics, Padding, padding) {
        return Err(km_err!(
            UnsupportedPaddingMode,
            "padding {:?} not authorized by key",
            padding
        ));
    }
    Ok(padding)
}

pub(crate) struct OpTableEntry {
    pub(crate) handle: OpHandle,
    pub(crate) op: Box<dyn Operation>,
}

impl<'a> Keystore<'a> {
    /// Begin an operation on a key, installing it in the operation table
    /// under a fresh handle.
    pub fn begin(
        &mut self,
        purpose: Purpose,
        key_blob: &[u8],
        params: &AuthorizationSet,
    ) -> Result<(u64, AuthorizationSet), Error> {
        // Claim a table slot up front so a full table fails before any
        // cryptography happens.
        let op_idx = self.new_operation_index()?;

        let key = self.load_key(key_blob, params)?;
        let algorithm = key.material.algorithm();
        if !contains_tag_value!(&key.characteristics, Purpose, purpose) {
            return Err(km_err!(
                IncompatiblePurpose,
                "purpose {:?} not authorized by key",
                purpose
            ));
        }
        let factory = self
            .op_factories
            .get(algorithm, purpose)
            .ok_or_else(|| km_err!(UnsupportedPurpose, "no {:?} for {:?}", purpose, algorithm))?;

        let mut out_params = AuthorizationSet::new();
        let op = factory.create_operation(&mut self.imp, &key, params, &mut out_params)?;

        let handle = self.new_op_handle()?;
        self.operations[op_idx] = Some(OpTableEntry { handle, op });
        Ok((handle.0, out_params))
    }

    /// Feed input to an in-flight operation.  Any failure retires the
    /// operation.
    pub fn update(
        &mut self,
        op_handle: u64,
        _params: &AuthorizationSet,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        let op_idx = self.op_index(OpHandle(op_handle))?;
        let entry = self.operations[op_idx].as_mut().unwrap(/* safe: op_index() checks */);
        let result = entry.op.update(&self.imp, input);
        if result.is_err() {
            // A failed update destroys the operation.
            self.operations[op_idx] = None;
        }
        result
    }

    /// Complete an in-flight operation.  The operation is retired whether or
    /// not it succeeds.
    pub fn finish(
        &mut self,
        op_handle: u64,
        _params: &AuthorizationSet,
        signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let entry = self.take_operation(OpHandle(op_handle))?;
        entry.op.finish(&self.imp, signature)
    }

    /// Abandon an in-flight operation.
    pub fn abort(&mut self, op_handle: u64) -> Result<(), Error> {
        let _entry = self.take_operation(OpHandle(op_handle))?;
        Ok(())
    }

    /// Return the index of a free slot in the operation table.
    fn new_operation_index(&mut self) -> Result<usize, Error> {
        self.operations.iter().position(Option::is_none).ok_or_else(|| {
            km_err!(TooManyOperations, "op count {} >= limit", self.operations.len())
        })
    }

    /// Return a fresh handle value not currently in the table.  Zero is
    /// reserved; repeated failure to draw anything else means the RNG is
    /// broken.
    fn new_op_handle(&mut self) -> Result<OpHandle, Error> {
        for _ in 0..MAX_HANDLE_ATTEMPTS {
            let handle = OpHandle(self.imp.rng.next_u64());
            if handle.0 != 0 && self.op_index(handle).is_err() {
                return Ok(handle);
            }
        }
        error!("failed to generate distinct operation handle after {} tries", MAX_HANDLE_ATTEMPTS);
        Err(km_err!(UnknownError, "could not allocate operation handle"))
    }

    /// Return the table index of the operation identified by `op_handle`.
    fn op_index(&self, op_handle: OpHandle) -> Result<usize, Error> {
        if op_handle.0 == 0 {
            return Err(km_err!(InvalidOperationHandle, "zero handle is reserved"));
        }
        self.operations
            .iter()
            .position(|entry| matches!(entry, Some(e) if e.handle == op_handle))
            .ok_or_else(|| {
                km_err!(InvalidOperationHandle, "operation handle {:?} not found", op_handle)
            })
    }

    /// Remove and return the operation identified by `op_handle`.
    fn take_operation(&mut self, op_handle: OpHandle) -> Result<OpTableEntry, Error> {
        let op_idx = self.op_index(op_handle)?;
        Ok(self.operations[op_idx].take().unwrap(/* safe: op_index() checks */))
    }
}
