//! ECDSA operations.  Input is accumulated through `update` (capped at the
//! curve coordinate size, extra data being ignored) and signed or verified at
//! `finish`.

use super::{resolve_digest, Operation, OperationFactory};
use crate::keys::Key;
use alloc::boxed::Box;
use alloc::vec::Vec;
use dkm_common::crypto::{self, ec, KeyMaterial};
use dkm_common::{km_err, Error, FallibleAllocExt};
use dkm_wire::{AuthorizationSet, Digest, Purpose};

/// Factory for ECDSA sign and verify operations.
pub(crate) struct EcdsaFactory {
    pub(crate) purpose: Purpose,
}

impl OperationFactory for EcdsaFactory {
    fn supported_digests(&self) -> &'static [Digest] {
        &[Digest::None]
    }

    fn create_operation(
        &self,
        _imp: &mut crypto::Implementation<'_>,
        key: &Key,
        params: &AuthorizationSet,
        _out_params: &mut AuthorizationSet,
    ) -> Result<Box<dyn Operation>, Error> {
        let ec_key = match &key.material {
            KeyMaterial::Ec(k) => k.clone(),
            _ => return Err(km_err!(IncompatibleAlgorithm, "not an EC key")),
        };
        // `supported_digests` is just NONE, so this both validates the
        // parameter and confirms the key carries DIGEST_NONE.
        let _digest = resolve_digest(self, key, params)?;

        Ok(match self.purpose {
            Purpose::Sign => Box::new(EcdsaSignOperation { key: ec_key, data: Vec::new() }),
            _ => Box::new(EcdsaVerifyOperation { key: ec_key, data: Vec::new() }),
        })
    }
}

/// Append input to the operation's buffer, keeping no more than the curve
/// coordinate length.
fn accumulate(key: &ec::Key, data: &mut Vec<u8>, input: &[u8]) -> Result<(), Error> {
    let space = key.curve.coord_len().saturating_sub(data.len());
    let take = core::cmp::min(space, input.len());
    if take > 0 {
        data.try_extend_from_slice(&input[..take])?;
    }
    Ok(())
}

struct EcdsaSignOperation {
    key: ec::Key,
    data: Vec<u8>,
}

impl Operation for EcdsaSignOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        accumulate(&self.key, &mut self.data, input)?;
        Ok((input.len(), Vec::new()))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        _signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        imp.ec.sign(&self.key, &self.data)
    }
}

struct EcdsaVerifyOperation {
    key: ec::Key,
    data: Vec<u8>,
}

impl Operation for EcdsaVerifyOperation {
    fn update(
        &mut self,
        _imp: &crypto::Implementation<'_>,
        input: &[u8],
    ) -> Result<(usize, Vec<u8>), Error> {
        accumulate(&self.key, &mut self.data, input)?;
        Ok((input.len(), Vec::new()))
    }

    fn finish(
        self: Box<Self>,
        imp: &crypto::Implementation<'_>,
        signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error> {
        let signature =
            signature.ok_or_else(|| km_err!(VerificationFailed, "no signature provided"))?;
        imp.ec.verify(&self.key, &self.data, signature)?;
        Ok(Vec::new())
    }
}
