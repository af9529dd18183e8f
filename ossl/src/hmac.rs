//! HMAC implementation based on OpenSSL.

use crate::{digest_into_openssl, ossl};
use dkm_common::crypto::{hmac, AccumulatingOperation};
use dkm_common::{crypto, km_err, Error, FallibleAllocExt};
use dkm_wire::Digest;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};

/// [`crypto::Hmac`] implementation based on OpenSSL.
pub struct OsslHmac;

impl crypto::Hmac for OsslHmac {
    fn begin(
        &self,
        key: hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn AccumulatingOperation>, Error> {
        let md = digest_into_openssl(digest)
            .ok_or_else(|| km_err!(UnsupportedDigest, "HMAC requires a digest"))?;
        let pkey = ossl!(PKey::hmac(&key.0))?;
        Ok(Box::new(OsslHmacOperation { pkey, md, pending_input: Vec::new() }))
    }
}

/// HMAC operation.  Input is buffered because a `Signer` borrows the key for
/// its whole lifetime; the MAC is computed at `finish()`.
pub struct OsslHmacOperation {
    pkey: PKey<Private>,
    md: MessageDigest,
    pending_input: Vec<u8>,
}

impl AccumulatingOperation for OsslHmacOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let mut signer = ossl!(openssl::sign::Signer::new(self.md, &self.pkey))?;
        ossl!(signer.update(&self.pending_input))?;
        ossl!(signer.sign_to_vec())
    }
}
