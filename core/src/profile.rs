//! Deployment profile hooks.

use dkm_common::crypto::{aes, Rng};
use dkm_wire::{KeyOrigin, Tag};

/// Which public operation is creating a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreationMethod {
    Generate,
    Import,
}

/// The small set of hooks that distinguish one deployment of the module from
/// another.  The core defers to these for every policy decision that is not
/// algorithm-specific.
pub trait Profile {
    /// Whether this deployment promises to check the given tag itself (and so
    /// routes it into the enforced set of new keys).
    fn is_enforced(&self, tag: Tag) -> bool;

    /// The `ORIGIN` value recorded on a newly created key.
    fn origin(&self, method: CreationMethod) -> KeyOrigin;

    /// The root-of-trust bytes mixed into every key blob's hidden set.
    fn root_of_trust(&self) -> &[u8];

    /// The master key that seals key blobs.
    fn master_key(&self) -> aes::Key;

    /// Fill `out` with a fresh nonce.
    fn generate_nonce(&self, rng: &mut dyn Rng, out: &mut [u8]);
}

/// The software-only profile: nothing is hardware-enforced.
pub struct SoftwareProfile;

impl Profile for SoftwareProfile {
    fn is_enforced(&self, _tag: Tag) -> bool {
        false
    }

    fn origin(&self, method: CreationMethod) -> KeyOrigin {
        match method {
            CreationMethod::Generate => KeyOrigin::Generated,
            CreationMethod::Import => KeyOrigin::Imported,
        }
    }

    fn root_of_trust(&self) -> &[u8] {
        b"SW"
    }

    fn master_key(&self) -> aes::Key {
        // All zeroes: blobs sealed by this profile are authenticated but not
        // confidential.  Deployments with secret storage override this.
        aes::Key::Aes128([0; 16])
    }

    fn generate_nonce(&self, rng: &mut dyn Rng, out: &mut [u8]) {
        rng.fill_bytes(out);
    }
}
