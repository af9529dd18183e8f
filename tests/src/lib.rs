//! Test helpers binding the keystore core to the OpenSSL provider.

use dkm_common::crypto::Implementation;
use dkm_core::profile::SoftwareProfile;
use dkm_core::Keystore;
use dkm_ossl::{
    aes::OsslAes, clock::SystemClock, ec::OsslEc, eq::OsslEq, hmac::OsslHmac, rng::OsslRng,
    rsa::OsslRsa,
};
use dkm_wire::{AuthorizationSet, KeyParam};

/// Run `f` against a keystore wired up with the OpenSSL provider and the
/// software profile.
pub fn with_keystore<T>(f: impl FnOnce(&mut Keystore) -> T) -> T {
    let mut rng = OsslRng;
    let imp = Implementation {
        rng: &mut rng,
        compare: &OsslEq,
        clock: &SystemClock,
        aes: &OsslAes,
        rsa: &OsslRsa,
        ec: &OsslEc,
        hmac: &OsslHmac,
    };
    let mut keystore = Keystore::new(imp, &SoftwareProfile).expect("failed to build keystore");
    f(&mut keystore)
}

/// Build an authorization set from a slice of parameters.
pub fn params(params: &[KeyParam]) -> AuthorizationSet {
    AuthorizationSet::from_params(params).expect("failed to build parameter set")
}
