//! EC implementation based on OpenSSL.

use crate::{openssl_err, ossl};
use dkm_common::crypto::{ec, KeyMaterial, Rng};
use dkm_common::{crypto, km_err, Error};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};

/// [`crypto::Ec`] implementation based on OpenSSL.
pub struct OsslEc;

fn curve_to_group(curve: ec::Curve) -> Result<openssl::ec::EcGroup, Error> {
    openssl::ec::EcGroup::from_curve_name(match curve {
        ec::Curve::P192 => Nid::X9_62_PRIME192V1,
        ec::Curve::P224 => Nid::SECP224R1,
        ec::Curve::P256 => Nid::X9_62_PRIME256V1,
        ec::Curve::P384 => Nid::SECP384R1,
        ec::Curve::P521 => Nid::SECP521R1,
    })
    .map_err(openssl_err!("failed to determine EcGroup for {:?}", curve))
}

fn nid_to_curve(nid: Nid) -> Result<ec::Curve, Error> {
    match nid {
        Nid::X9_62_PRIME192V1 => Ok(ec::Curve::P192),
        Nid::SECP224R1 => Ok(ec::Curve::P224),
        Nid::X9_62_PRIME256V1 => Ok(ec::Curve::P256),
        Nid::SECP384R1 => Ok(ec::Curve::P384),
        Nid::SECP521R1 => Ok(ec::Curve::P521),
        nid => Err(km_err!(UnsupportedEcField, "unsupported curve {:?}", nid)),
    }
}

fn private_key(key: &ec::Key) -> Result<openssl::ec::EcKey<Private>, Error> {
    ossl!(openssl::ec::EcKey::private_key_from_der(&key.der))
}

/// Truncate signing input to the curve coordinate length; extra data beyond
/// that is ignored, per standard ECDSA handling of oversized digests.
fn truncated<'a>(key: &ec::Key, data: &'a [u8]) -> &'a [u8] {
    let max = key.curve.coord_len();
    if data.len() > max {
        &data[..max]
    } else {
        data
    }
}

impl crypto::Ec for OsslEc {
    fn generate_key(&self, _rng: &mut dyn Rng, curve: ec::Curve) -> Result<KeyMaterial, Error> {
        let group = curve_to_group(curve)?;
        let ec_key = ossl!(openssl::ec::EcKey::<Private>::generate(group.as_ref()))?;
        let der = ossl!(ec_key.private_key_to_der())?;
        Ok(KeyMaterial::Ec(ec::Key { curve, der }))
    }

    fn import_pkcs8_key(&self, data: &[u8]) -> Result<(KeyMaterial, ec::Curve), Error> {
        let pkey = PKey::private_key_from_pkcs8(data)
            .map_err(|e| km_err!(InvalidArgument, "failed to parse PKCS#8 data: {:?}", e))?;
        let ec_key = pkey
            .ec_key()
            .map_err(|_e| km_err!(IncompatibleAlgorithm, "PKCS#8 key is not an EC key"))?;
        let nid = ec_key
            .group()
            .curve_name()
            .ok_or_else(|| km_err!(UnsupportedEcField, "imported key has no named curve"))?;
        let curve = nid_to_curve(nid)?;
        let der = ossl!(ec_key.private_key_to_der())?;
        Ok((KeyMaterial::Ec(ec::Key { curve, der }), curve))
    }

    fn subject_public_key_info(&self, key: &ec::Key) -> Result<Vec<u8>, Error> {
        let ec_key = private_key(key)?;
        let pkey = ossl!(PKey::from_ec_key(ec_key))?;
        ossl!(pkey.public_key_to_der())
    }

    fn sign(&self, key: &ec::Key, data: &[u8]) -> Result<Vec<u8>, Error> {
        let ec_key = private_key(key)?;
        let sig = ossl!(openssl::ecdsa::EcdsaSig::sign(truncated(key, data), &ec_key))?;
        ossl!(sig.to_der())
    }

    fn verify(&self, key: &ec::Key, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        let ec_key = private_key(key)?;
        let group = curve_to_group(key.curve)?;
        let pub_key =
            ossl!(openssl::ec::EcKey::from_public_key(group.as_ref(), ec_key.public_key()))?;
        let sig = openssl::ecdsa::EcdsaSig::from_der(signature)
            .map_err(|e| km_err!(VerificationFailed, "signature not parseable: {:?}", e))?;
        match sig.verify(truncated(key, data), &pub_key) {
            Ok(true) => Ok(()),
            Ok(false) => Err(km_err!(VerificationFailed, "signature mismatch")),
            Err(e) => Err(km_err!(VerificationFailed, "verify failed: {:?}", e)),
        }
    }
}
