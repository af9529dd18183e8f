//! Key factories and loaded keys.

use alloc::vec::Vec;
use dkm_common::crypto::{self, aes, ec, rsa, KeyMaterial};
use dkm_common::{
    get_opt_tag_value, get_tag_value, keyblob, km_err, try_to_vec, Error, FallibleAllocExt,
};
use dkm_wire::{
    Algorithm, AuthorizationSet, ErrorCode, KeyFormat, KeyParam, KeySizeInBits, RsaExponent,
};

/// A key materialized from an unsealed blob or fresh creation, together with
/// the full authorization set that governs its use.
pub struct Key {
    pub material: KeyMaterial,
    pub characteristics: AuthorizationSet,
}

/// Per-algorithm factory for creating, importing and describing keys.
pub trait KeyFactory {
    /// Generate a fresh key from a key description.  Returns the key material
    /// together with any authorizations synthesized from defaults, which the
    /// dispatcher folds into the key's characteristics.
    fn generate_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error>;

    /// Import key material in the given format.  Key-intrinsic values that
    /// the caller did not specify are synthesized; values the caller did
    /// specify must match the material.
    fn import_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
        format: KeyFormat,
        data: &[u8],
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error>;

    fn supported_import_formats(&self) -> &'static [KeyFormat];
    fn supported_export_formats(&self) -> &'static [KeyFormat];
}

static RSA_KEY_FACTORY: RsaKeyFactory = RsaKeyFactory;
static EC_KEY_FACTORY: EcKeyFactory = EcKeyFactory;
static AES_KEY_FACTORY: AesKeyFactory = AesKeyFactory;
static HMAC_KEY_FACTORY: HmacKeyFactory = HmacKeyFactory;

/// Registry mapping each algorithm to its key factory, built once at module
/// construction.  Enumeration order is the order algorithms are reported to
/// clients.
pub struct KeyFactoryRegistry {
    entries: Vec<(Algorithm, &'static dyn KeyFactory)>,
}

impl KeyFactoryRegistry {
    pub fn new() -> Result<Self, Error> {
        let mut entries: Vec<(Algorithm, &'static dyn KeyFactory)> = Vec::new();
        entries.try_push((Algorithm::Rsa, &RSA_KEY_FACTORY))?;
        entries.try_push((Algorithm::Ec, &EC_KEY_FACTORY))?;
        entries.try_push((Algorithm::Aes, &AES_KEY_FACTORY))?;
        entries.try_push((Algorithm::Hmac, &HMAC_KEY_FACTORY))?;
        Ok(Self { entries })
    }

    pub fn get(&self, algorithm: Algorithm) -> Option<&'static dyn KeyFactory> {
        self.entries.iter().find(|(alg, _)| *alg == algorithm).map(|(_, f)| *f)
    }

    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> + '_ {
        self.entries.iter().map(|(alg, _)| *alg)
    }
}

/// Materialize a [`Key`] from an unsealed blob.  The algorithm (and for EC
/// keys the curve) comes from the visible authorization sets.
pub fn load_key(plaintext: &keyblob::PlaintextKeyBlob) -> Result<Key, Error> {
    let mut characteristics = plaintext.enforced.clone();
    characteristics.extend_from(plaintext.unenforced.params())?;

    let algorithm =
        get_tag_value!(&characteristics, Algorithm, ErrorCode::UnsupportedAlgorithm)?;
    let key_size = get_tag_value!(&characteristics, KeySize, ErrorCode::UnsupportedKeySize)?;
    let material =
        KeyMaterial::from_raw(algorithm, key_size, try_to_vec(&plaintext.key_material)?)
            .map_err(|_e| km_err!(InvalidKeyBlob, "key material does not match characteristics"))?;
    Ok(Key { material, characteristics })
}

/// Append `KeyParam::Algorithm` to `extras` when the caller's description
/// omitted it.
fn synthesize_algorithm(
    extras: &mut Vec<KeyParam>,
    desc: &AuthorizationSet,
    algorithm: Algorithm,
) -> Result<(), Error> {
    if get_opt_tag_value!(desc, Algorithm)?.is_none() {
        extras.try_push(KeyParam::Algorithm(algorithm))?;
    }
    Ok(())
}

/// RSA key factory.
struct RsaKeyFactory;

impl KeyFactory for RsaKeyFactory {
    fn generate_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        let mut extras = Vec::new();
        let key_size = match get_opt_tag_value!(desc, KeySize)? {
            Some(sz) => *sz,
            None => {
                extras.try_push(KeyParam::KeySize(KeySizeInBits(rsa::DEFAULT_KEY_SIZE)))?;
                KeySizeInBits(rsa::DEFAULT_KEY_SIZE)
            }
        };
        let pub_exponent = match get_opt_tag_value!(desc, RsaPublicExponent)? {
            Some(e) => *e,
            None => {
                extras
                    .try_push(KeyParam::RsaPublicExponent(RsaExponent(rsa::DEFAULT_EXPONENT)))?;
                RsaExponent(rsa::DEFAULT_EXPONENT)
            }
        };
        let material = imp.rsa.generate_key(&mut *imp.rng, key_size, pub_exponent)?;
        Ok((material, extras))
    }

    fn import_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
        format: KeyFormat,
        data: &[u8],
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        if format != KeyFormat::Pkcs8 {
            return Err(km_err!(
                UnsupportedKeyFormat,
                "RSA import expects PKCS8, got {:?}",
                format
            ));
        }
        let (material, key_size, pub_exponent) =
            imp.rsa.import_pkcs8_key(data).map_err(algorithm_mismatch)?;

        let mut extras = Vec::new();
        match get_opt_tag_value!(desc, KeySize)? {
            Some(sz) if *sz != key_size => {
                return Err(km_err!(
                    ImportParameterMismatch,
                    "specified KEY_SIZE {:?} != key size {:?}",
                    sz,
                    key_size
                ));
            }
            Some(_) => {}
            None => extras.try_push(KeyParam::KeySize(key_size))?,
        }
        match get_opt_tag_value!(desc, RsaPublicExponent)? {
            Some(e) if *e != pub_exponent => {
                return Err(km_err!(
                    ImportParameterMismatch,
                    "specified RSA_PUBLIC_EXPONENT {:?} != exponent {:?}",
                    e,
                    pub_exponent
                ));
            }
            Some(_) => {}
            None => extras.try_push(KeyParam::RsaPublicExponent(pub_exponent))?,
        }
        synthesize_algorithm(&mut extras, desc, Algorithm::Rsa)?;
        Ok((material, extras))
    }

    fn supported_import_formats(&self) -> &'static [KeyFormat] {
        &[KeyFormat::Pkcs8]
    }
    fn supported_export_formats(&self) -> &'static [KeyFormat] {
        &[KeyFormat::X509]
    }
}

/// EC key factory.
struct EcKeyFactory;

impl KeyFactory for EcKeyFactory {
    fn generate_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        let mut extras = Vec::new();
        let key_size = match get_opt_tag_value!(desc, KeySize)? {
            Some(sz) => *sz,
            None => {
                extras.try_push(KeyParam::KeySize(KeySizeInBits(ec::DEFAULT_KEY_SIZE)))?;
                KeySizeInBits(ec::DEFAULT_KEY_SIZE)
            }
        };
        let curve = ec::Curve::from_key_size(key_size)?;
        let material = imp.ec.generate_key(&mut *imp.rng, curve)?;
        Ok((material, extras))
    }

    fn import_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
        format: KeyFormat,
        data: &[u8],
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        if format != KeyFormat::Pkcs8 {
            return Err(km_err!(
                UnsupportedKeyFormat,
                "EC import expects PKCS8, got {:?}",
                format
            ));
        }
        let (material, curve) = imp.ec.import_pkcs8_key(data).map_err(algorithm_mismatch)?;

        let mut extras = Vec::new();
        match get_opt_tag_value!(desc, KeySize)? {
            Some(sz) if *sz != curve.key_size() => {
                return Err(km_err!(
                    ImportParameterMismatch,
                    "specified KEY_SIZE {:?} != curve size {:?}",
                    sz,
                    curve.key_size()
                ));
            }
            Some(_) => {}
            None => extras.try_push(KeyParam::KeySize(curve.key_size()))?,
        }
        synthesize_algorithm(&mut extras, desc, Algorithm::Ec)?;
        Ok((material, extras))
    }

    fn supported_import_formats(&self) -> &'static [KeyFormat] {
        &[KeyFormat::Pkcs8]
    }
    fn supported_export_formats(&self) -> &'static [KeyFormat] {
        &[KeyFormat::X509]
    }
}

/// AES key factory.
struct AesKeyFactory;

impl KeyFactory for AesKeyFactory {
    fn generate_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        let key_size = get_tag_value!(desc, KeySize, ErrorCode::UnsupportedKeySize)?;
        let variant = aes::Variant::new(key_size)?;
        let material = imp.aes.generate_key(&mut *imp.rng, variant)?;
        Ok((material, Vec::new()))
    }

    fn import_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
        format: KeyFormat,
        data: &[u8],
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        if format != KeyFormat::Raw {
            return Err(km_err!(
                UnsupportedKeyFormat,
                "AES import expects RAW, got {:?}",
                format
            ));
        }
        let (material, key_size) = imp.aes.import_key(data)?;
        symmetric_size_params(desc, key_size)
            .map(|extras| (material, extras))
    }

    fn supported_import_formats(&self) -> &'static [KeyFormat] {
        &[KeyFormat::Raw]
    }
    fn supported_export_formats(&self) -> &'static [KeyFormat] {
        &[]
    }
}

/// HMAC key factory.
struct HmacKeyFactory;

impl KeyFactory for HmacKeyFactory {
    fn generate_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        let key_size = get_tag_value!(desc, KeySize, ErrorCode::UnsupportedKeySize)?;
        let material = imp.hmac.generate_key(&mut *imp.rng, key_size)?;
        Ok((material, Vec::new()))
    }

    fn import_key(
        &self,
        imp: &mut crypto::Implementation<'_>,
        desc: &AuthorizationSet,
        format: KeyFormat,
        data: &[u8],
    ) -> Result<(KeyMaterial, Vec<KeyParam>), Error> {
        if format != KeyFormat::Raw {
            return Err(km_err!(
                UnsupportedKeyFormat,
                "HMAC import expects RAW, got {:?}",
                format
            ));
        }
        let (material, key_size) = imp.hmac.import_key(data)?;
        symmetric_size_params(desc, key_size)
            .map(|extras| (material, extras))
    }

    fn supported_import_formats(&self) -> &'static [KeyFormat] {
        &[KeyFormat::Raw]
    }
    fn supported_export_formats(&self) -> &'static [KeyFormat] {
        &[]
    }
}

/// Validate a specified `KEY_SIZE` against the intrinsic size of imported
/// symmetric key material, synthesizing it when absent.  The algorithm tag is
/// not synthesized here: raw import cannot infer it, so the dispatcher
/// requires it up front.
fn symmetric_size_params(
    desc: &AuthorizationSet,
    actual: KeySizeInBits,
) -> Result<Vec<KeyParam>, Error> {
    let mut extras = Vec::new();
    match get_opt_tag_value!(desc, KeySize)? {
        Some(sz) if *sz != actual => {
            return Err(km_err!(
                ImportParameterMismatch,
                "specified KEY_SIZE {:?} != {} bits of key data",
                sz,
                actual.0
            ));
        }
        Some(_) => {}
        None => extras.try_push(KeyParam::KeySize(actual))?,
    }
    Ok(extras)
}

/// A PKCS#8 import that finds key material of a different algorithm inside is
/// a parameter mismatch, not a provider failure.
fn algorithm_mismatch(e: Error) -> Error {
    match e {
        Error::Km(ErrorCode::IncompatibleAlgorithm, _) => {
            km_err!(ImportParameterMismatch, "specified ALGORITHM != imported key material")
        }
        e => e,
    }
}

/// Export a key's public half in the requested format.
pub fn export_key(
    imp: &crypto::Implementation<'_>,
    key: &Key,
    format: KeyFormat,
) -> Result<Vec<u8>, Error> {
    match (&key.material, format) {
        (KeyMaterial::Rsa(rsa_key), KeyFormat::X509) => imp.rsa.subject_public_key_info(rsa_key),
        (KeyMaterial::Ec(ec_key), KeyFormat::X509) => imp.ec.subject_public_key_info(ec_key),
        (KeyMaterial::Rsa(_), _) | (KeyMaterial::Ec(_), _) => Err(km_err!(
            UnsupportedKeyFormat,
            "public export is X509 only, got {:?}",
            format
        )),
        _ => Err(km_err!(
            UnsupportedKeyFormat,
            "{:?} keys are not exportable",
            key.material.algorithm()
        )),
    }
}
