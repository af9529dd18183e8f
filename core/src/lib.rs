//! Software keystore module core: the dispatcher for the module's public
//! operations, the operation table, and the key/operation factory
//! registries.

#![no_std]
extern crate alloc;

use alloc::vec::Vec;
use dkm_common::{
    crypto, get_opt_tag_value, get_tag_value, keyblob, km_err, tag, Error, FallibleAllocExt,
};
use dkm_wire::{
    self as wire, Algorithm, AuthorizationSet, BlockMode, Digest, ErrorCode, KeyFormat, KeyParam,
    PaddingMode, Purpose, Tag,
};
use log::{debug, error};

pub mod keys;
pub mod operation;
pub mod profile;


use keys::{Key, KeyFactoryRegistry};
use operation::{OpTableEntry, OperationFactoryRegistry};
use profile::{CreationMethod, Profile};

/// Number of concurrent operations supported.
pub const MAX_OPERATIONS: usize = 16;

/// The result of creating a key: the sealed blob plus the visible
/// authorization sets it carries.
#[derive(Debug)]
pub struct KeyCreation {
    pub key_blob: Vec<u8>,
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

/// The keystore module dispatcher.  Designed to be driven by a
/// single-threaded host loop: no method is reentrant and every call runs to
/// completion.
pub struct Keystore<'a> {
    imp: crypto::Implementation<'a>,
    profile: &'a dyn Profile,
    key_factories: KeyFactoryRegistry,
    op_factories: OperationFactoryRegistry,
    operations: Vec<Option<OpTableEntry>>,
}

impl<'a> Keystore<'a> {
    /// Create a new [`Keystore`] instance around the given crypto
    /// implementations and deployment profile.
    pub fn new(imp: crypto::Implementation<'a>, profile: &'a dyn Profile) -> Result<Self, Error> {
        Ok(Self {
            imp,
            profile,
            key_factories: KeyFactoryRegistry::new()?,
            op_factories: OperationFactoryRegistry::new()?,
            operations: (0..MAX_OPERATIONS).map(|_| None).collect(),
        })
    }

    /// The implementation version triple.
    pub fn get_version(&self) -> wire::GetVersionResponse {
        wire::GetVersionResponse {
            major_ver: wire::MAJOR_VERSION,
            minor_ver: wire::MINOR_VERSION,
            subminor_ver: wire::SUBMINOR_VERSION,
        }
    }

    /// Mix caller-provided entropy into the RNG.
    pub fn add_entropy(&mut self, data: &[u8]) {
        self.imp.rng.add_entropy(data);
    }

    /// The algorithms this module supports, in registry order.
    pub fn supported_algorithms(&self) -> Result<Vec<Algorithm>, Error> {
        let mut result = Vec::new();
        for algorithm in self.key_factories.algorithms() {
            result.try_push(algorithm)?;
        }
        Ok(result)
    }

    fn op_factory(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<&'static dyn operation::OperationFactory, Error> {
        if self.key_factories.get(algorithm).is_none() {
            return Err(km_err!(UnsupportedAlgorithm, "algorithm {:?} not supported", algorithm));
        }
        self.op_factories
            .get(algorithm, purpose)
            .ok_or_else(|| km_err!(UnsupportedPurpose, "no {:?} for {:?}", purpose, algorithm))
    }

    /// Block modes available for `(algorithm, purpose)`.
    pub fn supported_block_modes(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<Vec<BlockMode>, Error> {
        let mut result = Vec::new();
        result.try_extend_from_slice(self.op_factory(algorithm, purpose)?.supported_block_modes())?;
        Ok(result)
    }

    /// Padding modes available for `(algorithm, purpose)`.
    pub fn supported_padding_modes(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<Vec<PaddingMode>, Error> {
        let mut result = Vec::new();
        result.try_extend_from_slice(self.op_factory(algorithm, purpose)?.supported_paddings())?;
        Ok(result)
    }

    /// Digests available for `(algorithm, purpose)`.
    pub fn supported_digests(
        &self,
        algorithm: Algorithm,
        purpose: Purpose,
    ) -> Result<Vec<Digest>, Error> {
        let mut result = Vec::new();
        result.try_extend_from_slice(self.op_factory(algorithm, purpose)?.supported_digests())?;
        Ok(result)
    }

    /// Import formats available for `algorithm`.
    pub fn supported_import_formats(&self, algorithm: Algorithm) -> Result<Vec<KeyFormat>, Error> {
        let factory = self
            .key_factories
            .get(algorithm)
            .ok_or_else(|| km_err!(UnsupportedAlgorithm, "algorithm {:?} not supported", algorithm))?;
        let mut result = Vec::new();
        result.try_extend_from_slice(factory.supported_import_formats())?;
        Ok(result)
    }

    /// Export formats available for `algorithm`.
    pub fn supported_export_formats(&self, algorithm: Algorithm) -> Result<Vec<KeyFormat>, Error> {
        let factory = self
            .key_factories
            .get(algorithm)
            .ok_or_else(|| km_err!(UnsupportedAlgorithm, "algorithm {:?} not supported", algorithm))?;
        let mut result = Vec::new();
        result.try_extend_from_slice(factory.supported_export_formats())?;
        Ok(result)
    }

    /// Generate a fresh key from a key description, returning its sealed blob
    /// and visible characteristics.
    pub fn generate_key(&mut self, key_description: &AuthorizationSet) -> Result<KeyCreation, Error> {
        let algorithm =
            get_tag_value!(key_description, Algorithm, ErrorCode::UnsupportedAlgorithm)?;
        let factory = self
            .key_factories
            .get(algorithm)
            .ok_or_else(|| km_err!(UnsupportedAlgorithm, "algorithm {:?} not supported", algorithm))?;
        let (material, extras) = factory.generate_key(&mut self.imp, key_description)?;
        self.finish_key_creation(key_description, &extras, material, CreationMethod::Generate)
    }

    /// Import key material, returning its sealed blob and visible
    /// characteristics.
    pub fn import_key(
        &mut self,
        key_description: &AuthorizationSet,
        key_format: KeyFormat,
        key_data: &[u8],
    ) -> Result<KeyCreation, Error> {
        let algorithm = match get_opt_tag_value!(key_description, Algorithm)? {
            Some(algorithm) => *algorithm,
            None => self.probe_import_algorithm(key_format, key_data)?,
        };
        let factory = self
            .key_factories
            .get(algorithm)
            .ok_or_else(|| km_err!(UnsupportedAlgorithm, "algorithm {:?} not supported", algorithm))?;
        let (material, extras) =
            factory.import_key(&mut self.imp, key_description, key_format, key_data)?;
        self.finish_key_creation(key_description, &extras, material, CreationMethod::Import)
    }

    /// Determine the algorithm of import material whose description omits
    /// `ALGORITHM`.  Only self-describing formats can be probed.
    fn probe_import_algorithm(
        &mut self,
        key_format: KeyFormat,
        key_data: &[u8],
    ) -> Result<Algorithm, Error> {
        if key_format != KeyFormat::Pkcs8 {
            return Err(km_err!(
                UnsupportedAlgorithm,
                "no ALGORITHM given and {:?} data is not self-describing",
                key_format
            ));
        }
        if self.imp.rsa.import_pkcs8_key(key_data).is_ok() {
            return Ok(Algorithm::Rsa);
        }
        if self.imp.ec.import_pkcs8_key(key_data).is_ok() {
            return Ok(Algorithm::Ec);
        }
        Err(km_err!(InvalidArgument, "PKCS#8 data holds no recognized key"))
    }

    /// Split the key description into enforced, unenforced and hidden sets,
    /// stamp origin and creation time, and seal everything into a blob.
    fn finish_key_creation(
        &mut self,
        desc: &AuthorizationSet,
        extras: &[KeyParam],
        material: crypto::KeyMaterial,
        method: CreationMethod,
    ) -> Result<KeyCreation, Error> {
        let mut enforced = AuthorizationSet::new();
        let mut unenforced = AuthorizationSet::new();
        for param in desc.params().iter().chain(extras.iter()) {
            match param.tag() {
                // These cannot be specified by the caller.
                Tag::RootOfTrust | Tag::Origin => {
                    return Err(km_err!(
                        InvalidTag,
                        "{:?} may not appear in a key description",
                        param.tag()
                    ));
                }
                // Not available in the software profile.
                Tag::RollbackResistant => {
                    return Err(km_err!(UnsupportedTag, "rollback resistance unavailable"));
                }
                // Client-binding tags go to the hidden set only.
                Tag::ApplicationId | Tag::ApplicationData => {}
                _ => self.route_param(&mut enforced, &mut unenforced, param.clone())?,
            }
        }
        let now = self.imp.clock.now();
        self.route_param(&mut enforced, &mut unenforced, KeyParam::CreationDatetime(now.0))?;
        self.route_param(
            &mut enforced,
            &mut unenforced,
            KeyParam::Origin(self.profile.origin(method)),
        )?;

        let hidden = tag::hidden(desc, self.profile.root_of_trust())?;
        let mut nonce = [0u8; keyblob::NONCE_SIZE];
        self.profile.generate_nonce(&mut *self.imp.rng, &mut nonce);
        let key_blob = keyblob::seal(
            self.imp.aes,
            &self.profile.master_key(),
            nonce,
            material.raw_bytes(),
            &enforced,
            &unenforced,
            &hidden,
        )?;
        Ok(KeyCreation { key_blob, enforced, unenforced })
    }

    fn route_param(
        &self,
        enforced: &mut AuthorizationSet,
        unenforced: &mut AuthorizationSet,
        param: KeyParam,
    ) -> Result<(), Error> {
        if self.profile.is_enforced(param.tag()) {
            enforced.push_back(param)?;
        } else {
            unenforced.push_back(param)?;
        }
        Ok(())
    }

    /// Unseal a key blob (with the hidden set derived from the request
    /// parameters) and materialize the key.
    fn load_key(&self, key_blob: &[u8], params: &AuthorizationSet) -> Result<Key, Error> {
        let hidden = tag::hidden(params, self.profile.root_of_trust())?;
        let plaintext =
            keyblob::unseal(self.imp.aes, &self.profile.master_key(), key_blob, &hidden)?;
        keys::load_key(&plaintext)
    }

    /// Export a key's public half.
    pub fn export_key(
        &mut self,
        key_format: KeyFormat,
        key_blob: &[u8],
        params: &AuthorizationSet,
    ) -> Result<Vec<u8>, Error> {
        let key = self.load_key(key_blob, params)?;
        keys::export_key(&self.imp, &key, key_format)
    }

    /// Return the visible authorization sets of a key blob.  The blob is
    /// authenticated first, so a caller with the wrong client identity learns
    /// nothing beyond `INVALID_KEY_BLOB`.
    pub fn get_key_characteristics(
        &mut self,
        key_blob: &[u8],
        params: &AuthorizationSet,
    ) -> Result<(AuthorizationSet, AuthorizationSet), Error> {
        let hidden = tag::hidden(params, self.profile.root_of_trust())?;
        let plaintext =
            keyblob::unseal(self.imp.aes, &self.profile.master_key(), key_blob, &hidden)?;
        Ok((plaintext.enforced.clone(), plaintext.unenforced.clone()))
    }

    /// Process a single framed request, producing a serialized response
    /// envelope.  The command id arrives out-of-band (a transport concern);
    /// responses are serialized at the current message version.
    pub fn process(&mut self, cmd: u32, req_data: &[u8]) -> Vec<u8> {
        match self.process_req(cmd, req_data) {
            Ok(rsp_data) => rsp_data,
            Err(code) => {
                // An error envelope is four bytes; if even that cannot be
                // built there is nothing more to be done.
                wire::serialize_response::<wire::AbortOperationResponse>(Err(code))
                    .unwrap_or_default()
            }
        }
    }

    fn process_req(&mut self, cmd: u32, req_data: &[u8]) -> Result<Vec<u8>, ErrorCode> {
        debug!("-> process command {}: {} bytes", cmd, req_data.len());
        match cmd {
            wire::GET_VERSION => {
                let _req = parse::<wire::GetVersionRequest>(req_data)?;
                rsp(Ok(self.get_version()))
            }
            wire::ADD_ENTROPY => {
                let req = parse::<wire::AddEntropyRequest>(req_data)?;
                self.add_entropy(&req.random_data);
                rsp(Ok(wire::AddEntropyResponse {}))
            }
            wire::SUPPORTED_ALGORITHMS => {
                let _req = parse::<wire::SupportedAlgorithmsRequest>(req_data)?;
                rsp(self
                    .supported_algorithms()
                    .map(|algorithms| wire::SupportedAlgorithmsResponse { algorithms }))
            }
            wire::SUPPORTED_BLOCK_MODES => {
                let req = parse::<wire::SupportedBlockModesRequest>(req_data)?;
                rsp(self
                    .supported_block_modes(req.algorithm, req.purpose)
                    .map(|block_modes| wire::SupportedBlockModesResponse { block_modes }))
            }
            wire::SUPPORTED_PADDING_MODES => {
                let req = parse::<wire::SupportedPaddingModesRequest>(req_data)?;
                rsp(self
                    .supported_padding_modes(req.algorithm, req.purpose)
                    .map(|padding_modes| wire::SupportedPaddingModesResponse { padding_modes }))
            }
            wire::SUPPORTED_DIGESTS => {
                let req = parse::<wire::SupportedDigestsRequest>(req_data)?;
                rsp(self
                    .supported_digests(req.algorithm, req.purpose)
                    .map(|digests| wire::SupportedDigestsResponse { digests }))
            }
            wire::SUPPORTED_IMPORT_FORMATS => {
                let req = parse::<wire::SupportedImportFormatsRequest>(req_data)?;
                rsp(self
                    .supported_import_formats(req.algorithm)
                    .map(|formats| wire::SupportedImportFormatsResponse { formats }))
            }
            wire::SUPPORTED_EXPORT_FORMATS => {
                let req = parse::<wire::SupportedExportFormatsRequest>(req_data)?;
                rsp(self
                    .supported_export_formats(req.algorithm)
                    .map(|formats| wire::SupportedExportFormatsResponse { formats }))
            }
            wire::GENERATE_KEY => {
                let req = parse::<wire::GenerateKeyRequest>(req_data)?;
                rsp(self.generate_key(&req.key_description).map(|creation| {
                    wire::GenerateKeyResponse {
                        key_blob: creation.key_blob,
                        enforced: creation.enforced,
                        unenforced: creation.unenforced,
                    }
                }))
            }
            wire::IMPORT_KEY => {
                let req = parse::<wire::ImportKeyRequest>(req_data)?;
                rsp(self
                    .import_key(&req.key_description, req.key_format, &req.key_data)
                    .map(|creation| wire::ImportKeyResponse {
                        key_blob: creation.key_blob,
                        enforced: creation.enforced,
                        unenforced: creation.unenforced,
                    }))
            }
            wire::EXPORT_KEY => {
                let req = parse::<wire::ExportKeyRequest>(req_data)?;
                rsp(self
                    .export_key(req.key_format, &req.key_blob, &req.additional_params)
                    .map(|key_data| wire::ExportKeyResponse { key_data }))
            }
            wire::GET_KEY_CHARACTERISTICS => {
                let req = parse::<wire::GetKeyCharacteristicsRequest>(req_data)?;
                rsp(self
                    .get_key_characteristics(&req.key_blob, &req.additional_params)
                    .map(|(enforced, unenforced)| wire::GetKeyCharacteristicsResponse {
                        enforced,
                        unenforced,
                    }))
            }
            wire::BEGIN_OPERATION => {
                let req = parse::<wire::BeginOperationRequest>(req_data)?;
                rsp(self
                    .begin(req.purpose, &req.key_blob, &req.additional_params)
                    .map(|(op_handle, output_params)| wire::BeginOperationResponse {
                        op_handle,
                        output_params,
                    }))
            }
            wire::UPDATE_OPERATION => {
                let req = parse::<wire::UpdateOperationRequest>(req_data)?;
                rsp(self
                    .update(req.op_handle, &req.additional_params, &req.input)
                    .map(|(consumed, output)| wire::UpdateOperationResponse {
                        consumed: consumed as u32,
                        output,
                    }))
            }
            wire::FINISH_OPERATION => {
                let req = parse::<wire::FinishOperationRequest>(req_data)?;
                let signature =
                    if req.signature.is_empty() { None } else { Some(&req.signature[..]) };
                rsp(self
                    .finish(req.op_handle, &req.additional_params, signature)
                    .map(|output| wire::FinishOperationResponse { output }))
            }
            wire::ABORT_OPERATION => {
                let req = parse::<wire::AbortOperationRequest>(req_data)?;
                rsp(self.abort(req.op_handle).map(|_| wire::AbortOperationResponse {}))
            }
            _ => {
                error!("unknown command {}", cmd);
                Err(ErrorCode::Unimplemented)
            }
        }
    }
}

/// Parse a request body; parse failures are reported as `UNKNOWN_ERROR`.
fn parse<T: wire::Message>(data: &[u8]) -> Result<T, ErrorCode> {
    T::from_slice(data).map_err(|e| {
        error!("failed to parse request: {:?}", e);
        ErrorCode::UnknownError
    })
}

/// Serialize an operation outcome into a response envelope.
fn rsp<T: wire::Message>(result: Result<T, Error>) -> Result<Vec<u8>, ErrorCode> {
    let serialized = match result {
        Ok(body) => wire::serialize_response(Ok(&body)),
        Err(e) => {
            error!("failing request with error {:?}", e);
            wire::serialize_response::<T>(Err(e.into()))
        }
    };
    serialized.map_err(|_e| ErrorCode::UnknownError)
}
