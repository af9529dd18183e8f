//! Request and response messages for the module's public operations.
//!
//! Requests travel as bare bodies; which command a body belongs to is the
//! transport's concern (the command ids below are provided for hosts to
//! use).  Responses are wrapped in an envelope that leads with a `u32` error
//! code: when the code is non-zero the body is absent.

use crate::{
    AuthorizationSet, Error, ErrorCode, KeyFormat, Message, PaddingMode, Purpose,
};
use alloc::vec::Vec;
use dkm_derive::Message;
use zeroize::ZeroizeOnDrop;

use crate::types::{Algorithm, BlockMode, Digest};

/// Command identifiers, kept numerically compatible with the original
/// implementation for the commands it had.
pub const GENERATE_KEY: u32 = 0;
pub const BEGIN_OPERATION: u32 = 1;
pub const UPDATE_OPERATION: u32 = 2;
pub const FINISH_OPERATION: u32 = 3;
pub const ABORT_OPERATION: u32 = 4;
pub const IMPORT_KEY: u32 = 5;
pub const EXPORT_KEY: u32 = 6;
pub const GET_VERSION: u32 = 7;
pub const ADD_ENTROPY: u32 = 8;
pub const GET_KEY_CHARACTERISTICS: u32 = 9;
pub const SUPPORTED_ALGORITHMS: u32 = 10;
pub const SUPPORTED_BLOCK_MODES: u32 = 11;
pub const SUPPORTED_PADDING_MODES: u32 = 12;
pub const SUPPORTED_DIGESTS: u32 = 13;
pub const SUPPORTED_IMPORT_FORMATS: u32 = 14;
pub const SUPPORTED_EXPORT_FORMATS: u32 = 15;

/// Implementation version triple.
pub const MAJOR_VERSION: u8 = 1;
pub const MINOR_VERSION: u8 = 0;
pub const SUBMINOR_VERSION: u8 = 0;

/// Highest message version this implementation produces and understands.
pub const MAX_MESSAGE_VERSION: u32 = 1;

/// Map an implementation version triple to its message version.  Clients call
/// `GetVersion` (itself unversioned) and then speak only messages at a
/// version the server supports.
pub fn message_version(major: u8, minor: u8, subminor: u8) -> Option<u32> {
    match (major, minor, subminor) {
        (0, 0, 0) => Some(0),
        (1, 0, 0) => Some(1),
        _ => None,
    }
}

// Requests.

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct GetVersionRequest {}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct SupportedAlgorithmsRequest {}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct SupportedBlockModesRequest {
    pub algorithm: Algorithm,
    pub purpose: Purpose,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct SupportedPaddingModesRequest {
    pub algorithm: Algorithm,
    pub purpose: Purpose,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct SupportedDigestsRequest {
    pub algorithm: Algorithm,
    pub purpose: Purpose,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct SupportedImportFormatsRequest {
    pub algorithm: Algorithm,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct SupportedExportFormatsRequest {
    pub algorithm: Algorithm,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct AddEntropyRequest {
    pub random_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct GenerateKeyRequest {
    pub key_description: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct GetKeyCharacteristicsRequest {
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Message, ZeroizeOnDrop)]
pub struct ImportKeyRequest {
    #[zeroize(skip)]
    pub key_description: AuthorizationSet,
    #[zeroize(skip)]
    pub key_format: KeyFormat,
    pub key_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct ExportKeyRequest {
    pub key_format: KeyFormat,
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct BeginOperationRequest {
    pub purpose: Purpose,
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct UpdateOperationRequest {
    pub op_handle: u64,
    pub input: Vec<u8>,
    pub additional_params: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct FinishOperationRequest {
    pub op_handle: u64,
    pub signature: Vec<u8>,
    pub additional_params: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Message)]
pub struct AbortOperationRequest {
    pub op_handle: u64,
}

// Response bodies.  The error code lives in the envelope, not here.

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct GetVersionResponse {
    pub major_ver: u8,
    pub minor_ver: u8,
    pub subminor_ver: u8,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct SupportedAlgorithmsResponse {
    pub algorithms: Vec<Algorithm>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct SupportedBlockModesResponse {
    pub block_modes: Vec<BlockMode>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct SupportedPaddingModesResponse {
    pub padding_modes: Vec<PaddingMode>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct SupportedDigestsResponse {
    pub digests: Vec<Digest>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct SupportedImportFormatsResponse {
    pub formats: Vec<KeyFormat>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct SupportedExportFormatsResponse {
    pub formats: Vec<KeyFormat>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct AddEntropyResponse {}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct GenerateKeyResponse {
    pub key_blob: Vec<u8>,
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct GetKeyCharacteristicsResponse {
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct ImportKeyResponse {
    pub key_blob: Vec<u8>,
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct ExportKeyResponse {
    pub key_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct BeginOperationResponse {
    pub op_handle: u64,
    pub output_params: AuthorizationSet,
}

/// Result of an `update` call.  This is the one message whose layout changed
/// between message versions: version 0 omitted `consumed`.  The [`Message`]
/// implementation speaks the current version; version-0 peers are handled
/// with [`UpdateOperationResponse::serialize_v0_into`] and
/// [`UpdateOperationResponse::deserialize_v0`].
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct UpdateOperationResponse {
    pub consumed: u32,
    pub output: Vec<u8>,
}

impl Message for UpdateOperationResponse {
    fn serialized_size(&self) -> usize {
        4 + self.output.serialized_size()
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        self.consumed.serialize_into(buf)?;
        self.output.serialize_into(buf)
    }
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (consumed, data) = <u32>::deserialize(data)?;
        let (output, data) = <Vec<u8>>::deserialize(data)?;
        Ok((Self { consumed, output }, data))
    }
}

impl UpdateOperationResponse {
    /// Serialize for a version-0 peer: no `consumed` field.
    pub fn serialize_v0_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        self.output.serialize_into(buf)
    }

    /// Deserialize the given message version.
    pub fn deserialize_versioned(version: u32, data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if version == 0 {
            Self::deserialize_v0(data)
        } else {
            Self::deserialize(data)
        }
    }

    /// Deserialize a version-0 body.
    pub fn deserialize_v0(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (output, data) = <Vec<u8>>::deserialize(data)?;
        Ok((Self { consumed: 0, output }, data))
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct FinishOperationResponse {
    pub output: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Message)]
pub struct AbortOperationResponse {}

/// Serialize a response envelope: the error code then, only on success, the
/// body.
pub fn serialize_response<T: Message>(rsp: Result<&T, ErrorCode>) -> Result<Vec<u8>, Error> {
    match rsp {
        Ok(body) => {
            let mut buf = Vec::new();
            buf.try_reserve(4 + body.serialized_size()).map_err(|_e| Error::AllocationFailed)?;
            ErrorCode::Ok.serialize_into(&mut buf)?;
            body.serialize_into(&mut buf)?;
            Ok(buf)
        }
        Err(code) => {
            let mut buf = Vec::new();
            buf.try_reserve(4).map_err(|_e| Error::AllocationFailed)?;
            code.serialize_into(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Parse a response envelope.  An error-bearing envelope must have an empty
/// body.
pub fn deserialize_response<T: Message>(data: &[u8]) -> Result<Result<T, ErrorCode>, Error> {
    let (code, rest) = ErrorCode::deserialize(data)?;
    if code == ErrorCode::Ok {
        Ok(Ok(T::from_slice(rest)?))
    } else if rest.is_empty() {
        Ok(Err(code))
    } else {
        Err(Error::ExcessData(rest.len()))
    }
}
