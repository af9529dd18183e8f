//! Tags, typed key parameters and authorization sets.

use crate::{wire_enum, Error, Message};
use alloc::vec::Vec;
use enumn::N;

/// Key size in bits.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeySizeInBits(pub u32);

/// RSA public exponent.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RsaExponent(pub u64);

/// Tag value types, encoded in the top four bits of a raw tag.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum TagType {
    Invalid = 0x0000_0000,
    Enum = 0x1000_0000,
    EnumRep = 0x2000_0000,
    Uint = 0x3000_0000,
    UintRep = 0x4000_0000,
    Ulong = 0x5000_0000,
    Date = 0x6000_0000,
    Bool = 0x7000_0000,
    Bignum = 0x8000_0000,
    Bytes = 0x9000_0000,
}

impl TagType {
    /// Whether tags of this type may appear more than once in a set.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, TagType::EnumRep | TagType::UintRep)
    }
}

/// Extract the [`TagType`] from a raw tag value.
pub fn tag_type(raw_tag: u32) -> TagType {
    TagType::n(raw_tag & 0xf000_0000).unwrap_or(TagType::Invalid)
}

/// Known tags.  The raw value combines the tag type (top four bits) with the
/// tag identity.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum Tag {
    Invalid = 0x0000_0000,
    Purpose = 0x2000_0001,
    Algorithm = 0x1000_0002,
    KeySize = 0x3000_0003,
    BlockMode = 0x2000_0004,
    Digest = 0x2000_0005,
    Padding = 0x2000_0006,
    CallerNonce = 0x7000_0007,
    ChunkLength = 0x3000_0008,
    MacLength = 0x3000_0009,
    RescopingAdd = 0x2000_0065,
    RescopingDel = 0x2000_0066,
    RsaPublicExponent = 0x5000_00c8,
    DsaGenerator = 0x8000_00c9,
    DsaP = 0x8000_00ca,
    DsaQ = 0x8000_00cb,
    ActiveDatetime = 0x6000_0190,
    OriginationExpireDatetime = 0x6000_0191,
    UsageExpireDatetime = 0x6000_0192,
    MinSecondsBetweenOps = 0x3000_0193,
    MaxUsesPerBoot = 0x3000_0194,
    AllUsers = 0x7000_01f4,
    UserId = 0x3000_01f5,
    UserAuthId = 0x3000_01f6,
    NoAuthRequired = 0x7000_01f7,
    AuthTimeout = 0x3000_01f8,
    AllApplications = 0x7000_0258,
    ApplicationId = 0x9000_0259,
    ApplicationData = 0x9000_02bc,
    CreationDatetime = 0x6000_02bd,
    Origin = 0x1000_02be,
    RollbackResistant = 0x7000_02bf,
    RootOfTrust = 0x9000_02c0,
    Nonce = 0x9000_03e9,
}

impl Tag {
    /// The value type carried by this tag.
    pub fn tag_type(&self) -> TagType {
        tag_type(*self as u32)
    }
}

/// Key algorithms.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, N)]
pub enum Algorithm {
    Rsa = 1,
    Dsa = 2,
    Ec = 3,
    Aes = 32,
    Hmac = 128,
}
wire_enum! { Algorithm }

/// Purposes a key operation can be created for.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, N)]
pub enum Purpose {
    Encrypt = 0,
    Decrypt = 1,
    Sign = 2,
    Verify = 3,
}
wire_enum! { Purpose }

/// Symmetric cipher block modes.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum BlockMode {
    Ecb = 1,
    Cbc = 2,
    Cfb = 3,
    Ofb = 4,
    Ocb = 36,
}
wire_enum! { BlockMode }

/// Padding modes.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum PaddingMode {
    None = 1,
    RsaOaep = 2,
    RsaPss = 3,
    RsaPkcs115Encrypt = 4,
    RsaPkcs115Sign = 5,
    Pkcs7 = 64,
}
wire_enum! { PaddingMode }

/// Digests.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum Digest {
    None = 0,
    Md5 = 1,
    Sha1 = 2,
    Sha224 = 3,
    Sha256 = 4,
    Sha384 = 5,
    Sha512 = 6,
}
wire_enum! { Digest }

/// Formats for imported and exported key material.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum KeyFormat {
    X509 = 0,
    Pkcs8 = 1,
    Raw = 3,
}
wire_enum! { KeyFormat }

/// How a key came into existence.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum KeyOrigin {
    Generated = 0,
    Imported = 1,
}
wire_enum! { KeyOrigin }

/// Error codes returned in every response envelope.  Values match the
/// original C implementation; `Ok` is zero and all failures are negative.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, N)]
pub enum ErrorCode {
    Ok = 0,
    UnsupportedPurpose = -2,
    IncompatiblePurpose = -3,
    UnsupportedAlgorithm = -4,
    IncompatibleAlgorithm = -5,
    UnsupportedKeySize = -6,
    UnsupportedBlockMode = -7,
    IncompatibleBlockMode = -8,
    UnsupportedMacLength = -9,
    UnsupportedPaddingMode = -10,
    IncompatiblePaddingMode = -11,
    UnsupportedDigest = -12,
    IncompatibleDigest = -13,
    UnsupportedKeyFormat = -17,
    IncompatibleKeyFormat = -18,
    InvalidInputLength = -21,
    KeyUserNotAuthenticated = -26,
    OutputParameterNull = -27,
    InvalidOperationHandle = -28,
    InsufficientBufferSpace = -29,
    VerificationFailed = -30,
    TooManyOperations = -31,
    InvalidKeyBlob = -33,
    InvalidArgument = -38,
    UnsupportedTag = -39,
    InvalidTag = -40,
    MemoryAllocationFailed = -41,
    InvalidDsaParams = -43,
    ImportParameterMismatch = -44,
    UnsupportedEcField = -50,
    Unimplemented = -100,
    VersionMismatch = -101,
    UnknownError = -1000,
}

impl Message for ErrorCode {
    fn serialized_size(&self) -> usize {
        4
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        (*self as i32 as u32).serialize_into(buf)
    }
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (v, rest) = <u32>::deserialize(data)?;
        let code = ErrorCode::n(v as i32).ok_or(Error::InvalidEnumValue(v))?;
        Ok((code, rest))
    }
}

/// Payload of a tag whose identity is not known to this implementation.  The
/// value shape follows the type encoded in the raw tag; tags with an invalid
/// type nibble carry a best-effort `u32`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnknownValue {
    Int(u32),
    Long(u64),
    Bool(u8),
    Bytes(Vec<u8>),
}

/// One typed authorization: a tag together with the value type that tag
/// demands.  Attaching the wrong value type to a tag is unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyParam {
    Purpose(Purpose),
    Algorithm(Algorithm),
    KeySize(KeySizeInBits),
    BlockMode(BlockMode),
    Digest(Digest),
    Padding(PaddingMode),
    CallerNonce,
    ChunkLength(u32),
    MacLength(u32),
    RescopingAdd(u32),
    RescopingDel(u32),
    RsaPublicExponent(RsaExponent),
    DsaGenerator(Vec<u8>),
    DsaP(Vec<u8>),
    DsaQ(Vec<u8>),
    ActiveDatetime(u64),
    OriginationExpireDatetime(u64),
    UsageExpireDatetime(u64),
    MinSecondsBetweenOps(u32),
    MaxUsesPerBoot(u32),
    AllUsers,
    UserId(u32),
    UserAuthId(u32),
    NoAuthRequired,
    AuthTimeout(u32),
    AllApplications,
    ApplicationId(Vec<u8>),
    ApplicationData(Vec<u8>),
    CreationDatetime(u64),
    Origin(KeyOrigin),
    RollbackResistant,
    RootOfTrust(Vec<u8>),
    Nonce(Vec<u8>),
    Unknown(u32, UnknownValue),
}

/// Borrowed view of a parameter's wire payload.
enum WireValue<'a> {
    U32(u32),
    U64(u64),
    Bool(u8),
    Blob(&'a [u8]),
}

impl KeyParam {
    /// The tag for this parameter; [`Tag::Invalid`] for unknown tags.
    pub fn tag(&self) -> Tag {
        match self {
            KeyParam::Purpose(_) => Tag::Purpose,
            KeyParam::Algorithm(_) => Tag::Algorithm,
            KeyParam::KeySize(_) => Tag::KeySize,
            KeyParam::BlockMode(_) => Tag::BlockMode,
            KeyParam::Digest(_) => Tag::Digest,
            KeyParam::Padding(_) => Tag::Padding,
            KeyParam::CallerNonce => Tag::CallerNonce,
            KeyParam::ChunkLength(_) => Tag::ChunkLength,
            KeyParam::MacLength(_) => Tag::MacLength,
            KeyParam::RescopingAdd(_) => Tag::RescopingAdd,
            KeyParam::RescopingDel(_) => Tag::RescopingDel,
            KeyParam::RsaPublicExponent(_) => Tag::RsaPublicExponent,
            KeyParam::DsaGenerator(_) => Tag::DsaGenerator,
            KeyParam::DsaP(_) => Tag::DsaP,
            KeyParam::DsaQ(_) => Tag::DsaQ,
            KeyParam::ActiveDatetime(_) => Tag::ActiveDatetime,
            KeyParam::OriginationExpireDatetime(_) => Tag::OriginationExpireDatetime,
            KeyParam::UsageExpireDatetime(_) => Tag::UsageExpireDatetime,
            KeyParam::MinSecondsBetweenOps(_) => Tag::MinSecondsBetweenOps,
            KeyParam::MaxUsesPerBoot(_) => Tag::MaxUsesPerBoot,
            KeyParam::AllUsers => Tag::AllUsers,
            KeyParam::UserId(_) => Tag::UserId,
            KeyParam::UserAuthId(_) => Tag::UserAuthId,
            KeyParam::NoAuthRequired => Tag::NoAuthRequired,
            KeyParam::AuthTimeout(_) => Tag::AuthTimeout,
            KeyParam::AllApplications => Tag::AllApplications,
            KeyParam::ApplicationId(_) => Tag::ApplicationId,
            KeyParam::ApplicationData(_) => Tag::ApplicationData,
            KeyParam::CreationDatetime(_) => Tag::CreationDatetime,
            KeyParam::Origin(_) => Tag::Origin,
            KeyParam::RollbackResistant => Tag::RollbackResistant,
            KeyParam::RootOfTrust(_) => Tag::RootOfTrust,
            KeyParam::Nonce(_) => Tag::Nonce,
            KeyParam::Unknown(_, _) => Tag::Invalid,
        }
    }

    /// The raw tag value as it appears on the wire.
    pub fn raw_tag(&self) -> u32 {
        match self {
            KeyParam::Unknown(raw, _) => *raw,
            _ => self.tag() as u32,
        }
    }

    fn wire_value(&self) -> WireValue<'_> {
        match self {
            KeyParam::Purpose(v) => WireValue::U32(*v as u32),
            KeyParam::Algorithm(v) => WireValue::U32(*v as u32),
            KeyParam::KeySize(v) => WireValue::U32(v.0),
            KeyParam::BlockMode(v) => WireValue::U32(*v as u32),
            KeyParam::Digest(v) => WireValue::U32(*v as u32),
            KeyParam::Padding(v) => WireValue::U32(*v as u32),
            KeyParam::ChunkLength(v)
            | KeyParam::MacLength(v)
            | KeyParam::RescopingAdd(v)
            | KeyParam::RescopingDel(v)
            | KeyParam::MinSecondsBetweenOps(v)
            | KeyParam::MaxUsesPerBoot(v)
            | KeyParam::UserId(v)
            | KeyParam::UserAuthId(v)
            | KeyParam::AuthTimeout(v) => WireValue::U32(*v),
            KeyParam::RsaPublicExponent(v) => WireValue::U64(v.0),
            KeyParam::ActiveDatetime(v)
            | KeyParam::OriginationExpireDatetime(v)
            | KeyParam::UsageExpireDatetime(v)
            | KeyParam::CreationDatetime(v) => WireValue::U64(*v),
            KeyParam::CallerNonce
            | KeyParam::AllUsers
            | KeyParam::NoAuthRequired
            | KeyParam::AllApplications
            | KeyParam::RollbackResistant => WireValue::Bool(1),
            KeyParam::Origin(v) => WireValue::U32(*v as u32),
            KeyParam::DsaGenerator(v)
            | KeyParam::DsaP(v)
            | KeyParam::DsaQ(v)
            | KeyParam::ApplicationId(v)
            | KeyParam::ApplicationData(v)
            | KeyParam::RootOfTrust(v)
            | KeyParam::Nonce(v) => WireValue::Blob(v),
            KeyParam::Unknown(_, UnknownValue::Int(v)) => WireValue::U32(*v),
            KeyParam::Unknown(_, UnknownValue::Long(v)) => WireValue::U64(*v),
            KeyParam::Unknown(_, UnknownValue::Bool(v)) => WireValue::Bool(*v),
            KeyParam::Unknown(_, UnknownValue::Bytes(v)) => WireValue::Blob(v),
        }
    }

    /// Bytes of a BYTES/BIGNUM payload, if this parameter has one.
    pub fn blob_value(&self) -> Option<&[u8]> {
        match self.wire_value() {
            WireValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Build a typed parameter from a raw tag and its decoded wire payload.
    fn from_wire(raw_tag: u32, value: UnknownValue) -> Result<KeyParam, Error> {
        let invalid = Error::MalformedData;
        Ok(match Tag::n(raw_tag) {
            Some(Tag::Purpose) => match value {
                UnknownValue::Int(v) => KeyParam::Purpose(Purpose::try_from(v)?),
                _ => return Err(invalid),
            },
            Some(Tag::Algorithm) => match value {
                UnknownValue::Int(v) => KeyParam::Algorithm(Algorithm::try_from(v)?),
                _ => return Err(invalid),
            },
            Some(Tag::KeySize) => match value {
                UnknownValue::Int(v) => KeyParam::KeySize(KeySizeInBits(v)),
                _ => return Err(invalid),
            },
            Some(Tag::BlockMode) => match value {
                UnknownValue::Int(v) => KeyParam::BlockMode(BlockMode::try_from(v)?),
                _ => return Err(invalid),
            },
            Some(Tag::Digest) => match value {
                UnknownValue::Int(v) => KeyParam::Digest(Digest::try_from(v)?),
                _ => return Err(invalid),
            },
            Some(Tag::Padding) => match value {
                UnknownValue::Int(v) => KeyParam::Padding(PaddingMode::try_from(v)?),
                _ => return Err(invalid),
            },
            // Bool tags are presence markers; the only valid payload byte is
            // one, so that every serialized byte is significant.
            Some(Tag::CallerNonce) => match value {
                UnknownValue::Bool(1) => KeyParam::CallerNonce,
                _ => return Err(invalid),
            },
            Some(Tag::ChunkLength) => match value {
                UnknownValue::Int(v) => KeyParam::ChunkLength(v),
                _ => return Err(invalid),
            },
            Some(Tag::MacLength) => match value {
                UnknownValue::Int(v) => KeyParam::MacLength(v),
                _ => return Err(invalid),
            },
            Some(Tag::RescopingAdd) => match value {
                UnknownValue::Int(v) => KeyParam::RescopingAdd(v),
                _ => return Err(invalid),
            },
            Some(Tag::RescopingDel) => match value {
                UnknownValue::Int(v) => KeyParam::RescopingDel(v),
                _ => return Err(invalid),
            },
            Some(Tag::RsaPublicExponent) => match value {
                UnknownValue::Long(v) => KeyParam::RsaPublicExponent(RsaExponent(v)),
                _ => return Err(invalid),
            },
            Some(Tag::DsaGenerator) => match value {
                UnknownValue::Bytes(v) => KeyParam::DsaGenerator(v),
                _ => return Err(invalid),
            },
            Some(Tag::DsaP) => match value {
                UnknownValue::Bytes(v) => KeyParam::DsaP(v),
                _ => return Err(invalid),
            },
            Some(Tag::DsaQ) => match value {
                UnknownValue::Bytes(v) => KeyParam::DsaQ(v),
                _ => return Err(invalid),
            },
            Some(Tag::ActiveDatetime) => match value {
                UnknownValue::Long(v) => KeyParam::ActiveDatetime(v),
                _ => return Err(invalid),
            },
            Some(Tag::OriginationExpireDatetime) => match value {
                UnknownValue::Long(v) => KeyParam::OriginationExpireDatetime(v),
                _ => return Err(invalid),
            },
            Some(Tag::UsageExpireDatetime) => match value {
                UnknownValue::Long(v) => KeyParam::UsageExpireDatetime(v),
                _ => return Err(invalid),
            },
            Some(Tag::MinSecondsBetweenOps) => match value {
                UnknownValue::Int(v) => KeyParam::MinSecondsBetweenOps(v),
                _ => return Err(invalid),
            },
            Some(Tag::MaxUsesPerBoot) => match value {
                UnknownValue::Int(v) => KeyParam::MaxUsesPerBoot(v),
                _ => return Err(invalid),
            },
            Some(Tag::AllUsers) => match value {
                UnknownValue::Bool(1) => KeyParam::AllUsers,
                _ => return Err(invalid),
            },
            Some(Tag::UserId) => match value {
                UnknownValue::Int(v) => KeyParam::UserId(v),
                _ => return Err(invalid),
            },
            Some(Tag::UserAuthId) => match value {
                UnknownValue::Int(v) => KeyParam::UserAuthId(v),
                _ => return Err(invalid),
            },
            Some(Tag::NoAuthRequired) => match value {
                UnknownValue::Bool(1) => KeyParam::NoAuthRequired,
                _ => return Err(invalid),
            },
            Some(Tag::AuthTimeout) => match value {
                UnknownValue::Int(v) => KeyParam::AuthTimeout(v),
                _ => return Err(invalid),
            },
            Some(Tag::AllApplications) => match value {
                UnknownValue::Bool(1) => KeyParam::AllApplications,
                _ => return Err(invalid),
            },
            Some(Tag::ApplicationId) => match value {
                UnknownValue::Bytes(v) => KeyParam::ApplicationId(v),
                _ => return Err(invalid),
            },
            Some(Tag::ApplicationData) => match value {
                UnknownValue::Bytes(v) => KeyParam::ApplicationData(v),
                _ => return Err(invalid),
            },
            Some(Tag::CreationDatetime) => match value {
                UnknownValue::Long(v) => KeyParam::CreationDatetime(v),
                _ => return Err(invalid),
            },
            Some(Tag::Origin) => match value {
                UnknownValue::Int(v) => KeyParam::Origin(KeyOrigin::try_from(v)?),
                _ => return Err(invalid),
            },
            Some(Tag::RollbackResistant) => match value {
                UnknownValue::Bool(1) => KeyParam::RollbackResistant,
                _ => return Err(invalid),
            },
            Some(Tag::RootOfTrust) => match value {
                UnknownValue::Bytes(v) => KeyParam::RootOfTrust(v),
                _ => return Err(invalid),
            },
            Some(Tag::Nonce) => match value {
                UnknownValue::Bytes(v) => KeyParam::Nonce(v),
                _ => return Err(invalid),
            },
            Some(Tag::Invalid) | None => KeyParam::Unknown(raw_tag, value),
        })
    }
}

/// Serialization order of the tag-type groups.
const TYPE_GROUP_ORDER: &[TagType] = &[
    TagType::Enum,
    TagType::EnumRep,
    TagType::Uint,
    TagType::UintRep,
    TagType::Ulong,
    TagType::Date,
    TagType::Bool,
    TagType::Bignum,
    TagType::Bytes,
    TagType::Invalid,
];

/// An ordered multiset of authorizations.  Insertion order is preserved for
/// iteration; the wire form groups entries by value type and deduplicates
/// non-repeatable tags, so equality is defined over the multiset rather than
/// the sequence.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationSet {
    params: Vec<KeyParam>,
}

impl AuthorizationSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Create a set holding copies of the given parameters.
    pub fn from_params(params: &[KeyParam]) -> Result<Self, Error> {
        let mut result = Vec::new();
        result.try_reserve(params.len()).map_err(|_e| Error::AllocationFailed)?;
        result.extend_from_slice(params);
        Ok(Self { params: result })
    }

    /// Append a parameter, reporting allocation failure.
    pub fn push_back(&mut self, param: KeyParam) -> Result<(), Error> {
        self.params.try_reserve(1).map_err(|_e| Error::AllocationFailed)?;
        self.params.push(param);
        Ok(())
    }

    /// Append copies of all parameters in `params`.
    pub fn extend_from(&mut self, params: &[KeyParam]) -> Result<(), Error> {
        self.params.try_reserve(params.len()).map_err(|_e| Error::AllocationFailed)?;
        self.params.extend_from_slice(params);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[KeyParam] {
        &self.params
    }

    /// Position of the next parameter with the given tag after `after`, if
    /// any.  Pass `None` to search from the start.
    pub fn find(&self, tag: Tag, after: Option<usize>) -> Option<usize> {
        let start = after.map(|idx| idx + 1).unwrap_or(0);
        self.params[start..].iter().position(|p| p.tag() == tag).map(|pos| start + pos)
    }

    /// Whether any parameter with the given tag is present.
    pub fn contains_tag(&self, tag: Tag) -> bool {
        self.find(tag, None).is_some()
    }

    /// The entries in wire order: grouped by tag type with non-repeatable
    /// tags deduplicated (first occurrence wins).
    fn wire_entries(&self) -> Result<Vec<&KeyParam>, Error> {
        let mut entries = Vec::new();
        entries.try_reserve(self.params.len()).map_err(|_e| Error::AllocationFailed)?;
        for group in TYPE_GROUP_ORDER {
            for (idx, param) in self.params.iter().enumerate() {
                let raw = param.raw_tag();
                if tag_type(raw) != *group {
                    continue;
                }
                if !tag_type(raw).is_repeatable()
                    && self.params[..idx].iter().any(|p| p.raw_tag() == raw)
                {
                    // Non-repeatable duplicate; the first occurrence covers it.
                    continue;
                }
                entries.push(param);
            }
        }
        Ok(entries)
    }
}

impl core::ops::Index<usize> for AuthorizationSet {
    type Output = KeyParam;
    fn index(&self, index: usize) -> &KeyParam {
        &self.params[index]
    }
}

impl<'a> IntoIterator for &'a AuthorizationSet {
    type Item = &'a KeyParam;
    type IntoIter = core::slice::Iter<'a, KeyParam>;
    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

impl From<Vec<KeyParam>> for AuthorizationSet {
    fn from(params: Vec<KeyParam>) -> Self {
        Self { params }
    }
}

/// Equality over the multiset of authorizations, ignoring order.
impl PartialEq for AuthorizationSet {
    fn eq(&self, other: &Self) -> bool {
        if self.params.len() != other.params.len() {
            return false;
        }
        self.params.iter().all(|p| {
            let mine = self.params.iter().filter(|q| *q == p).count();
            let theirs = other.params.iter().filter(|q| *q == p).count();
            mine == theirs
        })
    }
}

impl Eq for AuthorizationSet {}

impl Message for AuthorizationSet {
    fn serialized_size(&self) -> usize {
        let entries = match self.wire_entries() {
            Ok(e) => e,
            Err(_) => return 0,
        };
        let mut size = 4 + 4; // indirect length + entry count
        for entry in &entries {
            size += 4; // tag
            match entry.wire_value() {
                WireValue::U32(_) => size += 4,
                WireValue::U64(_) => size += 8,
                WireValue::Bool(_) => size += 1,
                // (length, offset) pair plus the bytes in the indirect region.
                WireValue::Blob(b) => size += 8 + b.len(),
            }
        }
        size
    }

    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let entries = self.wire_entries()?;
        let ind_len: usize = entries.iter().filter_map(|e| e.blob_value()).map(|b| b.len()).sum();
        buf.try_reserve(self.serialized_size()).map_err(|_e| Error::AllocationFailed)?;

        (ind_len as u32).serialize_into(buf)?;
        for entry in &entries {
            if let Some(blob) = entry.blob_value() {
                buf.extend_from_slice(blob);
            }
        }

        (entries.len() as u32).serialize_into(buf)?;
        let mut offset = 0u32;
        for entry in &entries {
            entry.raw_tag().serialize_into(buf)?;
            match entry.wire_value() {
                WireValue::U32(v) => v.serialize_into(buf)?,
                WireValue::U64(v) => v.serialize_into(buf)?,
                WireValue::Bool(v) => v.serialize_into(buf)?,
                WireValue::Blob(b) => {
                    (b.len() as u32).serialize_into(buf)?;
                    offset.serialize_into(buf)?;
                    offset += b.len() as u32;
                }
            }
        }
        Ok(())
    }

    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (ind_len, rest) = <u32>::deserialize(data)?;
        let ind_len = ind_len as usize;
        if rest.len() < ind_len {
            return Err(Error::DataTruncated);
        }
        let (indirect, rest) = rest.split_at(ind_len);

        let (count, mut rest) = <u32>::deserialize(rest)?;
        let count = count as usize;
        // The smallest possible entry is a tag plus a one-byte bool payload.
        if count > rest.len() / 5 {
            return Err(Error::DataTruncated);
        }

        let mut params = Vec::new();
        params.try_reserve(count).map_err(|_e| Error::AllocationFailed)?;
        let mut covered = 0usize;
        for _ in 0..count {
            let (raw_tag, r) = <u32>::deserialize(rest)?;
            let (value, r) = match tag_type(raw_tag) {
                TagType::Enum | TagType::EnumRep | TagType::Uint | TagType::UintRep => {
                    let (v, r) = <u32>::deserialize(r)?;
                    (UnknownValue::Int(v), r)
                }
                TagType::Ulong | TagType::Date => {
                    let (v, r) = <u64>::deserialize(r)?;
                    (UnknownValue::Long(v), r)
                }
                TagType::Bool => {
                    let (v, r) = <u8>::deserialize(r)?;
                    (UnknownValue::Bool(v), r)
                }
                TagType::Bignum | TagType::Bytes => {
                    let (len, r) = <u32>::deserialize(r)?;
                    let (offset, r) = <u32>::deserialize(r)?;
                    let (len, offset) = (len as usize, offset as usize);
                    if offset > ind_len || len > ind_len - offset {
                        return Err(Error::MalformedData);
                    }
                    let mut blob = Vec::new();
                    blob.try_reserve(len).map_err(|_e| Error::AllocationFailed)?;
                    blob.extend_from_slice(&indirect[offset..offset + len]);
                    covered += len;
                    (UnknownValue::Bytes(blob), r)
                }
                TagType::Invalid => {
                    let (v, r) = <u32>::deserialize(r)?;
                    (UnknownValue::Int(v), r)
                }
            };
            params.push(KeyParam::from_wire(raw_tag, value)?);
            rest = r;
        }
        if covered != ind_len {
            // Indirect data not fully claimed by the entries.
            return Err(Error::MalformedData);
        }
        Ok((Self { params }, rest))
    }
}
