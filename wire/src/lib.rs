//! Types and serialization for messages crossing the keystore module
//! boundary.
//!
//! Everything on the wire is length-prefixed little-endian: `u32`/`u64` are 4
//! and 8 bytes, byte strings are a `u32` length followed by that many bytes,
//! and arrays of fixed-width values are a `u32` count followed by the values.
//! Deserialization is bounded by the supplied slice and never reads past its
//! end.

#![no_std]
extern crate alloc;

use alloc::vec::Vec;

pub mod messages;
pub mod types;
pub use messages::*;
pub use types::*;


/// Errors encountered when [de-]serializing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Ran out of input before the value was complete.
    DataTruncated,
    /// Input had the given number of bytes left over after parsing.
    ExcessData(usize),
    /// Allocation failed while building a value.
    AllocationFailed,
    /// Integer value that doesn't match any allowed enum value.
    InvalidEnumValue(u32),
    /// Structurally invalid data (bad lengths or offsets).
    MalformedData,
}

/// Trait for types with a stable byte layout on the module boundary.
pub trait Message: Sized {
    /// Size in bytes of the serialized form.
    fn serialized_size(&self) -> usize;

    /// Append the serialized form to `buf`.
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error>;

    /// Parse a value from the front of `data`, returning it together with the
    /// unconsumed remainder.
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error>;

    /// Serialize to a fresh vector.
    fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        buf.try_reserve(self.serialized_size()).map_err(|_e| Error::AllocationFailed)?;
        self.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Parse a value that must occupy the whole of `data`.
    fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let (msg, rest) = Self::deserialize(data)?;
        if !rest.is_empty() {
            return Err(Error::ExcessData(rest.len()));
        }
        Ok(msg)
    }
}

impl Message for u8 {
    fn serialized_size(&self) -> usize {
        1
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(1).map_err(|_e| Error::AllocationFailed)?;
        buf.push(*self);
        Ok(())
    }
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.is_empty() {
            return Err(Error::DataTruncated);
        }
        Ok((data[0], &data[1..]))
    }
}

impl Message for u32 {
    fn serialized_size(&self) -> usize {
        4
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(4).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.len() < 4 {
            return Err(Error::DataTruncated);
        }
        let int_data: [u8; 4] = data[..4].try_into().map_err(|_e| Error::DataTruncated)?;
        Ok((u32::from_le_bytes(int_data), &data[4..]))
    }
}

impl Message for u64 {
    fn serialized_size(&self) -> usize {
        8
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(8).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.len() < 8 {
            return Err(Error::DataTruncated);
        }
        let int_data: [u8; 8] = data[..8].try_into().map_err(|_e| Error::DataTruncated)?;
        Ok((u64::from_le_bytes(int_data), &data[8..]))
    }
}

impl Message for Vec<u8> {
    fn serialized_size(&self) -> usize {
        4 + self.len()
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(4 + self.len()).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        buf.extend_from_slice(self);
        Ok(())
    }
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (len, rest) = <u32>::deserialize(data)?;
        let len = len as usize;
        if rest.len() < len {
            return Err(Error::DataTruncated);
        }
        let mut buf = Vec::new();
        buf.try_reserve(len).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&rest[..len]);
        Ok((buf, &rest[len..]))
    }
}

/// Fixed-width byte arrays serialize raw, with no length prefix.
impl<const N: usize> Message for [u8; N] {
    fn serialized_size(&self) -> usize {
        N
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(N).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(self);
        Ok(())
    }
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.len() < N {
            return Err(Error::DataTruncated);
        }
        let arr: [u8; N] = data[..N].try_into().map_err(|_e| Error::DataTruncated)?;
        Ok((arr, &data[N..]))
    }
}

/// Macro that emits `TryFrom<u32>` and [`Message`] implementations for a
/// fieldless `u32`-repr enum with `#[derive(N)]` attached, plus a counted
/// array implementation for `Vec` of the enum.
#[macro_export]
macro_rules! wire_enum {
    { $ename:ident } => {
        impl core::convert::TryFrom<u32> for $ename {
            type Error = $crate::Error;
            fn try_from(value: u32) -> Result<Self, Self::Error> {
                Self::n(value).ok_or($crate::Error::InvalidEnumValue(value))
            }
        }
        impl $crate::Message for $ename {
            fn serialized_size(&self) -> usize {
                4
            }
            fn serialize_into(&self, buf: &mut alloc::vec::Vec<u8>) -> Result<(), $crate::Error> {
                $crate::Message::serialize_into(&(*self as u32), buf)
            }
            fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), $crate::Error> {
                let (v, rest) = <u32 as $crate::Message>::deserialize(data)?;
                Ok((Self::try_from(v)?, rest))
            }
        }
        impl $crate::Message for alloc::vec::Vec<$ename> {
            fn serialized_size(&self) -> usize {
                4 + 4 * self.len()
            }
            fn serialize_into(&self, buf: &mut alloc::vec::Vec<u8>) -> Result<(), $crate::Error> {
                buf.try_reserve(4 + 4 * self.len()).map_err(|_e| $crate::Error::AllocationFailed)?;
                buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
                for item in self {
                    $crate::Message::serialize_into(item, buf)?;
                }
                Ok(())
            }
            fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), $crate::Error> {
                let (count, mut rest) = <u32 as $crate::Message>::deserialize(data)?;
                let count = count as usize;
                if rest.len() < count * 4 {
                    return Err($crate::Error::DataTruncated);
                }
                let mut result = alloc::vec::Vec::new();
                result.try_reserve(count).map_err(|_e| $crate::Error::AllocationFailed)?;
                for _ in 0..count {
                    let (item, r) = <$ename as $crate::Message>::deserialize(rest)?;
                    result.push(item);
                    rest = r;
                }
                Ok((result, rest))
            }
        }
    };
}
