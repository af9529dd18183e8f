//! Functionality shared by the keystore module core and its crypto
//! providers.

#![no_std]
extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

/// Re-export of the wire crate.
pub use dkm_wire as wire;

// Re-exports for macro expansion in dependent crates, which may not have
// `alloc` in their extern prelude.
#[doc(hidden)]
pub use alloc::format as __format;
#[doc(hidden)]
pub use alloc::vec::Vec as __Vec;

use wire::ErrorCode;

pub mod crypto;
pub mod keyblob;
pub mod tag;

/// General error type.
#[derive(Debug)]
pub enum Error {
    Wire(wire::Error),
    Km(ErrorCode, String),
}

// The message portion of `Km` errors exists for logging; it never crosses the
// module boundary, which carries only the `ErrorCode`.

/// Macro to build an [`Error::Km`] instance for an [`ErrorCode`] value known
/// at compile time: `km_err!(InvalidTag, "some {} format", arg)`.
#[macro_export]
macro_rules! km_err {
    { $error_code:ident, $($arg:tt)+ } => {
        $crate::Error::Km($crate::wire::ErrorCode::$error_code,
                          $crate::__format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

/// Macro to build an [`Error::Km`] instance from a runtime [`ErrorCode`]:
/// `km_verr!(rc, "some {} format", arg)`.
#[macro_export]
macro_rules! km_verr {
    { $error_code:expr, $($arg:tt)+ } => {
        $crate::Error::Km($error_code,
                          $crate::__format!("{}:{}: {}", file!(), line!(), format_args!($($arg)+))) };
}

impl From<Error> for ErrorCode {
    fn from(e: Error) -> Self {
        match e {
            Error::Wire(wire::Error::AllocationFailed) => ErrorCode::MemoryAllocationFailed,
            Error::Wire(_) => ErrorCode::UnknownError,
            Error::Km(code, _msg) => code,
        }
    }
}

impl From<wire::Error> for Error {
    fn from(e: wire::Error) -> Self {
        Error::Wire(e)
    }
}

/// Extension trait for fallible allocation on `Vec`.
pub trait FallibleAllocExt<T> {
    fn try_push(&mut self, value: T) -> Result<(), Error>;
    fn try_extend_from_slice(&mut self, slice: &[T]) -> Result<(), Error>
    where
        T: Clone;
}

impl<T> FallibleAllocExt<T> for Vec<T> {
    fn try_push(&mut self, value: T) -> Result<(), Error> {
        self.try_reserve(1).map_err(|_e| Error::Wire(wire::Error::AllocationFailed))?;
        self.push(value);
        Ok(())
    }
    fn try_extend_from_slice(&mut self, slice: &[T]) -> Result<(), Error>
    where
        T: Clone,
    {
        self.try_reserve(slice.len()).map_err(|_e| Error::Wire(wire::Error::AllocationFailed))?;
        self.extend_from_slice(slice);
        Ok(())
    }
}

/// Copy a slice into a fresh vector, detecting allocation failure.
pub fn try_to_vec(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut result = Vec::new();
    result.try_extend_from_slice(data)?;
    Ok(result)
}

/// Macro that mimics `vec![<val>; <len>]` but which detects allocation
/// failure.
#[macro_export]
macro_rules! vec_try {
    { $elem:expr ; $len:expr } => {
        {
            let mut v = $crate::__Vec::new();
            match v.try_reserve($len) {
                Err(_e) => Err($crate::Error::Wire($crate::wire::Error::AllocationFailed)),
                Ok(_) => {
                    v.resize($len, $elem);
                    Ok(v)
                }
            }
        }
    };
}
