//! Error types for argument validation and native OIDN failures.
//!
//! See [`Error`] for the main error type returned by public APIs and [`NativeError`] for the
//! status polled from the device after a filter has run.

use crate::image::ImageRole;
use crate::sys;
use std::fmt;

/// Native error code reported by the device error query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    Unknown,
    InvalidArgument,
    InvalidOperation,
    OutOfMemory,
    UnsupportedHardware,
    Cancelled,
    /// A code this crate does not know about (newer library).
    Other(u32),
}

impl ErrorCode {
    /// Maps a raw code; `None` for `OIDN_ERROR_NONE`.
    pub(crate) fn from_raw(code: sys::OIDNError) -> Option<Self> {
        Some(match code {
            sys::OIDN_ERROR_NONE => return None,
            sys::OIDN_ERROR_UNKNOWN => ErrorCode::Unknown,
            sys::OIDN_ERROR_INVALID_ARGUMENT => ErrorCode::InvalidArgument,
            sys::OIDN_ERROR_INVALID_OPERATION => ErrorCode::InvalidOperation,
            sys::OIDN_ERROR_OUT_OF_MEMORY => ErrorCode::OutOfMemory,
            sys::OIDN_ERROR_UNSUPPORTED_HARDWARE => ErrorCode::UnsupportedHardware,
            sys::OIDN_ERROR_CANCELLED => ErrorCode::Cancelled,
            other => ErrorCode::Other(other),
        })
    }

    /// The raw native value.
    pub fn raw(self) -> u32 {
        match self {
            ErrorCode::Unknown => sys::OIDN_ERROR_UNKNOWN,
            ErrorCode::InvalidArgument => sys::OIDN_ERROR_INVALID_ARGUMENT,
            ErrorCode::InvalidOperation => sys::OIDN_ERROR_INVALID_OPERATION,
            ErrorCode::OutOfMemory => sys::OIDN_ERROR_OUT_OF_MEMORY,
            ErrorCode::UnsupportedHardware => sys::OIDN_ERROR_UNSUPPORTED_HARDWARE,
            ErrorCode::Cancelled => sys::OIDN_ERROR_CANCELLED,
            ErrorCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unknown => f.write_str("unknown error"),
            ErrorCode::InvalidArgument => f.write_str("invalid argument"),
            ErrorCode::InvalidOperation => f.write_str("invalid operation"),
            ErrorCode::OutOfMemory => f.write_str("out of memory"),
            ErrorCode::UnsupportedHardware => f.write_str("unsupported hardware"),
            ErrorCode::Cancelled => f.write_str("cancelled"),
            ErrorCode::Other(code) => write!(f, "error code {}", code),
        }
    }
}

/// An error reported by the native library through its error query.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("OIDN {code} ({}): {message}", .code.raw())]
pub struct NativeError {
    pub code: ErrorCode,
    /// Message from the library; empty when it gave none.
    pub message: String,
}

/// Errors from oidn-pin.
///
/// Argument errors are raised before any native call is made. Errors coming out of a filter
/// execution are not returned here but through [`crate::DenoiseStatus`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A buffer does not have 3 or 4 channels.
    #[error("{role} image must have 3 or 4 channels, got {channels}")]
    InvalidChannelCount { role: ImageRole, channels: usize },
    /// A buffer's size differs from the color image.
    #[error("{role} image size {actual:?} does not match input size {expected:?}")]
    DimensionMismatch {
        role: ImageRole,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Backing slice is shorter than `width * height * channels`.
    #[error("buffer holds {len} floats, {required} required")]
    BufferTooSmall { len: usize, required: usize },
    /// The device was already released.
    #[error("OIDN device already released")]
    DeviceReleased,
    /// The native library returned no device.
    #[error("OIDN device creation failed{}", detail(.0))]
    DeviceCreationFailed(Option<NativeError>),
    /// The OpenImageDenoise shared library could not be loaded.
    #[error("failed to load OpenImageDenoise: {0}")]
    LibraryLoad(String),
    /// A native error surfaced as a hard failure (see [`crate::DenoiseStatus::into_result`]).
    #[error(transparent)]
    Native(#[from] NativeError),
}

fn detail(err: &Option<NativeError>) -> String {
    match err {
        Some(e) => format!(": {}", e),
        None => String::new(),
    }
}
