//! Raw FFI surface of Intel Open Image Denoise (OIDN) used by this crate.
//! Covers device setup, filter setup on shared host memory, execution, and error queries.
//! See <https://www.openimagedenoise.org>.

#![allow(non_camel_case_types, non_snake_case, dead_code)]

use std::os::raw::{c_char, c_int, c_void};

// ---------------------------------------------------------------------------
// Opaque handles
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct OIDNDeviceImpl {
    _private: [u8; 0],
}
#[repr(C)]
pub struct OIDNFilterImpl {
    _private: [u8; 0],
}

pub type OIDNDevice = *mut OIDNDeviceImpl;
pub type OIDNFilter = *mut OIDNFilterImpl;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum OIDNDeviceType {
    Default = 0,
    CPU = 1,
}

/// Native error code. Kept as a plain integer on the wire so that codes added by newer
/// library versions never produce an invalid enum value on our side.
pub type OIDNError = u32;

pub const OIDN_ERROR_NONE: OIDNError = 0;
pub const OIDN_ERROR_UNKNOWN: OIDNError = 1;
pub const OIDN_ERROR_INVALID_ARGUMENT: OIDNError = 2;
pub const OIDN_ERROR_INVALID_OPERATION: OIDNError = 3;
pub const OIDN_ERROR_OUT_OF_MEMORY: OIDNError = 4;
pub const OIDN_ERROR_UNSUPPORTED_HARDWARE: OIDNError = 5;
pub const OIDN_ERROR_CANCELLED: OIDNError = 6;

#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OIDNFormat {
    Undefined = 0,
    Float = 1,
    Float2,
    Float3,
    Float4,
}

// ---------------------------------------------------------------------------
// Entry point signatures (shared by the linked and runtime-loaded backends)
// ---------------------------------------------------------------------------

pub type NewDeviceFn = unsafe extern "C" fn(type_: OIDNDeviceType) -> OIDNDevice;
pub type SetDeviceIntFn = unsafe extern "C" fn(device: OIDNDevice, name: *const c_char, value: c_int);
pub type GetDeviceIntFn = unsafe extern "C" fn(device: OIDNDevice, name: *const c_char) -> c_int;
pub type CommitDeviceFn = unsafe extern "C" fn(device: OIDNDevice);
pub type GetDeviceErrorFn =
    unsafe extern "C" fn(device: OIDNDevice, out_message: *mut *const c_char) -> OIDNError;
pub type ReleaseDeviceFn = unsafe extern "C" fn(device: OIDNDevice);

pub type NewFilterFn = unsafe extern "C" fn(device: OIDNDevice, type_name: *const c_char) -> OIDNFilter;
pub type SetSharedFilterImageFn = unsafe extern "C" fn(
    filter: OIDNFilter,
    name: *const c_char,
    dev_ptr: *mut c_void,
    format: OIDNFormat,
    width: usize,
    height: usize,
    byte_offset: usize,
    pixel_byte_stride: usize,
    row_byte_stride: usize,
);
pub type SetFilterBoolFn = unsafe extern "C" fn(filter: OIDNFilter, name: *const c_char, value: bool);
pub type SetFilterIntFn = unsafe extern "C" fn(filter: OIDNFilter, name: *const c_char, value: c_int);
pub type SetFilterFloatFn = unsafe extern "C" fn(filter: OIDNFilter, name: *const c_char, value: f32);
pub type CommitFilterFn = unsafe extern "C" fn(filter: OIDNFilter);
pub type ExecuteFilterFn = unsafe extern "C" fn(filter: OIDNFilter);
pub type ReleaseFilterFn = unsafe extern "C" fn(filter: OIDNFilter);

// ---------------------------------------------------------------------------
// Link-time declarations (OIDN 2.x names)
// ---------------------------------------------------------------------------

#[cfg(feature = "link")]
extern "C" {
    pub fn oidnNewDevice(type_: OIDNDeviceType) -> OIDNDevice;
    pub fn oidnSetDeviceInt(device: OIDNDevice, name: *const c_char, value: c_int);
    pub fn oidnGetDeviceInt(device: OIDNDevice, name: *const c_char) -> c_int;
    pub fn oidnCommitDevice(device: OIDNDevice);
    pub fn oidnGetDeviceError(device: OIDNDevice, out_message: *mut *const c_char) -> OIDNError;
    pub fn oidnReleaseDevice(device: OIDNDevice);

    pub fn oidnNewFilter(device: OIDNDevice, type_name: *const c_char) -> OIDNFilter;
    pub fn oidnSetSharedFilterImage(
        filter: OIDNFilter,
        name: *const c_char,
        dev_ptr: *mut c_void,
        format: OIDNFormat,
        width: usize,
        height: usize,
        byte_offset: usize,
        pixel_byte_stride: usize,
        row_byte_stride: usize,
    );
    pub fn oidnSetFilterBool(filter: OIDNFilter, name: *const c_char, value: bool);
    pub fn oidnSetFilterInt(filter: OIDNFilter, name: *const c_char, value: c_int);
    pub fn oidnSetFilterFloat(filter: OIDNFilter, name: *const c_char, value: f32);
    pub fn oidnCommitFilter(filter: OIDNFilter);
    pub fn oidnExecuteFilter(filter: OIDNFilter);
    pub fn oidnReleaseFilter(filter: OIDNFilter);
}
