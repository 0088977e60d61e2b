//! The boundary between [`crate::Device`] and the OIDN library.
//!
//! Everything above this module speaks in closed enums ([`DeviceParam`], [`FilterParam`],
//! [`FilterKind`], [`ImageRole`]); the string keys OIDN expects exist only here.

use crate::device::DeviceType;
use crate::error::{Error, ErrorCode, NativeError};
use crate::image::ImageRole;
use crate::sys;
use std::ffi::{c_void, CStr};
use std::ptr;
use std::sync::Arc;

/// Integer device parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum DeviceParam {
    NumThreads,
    Version,
}

impl DeviceParam {
    pub(crate) fn key(self) -> &'static CStr {
        match self {
            DeviceParam::NumThreads => c"numThreads",
            DeviceParam::Version => c"version",
        }
    }
}

/// Scalar filter parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum FilterParam {
    Hdr,
    /// Pre-1.3 name of the input scale.
    HdrScale,
    InputScale,
    Directional,
    CleanAux,
    Quality,
}

impl FilterParam {
    pub(crate) fn key(self) -> &'static CStr {
        match self {
            FilterParam::Hdr => c"hdr",
            FilterParam::HdrScale => c"hdrScale",
            FilterParam::InputScale => c"inputScale",
            FilterParam::Directional => c"directional",
            FilterParam::CleanAux => c"cleanAux",
            FilterParam::Quality => c"quality",
        }
    }
}

/// Filter type created per denoise call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum FilterKind {
    /// Generic ray tracing filter (`"RT"`).
    Rt,
    /// Lightmap filter (`"RTLightmap"`).
    RtLightmap,
}

impl FilterKind {
    pub(crate) fn key(self) -> &'static CStr {
        match self {
            FilterKind::Rt => c"RT",
            FilterKind::RtLightmap => c"RTLightmap",
        }
    }
}

pub(crate) fn role_key(role: ImageRole) -> &'static CStr {
    match role {
        ImageRole::Color => c"color",
        ImageRole::Albedo => c"albedo",
        ImageRole::Normal => c"normal",
        ImageRole::Output => c"output",
    }
}

/// Geometry of a shared image. The logical format is always 3 floats per pixel; wider
/// pixels are skipped over through `pixel_byte_stride`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SharedImage {
    pub width: usize,
    pub height: usize,
    pub byte_offset: usize,
    pub pixel_byte_stride: usize,
    pub row_byte_stride: usize,
}

/// Calling contract of the native library.
///
/// # Safety
///
/// Every method taking a handle requires a live handle obtained from the same implementation
/// and not yet released.
pub(crate) trait NativeApi: Send + Sync {
    fn new_device(&self, device_type: DeviceType) -> sys::OIDNDevice;
    unsafe fn set_device_int(&self, device: sys::OIDNDevice, param: DeviceParam, value: i32);
    unsafe fn get_device_int(&self, device: sys::OIDNDevice, param: DeviceParam) -> i32;
    unsafe fn commit_device(&self, device: sys::OIDNDevice);
    /// Returns and clears the first unqueried error. A null `device` queries the per-thread
    /// error left by a failed device creation.
    unsafe fn take_error(&self, device: sys::OIDNDevice) -> Option<NativeError>;
    unsafe fn release_device(&self, device: sys::OIDNDevice);

    unsafe fn new_filter(&self, device: sys::OIDNDevice, kind: FilterKind) -> sys::OIDNFilter;
    /// `data` must stay valid for reads (and writes, for the output role) until the filter
    /// has executed.
    unsafe fn set_shared_image(
        &self,
        filter: sys::OIDNFilter,
        role: ImageRole,
        data: *mut c_void,
        image: &SharedImage,
    );
    unsafe fn set_filter_bool(&self, filter: sys::OIDNFilter, param: FilterParam, value: bool);
    unsafe fn set_filter_int(&self, filter: sys::OIDNFilter, param: FilterParam, value: i32);
    unsafe fn set_filter_float(&self, filter: sys::OIDNFilter, param: FilterParam, value: f32);
    unsafe fn commit_filter(&self, filter: sys::OIDNFilter);
    unsafe fn execute_filter(&self, filter: sys::OIDNFilter);
    unsafe fn release_filter(&self, filter: sys::OIDNFilter);
}

/// Entry points of a linked or runtime-loaded OIDN.
#[derive(Clone, Copy)]
struct Entries {
    new_device: sys::NewDeviceFn,
    set_device_int: sys::SetDeviceIntFn,
    get_device_int: sys::GetDeviceIntFn,
    commit_device: sys::CommitDeviceFn,
    get_device_error: sys::GetDeviceErrorFn,
    release_device: sys::ReleaseDeviceFn,
    new_filter: sys::NewFilterFn,
    set_shared_filter_image: sys::SetSharedFilterImageFn,
    set_filter_bool: sys::SetFilterBoolFn,
    set_filter_int: sys::SetFilterIntFn,
    set_filter_float: sys::SetFilterFloatFn,
    commit_filter: sys::CommitFilterFn,
    execute_filter: sys::ExecuteFilterFn,
    release_filter: sys::ReleaseFilterFn,
}

/// The real library, either linked at build time or loaded at runtime.
pub(crate) struct OidnLibrary {
    entries: Entries,
    #[cfg(feature = "dynamic")]
    _library: Option<libloading::Library>,
}

impl std::fmt::Debug for OidnLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidnLibrary").finish_non_exhaustive()
    }
}

#[cfg(feature = "link")]
impl OidnLibrary {
    fn linked() -> Self {
        Self {
            entries: Entries {
                new_device: sys::oidnNewDevice,
                set_device_int: sys::oidnSetDeviceInt,
                get_device_int: sys::oidnGetDeviceInt,
                commit_device: sys::oidnCommitDevice,
                get_device_error: sys::oidnGetDeviceError,
                release_device: sys::oidnReleaseDevice,
                new_filter: sys::oidnNewFilter,
                set_shared_filter_image: sys::oidnSetSharedFilterImage,
                set_filter_bool: sys::oidnSetFilterBool,
                set_filter_int: sys::oidnSetFilterInt,
                set_filter_float: sys::oidnSetFilterFloat,
                commit_filter: sys::oidnCommitFilter,
                execute_filter: sys::oidnExecuteFilter,
                release_filter: sys::oidnReleaseFilter,
            },
            #[cfg(feature = "dynamic")]
            _library: None,
        }
    }
}

/// Tries each candidate in order; a candidate that opens but lacks a symbol does not stop the
/// search. The error names the last candidate tried.
#[cfg(any(feature = "dynamic", test))]
pub(crate) fn first_loadable<T>(
    candidates: &[std::ffi::OsString],
    mut open: impl FnMut(&std::ffi::OsStr) -> Result<T, String>,
) -> Result<T, String> {
    let mut last_err = String::from("no candidate library");
    for name in candidates {
        match open(name) {
            Ok(loaded) => return Ok(loaded),
            Err(e) => {
                tracing::debug!(library = %name.to_string_lossy(), error = %e, "skipping OpenImageDenoise candidate");
                last_err = format!("{}: {}", name.to_string_lossy(), e);
            }
        }
    }
    Err(last_err)
}

#[cfg(feature = "dynamic")]
impl OidnLibrary {
    /// Loads OIDN from `OIDN_LIBRARY`, or from the platform library name on the search path.
    fn load() -> Result<Self, String> {
        let candidates: Vec<std::ffi::OsString> = match std::env::var_os("OIDN_LIBRARY") {
            Some(path) => vec![path],
            None => {
                let mut names = vec![libloading::library_filename("OpenImageDenoise")];
                if cfg!(target_os = "linux") {
                    names.push("libOpenImageDenoise.so.2".into());
                    names.push("libOpenImageDenoise.so.1".into());
                }
                names
            }
        };

        first_loadable(&candidates, |name| {
            let library = unsafe { libloading::Library::new(name) }.map_err(|e| e.to_string())?;
            let entries = unsafe { Self::resolve(&library) }.map_err(|e| e.to_string())?;
            tracing::debug!(library = %name.to_string_lossy(), "loaded OpenImageDenoise");
            Ok(Self {
                entries,
                _library: Some(library),
            })
        })
    }

    /// OIDN 2.x renamed the scalar accessors (`oidnSetDevice1i` -> `oidnSetDeviceInt`, ...);
    /// the 1.x names are used when the new ones are missing.
    unsafe fn resolve(library: &libloading::Library) -> Result<Entries, libloading::Error> {
        unsafe fn sym<T: Copy>(library: &libloading::Library, name: &[u8]) -> Result<T, libloading::Error> {
            library.get::<T>(name).map(|s| *s)
        }
        unsafe fn sym_or<T: Copy>(
            library: &libloading::Library,
            name: &[u8],
            legacy: &[u8],
        ) -> Result<T, libloading::Error> {
            sym(library, name).or_else(|_| sym(library, legacy))
        }

        Ok(Entries {
            new_device: sym(library, b"oidnNewDevice\0")?,
            set_device_int: sym_or(library, b"oidnSetDeviceInt\0", b"oidnSetDevice1i\0")?,
            get_device_int: sym_or(library, b"oidnGetDeviceInt\0", b"oidnGetDevice1i\0")?,
            commit_device: sym(library, b"oidnCommitDevice\0")?,
            get_device_error: sym(library, b"oidnGetDeviceError\0")?,
            release_device: sym(library, b"oidnReleaseDevice\0")?,
            new_filter: sym(library, b"oidnNewFilter\0")?,
            set_shared_filter_image: sym(library, b"oidnSetSharedFilterImage\0")?,
            set_filter_bool: sym_or(library, b"oidnSetFilterBool\0", b"oidnSetFilter1b\0")?,
            set_filter_int: sym_or(library, b"oidnSetFilterInt\0", b"oidnSetFilter1i\0")?,
            set_filter_float: sym_or(library, b"oidnSetFilterFloat\0", b"oidnSetFilter1f\0")?,
            commit_filter: sym(library, b"oidnCommitFilter\0")?,
            execute_filter: sym(library, b"oidnExecuteFilter\0")?,
            release_filter: sym(library, b"oidnReleaseFilter\0")?,
        })
    }
}

impl NativeApi for OidnLibrary {
    fn new_device(&self, device_type: DeviceType) -> sys::OIDNDevice {
        unsafe { (self.entries.new_device)(device_type.to_raw()) }
    }

    unsafe fn set_device_int(&self, device: sys::OIDNDevice, param: DeviceParam, value: i32) {
        (self.entries.set_device_int)(device, param.key().as_ptr(), value)
    }

    unsafe fn get_device_int(&self, device: sys::OIDNDevice, param: DeviceParam) -> i32 {
        (self.entries.get_device_int)(device, param.key().as_ptr())
    }

    unsafe fn commit_device(&self, device: sys::OIDNDevice) {
        (self.entries.commit_device)(device)
    }

    unsafe fn take_error(&self, device: sys::OIDNDevice) -> Option<NativeError> {
        let mut msg_ptr: *const std::ffi::c_char = ptr::null();
        let code = ErrorCode::from_raw((self.entries.get_device_error)(device, &mut msg_ptr))?;
        let message = if msg_ptr.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg_ptr).to_string_lossy().into_owned()
        };
        Some(NativeError { code, message })
    }

    unsafe fn release_device(&self, device: sys::OIDNDevice) {
        (self.entries.release_device)(device)
    }

    unsafe fn new_filter(&self, device: sys::OIDNDevice, kind: FilterKind) -> sys::OIDNFilter {
        (self.entries.new_filter)(device, kind.key().as_ptr())
    }

    unsafe fn set_shared_image(
        &self,
        filter: sys::OIDNFilter,
        role: ImageRole,
        data: *mut c_void,
        image: &SharedImage,
    ) {
        (self.entries.set_shared_filter_image)(
            filter,
            role_key(role).as_ptr(),
            data,
            sys::OIDNFormat::Float3,
            image.width,
            image.height,
            image.byte_offset,
            image.pixel_byte_stride,
            image.row_byte_stride,
        )
    }

    unsafe fn set_filter_bool(&self, filter: sys::OIDNFilter, param: FilterParam, value: bool) {
        (self.entries.set_filter_bool)(filter, param.key().as_ptr(), value)
    }

    unsafe fn set_filter_int(&self, filter: sys::OIDNFilter, param: FilterParam, value: i32) {
        (self.entries.set_filter_int)(filter, param.key().as_ptr(), value)
    }

    unsafe fn set_filter_float(&self, filter: sys::OIDNFilter, param: FilterParam, value: f32) {
        (self.entries.set_filter_float)(filter, param.key().as_ptr(), value)
    }

    unsafe fn commit_filter(&self, filter: sys::OIDNFilter) {
        (self.entries.commit_filter)(filter)
    }

    unsafe fn execute_filter(&self, filter: sys::OIDNFilter) {
        (self.entries.execute_filter)(filter)
    }

    unsafe fn release_filter(&self, filter: sys::OIDNFilter) {
        (self.entries.release_filter)(filter)
    }
}

/// The process-wide OIDN library. Linking takes precedence over runtime loading.
pub(crate) fn default_api() -> Result<Arc<dyn NativeApi>, Error> {
    #[cfg(feature = "link")]
    {
        static LINKED: std::sync::OnceLock<Arc<OidnLibrary>> = std::sync::OnceLock::new();
        let lib = LINKED.get_or_init(|| Arc::new(OidnLibrary::linked()));
        Ok(lib.clone() as Arc<dyn NativeApi>)
    }
    #[cfg(all(feature = "dynamic", not(feature = "link")))]
    {
        static LOADED: std::sync::OnceLock<Result<Arc<OidnLibrary>, String>> =
            std::sync::OnceLock::new();
        match LOADED.get_or_init(|| OidnLibrary::load().map(Arc::new)) {
            Ok(lib) => Ok(lib.clone() as Arc<dyn NativeApi>),
            Err(e) => Err(Error::LibraryLoad(e.clone())),
        }
    }
    #[cfg(not(any(feature = "dynamic", feature = "link")))]
    {
        Err(Error::LibraryLoad(
            "built without the `dynamic` or `link` feature".to_string(),
        ))
    }
}
