//! OIDN device: owns the native device handle and its configuration.

use crate::error::{Error, NativeError};
use crate::filter::PinLedger;
use crate::native::{self, DeviceParam, NativeApi};
use crate::sys;
use std::fmt;
use std::ptr;
use std::sync::Arc;

/// OIDN device type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceType {
    /// Auto-select the best available backend.
    #[default]
    Default,
    /// CPU only (most portable).
    Cpu,
}

impl DeviceType {
    pub(crate) fn to_raw(self) -> sys::OIDNDeviceType {
        match self {
            DeviceType::Default => sys::OIDNDeviceType::Default,
            DeviceType::Cpu => sys::OIDNDeviceType::CPU,
        }
    }
}

/// Options for creating a [`Device`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceOptions {
    pub device_type: DeviceType,
    /// Worker threads for the native engine. `None` or a value <= 0 lets OIDN choose.
    pub num_threads: Option<i32>,
}

/// Library version reported by the device, packed natively as `MMmmpp`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Decodes the native two-decimal-digits-per-component packing (e.g. `20401` is 2.4.1).
    pub fn from_packed(v: i32) -> Self {
        let v = v.max(0);
        let major = v / 10000;
        let minor = v / 100 - major * 100;
        let patch = v % 100;
        Self::new(major as u32, minor as u32, patch as u32)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Open Image Denoise device.
///
/// Creating a device is relatively expensive; create one and reuse it for many
/// [`denoise`](Self::denoise) calls. A device may be moved between threads but is not `Sync`:
/// calls on one device must not overlap.
///
/// The native handle is released by [`release`](Self::release) or on drop, whichever comes first.
pub struct Device {
    api: Arc<dyn NativeApi>,
    /// Null once released.
    raw: sys::OIDNDevice,
    device_type: DeviceType,
    num_threads: i32,
    version: Version,
    pins: PinLedger,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("device_type", &self.device_type)
            .field("num_threads", &self.num_threads)
            .field("version", &self.version)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Creates a device using the default backend and thread count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LibraryLoad`] if OpenImageDenoise cannot be loaded, or
    /// [`Error::DeviceCreationFailed`] with the native error if no device could be created.
    pub fn new() -> Result<Self, Error> {
        Self::with_options(DeviceOptions::default())
    }

    /// Creates a CPU-only device.
    pub fn cpu() -> Result<Self, Error> {
        Self::with_options(DeviceOptions {
            device_type: DeviceType::Cpu,
            num_threads: None,
        })
    }

    /// Creates a device with explicit type and thread count.
    pub fn with_options(options: DeviceOptions) -> Result<Self, Error> {
        Self::with_api(native::default_api()?, options)
    }

    pub(crate) fn with_api(api: Arc<dyn NativeApi>, options: DeviceOptions) -> Result<Self, Error> {
        let raw = api.new_device(options.device_type);
        if raw.is_null() {
            return Err(Error::DeviceCreationFailed(unsafe { api.take_error(ptr::null_mut()) }));
        }

        let requested = options.num_threads.filter(|&n| n > 0);
        let (num_threads, version) = unsafe {
            if let Some(n) = requested {
                api.set_device_int(raw, DeviceParam::NumThreads, n);
            }
            api.commit_device(raw);
            let num_threads = match requested {
                Some(n) => n,
                None => api.get_device_int(raw, DeviceParam::NumThreads),
            };
            let version = Version::from_packed(api.get_device_int(raw, DeviceParam::Version));
            (num_threads, version)
        };

        tracing::debug!(
            device_type = ?options.device_type,
            num_threads,
            %version,
            "created OIDN device"
        );
        Ok(Self {
            api,
            raw,
            device_type: options.device_type,
            num_threads,
            version,
            pins: PinLedger::default(),
        })
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Thread count in effect, as of the last construction or [`set_num_threads`](Self::set_num_threads).
    /// Does not query the native side.
    pub fn num_threads(&self) -> i32 {
        self.num_threads
    }

    /// Sets the worker thread count and re-commits the device. A value <= 0 restores the native
    /// default, which is read back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceReleased`] after [`release`](Self::release).
    pub fn set_num_threads(&mut self, num_threads: i32) -> Result<(), Error> {
        let raw = self.raw()?;
        self.num_threads = unsafe {
            self.api.set_device_int(raw, DeviceParam::NumThreads, num_threads);
            self.api.commit_device(raw);
            if num_threads > 0 {
                num_threads
            } else {
                self.api.get_device_int(raw, DeviceParam::NumThreads)
            }
        };
        tracing::debug!(requested = num_threads, num_threads = self.num_threads, "updated OIDN thread count");
        Ok(())
    }

    /// Native library version, read once when the device was created.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the first unqueried native error and clears it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceReleased`] after [`release`](Self::release).
    pub fn take_error(&self) -> Result<Option<NativeError>, Error> {
        let raw = self.raw()?;
        Ok(unsafe { self.api.take_error(raw) })
    }

    /// Releases the native device. Safe to call more than once; later calls do nothing.
    pub fn release(&mut self) {
        if self.raw.is_null() {
            return;
        }
        let raw = std::mem::replace(&mut self.raw, ptr::null_mut());
        unsafe { self.api.release_device(raw) };
        tracing::debug!("released OIDN device");
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_null()
    }

    pub(crate) fn raw(&self) -> Result<sys::OIDNDevice, Error> {
        if self.raw.is_null() {
            return Err(Error::DeviceReleased);
        }
        Ok(self.raw)
    }

    pub(crate) fn api(&self) -> &dyn NativeApi {
        &*self.api
    }

    pub(crate) fn pins(&self) -> &PinLedger {
        &self.pins
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.release();
    }
}

// The handle is owned exclusively; OIDN devices may be used from any thread, one call at a time.
unsafe impl Send for Device {}
