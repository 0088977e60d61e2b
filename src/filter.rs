//! RT and RTLightmap denoising on caller-owned buffers.
//!
//! Each call creates a filter, shares the caller's memory with it (no copies), executes
//! synchronously and releases everything before returning. Buffers stay borrowed ("pinned")
//! only while the filter runs.

use crate::device::{Device, Version};
use crate::error::{Error, ErrorCode, NativeError};
use crate::image::{ImageRole, ImageView, ImageViewMut};
use crate::native::{FilterKind, FilterParam, NativeApi, SharedImage};
use crate::sys;
use std::cell::Cell;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::size_of;

/// Filter quality vs performance trade-off (OIDN 2.x).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quality {
    /// Library default; not sent to the native side.
    #[default]
    Default,
    /// Interactive preview.
    Fast,
    /// Interactive, better than `Fast`.
    Balanced,
    /// Final-frame rendering.
    High,
}

impl Quality {
    fn to_raw(self) -> i32 {
        match self {
            Quality::Default => 0,
            Quality::Fast => 4,
            Quality::Balanced => 5,
            Quality::High => 6,
        }
    }
}

/// Options for [`Device::denoise`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DenoiseOptions {
    /// Scale mapping pixel value 1.0 to 100 cd/m². `None` (or NaN) = computed by OIDN.
    pub input_scale: Option<f32>,
    pub quality: Quality,
    /// Albedo and normal are noise-free (prefiltered).
    pub clean_aux: bool,
}

/// Options for [`Device::denoise_lightmap`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightmapOptions {
    /// The lightmap holds directional (spherical harmonics) coefficients.
    pub directional: bool,
    /// `None` (or NaN) = computed by OIDN.
    pub input_scale: Option<f32>,
}

/// Outcome of a denoise call that got as far as the native filter.
///
/// Errors reported by the device after execution do not fail the call; they are carried here
/// (and logged as warnings) and the output buffer may be partially written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct DenoiseStatus {
    pub native_error: Option<NativeError>,
}

impl DenoiseStatus {
    /// No native error was reported.
    pub fn is_ok(&self) -> bool {
        self.native_error.is_none()
    }

    /// Turns a reported native error into [`Error::Native`].
    pub fn into_result(self) -> Result<(), Error> {
        match self.native_error {
            Some(e) => Err(Error::Native(e)),
            None => Ok(()),
        }
    }
}

/// Scale parameter key for the library version: `hdrScale` became `inputScale` in OIDN 1.3.
pub(crate) fn scale_param(version: Version) -> FilterParam {
    if version >= Version::new(1, 3, 0) {
        FilterParam::InputScale
    } else {
        FilterParam::HdrScale
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

/// Counts buffer pins taken and released on a device.
#[derive(Debug, Default)]
pub(crate) struct PinLedger {
    acquired: Cell<usize>,
    released: Cell<usize>,
}

impl PinLedger {
    fn acquire(&self) {
        self.acquired.set(self.acquired.get() + 1);
    }

    fn release(&self) {
        self.released.set(self.released.get() + 1);
    }

    /// `(acquired, released)` over the device's lifetime.
    pub(crate) fn counts(&self) -> (usize, usize) {
        (self.acquired.get(), self.released.get())
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.acquired.get() - self.released.get()
    }
}

/// A buffer borrowed for the duration of one native call. Its address stays valid until drop.
struct Pinned<'a> {
    role: ImageRole,
    ptr: *mut c_void,
    image: SharedImage,
    ledger: &'a PinLedger,
    _borrow: PhantomData<&'a [f32]>,
}

impl<'a> Pinned<'a> {
    fn layout(width: usize, height: usize, channels: usize) -> SharedImage {
        let pixel_byte_stride = channels * size_of::<f32>();
        SharedImage {
            width,
            height,
            byte_offset: 0,
            pixel_byte_stride,
            row_byte_stride: pixel_byte_stride * width,
        }
    }

    fn input(ledger: &'a PinLedger, role: ImageRole, view: &'a ImageView<'_>) -> Self {
        ledger.acquire();
        tracing::trace!(%role, "pinned buffer");
        Self {
            role,
            // Input images are only read by the filter.
            ptr: view.data().as_ptr() as *mut c_void,
            image: Self::layout(view.width(), view.height(), view.channels()),
            ledger,
            _borrow: PhantomData,
        }
    }

    fn output(ledger: &'a PinLedger, view: &'a mut ImageViewMut<'_>) -> Self {
        ledger.acquire();
        tracing::trace!(role = %ImageRole::Output, "pinned buffer");
        let image = Self::layout(view.width(), view.height(), view.channels());
        Self {
            role: ImageRole::Output,
            ptr: view.data_mut().as_mut_ptr() as *mut c_void,
            image,
            ledger,
            _borrow: PhantomData,
        }
    }
}

impl Drop for Pinned<'_> {
    fn drop(&mut self) {
        self.ledger.release();
        tracing::trace!(role = %self.role, "unpinned buffer");
    }
}

/// Native filter owned by a single denoise call.
struct FilterHandle<'d> {
    api: &'d dyn NativeApi,
    raw: sys::OIDNFilter,
    kind: FilterKind,
}

impl<'d> FilterHandle<'d> {
    fn new(api: &'d dyn NativeApi, device: sys::OIDNDevice, kind: FilterKind) -> Option<Self> {
        let raw = unsafe { api.new_filter(device, kind) };
        if raw.is_null() {
            return None;
        }
        tracing::trace!(filter = ?kind, "created filter");
        Some(Self { api, raw, kind })
    }

    fn attach(&self, pin: &Pinned<'_>) {
        unsafe { self.api.set_shared_image(self.raw, pin.role, pin.ptr, &pin.image) };
    }

    fn set(&self, param: FilterParam, value: ParamValue) {
        unsafe {
            match value {
                ParamValue::Bool(v) => self.api.set_filter_bool(self.raw, param, v),
                ParamValue::Int(v) => self.api.set_filter_int(self.raw, param, v),
                ParamValue::Float(v) => self.api.set_filter_float(self.raw, param, v),
            }
        }
    }

    fn commit_and_execute(&self) {
        unsafe {
            self.api.commit_filter(self.raw);
            self.api.execute_filter(self.raw);
        }
    }
}

impl Drop for FilterHandle<'_> {
    fn drop(&mut self) {
        unsafe { self.api.release_filter(self.raw) };
        tracing::trace!(filter = ?self.kind, "released filter");
    }
}

fn check_channels(role: ImageRole, channels: usize) -> Result<(), Error> {
    if !(3..=4).contains(&channels) {
        return Err(Error::InvalidChannelCount { role, channels });
    }
    Ok(())
}

fn check_size(role: ImageRole, expected: (usize, usize), width: usize, height: usize) -> Result<(), Error> {
    if (width, height) != expected {
        return Err(Error::DimensionMismatch {
            role,
            expected,
            actual: (width, height),
        });
    }
    Ok(())
}

fn scale_value(scale: Option<f32>) -> Option<f32> {
    scale.filter(|s| !s.is_nan())
}

impl Device {
    /// Denoises `color` into `output` with the RT filter, optionally guided by albedo and
    /// normal images. Images must have 3 or 4 channels and the size of `color`; only RGB is
    /// read or written, a fourth channel of `output` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChannelCount`] or [`Error::DimensionMismatch`] before any native
    /// call, or [`Error::DeviceReleased`]. Native failures are reported in the returned
    /// [`DenoiseStatus`], not as errors.
    pub fn denoise(
        &self,
        color: &ImageView<'_>,
        albedo: Option<&ImageView<'_>>,
        normal: Option<&ImageView<'_>>,
        output: &mut ImageViewMut<'_>,
        options: &DenoiseOptions,
    ) -> Result<DenoiseStatus, Error> {
        self.raw()?;
        check_channels(ImageRole::Color, color.channels())?;
        if let Some(a) = albedo {
            check_channels(ImageRole::Albedo, a.channels())?;
        }
        if let Some(n) = normal {
            check_channels(ImageRole::Normal, n.channels())?;
        }
        check_channels(ImageRole::Output, output.channels())?;

        let size = (color.width(), color.height());
        if let Some(a) = albedo {
            check_size(ImageRole::Albedo, size, a.width(), a.height())?;
        }
        if let Some(n) = normal {
            check_size(ImageRole::Normal, size, n.width(), n.height())?;
        }
        check_size(ImageRole::Output, size, output.width(), output.height())?;

        let mut params = vec![(FilterParam::Hdr, ParamValue::Bool(true))];
        if let Some(scale) = scale_value(options.input_scale) {
            params.push((scale_param(self.version()), ParamValue::Float(scale)));
        }
        if options.clean_aux {
            params.push((FilterParam::CleanAux, ParamValue::Bool(true)));
        }
        if options.quality != Quality::Default {
            params.push((FilterParam::Quality, ParamValue::Int(options.quality.to_raw())));
        }

        let mut inputs = vec![(ImageRole::Color, color)];
        inputs.extend(albedo.map(|a| (ImageRole::Albedo, a)));
        inputs.extend(normal.map(|n| (ImageRole::Normal, n)));

        self.run_filter(FilterKind::Rt, &inputs, output, &params)
    }

    /// Denoises a lightmap with the RTLightmap filter. Only color and output are used.
    ///
    /// # Errors
    ///
    /// Same as [`denoise`](Self::denoise).
    pub fn denoise_lightmap(
        &self,
        color: &ImageView<'_>,
        output: &mut ImageViewMut<'_>,
        options: &LightmapOptions,
    ) -> Result<DenoiseStatus, Error> {
        self.raw()?;
        check_channels(ImageRole::Color, color.channels())?;
        check_channels(ImageRole::Output, output.channels())?;
        check_size(
            ImageRole::Output,
            (color.width(), color.height()),
            output.width(),
            output.height(),
        )?;

        // RTLightmap is HDR-only and has no `hdr` parameter.
        let mut params = vec![(FilterParam::Directional, ParamValue::Bool(options.directional))];
        if let Some(scale) = scale_value(options.input_scale) {
            params.push((scale_param(self.version()), ParamValue::Float(scale)));
        }

        self.run_filter(FilterKind::RtLightmap, &[(ImageRole::Color, color)], output, &params)
    }

    /// Denoises `image` into a new 3-channel image of the same size.
    ///
    /// # Errors
    ///
    /// Same as [`denoise`](Self::denoise).
    pub fn denoise_image(&self, image: &crate::Image) -> Result<(crate::Image, DenoiseStatus), Error> {
        let mut output = crate::Image::new(image.width(), image.height(), 3);
        let status = self.denoise(
            &image.view(),
            None,
            None,
            &mut output.view_mut(),
            &DenoiseOptions::default(),
        )?;
        Ok((output, status))
    }

    fn run_filter(
        &self,
        kind: FilterKind,
        inputs: &[(ImageRole, &ImageView<'_>)],
        output: &mut ImageViewMut<'_>,
        params: &[(FilterParam, ParamValue)],
    ) -> Result<DenoiseStatus, Error> {
        let device = self.raw()?;
        let api = self.api();
        let ledger = self.pins();

        let mut pins: Vec<Pinned<'_>> = inputs
            .iter()
            .map(|&(role, view)| Pinned::input(ledger, role, view))
            .collect();
        pins.push(Pinned::output(ledger, output));

        let filter = FilterHandle::new(api, device, kind);
        if let Some(filter) = &filter {
            for pin in &pins {
                filter.attach(pin);
            }
            for &(param, value) in params {
                filter.set(param, value);
            }
            filter.commit_and_execute();
        }
        drop(pins);
        debug_assert_eq!(ledger.outstanding(), 0);

        let native_error = unsafe { api.take_error(device) }.or_else(|| {
            filter.is_none().then(|| NativeError {
                code: ErrorCode::Unknown,
                message: format!("failed to create {:?} filter", kind),
            })
        });
        if let Some(e) = &native_error {
            tracing::warn!(
                filter = ?kind,
                code = e.code.raw(),
                message = %e.message,
                "OIDN reported an error while denoising"
            );
        }
        drop(filter);

        Ok(DenoiseStatus { native_error })
    }
}
