//! # oidn-pin
//!
//! Safe bindings to [Intel Open Image Denoise](https://www.openimagedenoise.org) (OIDN) that
//! denoise caller-owned float images without copying them: buffers are shared with the native
//! filter for the duration of one call and released before it returns.
//!
//! Works with OIDN 1.x and 2.x. It does not depend on `oidn-rs`.
//!
//! ## Setup
//!
//! With the default `dynamic` feature the OpenImageDenoise shared library is loaded at runtime
//! on first use, from **`OIDN_LIBRARY`** if set, otherwise from the library search path.
//!
//! With the `link` feature the library is linked at build time instead; set **`OIDN_DIR`** to
//! the install directory (containing `include/` and `lib/`) or install it for **pkg-config**.
//!
//! ## Example: denoise an RGBA buffer
//!
//! ```no_run
//! # fn main() -> Result<(), oidn_pin::Error> {
//! use oidn_pin::{DenoiseOptions, Device, ImageView, ImageViewMut};
//!
//! let (width, height) = (64, 64);
//! let color = vec![0.5f32; width * height * 4];
//! let mut output = vec![0.0f32; width * height * 3];
//!
//! let device = Device::new()?;
//! let status = device.denoise(
//!     &ImageView::new(&color, width, height, 4)?,
//!     None,
//!     None,
//!     &mut ImageViewMut::new(&mut output, width, height, 3)?,
//!     &DenoiseOptions::default(),
//! )?;
//! if let Some(e) = status.native_error {
//!     eprintln!("denoising failed: {}", e);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Argument errors (channel count, image sizes) are returned as [`Error`]. Errors the library
//! reports while executing are returned in [`DenoiseStatus`] and logged with `tracing`; call
//! [`DenoiseStatus::into_result`] to treat them as hard failures.

pub mod device;
pub mod error;
pub mod filter;
pub mod image;
mod native;
mod sys;

#[cfg(test)]
mod tests;

pub use device::{Device, DeviceOptions, DeviceType, Version};
pub use error::{Error, ErrorCode, NativeError};
pub use filter::{DenoiseOptions, DenoiseStatus, LightmapOptions, Quality};
pub use image::{Image, ImageRole, ImageView, ImageViewMut};
