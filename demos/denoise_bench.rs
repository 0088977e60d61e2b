//! Denoise timing on the real library: 100 runs on a 1x1 image, then a 4x4 RGBA image end to end.
//!
//! Run with: cargo run --release --example denoise_bench
//! Requires the OpenImageDenoise shared library (set OIDN_LIBRARY if it is not on the search path).
//! Set RUST_LOG=oidn_pin=debug for device and filter logs.

use oidn_pin::{DenoiseOptions, Device, Image};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut device = Device::new()?;
    println!("OIDN {} using {} threads", device.version(), device.num_threads());

    let pixel = Image::new(1, 1, 3);
    let runs = 100u32;
    let mut total = Duration::ZERO;
    for _ in 0..runs {
        let start = Instant::now();
        let (_, status) = device.denoise_image(&pixel)?;
        total += start.elapsed();
        status.into_result()?;
    }
    println!("Avg time: {:.3}ms", total.as_secs_f64() * 1000.0 / runs as f64);

    let (width, height) = (4, 4);
    let mut noisy = Image::new(width, height, 4);
    for (i, v) in noisy.as_mut_slice().iter_mut().enumerate() {
        *v = if i % 4 == 3 { 1.0 } else { 0.5 + rand_simple(i) * 0.1 };
    }
    let mut output = Image::new(width, height, 3);
    let start = Instant::now();
    let status = device.denoise(
        &noisy.view(),
        None,
        None,
        &mut output.view_mut(),
        &DenoiseOptions::default(),
    )?;
    status.into_result()?;
    println!("Denoised {}x{} RGBA image in {:.3}ms", width, height, start.elapsed().as_secs_f64() * 1000.0);

    device.release();
    Ok(())
}

fn rand_simple(seed: usize) -> f32 {
    let x = (seed as u64).wrapping_mul(0x9e3779b97f4a7c15);
    ((x >> 32) as f32) / (u32::MAX as f32)
}
