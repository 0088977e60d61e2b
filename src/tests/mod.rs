//! Unit tests against a recording mock of the OIDN library (no OIDN install needed).


use crate::filter::scale_param;
use crate::native::{first_loadable, DeviceParam, FilterKind, FilterParam, NativeApi, SharedImage};
use crate::{
    DenoiseOptions, Device, DeviceOptions, DeviceType, Error, ErrorCode, Image, ImageRole,
    ImageView, ImageViewMut, LightmapOptions, Quality, Version,
};
use mock::{Call, MockApi};
use std::collections::HashSet;
use std::ffi::OsString;
use std::sync::Arc;

fn device_with(mock: &Arc<MockApi>, options: DeviceOptions) -> Device {
    let api: Arc<dyn NativeApi> = mock.clone();
    Device::with_api(api, options).expect("mock device creation")
}

fn device(mock: &Arc<MockApi>) -> Device {
    device_with(mock, DeviceOptions::default())
}

/// Image whose pixel (x, y) holds (x, y, x + y[, 1.0]).
fn gradient(width: usize, height: usize, channels: usize) -> Image {
    let mut img = Image::new(width, height, channels);
    let data = img.as_mut_slice();
    for y in 0..height {
        for x in 0..width {
            let p = (y * width + x) * channels;
            data[p] = x as f32;
            data[p + 1] = y as f32;
            data[p + 2] = (x + y) as f32;
            if channels == 4 {
                data[p + 3] = 1.0;
            }
        }
    }
    img
}

// ---------------------------------------------------------------------------
// Device lifecycle and configuration
// ---------------------------------------------------------------------------

#[test]
fn test_explicit_thread_count_is_set_before_commit() {
    let mock = MockApi::new().into_arc();
    let dev = device_with(
        &mock,
        DeviceOptions {
            device_type: DeviceType::Cpu,
            num_threads: Some(6),
        },
    );
    assert_eq!(dev.num_threads(), 6);
    assert_eq!(dev.device_type(), DeviceType::Cpu);

    let calls = mock.calls();
    assert_eq!(calls[0], Call::NewDevice(DeviceType::Cpu));
    assert_eq!(calls[1], Call::SetDeviceInt(DeviceParam::NumThreads, 6));
    assert_eq!(calls[2], Call::CommitDevice);
    assert_eq!(mock.count(|c| *c == Call::GetDeviceInt(DeviceParam::NumThreads)), 0);
}

#[test]
fn test_default_thread_count_is_read_back() {
    let mock = MockApi::new().with_default_threads(12).into_arc();
    let dev = device(&mock);
    assert_eq!(dev.num_threads(), 12);
    assert_eq!(mock.count(|c| matches!(c, Call::SetDeviceInt(..))), 0);
    assert_eq!(mock.count(|c| *c == Call::GetDeviceInt(DeviceParam::NumThreads)), 1);
}

#[test]
fn test_non_positive_thread_request_uses_native_default() {
    let mock = MockApi::new().with_default_threads(4).into_arc();
    let dev = device_with(
        &mock,
        DeviceOptions {
            device_type: DeviceType::Default,
            num_threads: Some(-1),
        },
    );
    assert_eq!(dev.num_threads(), 4);
    assert_eq!(mock.count(|c| matches!(c, Call::SetDeviceInt(..))), 0);
}

#[test]
fn test_set_num_threads_recommits() {
    let mock = MockApi::new().with_default_threads(16).into_arc();
    let mut dev = device(&mock);

    dev.set_num_threads(3).expect("set threads");
    assert_eq!(dev.num_threads(), 3);
    let calls = mock.calls();
    let n = calls.len();
    assert_eq!(calls[n - 2], Call::SetDeviceInt(DeviceParam::NumThreads, 3));
    assert_eq!(calls[n - 1], Call::CommitDevice);

    // Getting does not query the native side.
    let before = mock.call_count();
    assert_eq!(dev.num_threads(), 3);
    assert_eq!(mock.call_count(), before);

    dev.set_num_threads(0).expect("reset threads");
    assert_eq!(dev.num_threads(), 16);
    assert_eq!(mock.calls().last(), Some(&Call::GetDeviceInt(DeviceParam::NumThreads)));
}

#[test]
fn test_device_creation_failure_carries_native_error() {
    let mock = MockApi::new().failing_device().into_arc();
    let api: Arc<dyn NativeApi> = mock.clone();
    let err = Device::with_api(api, DeviceOptions::default()).expect_err("should fail");
    match err {
        Error::DeviceCreationFailed(Some(e)) => assert_eq!(e.code, ErrorCode::UnsupportedHardware),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(mock.calls().contains(&Call::TakeError { global: true }));
    assert_eq!(mock.count(|c| *c == Call::CommitDevice), 0);
}

#[test]
fn test_release_is_idempotent() {
    let mock = MockApi::new().into_arc();
    let mut dev = device(&mock);
    assert_eq!(mock.live_devices(), 1);

    dev.release();
    dev.release();
    assert!(dev.is_released());
    drop(dev);

    assert_eq!(mock.count(|c| *c == Call::ReleaseDevice), 1);
    assert_eq!(mock.live_devices(), 0);
    assert_eq!(mock.bad_releases(), 0);
}

#[test]
fn test_drop_releases_unused_device() {
    let mock = MockApi::new().into_arc();
    drop(device(&mock));
    assert_eq!(mock.count(|c| *c == Call::ReleaseDevice), 1);
    assert_eq!(mock.live_devices(), 0);
}

#[test]
fn test_released_device_rejects_operations() {
    let mock = MockApi::new().into_arc();
    let mut dev = device(&mock);
    dev.release();
    let before = mock.call_count();

    assert!(matches!(dev.set_num_threads(2), Err(Error::DeviceReleased)));
    assert!(matches!(dev.take_error(), Err(Error::DeviceReleased)));
    let img = Image::new(2, 2, 3);
    assert!(matches!(dev.denoise_image(&img), Err(Error::DeviceReleased)));
    assert_eq!(mock.call_count(), before);
}

#[test]
fn test_version_decoding() {
    assert_eq!(Version::from_packed(20401), Version::new(2, 4, 1));
    assert_eq!(Version::from_packed(10205), Version::new(1, 2, 5));
    assert_eq!(Version::from_packed(0), Version::new(0, 0, 0));
    assert_eq!(Version::from_packed(20401).to_string(), "2.4.1");

    let mock = MockApi::new().with_version(10300).into_arc();
    assert_eq!(device(&mock).version(), Version::new(1, 3, 0));
}

#[test]
fn test_scale_key_depends_on_version() {
    assert_eq!(scale_param(Version::new(1, 2, 4)), FilterParam::HdrScale);
    assert_eq!(scale_param(Version::new(1, 3, 0)), FilterParam::InputScale);
    assert_eq!(scale_param(Version::new(2, 4, 1)), FilterParam::InputScale);
    assert_eq!(FilterParam::HdrScale.key().to_str().unwrap(), "hdrScale");
    assert_eq!(FilterParam::InputScale.key().to_str().unwrap(), "inputScale");
}

#[test]
fn test_error_code_mapping() {
    assert_eq!(ErrorCode::from_raw(0), None);
    assert_eq!(ErrorCode::from_raw(4), Some(ErrorCode::OutOfMemory));
    assert_eq!(ErrorCode::from_raw(6), Some(ErrorCode::Cancelled));
    assert_eq!(ErrorCode::from_raw(42), Some(ErrorCode::Other(42)));
    assert_eq!(ErrorCode::Other(42).raw(), 42);
}

#[test]
fn test_library_search_skips_incomplete_candidates() {
    let candidates: Vec<OsString> = ["libOpenImageDenoise.so", "libOpenImageDenoise.so.2", "libOpenImageDenoise.so.1"]
        .iter()
        .map(OsString::from)
        .collect();
    let mut tried = Vec::new();
    let loaded = first_loadable(&candidates, |name| {
        tried.push(name.to_owned());
        if name == "libOpenImageDenoise.so" {
            Err("undefined symbol: oidnNewFilter".to_string())
        } else {
            Ok(name.to_owned())
        }
    })
    .expect("second candidate loads");
    assert_eq!(loaded, "libOpenImageDenoise.so.2");
    assert_eq!(tried.len(), 2);

    let err = first_loadable(&candidates, |_| Err::<(), _>("not found".to_string())).expect_err("nothing loads");
    assert_eq!(err, "libOpenImageDenoise.so.1: not found");
}

// ---------------------------------------------------------------------------
// Denoise
// ---------------------------------------------------------------------------

#[test]
fn test_denoise_with_aux_images() {
    for channels in [3, 4] {
        let mock = MockApi::new().into_arc();
        let dev = device(&mock);
        let color = gradient(5, 3, channels);
        let albedo = Image::new(5, 3, channels);
        let normal = Image::new(5, 3, 3);
        let mut output = Image::new(5, 3, 3);

        let status = dev
            .denoise(
                &color.view(),
                Some(&albedo.view()),
                Some(&normal.view()),
                &mut output.view_mut(),
                &DenoiseOptions::default(),
            )
            .expect("denoise");
        assert!(status.is_ok());
        assert_eq!((output.width(), output.height(), output.channels()), (5, 3, 3));
        assert_eq!(output.pixel(4, 2), &[4.0, 2.0, 6.0]);

        let roles = mock.attached_roles();
        let expected: HashSet<_> =
            [ImageRole::Color, ImageRole::Albedo, ImageRole::Normal, ImageRole::Output].into();
        assert_eq!(roles, expected);
        assert_eq!(mock.live_filters(), 0);
    }
}

#[test]
fn test_strides_follow_channel_count() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let color = gradient(7, 2, 4);
    let mut output = Image::new(7, 2, 3);
    let _ = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &DenoiseOptions::default())
        .expect("denoise");

    let images: Vec<_> = mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SetSharedImage(role, image) => Some((role, image)),
            _ => None,
        })
        .collect();
    assert_eq!(
        images,
        vec![
            (
                ImageRole::Color,
                SharedImage {
                    width: 7,
                    height: 2,
                    byte_offset: 0,
                    pixel_byte_stride: 16,
                    row_byte_stride: 112,
                }
            ),
            (
                ImageRole::Output,
                SharedImage {
                    width: 7,
                    height: 2,
                    byte_offset: 0,
                    pixel_byte_stride: 12,
                    row_byte_stride: 84,
                }
            ),
        ]
    );
}

#[test]
fn test_rgba_output_keeps_alpha() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let color = gradient(3, 3, 3);
    let mut output = Image::from_vec(vec![-1.0; 3 * 3 * 4], 3, 3, 4).unwrap();
    let _ = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &DenoiseOptions::default())
        .expect("denoise");
    assert_eq!(output.pixel(2, 1), &[2.0, 1.0, 3.0, -1.0]);
}

#[test]
fn test_denoise_call_sequence() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let setup = mock.call_count();
    let color = Image::new(2, 2, 3);
    let mut output = Image::new(2, 2, 3);
    let _ = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &DenoiseOptions::default())
        .expect("denoise");

    let calls = mock.calls()[setup..].to_vec();
    assert_eq!(calls[0], Call::NewFilter(FilterKind::Rt));
    assert!(matches!(calls[1], Call::SetSharedImage(ImageRole::Color, _)));
    assert!(matches!(calls[2], Call::SetSharedImage(ImageRole::Output, _)));
    assert_eq!(
        calls[3..],
        [
            Call::SetFilterBool(FilterParam::Hdr, true),
            Call::CommitFilter,
            Call::ExecuteFilter,
            Call::TakeError { global: false },
            Call::ReleaseFilter,
        ]
    );
}

#[test]
fn test_optional_parameters() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let color = Image::new(2, 2, 3);
    let mut output = Image::new(2, 2, 3);
    let options = DenoiseOptions {
        input_scale: Some(0.5),
        quality: Quality::High,
        clean_aux: true,
    };
    let _ = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &options)
        .expect("denoise");
    assert_eq!(mock.count(|c| *c == Call::SetFilterFloat(FilterParam::InputScale, 0.5)), 1);
    assert_eq!(mock.count(|c| *c == Call::SetFilterInt(FilterParam::Quality, 6)), 1);
    assert_eq!(mock.count(|c| *c == Call::SetFilterBool(FilterParam::CleanAux, true)), 1);

    // NaN means "let OIDN compute it".
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let options = DenoiseOptions {
        input_scale: Some(f32::NAN),
        ..DenoiseOptions::default()
    };
    let _ = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &options)
        .expect("denoise");
    assert_eq!(mock.count(|c| matches!(c, Call::SetFilterFloat(..))), 0);
    assert_eq!(mock.count(|c| matches!(c, Call::SetFilterInt(..))), 0);
}

#[test]
fn test_legacy_library_gets_hdr_scale() {
    let mock = MockApi::new().with_version(10204).into_arc();
    let dev = device(&mock);
    let color = Image::new(2, 2, 3);
    let mut output = Image::new(2, 2, 3);
    let options = DenoiseOptions {
        input_scale: Some(2.0),
        ..DenoiseOptions::default()
    };
    let _ = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &options)
        .expect("denoise");
    assert_eq!(mock.count(|c| *c == Call::SetFilterFloat(FilterParam::HdrScale, 2.0)), 1);
    assert_eq!(mock.count(|c| *c == Call::SetFilterFloat(FilterParam::InputScale, 2.0)), 0);
}

#[test]
fn test_invalid_channel_counts_make_no_native_calls() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let before = mock.call_count();
    let good = Image::new(4, 4, 3);

    for channels in [1, 2, 5, 6] {
        let bad = Image::new(4, 4, channels);

        let mut out = Image::new(4, 4, 3);
        let err = dev
            .denoise(&bad.view(), None, None, &mut out.view_mut(), &DenoiseOptions::default())
            .expect_err("bad color");
        assert!(matches!(err, Error::InvalidChannelCount { role: ImageRole::Color, channels: c } if c == channels));

        let err = dev
            .denoise(&good.view(), Some(&bad.view()), None, &mut out.view_mut(), &DenoiseOptions::default())
            .expect_err("bad albedo");
        assert!(matches!(err, Error::InvalidChannelCount { role: ImageRole::Albedo, .. }));

        let err = dev
            .denoise(&good.view(), None, Some(&bad.view()), &mut out.view_mut(), &DenoiseOptions::default())
            .expect_err("bad normal");
        assert!(matches!(err, Error::InvalidChannelCount { role: ImageRole::Normal, .. }));

        let mut bad_out = Image::new(4, 4, channels);
        let err = dev
            .denoise(&good.view(), None, None, &mut bad_out.view_mut(), &DenoiseOptions::default())
            .expect_err("bad output");
        assert!(matches!(err, Error::InvalidChannelCount { role: ImageRole::Output, .. }));

        let err = dev
            .denoise_lightmap(&bad.view(), &mut out.view_mut(), &LightmapOptions::default())
            .expect_err("bad lightmap color");
        assert!(matches!(err, Error::InvalidChannelCount { role: ImageRole::Color, .. }));
    }

    assert_eq!(mock.call_count(), before);
    assert_eq!(dev.pins().counts(), (0, 0));
}

#[test]
fn test_dimension_mismatch_makes_no_native_calls() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let before = mock.call_count();
    let color = Image::new(4, 4, 3);
    let wide = Image::new(5, 4, 3);
    let tall = Image::new(4, 5, 3);
    let mut out = Image::new(4, 4, 3);

    let err = dev
        .denoise(&color.view(), Some(&wide.view()), None, &mut out.view_mut(), &DenoiseOptions::default())
        .expect_err("albedo size");
    assert!(matches!(
        err,
        Error::DimensionMismatch { role: ImageRole::Albedo, expected: (4, 4), actual: (5, 4) }
    ));

    let err = dev
        .denoise(&color.view(), None, Some(&tall.view()), &mut out.view_mut(), &DenoiseOptions::default())
        .expect_err("normal size");
    assert!(matches!(err, Error::DimensionMismatch { role: ImageRole::Normal, .. }));

    let mut small_out = Image::new(3, 4, 3);
    let err = dev
        .denoise(&color.view(), None, None, &mut small_out.view_mut(), &DenoiseOptions::default())
        .expect_err("output size");
    assert!(matches!(err, Error::DimensionMismatch { role: ImageRole::Output, .. }));

    let err = dev
        .denoise_lightmap(&color.view(), &mut small_out.view_mut(), &LightmapOptions::default())
        .expect_err("lightmap output size");
    assert!(matches!(err, Error::DimensionMismatch { role: ImageRole::Output, .. }));

    assert_eq!(mock.call_count(), before);
}

#[test]
fn test_native_error_is_soft() {
    let mock = MockApi::new()
        .error_on_execute(ErrorCode::OutOfMemory, "allocation failed")
        .into_arc();
    let dev = device(&mock);
    let color = gradient(4, 4, 4);
    let mut output = Image::new(4, 4, 3);

    let status = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &DenoiseOptions::default())
        .expect("native errors do not fail the call");
    let err = status.native_error.clone().expect("native error reported");
    assert_eq!(err.code, ErrorCode::OutOfMemory);
    assert_eq!(err.message, "allocation failed");
    assert!(matches!(status.into_result(), Err(Error::Native(_))));

    assert_eq!(mock.live_filters(), 0);
    let (acquired, released) = dev.pins().counts();
    assert_eq!((acquired, released), (2, 2));
    // Polled once; nothing left behind.
    assert_eq!(dev.take_error().unwrap(), None);
}

#[test]
fn test_filter_creation_failure_is_soft() {
    let mock = MockApi::new().failing_filter().into_arc();
    let dev = device(&mock);
    let color = Image::new(2, 2, 3);
    let mut output = Image::new(2, 2, 3);

    let status = dev
        .denoise(&color.view(), None, None, &mut output.view_mut(), &DenoiseOptions::default())
        .expect("soft failure");
    assert_eq!(status.native_error.map(|e| e.code), Some(ErrorCode::InvalidArgument));
    assert_eq!(mock.count(|c| matches!(c, Call::SetSharedImage(..))), 0);
    assert_eq!(mock.count(|c| *c == Call::ExecuteFilter), 0);
    assert_eq!(mock.count(|c| *c == Call::ReleaseFilter), 0);
    assert_eq!(dev.pins().outstanding(), 0);
}

#[test]
fn test_pins_balance_across_calls() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let color = gradient(3, 2, 3);
    let albedo = Image::new(3, 2, 3);
    let mut output = Image::new(3, 2, 3);

    let _ = dev
        .denoise(&color.view(), Some(&albedo.view()), None, &mut output.view_mut(), &DenoiseOptions::default())
        .expect("denoise");
    assert_eq!(dev.pins().counts(), (3, 3));

    let _ = dev
        .denoise_lightmap(&color.view(), &mut output.view_mut(), &LightmapOptions::default())
        .expect("lightmap");
    assert_eq!(dev.pins().counts(), (5, 5));
}

#[test]
fn test_zero_image_end_to_end() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let input = Image::new(4, 4, 3);

    let (output, status) = dev.denoise_image(&input).expect("denoise");
    assert_eq!((output.width(), output.height(), output.channels()), (4, 4, 3));
    assert_eq!(output.as_slice().len(), 48);
    assert!(status.is_ok());
}

#[test]
fn test_denoise_image_drops_alpha() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let input = gradient(2, 2, 4);

    let (output, _) = dev.denoise_image(&input).expect("denoise");
    assert_eq!(output.channels(), 3);
    assert_eq!(output.pixel(1, 1), &[1.0, 1.0, 2.0]);
}

#[test]
fn test_lightmap_attaches_color_and_output_only() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let color = gradient(4, 4, 3);
    let mut output = Image::new(4, 4, 3);
    let options = LightmapOptions {
        directional: true,
        input_scale: None,
    };

    let status = dev
        .denoise_lightmap(&color.view(), &mut output.view_mut(), &options)
        .expect("lightmap");
    assert!(status.is_ok());

    let expected: HashSet<_> = [ImageRole::Color, ImageRole::Output].into();
    assert_eq!(mock.attached_roles(), expected);
    assert_eq!(mock.count(|c| *c == Call::NewFilter(FilterKind::RtLightmap)), 1);
    assert_eq!(mock.count(|c| *c == Call::SetFilterBool(FilterParam::Directional, true)), 1);
    assert_eq!(mock.count(|c| matches!(c, Call::SetFilterBool(FilterParam::Hdr, _))), 0);
    assert_eq!(output.pixel(3, 2), &[3.0, 2.0, 5.0]);
}

#[test]
fn test_lightmap_scale_key_follows_version() {
    for (packed, key, other) in [
        (20401, FilterParam::InputScale, FilterParam::HdrScale),
        (10204, FilterParam::HdrScale, FilterParam::InputScale),
    ] {
        let mock = MockApi::new().with_version(packed).into_arc();
        let dev = device(&mock);
        let color = Image::new(2, 2, 3);
        let mut output = Image::new(2, 2, 3);
        let options = LightmapOptions {
            directional: false,
            input_scale: Some(0.5),
        };
        let _ = dev
            .denoise_lightmap(&color.view(), &mut output.view_mut(), &options)
            .expect("lightmap");
        assert_eq!(mock.count(|c| *c == Call::SetFilterFloat(key, 0.5)), 1, "version {}", packed);
        assert_eq!(mock.count(|c| matches!(c, Call::SetFilterFloat(p, _) if *p == other)), 0);
        assert_eq!(mock.count(|c| *c == Call::SetFilterBool(FilterParam::Directional, false)), 1);
    }
}

#[test]
fn test_lightmap_nan_scale_is_not_sent() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let color = Image::new(2, 2, 3);
    let mut output = Image::new(2, 2, 3);
    let options = LightmapOptions {
        directional: false,
        input_scale: Some(f32::NAN),
    };
    let status = dev
        .denoise_lightmap(&color.view(), &mut output.view_mut(), &options)
        .expect("lightmap");
    assert!(status.is_ok());
    assert_eq!(mock.count(|c| matches!(c, Call::SetFilterFloat(..))), 0);
    assert_eq!(mock.count(|c| *c == Call::ExecuteFilter), 1);
}

#[test]
fn test_view_over_caller_slices() {
    let mock = MockApi::new().into_arc();
    let dev = device(&mock);
    let color = vec![0.25f32; 2 * 2 * 4];
    let mut output = vec![0.0f32; 2 * 2 * 3];

    let status = dev
        .denoise(
            &ImageView::new(&color, 2, 2, 4).unwrap(),
            None,
            None,
            &mut ImageViewMut::new(&mut output, 2, 2, 3).unwrap(),
            &DenoiseOptions::default(),
        )
        .expect("denoise");
    assert!(status.is_ok());
    assert!(output.iter().all(|&v| v == 0.25));
}
