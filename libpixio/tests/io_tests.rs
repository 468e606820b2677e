use std::path::PathBuf;

use pixio::{ImageInput, ImageOutput, OpenMode, PixioError, TypeDesc, AUTO_STRIDE};

fn gradient_rgba(width: i32, height: i32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 17 % 256) as u8);
            data.push((y * 31 % 256) as u8);
            data.push(((x + y) * 7 % 256) as u8);
            data.push(255);
        }
    }
    data
}

fn write_png(path: &PathBuf, width: i32, height: i32, pixels: &[u8]) {
    let spec = pixio::ImageSpec::new_2d(TypeDesc::UINT8, width, height, 4);
    let mut out = ImageOutput::create(path, None).expect("png is writable");
    out.open(path, &spec, OpenMode::Create).expect("open for write");
    out.write_image(TypeDesc::UINT8, pixels, AUTO_STRIDE, AUTO_STRIDE, AUTO_STRIDE, None)
        .expect("write");
    out.close().expect("close");
}

#[test]
fn write_then_read_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("gradient.png");
    let pixels = gradient_rgba(8, 5);
    write_png(&path, 8, 5, &pixels);

    let mut input = ImageInput::open(&path, None).expect("open for read");
    assert_eq!(input.format_name(), "png");
    let spec = input.spec().clone();
    assert_eq!((spec.width, spec.height, spec.nchannels), (8, 5, 4));
    assert_eq!(spec.format.basetype, pixio::BaseType::UInt8);

    let mut back = vec![0u8; pixels.len()];
    input.read_image(TypeDesc::UINT8, &mut back, None).expect("read");
    assert_eq!(back, pixels);
    input.close().expect("close");
}

#[test]
fn read_converts_to_float() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("two.png");
    // 1x1, a single mid-gray pixel.
    write_png(&path, 1, 1, &[128, 64, 255, 255]);

    let input = ImageInput::open(&path, None).expect("open");
    let mut data = vec![0f32; 4];
    input.read_image_f32(&mut data).expect("read floats");
    assert!((data[0] - 128.0 / 255.0).abs() < 1e-6);
    assert!((data[1] - 64.0 / 255.0).abs() < 1e-6);
    assert!((data[2] - 1.0).abs() < 1e-6);
    assert!((data[3] - 1.0).abs() < 1e-6);
}

#[test]
fn read_scanline_matches_image_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rows.png");
    let pixels = gradient_rgba(6, 4);
    write_png(&path, 6, 4, &pixels);

    let input = ImageInput::open(&path, None).expect("open");
    let mut row = vec![0f32; 6 * 4];
    input.read_scanline_f32(2, 0, &mut row).expect("scanline");
    for x in 0..6usize {
        let expected = f32::from(pixels[(2 * 6 + x) * 4]) / 255.0;
        assert!((row[x * 4] - expected).abs() < 1e-6);
    }

    // Out-of-range scanline fails without changing stream state.
    assert!(input.read_scanline_f32(99, 0, &mut row).is_err());
    assert!(input.read_scanline_f32(0, 0, &mut row).is_ok());
}

#[test]
fn strided_read_places_pixels_where_asked() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stride.png");
    let pixels = gradient_rgba(4, 2);
    write_png(&path, 4, 2, &pixels);

    let input = ImageInput::open(&path, None).expect("open");
    // Leave a 2-byte gap after every pixel.
    let xstride = 6isize;
    let mut buf = vec![0u8; (2 - 1) * 4 * 6 + (4 - 1) * 6 + 4];
    input
        .read_image_channels(0, 4, TypeDesc::UINT8, &mut buf, xstride, AUTO_STRIDE, AUTO_STRIDE, None)
        .expect("strided read");
    for y in 0..2usize {
        for x in 0..4usize {
            let src = &pixels[(y * 4 + x) * 4..][..4];
            let dst = &buf[y * 4 * 6 + x * 6..][..4];
            assert_eq!(src, dst, "pixel ({x},{y})");
        }
    }
}

#[test]
fn negative_strides_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("neg.png");
    write_png(&path, 2, 2, &gradient_rgba(2, 2));

    let input = ImageInput::open(&path, None).expect("open");
    let mut buf = vec![0u8; 64];
    let err = input
        .read_image_channels(0, 4, TypeDesc::UINT8, &mut buf, -4, AUTO_STRIDE, AUTO_STRIDE, None)
        .expect_err("negative stride");
    assert!(matches!(err, PixioError::InvalidStride(-4)));
}

#[test]
fn open_nonexistent_file_fails_with_message() {
    let err = ImageInput::open("definitely-not-here.png", None).expect_err("must fail");
    assert!(!err.to_string().is_empty());
}

#[test]
fn unknown_extension_is_rejected_at_create_time() {
    let err = ImageInput::create("file.unknownext", None).expect_err("must fail");
    assert!(matches!(err, PixioError::UnknownFormat(_)));
}

#[test]
fn seek_subimage_soft_failure_keeps_cursor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("seek.png");
    write_png(&path, 2, 2, &gradient_rgba(2, 2));

    let mut input = ImageInput::open(&path, None).expect("open");
    assert_eq!(input.current_subimage(), 0);
    assert!(input.seek_subimage(0, 0).is_ok());

    let err = input.seek_subimage(1, 0).expect_err("one subimage only");
    assert!(matches!(err, PixioError::SubimageNotFound { subimage: 1, .. }));
    assert_eq!(input.current_subimage(), 0);
    assert_eq!(input.current_miplevel(), 0);

    // Still readable after the soft failure.
    let mut data = vec![0f32; 2 * 2 * 4];
    assert!(input.read_image_f32(&mut data).is_ok());
}

#[test]
fn tile_reads_fail_on_untiled_images() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tile.png");
    write_png(&path, 4, 4, &gradient_rgba(4, 4));

    let input = ImageInput::open(&path, None).expect("open");
    let mut data = vec![0f32; 16];
    let err = input.read_tile_f32(0, 0, 0, &mut data).expect_err("untiled");
    assert!(matches!(err, PixioError::UnsupportedFormat(_)));
}

#[test]
fn reads_after_close_fail_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("closed.png");
    write_png(&path, 2, 2, &gradient_rgba(2, 2));

    let mut input = ImageInput::open(&path, None).expect("open");
    input.close().expect("close");
    let mut data = vec![0f32; 2 * 2 * 4];
    assert!(matches!(input.read_image_f32(&mut data), Err(PixioError::NotOpen)));
    assert!(matches!(input.seek_subimage(0, 0), Err(PixioError::NotOpen)));
}

#[test]
fn writes_after_close_fail_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sealed.png");
    let spec = pixio::ImageSpec::new_2d(TypeDesc::UINT8, 2, 2, 4);
    let pixels = gradient_rgba(2, 2);

    let mut out = ImageOutput::create(&path, None).expect("create");
    out.open(&path, &spec, OpenMode::Create).expect("open");
    out.write_image(TypeDesc::UINT8, &pixels, AUTO_STRIDE, AUTO_STRIDE, AUTO_STRIDE, None)
        .expect("write");
    out.close().expect("close");

    let err = out
        .write_image(TypeDesc::UINT8, &pixels, AUTO_STRIDE, AUTO_STRIDE, AUTO_STRIDE, None)
        .expect_err("closed stream");
    assert!(matches!(err, PixioError::NotOpen));
    // The file written before the failure is intact.
    assert!(ImageInput::open(&path, None).is_ok());
}

#[test]
fn write_before_open_fails_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("unopened.png");
    let mut out = ImageOutput::create(&path, None).expect("create");
    let err = out
        .write_image(TypeDesc::UINT8, &[0u8; 4], AUTO_STRIDE, AUTO_STRIDE, AUTO_STRIDE, None)
        .expect_err("not open yet");
    assert!(matches!(err, PixioError::NotOpen));
}

#[test]
fn append_modes_are_rejected_and_leave_the_handle_reusable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("append.png");
    let spec = pixio::ImageSpec::new_2d(TypeDesc::UINT8, 2, 2, 4);
    let mut out = ImageOutput::create(&path, None).expect("create");

    assert!(out.open(&path, &spec, OpenMode::AppendSubimage).is_err());
    // A failed open leaves the handle usable for a correct one.
    assert!(out.open(&path, &spec, OpenMode::Create).is_ok());
}

#[test]
fn open_multi_accepts_one_spec_and_rejects_many() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("multi.png");
    let spec = pixio::ImageSpec::new_2d(TypeDesc::UINT8, 2, 2, 4);

    let mut out = ImageOutput::create(&path, None).expect("create");
    assert!(out.open_multi(&path, &[spec.clone(), spec.clone()]).is_err());
    assert!(out.open_multi(&path, std::slice::from_ref(&spec)).is_ok());
}

#[test]
fn scanline_writes_accumulate_into_the_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scanlines.png");
    let spec = pixio::ImageSpec::new_2d(TypeDesc::UINT8, 4, 3, 4);
    let pixels = gradient_rgba(4, 3);

    let mut out = ImageOutput::create(&path, None).expect("create");
    out.open(&path, &spec, OpenMode::Create).expect("open");
    for y in 0..3 {
        let row = &pixels[(y as usize) * 4 * 4..][..4 * 4];
        out.write_scanline(y, 0, TypeDesc::UINT8, row, AUTO_STRIDE)
            .expect("scanline");
    }
    out.close().expect("close");

    let input = ImageInput::open(&path, None).expect("open for read");
    let mut back = vec![0u8; pixels.len()];
    input.read_image(TypeDesc::UINT8, &mut back, None).expect("read");
    assert_eq!(back, pixels);
}

#[test]
fn progress_callback_runs_and_can_interrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("progress.png");
    write_png(&path, 4, 4, &gradient_rgba(4, 4));

    let input = ImageInput::open(&path, None).expect("open");
    let mut calls = 0u32;
    let mut buf = vec![0u8; 4 * 4 * 4];
    {
        let mut observe = |_portion: f32| {
            calls += 1;
            false
        };
        input
            .read_image(TypeDesc::UINT8, &mut buf, Some(&mut observe))
            .expect("read with progress");
    }
    assert!(calls > 0);

    let mut cancel = |_portion: f32| true;
    let err = input
        .read_image(TypeDesc::UINT8, &mut buf, Some(&mut cancel))
        .expect_err("interrupted");
    assert!(matches!(err, PixioError::Interrupted));
}

#[test]
fn config_hint_can_request_a_float_working_format() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hint.png");
    write_png(&path, 2, 2, &gradient_rgba(2, 2));

    let hint = pixio::ImageSpec::new(TypeDesc::FLOAT);
    let input = ImageInput::open(&path, Some(&hint)).expect("open with hint");
    assert_eq!(input.spec().format.basetype, pixio::BaseType::Float);
    // The hint spec itself was not mutated.
    assert_eq!(hint.nchannels, 0);
}

#[test]
fn valid_file_sniffs_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("real.png");
    write_png(&path, 2, 2, &gradient_rgba(2, 2));
    let fake = dir.path().join("fake.png");
    std::fs::write(&fake, b"not a png at all").expect("write junk");

    let input = ImageInput::create(&path, None).expect("create");
    assert!(input.valid_file(&path));
    assert!(!input.valid_file(&fake));
    assert!(!input.valid_file(dir.path().join("missing.png")));
}
