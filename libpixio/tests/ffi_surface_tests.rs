//! End-to-end drives of the C surface: raw pointers, POD structs, and
//! free functions only, the way a host-language binding would call it.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::atomic::{AtomicU32, Ordering};

use pixio::ffi::*;

fn sref(s: &str) -> PixioStringRef {
    PixioStringRef {
        ptr: s.as_ptr().cast::<c_char>(),
        len: s.len(),
    }
}

unsafe fn take_string(p: *mut c_char) -> String {
    assert!(!p.is_null());
    let s = unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned();
    unsafe { pixio_free_string(p) };
    s
}

const UINT8: PixioTypeDesc = PixioTypeDesc {
    basetype: 2,
    aggregate: 1,
    vecsemantics: 0,
    reserved: 0,
    arraylen: 0,
};

const FLOAT: PixioTypeDesc = PixioTypeDesc {
    basetype: 11,
    aggregate: 1,
    vecsemantics: 0,
    reserved: 0,
    arraylen: 0,
};

#[test]
fn spec_accessors() {
    let spec = pixio_imagespec_new_2d(64, 32, 4, FLOAT);
    assert!(!spec.is_null());
    unsafe {
        assert_eq!(pixio_imagespec_width(spec), 64);
        assert_eq!(pixio_imagespec_height(spec), 32);
        assert_eq!(pixio_imagespec_nchannels(spec), 4);
        assert_eq!(pixio_imagespec_depth(spec), 1);
        assert_eq!(pixio_imagespec_alpha_channel(spec), 3);

        pixio_imagespec_set_tile_width(spec, 16);
        pixio_imagespec_set_tile_height(spec, 16);
        pixio_imagespec_set_tile_depth(spec, 1);
        assert_eq!(pixio_imagespec_tile_pixels(spec), 256);
        assert_eq!(pixio_imagespec_tile_bytes(spec, false), 256 * 16);

        assert_eq!(pixio_imagespec_pixel_bytes(spec, false), 16);
        assert_eq!(pixio_imagespec_image_bytes(spec, false), 64 * 32 * 16);
        assert!(pixio_imagespec_size_safe(spec));

        let name = take_string(pixio_imagespec_channel_name(spec, 1));
        assert_eq!(name, "G");
        let beyond = take_string(pixio_imagespec_channel_name(spec, 99));
        assert_eq!(beyond, "");

        let fmt = pixio_imagespec_format(spec);
        assert_eq!(fmt.basetype, 11);

        pixio_imagespec_delete(spec);
    }
}

#[test]
fn spec_channel_names_through_a_string_array() {
    let spec = pixio_imagespec_new_2d(4, 4, 3, UINT8);
    let names = pixio_string_array_new(3);
    unsafe {
        assert!(pixio_string_array_set(names, 3, 0, sref("red")));
        assert!(pixio_string_array_set(names, 3, 1, sref("green")));
        assert!(pixio_string_array_set(names, 3, 2, sref("blue")));
        pixio_imagespec_set_channel_names(spec, names.cast_const().cast(), 3);
        // The spec copied the names; the array can be released now.
        pixio_string_array_free(names, 3);

        assert_eq!(take_string(pixio_imagespec_channel_name(spec, 0)), "red");
        assert_eq!(take_string(pixio_imagespec_channel_name(spec, 2)), "blue");
        pixio_imagespec_delete(spec);
    }
}

#[test]
fn spec_attributes_via_the_boundary() {
    let spec = pixio_imagespec_new(UINT8);
    unsafe {
        pixio_imagespec_attribute_int(spec, sref("Orientation"), 6);
        pixio_imagespec_attribute_float(spec, sref("PixelAspectRatio"), 2.0);
        pixio_imagespec_attribute_string(spec, sref("Software"), sref("host"));

        assert_eq!(pixio_imagespec_get_int_attribute(spec, sref("Orientation"), 0), 6);
        assert_eq!(
            pixio_imagespec_get_float_attribute(spec, sref("PixelAspectRatio"), 0.0),
            2.0
        );
        assert_eq!(
            take_string(pixio_imagespec_get_string_attribute(spec, sref("Software"), sref("?"))),
            "host"
        );
        // Absent or mismatched: the caller's default, never a failure.
        assert_eq!(pixio_imagespec_get_int_attribute(spec, sref("Software"), -7), -7);
        assert_eq!(
            take_string(pixio_imagespec_get_string_attribute(spec, sref("missing"), sref("dflt"))),
            "dflt"
        );

        // Typed set through a void pointer.
        let exposure = 0.25f32;
        assert!(pixio_imagespec_attribute_typed(
            spec,
            sref("ExposureTime"),
            FLOAT,
            (&exposure as *const f32).cast::<c_void>(),
        ));
        assert_eq!(
            pixio_imagespec_get_float_attribute(spec, sref("ExposureTime"), 0.0),
            0.25
        );

        // Case-insensitive erase with a type filter.
        let unknown = PixioTypeDesc::default();
        pixio_imagespec_erase_attribute(spec, sref("orientation"), unknown, false);
        assert_eq!(pixio_imagespec_get_int_attribute(spec, sref("Orientation"), 0), 0);

        let json = take_string(pixio_imagespec_to_json(spec));
        assert!(json.contains("ExposureTime"));

        pixio_imagespec_delete(spec);
    }
}

#[test]
fn invalid_typedesc_is_rejected_at_the_boundary() {
    let bogus = PixioTypeDesc {
        basetype: 99,
        aggregate: 1,
        vecsemantics: 0,
        reserved: 0,
        arraylen: 0,
    };
    let spec = pixio_imagespec_new(bogus);
    assert!(spec.is_null());
    let msg = unsafe { take_string(pixio_geterror()) };
    assert!(msg.contains("type descriptor"), "got: {msg}");
}

static PROGRESS_CALLS: AtomicU32 = AtomicU32::new(0);

unsafe extern "C" fn count_progress(_opaque: *mut c_void, _portion: f32) -> bool {
    PROGRESS_CALLS.fetch_add(1, Ordering::Relaxed);
    false
}

#[test]
fn output_input_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("seq.png");
    let name = path.display().to_string();

    let mut pixels = Vec::with_capacity(8 * 4 * 4);
    for i in 0..8 * 4 * 4 {
        pixels.push((i * 13 % 256) as u8);
    }

    unsafe {
        let out = pixio_imageoutput_create(sref(&name), sref(""));
        assert!(!out.is_null());
        assert_eq!(take_string(pixio_imageoutput_format_name(out)), "png");

        let spec = pixio_imagespec_new_2d(8, 4, 4, UINT8);
        assert!(pixio_imageoutput_open(out, sref(&name), spec.cast_const(), 0));
        assert!(pixio_imageoutput_write_image(
            out,
            UINT8,
            pixels.as_ptr().cast::<c_void>(),
            isize::MIN,
            isize::MIN,
            isize::MIN,
            None,
            std::ptr::null_mut(),
        ));
        assert!(pixio_imageoutput_close(out));

        // Writes after close fail and report; memory stays intact.
        assert!(!pixio_imageoutput_write_image(
            out,
            UINT8,
            pixels.as_ptr().cast::<c_void>(),
            isize::MIN,
            isize::MIN,
            isize::MIN,
            None,
            std::ptr::null_mut(),
        ));
        let msg = take_string(pixio_imageoutput_geterror(out));
        assert!(!msg.is_empty());
        pixio_imageoutput_delete(out);
        pixio_imagespec_delete(spec);

        // Read it back through the input surface.
        let input = pixio_imageinput_open(sref(&name), std::ptr::null());
        assert!(!input.is_null());
        assert_eq!(take_string(pixio_imageinput_format_name(input)), "png");

        let borrowed = pixio_imageinput_spec(input);
        assert!(!borrowed.is_null());
        assert_eq!(pixio_imagespec_width(borrowed), 8);
        assert_eq!(pixio_imagespec_height(borrowed), 4);
        assert_eq!(pixio_imagespec_nchannels(borrowed), 4);

        let mut back = vec![0u8; pixels.len()];
        PROGRESS_CALLS.store(0, Ordering::Relaxed);
        assert!(pixio_imageinput_read_image(
            input,
            UINT8,
            back.as_mut_ptr().cast::<c_void>(),
            Some(count_progress),
            std::ptr::null_mut(),
        ));
        assert_eq!(back, pixels);
        assert!(PROGRESS_CALLS.load(Ordering::Relaxed) > 0);

        // Soft-failing seek leaves the cursor alone.
        assert!(!pixio_imageinput_seek_subimage(input, 2, 0));
        let seek_err = take_string(pixio_imageinput_geterror(input));
        assert!(!seek_err.is_empty());
        assert_eq!(pixio_imageinput_current_subimage(input), 0);

        let mut floats = vec![0f32; 8 * 4];
        assert!(pixio_imageinput_read_scanline_floats(input, 1, 0, floats.as_mut_ptr()));
        assert!((floats[0] - f32::from(pixels[8 * 4]) / 255.0).abs() < 1e-6);

        assert!(pixio_imageinput_close(input));
        assert!(!pixio_imageinput_read_image_floats(input, floats.as_mut_ptr()));
        pixio_imageinput_delete(input);
    }
}

#[test]
fn open_multi_copies_the_spec_array_by_value() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("multi.png");
    let name = path.display().to_string();

    unsafe {
        let out = pixio_imageoutput_create(sref(&name), sref(""));
        let a = pixio_imagespec_new_2d(2, 2, 3, UINT8);
        let b = pixio_imagespec_new_2d(2, 2, 3, UINT8);
        let specs = [a.cast_const(), b.cast_const()];

        // More than one subimage: cleanly refused by the engine.
        assert!(!pixio_imageoutput_open_multi(out, sref(&name), 2, specs.as_ptr()));
        let _ = take_string(pixio_imageoutput_geterror(out));

        // Exactly one works, and the host's specs stay host-owned.
        assert!(pixio_imageoutput_open_multi(out, sref(&name), 1, specs.as_ptr()));
        pixio_imagespec_delete(a);
        pixio_imagespec_delete(b);

        let px = [0u8; 2 * 2 * 3];
        assert!(pixio_imageoutput_write_image(
            out,
            UINT8,
            px.as_ptr().cast::<c_void>(),
            isize::MIN,
            isize::MIN,
            isize::MIN,
            None,
            std::ptr::null_mut(),
        ));
        assert!(pixio_imageoutput_close(out));
        pixio_imageoutput_delete(out);
    }
}

#[test]
fn cache_surface() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cached.png");
    let name = path.display().to_string();

    // Seed a file through the output surface.
    let mut pixels = Vec::with_capacity(4 * 4 * 4);
    for i in 0..4 * 4 * 4 {
        pixels.push((i * 11 % 256) as u8);
    }
    unsafe {
        let out = pixio_imageoutput_create(sref(&name), sref(""));
        let spec = pixio_imagespec_new_2d(4, 4, 4, UINT8);
        assert!(pixio_imageoutput_open(out, sref(&name), spec.cast_const(), 0));
        assert!(pixio_imageoutput_write_image(
            out,
            UINT8,
            pixels.as_ptr().cast::<c_void>(),
            isize::MIN,
            isize::MIN,
            isize::MIN,
            None,
            std::ptr::null_mut(),
        ));
        assert!(pixio_imageoutput_close(out));
        pixio_imageoutput_delete(out);
        pixio_imagespec_delete(spec);
    }

    unsafe {
        let cache = pixio_imagecache_create(false);
        assert!(!cache.is_null());

        // Settings round-trip; unknown names and bad types refused.
        let budget = 512.0f32;
        assert!(pixio_imagecache_attribute(
            cache,
            sref("max_memory_MB"),
            FLOAT,
            (&budget as *const f32).cast::<c_void>(),
        ));
        let mut readback = 0.0f32;
        assert!(pixio_imagecache_getattribute(
            cache,
            sref("max_memory_MB"),
            FLOAT,
            (&mut readback as *mut f32).cast::<c_void>(),
        ));
        assert_eq!(readback, 512.0);
        assert!(!pixio_imagecache_attribute(
            cache,
            sref("bogus_setting"),
            FLOAT,
            (&budget as *const f32).cast::<c_void>(),
        ));
        assert!(!pixio_imagecache_getattribute(
            cache,
            sref("max_memory_MB"),
            UINT8,
            (&mut readback as *mut f32).cast::<c_void>(),
        ));

        // Per-thread scratch: explicit handles are preferred and identity
        // passes through get-or-create; null degrades to a cache-owned
        // default.
        let pt = pixio_imagecache_create_perthread_info(cache);
        assert!(!pt.is_null());
        assert_eq!(pixio_imagecache_get_perthread_info(cache, pt), pt);
        let auto = pixio_imagecache_get_perthread_info(cache, std::ptr::null_mut());
        assert!(!auto.is_null());

        // Handle resolution is one-time: both lookups alias one entry.
        let h1 = pixio_imagecache_get_image_handle(cache, sref(&name), pt);
        let h2 = pixio_imagecache_get_image_handle(cache, sref(&name), pt);
        assert!(!h1.is_null());
        assert_eq!(h1, h2);
        assert!(pixio_imagecache_good(cache, h1));

        // Metadata through both forms.
        let mut resolution = [0i32; 2];
        let int2 = PixioTypeDesc {
            basetype: 7,
            aggregate: 1,
            vecsemantics: 0,
            reserved: 0,
            arraylen: 2,
        };
        assert!(pixio_imagecache_get_image_info(
            cache,
            sref(&name),
            0,
            0,
            sref("resolution"),
            int2,
            resolution.as_mut_ptr().cast::<c_void>(),
        ));
        assert_eq!(resolution, [4, 4]);

        let mut channels = 0i32;
        let int1 = PixioTypeDesc {
            basetype: 7,
            aggregate: 1,
            vecsemantics: 0,
            reserved: 0,
            arraylen: 0,
        };
        assert!(pixio_imagecache_get_image_info_by_handle(
            cache,
            h1,
            pt,
            0,
            0,
            sref("channels"),
            int1,
            (&mut channels as *mut i32).cast::<c_void>(),
        ));
        assert_eq!(channels, 4);

        // Spec into a caller-owned record.
        let spec = pixio_imagespec_new(UINT8);
        assert!(pixio_imagecache_get_imagespec_by_handle(cache, h1, pt, spec, 0, 0, false));
        assert_eq!(pixio_imagespec_width(spec.cast_const()), 4);

        // Pixels through the handle-based fast path.
        let mut region = vec![0u8; 2 * 2 * 4];
        assert!(pixio_imagecache_get_pixels_stride_by_handle(
            cache,
            h1,
            pt,
            0,
            0,
            1,
            3,
            1,
            3,
            0,
            1,
            0,
            4,
            UINT8,
            region.as_mut_ptr().cast::<c_void>(),
            isize::MIN,
            isize::MIN,
            isize::MIN,
            0,
            0,
        ));
        for y in 0..2usize {
            for x in 0..2usize {
                let src = &pixels[((y + 1) * 4 + (x + 1)) * 4..][..4];
                let dst = &region[(y * 2 + x) * 4..][..4];
                assert_eq!(src, dst);
            }
        }

        // Invalidation: the old handle stays dereferenceable but fails.
        pixio_imagecache_invalidate(cache, sref(&name));
        assert!(!pixio_imagecache_good(cache, h1));
        assert!(!pixio_imagecache_get_imagespec_by_handle(cache, h1, pt, spec, 0, 0, false));
        let msg = take_string(pixio_imagecache_geterror(cache));
        assert!(!msg.is_empty());

        // Name-based queries re-resolve and recover.
        assert!(pixio_imagecache_get_imagespec(cache, sref(&name), spec, 0, 0, false));
        pixio_imagespec_delete(spec);

        let stats = take_string(pixio_imagecache_getstats(cache.cast_const(), 2));
        assert!(stats.contains("resident"));

        let resolved = take_string(pixio_imagecache_resolve_filename(cache, sref(&name)));
        assert_eq!(resolved, name);

        pixio_imagecache_destroy_perthread_info(cache, pt);
        pixio_imagecache_destroy(cache, false);
    }
}
