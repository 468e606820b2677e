//! C surface for read-stream handles.
//!
//! A handle comes from `open` or `create` and must be released with
//! exactly one `pixio_imageinput_delete`. After a failing call on a
//! handle, drain its message with `pixio_imageinput_geterror` before the
//! next call overwrites it. Handles are single-threaded.

use std::os::raw::{c_char, c_int, c_void};

use super::{
    make_cstring, set_last_error, PixioImageInput, PixioImageSpec, PixioProgressCallback,
    PixioStringRef, PixioTypeDesc,
};
use crate::error::Result;
use crate::input::ImageInput;
use crate::pixels;
use crate::typedesc::TypeDesc;
use crate::AUTO_STRIDE;

pub(crate) struct InputHandle {
    pub(crate) input: ImageInput,
    pub(crate) error: Option<String>,
}

impl InputHandle {
    fn record<T>(&mut self, result: Result<T>) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                self.error = Some(e.to_string());
                false
            }
        }
    }
}

fn into_handle(input: ImageInput) -> *mut PixioImageInput {
    Box::into_raw(Box::new(InputHandle { input, error: None })).cast::<PixioImageInput>()
}

unsafe fn handle_mut<'a>(p: *mut PixioImageInput) -> Option<&'a mut InputHandle> {
    unsafe { p.cast::<InputHandle>().as_mut() }
}

unsafe fn handle_ref<'a>(p: *const PixioImageInput) -> Option<&'a InputHandle> {
    unsafe { p.cast::<InputHandle>().as_ref() }
}

/// Opens `filename` for reading. `config`, when non-null, is a borrowed
/// hint spec, never retained. Null on failure with the thread-local
/// error set.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_open(
    filename: PixioStringRef,
    config: *const PixioImageSpec,
) -> *mut PixioImageInput {
    let name = unsafe { filename.to_owned_lossy() };
    let config = unsafe { super::spec_ref(config) };
    match ImageInput::open(&name, config) {
        Ok(input) => into_handle(input),
        Err(e) => {
            set_last_error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Resolves a format plugin for `filename` without opening the file.
/// Null on failure with the thread-local error set.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_create(
    filename: PixioStringRef,
    plugin_searchpath: PixioStringRef,
) -> *mut PixioImageInput {
    let name = unsafe { filename.to_owned_lossy() };
    let searchpath = unsafe { plugin_searchpath.to_owned_lossy() };
    match ImageInput::create(&name, Some(&searchpath)) {
        Ok(input) => into_handle(input),
        Err(e) => {
            set_last_error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Releases a handle. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_delete(input: *mut PixioImageInput) {
    if !input.is_null() {
        drop(unsafe { Box::from_raw(input.cast::<InputHandle>()) });
    }
}

/// Drains this handle's pending error message; empty when none. The
/// returned string is owned by the caller.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_geterror(input: *mut PixioImageInput) -> *mut c_char {
    let msg = unsafe { handle_mut(input) }
        .and_then(|h| h.error.take())
        .unwrap_or_default();
    make_cstring(&msg)
}

/// Owned copy of the resolved plugin's short name.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_format_name(
    input: *const PixioImageInput,
) -> *mut c_char {
    let name = unsafe { handle_ref(input) }.map_or("", |h| h.input.format_name());
    make_cstring(name)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_valid_file(
    input: *const PixioImageInput,
    filename: PixioStringRef,
) -> bool {
    let Some(h) = (unsafe { handle_ref(input) }) else {
        return false;
    };
    let name = unsafe { filename.to_owned_lossy() };
    h.input.valid_file(&name)
}

/// Opens (or re-opens) a created handle on `name`.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_open_path(
    input: *mut PixioImageInput,
    name: PixioStringRef,
) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    let name = unsafe { name.to_owned_lossy() };
    let result = h.input.open_path(&name);
    h.record(result)
}

/// Borrowed spec of the current subimage: valid only while this handle
/// stays open, never passed to `pixio_imagespec_delete`.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_spec(
    input: *const PixioImageInput,
) -> *const PixioImageSpec {
    unsafe { handle_ref(input) }.map_or(std::ptr::null(), |h| {
        (h.input.spec() as *const crate::ImageSpec).cast::<PixioImageSpec>()
    })
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_supports(
    input: *const PixioImageInput,
    feature: PixioStringRef,
) -> bool {
    let Some(h) = (unsafe { handle_ref(input) }) else {
        return false;
    };
    let feature = unsafe { feature.to_owned_lossy() };
    h.input.supports(&feature)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_close(input: *mut PixioImageInput) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    let result = h.input.close();
    h.record(result)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_current_subimage(
    input: *const PixioImageInput,
) -> c_int {
    unsafe { handle_ref(input) }.map_or(0, |h| h.input.current_subimage())
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_current_miplevel(
    input: *const PixioImageInput,
) -> c_int {
    unsafe { handle_ref(input) }.map_or(0, |h| h.input.current_miplevel())
}

/// Moves the subimage/miplevel cursor. On failure the cursor is
/// unchanged (soft failure, handle stays open).
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_seek_subimage(
    input: *mut PixioImageInput,
    subimage: c_int,
    miplevel: c_int,
) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    let result = h.input.seek_subimage(subimage, miplevel);
    h.record(result)
}

/// Reads scanline `y` as floats into `data`, which must hold at least
/// `width * nchannels` floats.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_read_scanline_floats(
    input: *mut PixioImageInput,
    y: c_int,
    z: c_int,
    data: *mut f32,
) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    if data.is_null() {
        return false;
    }
    let spec = h.input.spec();
    let len = spec.width.max(0) as usize * spec.nchannels.max(0) as usize;
    let slice = unsafe { std::slice::from_raw_parts_mut(data, len) };
    let result = h.input.read_scanline_f32(y, z, slice);
    h.record(result)
}

/// Reads the tile at `(x, y, z)` as floats into `data`, which must hold
/// at least `tile_pixels * nchannels` floats.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_read_tile_floats(
    input: *mut PixioImageInput,
    x: c_int,
    y: c_int,
    z: c_int,
    data: *mut f32,
) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    if data.is_null() {
        return false;
    }
    let spec = h.input.spec();
    let len = spec.tile_pixels() as usize * spec.nchannels.max(0) as usize;
    let slice = unsafe { std::slice::from_raw_parts_mut(data, len) };
    let result = h.input.read_tile_f32(x, y, z, slice);
    h.record(result)
}

/// Reads the whole current subimage as floats into `data`, which must
/// hold at least `image_pixels * nchannels` floats.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_read_image_floats(
    input: *mut PixioImageInput,
    data: *mut f32,
) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    if data.is_null() {
        return false;
    }
    let spec = h.input.spec();
    let len = spec.image_pixels() as usize * spec.nchannels.max(0) as usize;
    let slice = unsafe { std::slice::from_raw_parts_mut(data, len) };
    let result = h.input.read_image_f32(slice);
    h.record(result)
}

pub(crate) fn adapt_progress(
    callback: PixioProgressCallback,
    opaque: *mut c_void,
) -> Option<Box<dyn FnMut(f32) -> bool>> {
    callback.map(|cb| {
        let hook: Box<dyn FnMut(f32) -> bool> =
            Box::new(move |portion| unsafe { cb(opaque, portion) });
        hook
    })
}

/// Reads the whole current subimage, converting to `format`, with
/// contiguous layout. `data` must hold `image_pixels * nchannels`
/// samples of `format`. The progress callback, when non-null, runs
/// synchronously on this thread and may interrupt by returning true.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageinput_read_image(
    input: *mut PixioImageInput,
    format: PixioTypeDesc,
    data: *mut c_void,
    callback: PixioProgressCallback,
    opaque_data: *mut c_void,
) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    let spec = h.input.spec();
    let nch = spec.nchannels;
    unsafe {
        read_image_channels_impl(h, 0, nch, format, data, AUTO_STRIDE, AUTO_STRIDE, AUTO_STRIDE, callback, opaque_data)
    }
}

/// Channel-range, strided read of the whole current subimage. Strides
/// are byte strides; pass the auto-stride sentinel for contiguous
/// defaults.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imageinput_read_image_channels(
    input: *mut PixioImageInput,
    chbegin: c_int,
    chend: c_int,
    format: PixioTypeDesc,
    data: *mut c_void,
    xstride: isize,
    ystride: isize,
    zstride: isize,
    callback: PixioProgressCallback,
    opaque_data: *mut c_void,
) -> bool {
    let Some(h) = (unsafe { handle_mut(input) }) else {
        return false;
    };
    unsafe {
        read_image_channels_impl(
            h, chbegin, chend, format, data, xstride, ystride, zstride, callback, opaque_data,
        )
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn read_image_channels_impl(
    h: &mut InputHandle,
    chbegin: c_int,
    chend: c_int,
    format: PixioTypeDesc,
    data: *mut c_void,
    xstride: isize,
    ystride: isize,
    zstride: isize,
    callback: PixioProgressCallback,
    opaque_data: *mut c_void,
) -> bool {
    if data.is_null() {
        return false;
    }
    let td = match TypeDesc::from_raw(format) {
        Ok(td) => td,
        Err(e) => return h.record::<()>(Err(e)),
    };
    let spec = h.input.spec();
    let nch = (chend - chbegin).max(0) as usize;
    let (w, hgt, d) = (
        spec.width.max(0) as usize,
        spec.height.max(0) as usize,
        spec.depth.max(0) as usize,
    );
    let span = pixels::resolve_strides(td.basetype.bytes(), nch, w, hgt, xstride, ystride, zstride)
        .and_then(|strides| pixels::span_bytes(strides, w, hgt, d, td.basetype.bytes() * nch));
    let span = match span {
        Ok(span) => span,
        Err(e) => return h.record::<()>(Err(e)),
    };
    let slice = unsafe { std::slice::from_raw_parts_mut(data.cast::<u8>(), span) };
    let mut hook = adapt_progress(callback, opaque_data);
    let result = h.input.read_image_channels(
        chbegin,
        chend,
        td,
        slice,
        xstride,
        ystride,
        zstride,
        hook.as_deref_mut(),
    );
    h.record(result)
}
