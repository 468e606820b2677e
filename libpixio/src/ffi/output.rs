//! C surface for write-stream handles.
//!
//! A handle comes from `create` and must be released with exactly one
//! `pixio_imageoutput_delete`. Failing calls record their message on the
//! handle; drain it with `pixio_imageoutput_geterror` before the next
//! call overwrites it. Handles are single-threaded.

use std::os::raw::{c_char, c_int, c_void};

use super::input::adapt_progress;
use super::{
    make_cstring, set_last_error, spec_ref, PixioImageOutput, PixioImageSpec,
    PixioProgressCallback, PixioStringRef, PixioTypeDesc,
};
use crate::error::{PixioError, Result};
use crate::output::{ImageOutput, OpenMode};
use crate::pixels;
use crate::spec::ImageSpec;
use crate::typedesc::TypeDesc;

pub(crate) struct OutputHandle {
    pub(crate) output: ImageOutput,
    pub(crate) error: Option<String>,
}

impl OutputHandle {
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

unsafe fn handle_mut<'a>(p: *mut PixioImageOutput) -> Option<&'a mut OutputHandle> {
    unsafe { p.cast::<OutputHandle>().as_mut() }
}

unsafe fn handle_ref<'a>(p: *const PixioImageOutput) -> Option<&'a OutputHandle> {
    unsafe { p.cast::<OutputHandle>().as_ref() }
}

/// Resolves a writable format plugin for `filename` without creating the
/// file. Null on failure with the thread-local error set.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_create(
    filename: PixioStringRef,
    plugin_searchpath: PixioStringRef,
) -> *mut PixioImageOutput {
    let name = unsafe { filename.to_owned_lossy() };
    let searchpath = unsafe { plugin_searchpath.to_owned_lossy() };
    match ImageOutput::create(&name, Some(&searchpath)) {
        Ok(output) => {
            Box::into_raw(Box::new(OutputHandle { output, error: None })).cast::<PixioImageOutput>()
        }
        Err(e) => {
            set_last_error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Releases a handle. Null is a no-op. Does not flush: close first.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_delete(output: *mut PixioImageOutput) {
    if !output.is_null() {
        drop(unsafe { Box::from_raw(output.cast::<OutputHandle>()) });
    }
}

/// Drains this handle's pending error message; empty when none. The
/// returned string is owned by the caller.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_geterror(output: *mut PixioImageOutput) -> *mut c_char {
    let msg = unsafe { handle_mut(output) }
        .and_then(|h| h.error.take())
        .unwrap_or_default();
    make_cstring(&msg)
}

/// Owned copy of the resolved plugin's short name.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_format_name(
    output: *const PixioImageOutput,
) -> *mut c_char {
    let name = unsafe { handle_ref(output) }.map_or("", |h| h.output.format_name());
    make_cstring(name)
}

/// Borrowed spec declared at open time: valid only while this handle
/// lives, never passed to `pixio_imagespec_delete`.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_spec(
    output: *const PixioImageOutput,
) -> *const PixioImageSpec {
    unsafe { handle_ref(output) }.map_or(std::ptr::null(), |h| {
        (h.output.spec() as *const ImageSpec).cast::<PixioImageSpec>()
    })
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_supports(
    output: *const PixioImageOutput,
    feature: PixioStringRef,
) -> bool {
    let Some(h) = (unsafe { handle_ref(output) }) else {
        return false;
    };
    let feature = unsafe { feature.to_owned_lossy() };
    h.output.supports(&feature)
}

fn open_mode(mode: c_int) -> Result<OpenMode> {
    match mode {
        0 => Ok(OpenMode::Create),
        1 => Ok(OpenMode::AppendSubimage),
        2 => Ok(OpenMode::AppendMipLevel),
        other => Err(PixioError::UnsupportedFormat(format!(
            "open mode {other}"
        ))),
    }
}

/// Declares the target file and its spec. The spec is copied during the
/// call; the caller keeps ownership of its argument.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_open(
    output: *mut PixioImageOutput,
    name: PixioStringRef,
    spec: *const PixioImageSpec,
    mode: c_int,
) -> bool {
    let Some(h) = (unsafe { handle_mut(output) }) else {
        return false;
    };
    let Some(spec) = (unsafe { spec_ref(spec) }) else {
        return h.record::<()>(Err(PixioError::OpenFailed("null spec".to_string())));
    };
    let name = unsafe { name.to_owned_lossy() };
    let result = open_mode(mode).and_then(|m| h.output.open(&name, spec, m));
    h.record(result)
}

/// Multi-subimage open, pre-declaring every subimage's spec. The spec
/// array is copied by value before use; host pointers are never
/// retained.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_open_multi(
    output: *mut PixioImageOutput,
    name: PixioStringRef,
    subimages: c_int,
    specs: *const *const PixioImageSpec,
) -> bool {
    let Some(h) = (unsafe { handle_mut(output) }) else {
        return false;
    };
    if specs.is_null() || subimages < 1 {
        return h.record::<()>(Err(PixioError::OpenFailed("no subimage specs".to_string())));
    }
    // Copy every spec out of host memory before acting on any of them.
    let mut copies: Vec<ImageSpec> = Vec::with_capacity(subimages as usize);
    for i in 0..subimages as usize {
        match unsafe { spec_ref(*specs.add(i)) } {
            Some(s) => copies.push(s.clone()),
            None => {
                return h.record::<()>(Err(PixioError::OpenFailed(format!(
                    "null spec for subimage {i}"
                ))));
            }
        }
    }
    let name = unsafe { name.to_owned_lossy() };
    let result = h.output.open_multi(&name, &copies);
    h.record(result)
}

/// Flushes staged pixels through the encoder and closes the stream.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_close(output: *mut PixioImageOutput) -> bool {
    let Some(h) = (unsafe { handle_mut(output) }) else {
        return false;
    };
    let result = h.output.close();
    h.record(result)
}

/// Writes scanline `y` from caller data in `format`. `xstride` is a byte
/// stride; pass the auto-stride sentinel for contiguous data.
#[no_mangle]
pub unsafe extern "C" fn pixio_imageoutput_write_scanline(
    output: *mut PixioImageOutput,
    y: c_int,
    z: c_int,
    format: PixioTypeDesc,
    data: *const c_void,
    xstride: isize,
) -> bool {
    let Some(h) = (unsafe { handle_mut(output) }) else {
        return false;
    };
    if data.is_null() {
        return false;
    }
    let td = match TypeDesc::from_raw(format) {
        Ok(td) => td,
        Err(e) => return h.record::<()>(Err(e)),
    };
    let spec = h.output.spec();
    let nch = spec.nchannels.max(0) as usize;
    let w = spec.width.max(0) as usize;
    let span = pixels::resolve_strides(td.basetype.bytes(), nch, w, 1, xstride, crate::AUTO_STRIDE, crate::AUTO_STRIDE)
        .and_then(|strides| pixels::span_bytes(strides, w, 1, 1, td.basetype.bytes() * nch));
    let span = match span {
        Ok(span) => span,
        Err(e) => return h.record::<()>(Err(e)),
    };
    let slice = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), span) };
    let result = h.output.write_scanline(y, z, td, slice, xstride);
    h.record(result)
}

/// Writes the entire declared image in one call. Strides are byte
/// strides with the auto-stride sentinel for contiguous defaults; the
/// progress callback runs synchronously and may interrupt.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imageoutput_write_image(
    output: *mut PixioImageOutput,
    format: PixioTypeDesc,
    data: *const c_void,
    xstride: isize,
    ystride: isize,
    zstride: isize,
    callback: PixioProgressCallback,
    opaque_data: *mut c_void,
) -> bool {
    let Some(h) = (unsafe { handle_mut(output) }) else {
        return false;
    };
    if data.is_null() {
        return false;
    }
    let td = match TypeDesc::from_raw(format) {
        Ok(td) => td,
        Err(e) => return h.record::<()>(Err(e)),
    };
    let spec = h.output.spec();
    let nch = spec.nchannels.max(0) as usize;
    let (w, hgt) = (spec.width.max(0) as usize, spec.height.max(0) as usize);
    let span = pixels::resolve_strides(td.basetype.bytes(), nch, w, hgt, xstride, ystride, zstride)
        .and_then(|strides| pixels::span_bytes(strides, w, hgt, 1, td.basetype.bytes() * nch));
    let span = match span {
        Ok(span) => span,
        Err(e) => return h.record::<()>(Err(e)),
    };
    let slice = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), span) };
    let mut hook = adapt_progress(callback, opaque_data);
    let result = h.output.write_image(td, slice, xstride, ystride, zstride, hook.as_deref_mut());
    h.record(result)
}
