//! C surface for the shared image cache.
//!
//! Cache handles come from `pixio_imagecache_create` and pair with
//! exactly one `pixio_imagecache_destroy`. Image handles and auto-created
//! per-thread state are owned by the cache and are never freed by the
//! caller; explicitly created per-thread state pairs with
//! `pixio_imagecache_destroy_perthread_info`. The cache is safe for
//! concurrent use when each thread passes its own per-thread handle.

use std::os::raw::{c_char, c_int, c_void};

use super::{
    make_cstring, read_attr_value, spec_mut, write_attr_value, PixioCacheImageHandle,
    PixioCachePerthread, PixioImageCache, PixioImageSpec, PixioStringRef, PixioTypeDesc,
};
use crate::cache::{CacheFile, ImageCache, Perthread};
use crate::pixels::Region;
use crate::typedesc::TypeDesc;
use crate::AUTO_STRIDE;

unsafe fn cache_ref<'a>(p: *const PixioImageCache) -> Option<&'a ImageCache> {
    unsafe { p.cast::<ImageCache>().as_ref() }
}

unsafe fn perthread_mut<'a>(p: *mut PixioCachePerthread) -> Option<&'a mut Perthread> {
    unsafe { p.cast::<Perthread>().as_mut() }
}

unsafe fn file_ref<'a>(p: *const PixioCacheImageHandle) -> Option<&'a CacheFile> {
    unsafe { p.cast::<CacheFile>().as_ref() }
}

fn file_ptr(file: &std::sync::Arc<CacheFile>) -> *mut PixioCacheImageHandle {
    (std::sync::Arc::as_ptr(file) as *mut CacheFile).cast::<PixioCacheImageHandle>()
}

/// Returns the process-wide shared cache (`shared = true`) or a fresh
/// private one. Pair with exactly one `pixio_imagecache_destroy`.
#[no_mangle]
pub extern "C" fn pixio_imagecache_create(shared: bool) -> *mut PixioImageCache {
    Box::into_raw(Box::new(ImageCache::create(shared))).cast::<PixioImageCache>()
}

/// Releases one cache handle. `teardown = true` on the shared instance
/// additionally evicts its residents immediately. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_destroy(cache: *mut PixioImageCache, teardown: bool) {
    if !cache.is_null() {
        let boxed = unsafe { Box::from_raw(cache.cast::<ImageCache>()) };
        ImageCache::destroy(*boxed, teardown);
    }
}

/// Evicts everything, poisoning outstanding image handles.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_clear(cache: *mut PixioImageCache) {
    if let Some(c) = unsafe { cache_ref(cache) } {
        c.clear();
    }
}

/// Drains the cache's pending error message; empty when none. The
/// returned string is owned by the caller.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_geterror(cache: *const PixioImageCache) -> *mut c_char {
    let msg = unsafe { cache_ref(cache) }.map_or_else(String::new, ImageCache::geterror);
    make_cstring(&msg)
}

/// Owned, human-readable statistics report; higher levels add detail.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_getstats(
    cache: *const PixioImageCache,
    level: c_int,
) -> *mut c_char {
    let stats = unsafe { cache_ref(cache) }.map_or_else(String::new, |c| c.getstats(level));
    make_cstring(&stats)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_reset_stats(cache: *mut PixioImageCache) {
    if let Some(c) = unsafe { cache_ref(cache) } {
        c.reset_stats();
    }
}

/// Evicts one entry by name. Outstanding handles to it keep failing
/// cleanly rather than dangling.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_invalidate(
    cache: *mut PixioImageCache,
    filename: PixioStringRef,
) {
    if let Some(c) = unsafe { cache_ref(cache) } {
        let name = unsafe { filename.to_owned_lossy() };
        c.invalidate(&name);
    }
}

/// Evicts everything; `force = true` also evicts entries with
/// outstanding references.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_invalidate_all(
    cache: *mut PixioImageCache,
    force: bool,
) {
    if let Some(c) = unsafe { cache_ref(cache) } {
        c.invalidate_all(force);
    }
}

/// Sets a cache-wide setting by name and typed value. False for
/// unrecognized names or mismatched types.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_attribute(
    cache: *mut PixioImageCache,
    name: PixioStringRef,
    datatype: PixioTypeDesc,
    value: *const c_void,
) -> bool {
    let Some(c) = (unsafe { cache_ref(cache) }) else {
        return false;
    };
    let Some(v) = (unsafe { read_attr_value(datatype, value) }) else {
        return false;
    };
    let name = unsafe { name.to_owned_lossy() };
    c.attribute(&name, &v)
}

/// Reads a cache-wide setting into caller storage. False for
/// unrecognized names or mismatched types.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_getattribute(
    cache: *mut PixioImageCache,
    name: PixioStringRef,
    datatype: PixioTypeDesc,
    value: *mut c_void,
) -> bool {
    let Some(c) = (unsafe { cache_ref(cache) }) else {
        return false;
    };
    let name = unsafe { name.to_owned_lossy() };
    match c.getattribute(&name) {
        Some(v) => unsafe { write_attr_value(&v, datatype, value) },
        None => false,
    }
}

/// Get-or-create per-thread state: returns `thread_info` when non-null,
/// otherwise the calling thread's cache-owned default (created on first
/// use, with the lock cost that implies).
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_get_perthread_info(
    cache: *mut PixioImageCache,
    thread_info: *mut PixioCachePerthread,
) -> *mut PixioCachePerthread {
    if !thread_info.is_null() {
        return thread_info;
    }
    match unsafe { cache_ref(cache) } {
        Some(c) => c.auto_perthread().cast::<PixioCachePerthread>(),
        None => std::ptr::null_mut(),
    }
}

/// Creates caller-owned per-thread state. Prefer obtaining one of these
/// per thread and reusing it on hot paths over passing null. Pair with
/// `pixio_imagecache_destroy_perthread_info`.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_create_perthread_info(
    cache: *mut PixioImageCache,
) -> *mut PixioCachePerthread {
    match unsafe { cache_ref(cache) } {
        Some(c) => Box::into_raw(c.create_perthread_info()).cast::<PixioCachePerthread>(),
        None => std::ptr::null_mut(),
    }
}

/// Destroys per-thread state obtained from
/// `pixio_imagecache_create_perthread_info`. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_destroy_perthread_info(
    cache: *mut PixioImageCache,
    thread_info: *mut PixioCachePerthread,
) {
    if thread_info.is_null() {
        return;
    }
    let info = unsafe { Box::from_raw(thread_info.cast::<Perthread>()) };
    match unsafe { cache_ref(cache) } {
        Some(c) => c.destroy_perthread_info(info),
        None => drop(info),
    }
}

/// One-time name resolution to a reusable image handle. The handle is
/// owned by the cache: never freed by the caller, valid until the cache
/// is destroyed, failing (not dangling) after invalidation.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_get_image_handle(
    cache: *mut PixioImageCache,
    name: PixioStringRef,
    thread_info: *mut PixioCachePerthread,
) -> *mut PixioCacheImageHandle {
    let Some(c) = (unsafe { cache_ref(cache) }) else {
        return std::ptr::null_mut();
    };
    let name = unsafe { name.to_owned_lossy() };
    let pt = unsafe { perthread_mut(thread_info) };
    let file = c.get_image_handle(&name, pt);
    file_ptr(&file)
}

/// Validity check on an image handle; a flag read, no I/O.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_good(
    cache: *mut PixioImageCache,
    file: *mut PixioCacheImageHandle,
) -> bool {
    match (unsafe { cache_ref(cache) }, unsafe { file_ref(file) }) {
        (Some(c), Some(f)) => c.good(f),
        _ => false,
    }
}

/// Metadata query by name. Writes the value into `(datatype, data)`;
/// false with the cache error set when the name, subimage, or types do
/// not resolve.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imagecache_get_image_info(
    cache: *mut PixioImageCache,
    filename: PixioStringRef,
    subimage: c_int,
    miplevel: c_int,
    dataname: PixioStringRef,
    datatype: PixioTypeDesc,
    data: *mut c_void,
) -> bool {
    let Some(c) = (unsafe { cache_ref(cache) }) else {
        return false;
    };
    let name = unsafe { filename.to_owned_lossy() };
    let dataname = unsafe { dataname.to_owned_lossy() };
    match c.get_image_info_named(&name, None, subimage, miplevel, &dataname) {
        Ok(v) => {
            let ok = unsafe { write_attr_value(&v, datatype, data) };
            if !ok {
                c.set_error(format!("type mismatch for image info \"{dataname}\""));
            }
            ok
        }
        Err(e) => {
            c.set_error(e.to_string());
            false
        }
    }
}

/// Handle-based form of `pixio_imagecache_get_image_info`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imagecache_get_image_info_by_handle(
    cache: *mut PixioImageCache,
    file: *mut PixioCacheImageHandle,
    thread_info: *mut PixioCachePerthread,
    subimage: c_int,
    miplevel: c_int,
    dataname: PixioStringRef,
    datatype: PixioTypeDesc,
    data: *mut c_void,
) -> bool {
    let (Some(c), Some(f)) = (unsafe { cache_ref(cache) }, unsafe { file_ref(file) }) else {
        return false;
    };
    let _ = unsafe { perthread_mut(thread_info) };
    let dataname = unsafe { dataname.to_owned_lossy() };
    match c.get_image_info(f, subimage, miplevel, &dataname) {
        Ok(v) => {
            let ok = unsafe { write_attr_value(&v, datatype, data) };
            if !ok {
                c.set_error(format!("type mismatch for image info \"{dataname}\""));
            }
            ok
        }
        Err(e) => {
            c.set_error(e.to_string());
            false
        }
    }
}

/// Copies a resident file's spec into a caller-owned spec handle, by
/// name.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_get_imagespec(
    cache: *mut PixioImageCache,
    filename: PixioStringRef,
    spec: *mut PixioImageSpec,
    subimage: c_int,
    miplevel: c_int,
    native: bool,
) -> bool {
    let (Some(c), Some(out)) = (unsafe { cache_ref(cache) }, unsafe { spec_mut(spec) }) else {
        return false;
    };
    let name = unsafe { filename.to_owned_lossy() };
    match c.get_imagespec_named(&name, None, subimage, miplevel, native) {
        Ok(s) => {
            *out = s;
            true
        }
        Err(e) => {
            c.set_error(e.to_string());
            false
        }
    }
}

/// Handle-based form of `pixio_imagecache_get_imagespec`.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_get_imagespec_by_handle(
    cache: *mut PixioImageCache,
    file: *mut PixioCacheImageHandle,
    thread_info: *mut PixioCachePerthread,
    spec: *mut PixioImageSpec,
    subimage: c_int,
    miplevel: c_int,
    native: bool,
) -> bool {
    let (Some(c), Some(f)) = (unsafe { cache_ref(cache) }, unsafe { file_ref(file) }) else {
        return false;
    };
    let Some(out) = (unsafe { spec_mut(spec) }) else {
        return false;
    };
    let _ = unsafe { perthread_mut(thread_info) };
    match c.get_imagespec(f, subimage, miplevel, native) {
        Ok(s) => {
            *out = s;
            true
        }
        Err(e) => {
            c.set_error(e.to_string());
            false
        }
    }
}

/// Owned copy of the filename after search-path resolution; the input
/// unchanged when nothing matches.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagecache_resolve_filename(
    cache: *mut PixioImageCache,
    filename: PixioStringRef,
) -> *mut c_char {
    let name = unsafe { filename.to_owned_lossy() };
    let resolved =
        unsafe { cache_ref(cache) }.map_or_else(|| name.clone(), |c| c.resolve_filename(&name));
    make_cstring(&resolved)
}

#[allow(clippy::too_many_arguments)]
unsafe fn get_pixels_common(
    c: &ImageCache,
    source: PixelSource<'_>,
    perthread: Option<&mut Perthread>,
    subimage: c_int,
    miplevel: c_int,
    region: Region,
    chbegin: c_int,
    chend: c_int,
    format: PixioTypeDesc,
    result: *mut c_void,
    xstride: isize,
    ystride: isize,
    zstride: isize,
) -> bool {
    if result.is_null() {
        return false;
    }
    let td = match TypeDesc::from_raw(format) {
        Ok(td) => td,
        Err(e) => {
            c.set_error(e.to_string());
            return false;
        }
    };
    let nch = (chend - chbegin).max(0) as usize;
    let (w, h, d) = (
        region.width().max(0) as usize,
        region.height().max(0) as usize,
        region.depth().max(0) as usize,
    );
    let span = crate::pixels::resolve_strides(td.basetype.bytes(), nch, w, h, xstride, ystride, zstride)
        .and_then(|s| crate::pixels::span_bytes(s, w, h, d, td.basetype.bytes() * nch));
    let span = match span {
        Ok(span) => span,
        Err(e) => {
            c.set_error(e.to_string());
            return false;
        }
    };
    let data = unsafe { std::slice::from_raw_parts_mut(result.cast::<u8>(), span) };
    let outcome = match source {
        PixelSource::Name(name) => c.get_pixels_named(
            name, perthread, subimage, miplevel, region, chbegin, chend, td, data, xstride,
            ystride, zstride,
        ),
        PixelSource::File(f) => c.get_pixels(
            f, subimage, miplevel, region, chbegin, chend, td, data, xstride, ystride, zstride,
        ),
    };
    match outcome {
        Ok(()) => true,
        Err(e) => {
            c.set_error(e.to_string());
            false
        }
    }
}

enum PixelSource<'a> {
    Name(&'a str),
    File(&'a CacheFile),
}

/// Full-channel pixel query by name with contiguous layout.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imagecache_get_pixels(
    cache: *mut PixioImageCache,
    filename: PixioStringRef,
    subimage: c_int,
    miplevel: c_int,
    xbegin: c_int,
    xend: c_int,
    ybegin: c_int,
    yend: c_int,
    zbegin: c_int,
    zend: c_int,
    format: PixioTypeDesc,
    result: *mut c_void,
) -> bool {
    let Some(c) = (unsafe { cache_ref(cache) }) else {
        return false;
    };
    let name = unsafe { filename.to_owned_lossy() };
    let region = Region { xbegin, xend, ybegin, yend, zbegin, zend };
    let nch = match c.get_image_info_named(&name, None, subimage, miplevel, "channels") {
        Ok(crate::spec::AttrValue::Int(n)) => n,
        Ok(_) | Err(_) => {
            // Lookup error surfaces again below with full context.
            0
        }
    };
    unsafe {
        get_pixels_common(
            c,
            PixelSource::Name(&name),
            None,
            subimage,
            miplevel,
            region,
            0,
            nch,
            format,
            result,
            AUTO_STRIDE,
            AUTO_STRIDE,
            AUTO_STRIDE,
        )
    }
}

/// Handle-based form of `pixio_imagecache_get_pixels`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imagecache_get_pixels_by_handle(
    cache: *mut PixioImageCache,
    file: *mut PixioCacheImageHandle,
    thread_info: *mut PixioCachePerthread,
    subimage: c_int,
    miplevel: c_int,
    xbegin: c_int,
    xend: c_int,
    ybegin: c_int,
    yend: c_int,
    zbegin: c_int,
    zend: c_int,
    format: PixioTypeDesc,
    result: *mut c_void,
) -> bool {
    let (Some(c), Some(f)) = (unsafe { cache_ref(cache) }, unsafe { file_ref(file) }) else {
        return false;
    };
    let pt = unsafe { perthread_mut(thread_info) };
    let region = Region { xbegin, xend, ybegin, yend, zbegin, zend };
    let nch = match c.get_image_info(f, subimage, miplevel, "channels") {
        Ok(crate::spec::AttrValue::Int(n)) => n,
        Ok(_) | Err(_) => 0,
    };
    unsafe {
        get_pixels_common(
            c,
            PixelSource::File(f),
            pt,
            subimage,
            miplevel,
            region,
            0,
            nch,
            format,
            result,
            AUTO_STRIDE,
            AUTO_STRIDE,
            AUTO_STRIDE,
        )
    }
}

/// Channel-range, strided pixel query by name. `cache_chbegin`/
/// `cache_chend` are advisory residency hints and accepted for call
/// compatibility.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imagecache_get_pixels_stride(
    cache: *mut PixioImageCache,
    filename: PixioStringRef,
    subimage: c_int,
    miplevel: c_int,
    xbegin: c_int,
    xend: c_int,
    ybegin: c_int,
    yend: c_int,
    zbegin: c_int,
    zend: c_int,
    chbegin: c_int,
    chend: c_int,
    format: PixioTypeDesc,
    result: *mut c_void,
    xstride: isize,
    ystride: isize,
    zstride: isize,
    _cache_chbegin: c_int,
    _cache_chend: c_int,
) -> bool {
    let Some(c) = (unsafe { cache_ref(cache) }) else {
        return false;
    };
    let name = unsafe { filename.to_owned_lossy() };
    let region = Region { xbegin, xend, ybegin, yend, zbegin, zend };
    unsafe {
        get_pixels_common(
            c,
            PixelSource::Name(&name),
            None,
            subimage,
            miplevel,
            region,
            chbegin,
            chend,
            format,
            result,
            xstride,
            ystride,
            zstride,
        )
    }
}

/// Handle-based form of `pixio_imagecache_get_pixels_stride`; the fast
/// path for tight loops when paired with a per-thread handle.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pixio_imagecache_get_pixels_stride_by_handle(
    cache: *mut PixioImageCache,
    file: *mut PixioCacheImageHandle,
    thread_info: *mut PixioCachePerthread,
    subimage: c_int,
    miplevel: c_int,
    xbegin: c_int,
    xend: c_int,
    ybegin: c_int,
    yend: c_int,
    zbegin: c_int,
    zend: c_int,
    chbegin: c_int,
    chend: c_int,
    format: PixioTypeDesc,
    result: *mut c_void,
    xstride: isize,
    ystride: isize,
    zstride: isize,
    _cache_chbegin: c_int,
    _cache_chend: c_int,
) -> bool {
    let (Some(c), Some(f)) = (unsafe { cache_ref(cache) }, unsafe { file_ref(file) }) else {
        return false;
    };
    let pt = unsafe { perthread_mut(thread_info) };
    let region = Region { xbegin, xend, ybegin, yend, zbegin, zend };
    unsafe {
        get_pixels_common(
            c,
            PixelSource::File(f),
            pt,
            subimage,
            miplevel,
            region,
            chbegin,
            chend,
            format,
            result,
            xstride,
            ystride,
            zstride,
        )
    }
}
