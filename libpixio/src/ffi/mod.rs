//! Flat C ABI surface.
//!
//! Everything crossing this boundary is an opaque pointer, a POD struct,
//! or a free function. The conventions, applied by every function here:
//!
//! - **Borrowed strings in**: [`PixioStringRef`] views host bytes and is
//!   only valid for the duration of the call.
//! - **Owned strings out**: every returned `*mut c_char` is a fresh
//!   NUL-terminated allocation the caller must release exactly once with
//!   [`pixio_free_string`] — never with a foreign deallocator.
//! - **Errors as values**: fallible calls return `false`/null and record
//!   a message — on the handle when there is one, otherwise in a
//!   thread-local slot drained by [`pixio_geterror`]. One pending message,
//!   last-write-wins, cleared on read.
//! - **No unwinding**: library code returns `Result`; this layer converts.

pub mod cache;
pub mod input;
pub mod output;
pub mod spec;

pub use self::cache::*;
pub use self::input::*;
pub use self::output::*;
pub use self::spec::*;

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::spec::AttrValue;
use crate::typedesc::{BaseType, TypeDesc};

/// ABI form of a type descriptor. Field order and enum values are fixed;
/// see [`crate::typedesc`].
pub use crate::typedesc::RawTypeDesc as PixioTypeDesc;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

static OWNED_STRINGS: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn set_last_error(msg: impl Into<String>) {
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg.into()));
}

/// Borrowed, non-owning view of host-owned string bytes.
///
/// `{null, 0}` is the empty string. The callee never retains the view
/// past the call; invalid UTF-8 is replaced lossily.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PixioStringRef {
    pub ptr: *const c_char,
    pub len: usize,
}

impl PixioStringRef {
    pub(crate) unsafe fn to_owned_lossy(self) -> String {
        if self.ptr.is_null() || self.len == 0 {
            return String::new();
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr.cast::<u8>(), self.len) };
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Allocates an owned, NUL-terminated copy of `s` for the host side.
/// Interior NULs are replaced; the copy is exactly `len + 1` bytes.
pub(crate) fn make_cstring(s: &str) -> *mut c_char {
    let sanitized;
    let text = if s.as_bytes().contains(&0) {
        sanitized = s.replace('\0', "\u{fffd}");
        sanitized.as_str()
    } else {
        s
    };
    let cs = CString::new(text).unwrap_or_default();
    OWNED_STRINGS.fetch_add(1, Ordering::Relaxed);
    cs.into_raw()
}

/// Releases a string allocated by this library. Must be called exactly
/// once per returned string; null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn pixio_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        OWNED_STRINGS.fetch_sub(1, Ordering::Relaxed);
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Number of owned strings currently live (allocated and not yet freed).
/// Diagnostic: lets leak checks pair every allocation with its release.
#[no_mangle]
pub extern "C" fn pixio_owned_string_count() -> usize {
    OWNED_STRINGS.load(Ordering::Relaxed)
}

/// Drains the thread-local error slot: the pending message, or an empty
/// string. Never fails. The returned string is owned by the caller.
#[no_mangle]
pub extern "C" fn pixio_geterror() -> *mut c_char {
    let msg = LAST_ERROR.with(|e| e.borrow_mut().take()).unwrap_or_default();
    make_cstring(&msg)
}

/// Allocates a zero-initialized array of `len` string slots.
#[no_mangle]
pub extern "C" fn pixio_string_array_new(len: usize) -> *mut *mut c_char {
    if len == 0 {
        return std::ptr::null_mut();
    }
    let slots: Vec<*mut c_char> = vec![std::ptr::null_mut(); len];
    Box::into_raw(slots.into_boxed_slice()).cast::<*mut c_char>()
}

/// Stores an owned copy of `value` into slot `index`, releasing any
/// previous occupant. False when the array is null or the index is out
/// of range.
#[no_mangle]
pub unsafe extern "C" fn pixio_string_array_set(
    arr: *mut *mut c_char,
    len: usize,
    index: usize,
    value: PixioStringRef,
) -> bool {
    if arr.is_null() || index >= len {
        return false;
    }
    let slot = unsafe { arr.add(index) };
    let old = unsafe { *slot };
    if !old.is_null() {
        unsafe { pixio_free_string(old) };
    }
    let text = unsafe { value.to_owned_lossy() };
    unsafe { *slot = make_cstring(&text) };
    true
}

/// Frees every non-null slot, then the array itself. Null slots are
/// skipped, never double-freed; a null array is a no-op.
#[no_mangle]
pub unsafe extern "C" fn pixio_string_array_free(arr: *mut *mut c_char, len: usize) {
    if arr.is_null() {
        return;
    }
    for i in 0..len {
        let p = unsafe { *arr.add(i) };
        if !p.is_null() {
            unsafe { pixio_free_string(p) };
        }
    }
    drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(arr, len)) });
}

/// Storage bytes of one value of the described type; 0 when the
/// descriptor is invalid.
#[no_mangle]
pub extern "C" fn pixio_typedesc_bytes(desc: PixioTypeDesc) -> usize {
    TypeDesc::from_raw(desc).map_or(0, TypeDesc::total_bytes)
}

/// Opaque handle to an [`crate::ImageSpec`].
pub struct PixioImageSpec {
    _private: [u8; 0],
}

/// Opaque handle to an [`crate::ImageInput`].
pub struct PixioImageInput {
    _private: [u8; 0],
}

/// Opaque handle to an [`crate::ImageOutput`].
pub struct PixioImageOutput {
    _private: [u8; 0],
}

/// Opaque handle to an [`crate::ImageCache`].
pub struct PixioImageCache {
    _private: [u8; 0],
}

/// Opaque handle to cache per-thread scratch state.
pub struct PixioCachePerthread {
    _private: [u8; 0],
}

/// Opaque fast-path handle to a cache-resident file. Owned by the cache;
/// never freed by the caller.
pub struct PixioCacheImageHandle {
    _private: [u8; 0],
}

/// Progress hook for long reads/writes. Invoked synchronously on the
/// calling thread, zero or more times, never after the call returns.
/// Returning true interrupts the operation. Must not block or re-enter
/// the handle it was passed to.
pub type PixioProgressCallback =
    Option<unsafe extern "C" fn(opaque_data: *mut c_void, portion_done: f32) -> bool>;

pub(crate) unsafe fn spec_ref<'a>(p: *const PixioImageSpec) -> Option<&'a crate::ImageSpec> {
    unsafe { p.cast::<crate::ImageSpec>().as_ref() }
}

pub(crate) unsafe fn spec_mut<'a>(p: *mut PixioImageSpec) -> Option<&'a mut crate::ImageSpec> {
    unsafe { p.cast::<crate::ImageSpec>().as_mut() }
}

/// Reads a typed value the host passed as `(datatype, ptr)`.
///
/// String values arrive as a pointer to a `char*` (the host keeps
/// ownership of the pointed-to bytes).
pub(crate) unsafe fn read_attr_value(
    datatype: PixioTypeDesc,
    ptr: *const c_void,
) -> Option<AttrValue> {
    let td = TypeDesc::from_raw(datatype).ok()?;
    if ptr.is_null() {
        return None;
    }
    let n = td.num_elements();
    match (td.basetype, td.arraylen) {
        (BaseType::Int32, 0) => Some(AttrValue::Int(unsafe { *ptr.cast::<i32>() })),
        (BaseType::UInt32, 0) => Some(AttrValue::UInt(unsafe { *ptr.cast::<u32>() })),
        (BaseType::Float, 0) => Some(AttrValue::Float(unsafe { *ptr.cast::<f32>() })),
        (BaseType::Double, 0) => Some(AttrValue::Double(unsafe { *ptr.cast::<f64>() })),
        (BaseType::String, 0) => {
            let s = unsafe { *ptr.cast::<*const c_char>() };
            if s.is_null() {
                Some(AttrValue::Str(String::new()))
            } else {
                let c = unsafe { std::ffi::CStr::from_ptr(s) };
                Some(AttrValue::Str(c.to_string_lossy().into_owned()))
            }
        }
        (BaseType::Int32, len) if len > 0 => {
            let vals = unsafe { std::slice::from_raw_parts(ptr.cast::<i32>(), n) };
            Some(AttrValue::IntVec(vals.to_vec()))
        }
        (BaseType::Float, len) if len > 0 => {
            let vals = unsafe { std::slice::from_raw_parts(ptr.cast::<f32>(), n) };
            Some(AttrValue::FloatVec(vals.to_vec()))
        }
        _ => None,
    }
}

/// Writes a typed value into host storage described by `(datatype, out)`.
/// False (and nothing written) when the types do not line up. A written
/// string is a fresh owned allocation stored as a `char*`; the receiver
/// frees it with [`pixio_free_string`].
pub(crate) unsafe fn write_attr_value(
    value: &AttrValue,
    datatype: PixioTypeDesc,
    out: *mut c_void,
) -> bool {
    let Ok(td) = TypeDesc::from_raw(datatype) else {
        return false;
    };
    if out.is_null() {
        return false;
    }
    match (value, td.basetype, td.arraylen) {
        (AttrValue::Int(v), BaseType::Int32, 0) => unsafe { *out.cast::<i32>() = *v },
        (AttrValue::UInt(v), BaseType::UInt32, 0) => unsafe { *out.cast::<u32>() = *v },
        (AttrValue::Float(v), BaseType::Float, 0) => unsafe { *out.cast::<f32>() = *v },
        (AttrValue::Double(v), BaseType::Double, 0) => unsafe { *out.cast::<f64>() = *v },
        (AttrValue::Str(s), BaseType::String, 0) => unsafe {
            *out.cast::<*mut c_char>() = make_cstring(s);
        },
        (AttrValue::IntVec(v), BaseType::Int32, len) if len as usize == v.len() => unsafe {
            std::ptr::copy_nonoverlapping(v.as_ptr(), out.cast::<i32>(), v.len());
        },
        (AttrValue::FloatVec(v), BaseType::Float, len) if len as usize == v.len() => unsafe {
            std::ptr::copy_nonoverlapping(v.as_ptr(), out.cast::<f32>(), v.len());
        },
        _ => return false,
    }
    true
}
