//! C surface for [`ImageSpec`] handles.
//!
//! Specs created here (`new`, `new_2d`, `clone`) are host-owned and must
//! be released with exactly one `pixio_imagespec_delete`. Specs borrowed
//! from stream handles must never be passed to `delete`.

use std::os::raw::{c_char, c_int, c_void};

use super::{
    make_cstring, read_attr_value, set_last_error, spec_mut, spec_ref, PixioImageSpec,
    PixioStringRef, PixioTypeDesc,
};
use crate::spec::{AttrValue, ImageSpec};
use crate::typedesc::{BaseType, TypeDesc};

fn into_handle(spec: ImageSpec) -> *mut PixioImageSpec {
    Box::into_raw(Box::new(spec)).cast::<PixioImageSpec>()
}

/// Creates a zero-sized spec with the given working format.
#[no_mangle]
pub extern "C" fn pixio_imagespec_new(format: PixioTypeDesc) -> *mut PixioImageSpec {
    match TypeDesc::from_raw(format) {
        Ok(td) => into_handle(ImageSpec::new(td)),
        Err(e) => {
            set_last_error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Creates a 2D spec with default channel names.
#[no_mangle]
pub extern "C" fn pixio_imagespec_new_2d(
    xres: c_int,
    yres: c_int,
    nchans: c_int,
    format: PixioTypeDesc,
) -> *mut PixioImageSpec {
    match TypeDesc::from_raw(format) {
        Ok(td) => into_handle(ImageSpec::new_2d(td, xres, yres, nchans)),
        Err(e) => {
            set_last_error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Deep copy of a spec; the copy is independently owned.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_clone(
    spec: *const PixioImageSpec,
) -> *mut PixioImageSpec {
    match unsafe { spec_ref(spec) } {
        Some(s) => into_handle(s.clone()),
        None => std::ptr::null_mut(),
    }
}

/// Releases a host-owned spec. Null is a no-op.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_delete(spec: *mut PixioImageSpec) {
    if !spec.is_null() {
        drop(unsafe { Box::from_raw(spec.cast::<ImageSpec>()) });
    }
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_default_channel_names(spec: *mut PixioImageSpec) {
    if let Some(s) = unsafe { spec_mut(spec) } {
        s.default_channel_names();
    }
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_channel_bytes(spec: *const PixioImageSpec) -> usize {
    unsafe { spec_ref(spec) }.map_or(0, ImageSpec::channel_bytes)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_channel_bytes_chan(
    spec: *const PixioImageSpec,
    chan: c_int,
    native: bool,
) -> usize {
    unsafe { spec_ref(spec) }.map_or(0, |s| s.channel_bytes_chan(chan, native))
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_pixel_bytes(
    spec: *const PixioImageSpec,
    native: bool,
) -> usize {
    unsafe { spec_ref(spec) }.map_or(0, |s| s.pixel_bytes(native))
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_pixel_bytes_chans(
    spec: *const PixioImageSpec,
    chbegin: c_int,
    chend: c_int,
    native: bool,
) -> usize {
    unsafe { spec_ref(spec) }.map_or(0, |s| s.pixel_bytes_chans(chbegin, chend, native))
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_scanline_bytes(
    spec: *const PixioImageSpec,
    native: bool,
) -> u64 {
    unsafe { spec_ref(spec) }.map_or(0, |s| s.scanline_bytes(native))
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_tile_pixels(spec: *const PixioImageSpec) -> u64 {
    unsafe { spec_ref(spec) }.map_or(0, ImageSpec::tile_pixels)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_tile_bytes(
    spec: *const PixioImageSpec,
    native: bool,
) -> u64 {
    unsafe { spec_ref(spec) }.map_or(0, |s| s.tile_bytes(native))
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_image_pixels(spec: *const PixioImageSpec) -> u64 {
    unsafe { spec_ref(spec) }.map_or(0, ImageSpec::image_pixels)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_image_bytes(
    spec: *const PixioImageSpec,
    native: bool,
) -> u64 {
    unsafe { spec_ref(spec) }.map_or(0, |s| s.image_bytes(native))
}

/// Whether the computed image byte count fits this host's size type.
/// Check before trusting a byte count for allocation.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_size_safe(spec: *const PixioImageSpec) -> bool {
    unsafe { spec_ref(spec) }.map_or(false, ImageSpec::size_safe)
}

/// Serializes the spec to JSON. Owned string; null on failure with the
/// thread-local error set.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_to_json(spec: *mut PixioImageSpec) -> *mut c_char {
    match unsafe { spec_ref(spec.cast_const()) }.map(ImageSpec::to_json) {
        Some(Ok(json)) => make_cstring(&json),
        Some(Err(e)) => {
            set_last_error(e.to_string());
            std::ptr::null_mut()
        }
        None => std::ptr::null_mut(),
    }
}

macro_rules! int_field_accessors {
    ($($get:ident, $set:ident, $field:ident;)*) => {
        $(
            #[no_mangle]
            pub unsafe extern "C" fn $get(spec: *const PixioImageSpec) -> c_int {
                unsafe { spec_ref(spec) }.map_or(0, |s| s.$field)
            }

            #[no_mangle]
            pub unsafe extern "C" fn $set(spec: *mut PixioImageSpec, val: c_int) {
                if let Some(s) = unsafe { spec_mut(spec) } {
                    s.$field = val;
                }
            }
        )*
    };
}

int_field_accessors! {
    pixio_imagespec_x, pixio_imagespec_set_x, x;
    pixio_imagespec_y, pixio_imagespec_set_y, y;
    pixio_imagespec_z, pixio_imagespec_set_z, z;
    pixio_imagespec_width, pixio_imagespec_set_width, width;
    pixio_imagespec_height, pixio_imagespec_set_height, height;
    pixio_imagespec_depth, pixio_imagespec_set_depth, depth;
    pixio_imagespec_full_x, pixio_imagespec_set_full_x, full_x;
    pixio_imagespec_full_y, pixio_imagespec_set_full_y, full_y;
    pixio_imagespec_full_z, pixio_imagespec_set_full_z, full_z;
    pixio_imagespec_full_width, pixio_imagespec_set_full_width, full_width;
    pixio_imagespec_full_height, pixio_imagespec_set_full_height, full_height;
    pixio_imagespec_full_depth, pixio_imagespec_set_full_depth, full_depth;
    pixio_imagespec_tile_width, pixio_imagespec_set_tile_width, tile_width;
    pixio_imagespec_tile_height, pixio_imagespec_set_tile_height, tile_height;
    pixio_imagespec_tile_depth, pixio_imagespec_set_tile_depth, tile_depth;
    pixio_imagespec_nchannels, pixio_imagespec_set_nchannels, nchannels;
    pixio_imagespec_alpha_channel, pixio_imagespec_set_alpha_channel, alpha_channel;
    pixio_imagespec_z_channel, pixio_imagespec_set_z_channel, z_channel;
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_format(spec: *const PixioImageSpec) -> PixioTypeDesc {
    unsafe { spec_ref(spec) }.map_or_else(|| TypeDesc::UNKNOWN.to_raw(), |s| s.format.to_raw())
}

/// Sets the working format. False when the descriptor is invalid.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_set_format(
    spec: *mut PixioImageSpec,
    format: PixioTypeDesc,
) -> bool {
    let (Some(s), Ok(td)) = (unsafe { spec_mut(spec) }, TypeDesc::from_raw(format)) else {
        return false;
    };
    s.format = td;
    true
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_deep(spec: *const PixioImageSpec) -> bool {
    unsafe { spec_ref(spec) }.map_or(false, |s| s.deep)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_set_deep(spec: *mut PixioImageSpec, val: bool) {
    if let Some(s) = unsafe { spec_mut(spec) } {
        s.deep = val;
    }
}

/// Owned copy of channel `index`'s name; empty when out of range.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_channel_name(
    spec: *const PixioImageSpec,
    index: c_int,
) -> *mut c_char {
    let name = unsafe { spec_ref(spec) }.map_or("", |s| s.channel_name(index));
    make_cstring(name)
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_channel_format(
    spec: *const PixioImageSpec,
    chan: c_int,
) -> PixioTypeDesc {
    unsafe { spec_ref(spec) }
        .map_or_else(|| TypeDesc::UNKNOWN.to_raw(), |s| s.channel_format(chan).to_raw())
}

/// Replaces the channel name list from an array of `count` NUL-terminated
/// strings (see `pixio_string_array_new`). Null slots become empty names.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_set_channel_names(
    spec: *mut PixioImageSpec,
    names: *const *const c_char,
    count: c_int,
) {
    let Some(s) = (unsafe { spec_mut(spec) }) else {
        return;
    };
    if names.is_null() || count < 0 {
        return;
    }
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        let p = unsafe { *names.add(i) };
        if p.is_null() {
            out.push(String::new());
        } else {
            out.push(unsafe { std::ffi::CStr::from_ptr(p) }.to_string_lossy().into_owned());
        }
    }
    s.channel_names = out;
}

/// Generic typed attribute set. False when the descriptor and value do
/// not line up.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_attribute_typed(
    spec: *mut PixioImageSpec,
    name: PixioStringRef,
    datatype: PixioTypeDesc,
    value: *const c_void,
) -> bool {
    let Some(s) = (unsafe { spec_mut(spec) }) else {
        return false;
    };
    let Some(v) = (unsafe { read_attr_value(datatype, value) }) else {
        return false;
    };
    let name = unsafe { name.to_owned_lossy() };
    s.attribute(&name, v);
    true
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_attribute_int(
    spec: *mut PixioImageSpec,
    name: PixioStringRef,
    value: c_int,
) {
    if let Some(s) = unsafe { spec_mut(spec) } {
        let name = unsafe { name.to_owned_lossy() };
        s.attribute(&name, AttrValue::Int(value));
    }
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_attribute_uint(
    spec: *mut PixioImageSpec,
    name: PixioStringRef,
    value: u32,
) {
    if let Some(s) = unsafe { spec_mut(spec) } {
        let name = unsafe { name.to_owned_lossy() };
        s.attribute(&name, AttrValue::UInt(value));
    }
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_attribute_float(
    spec: *mut PixioImageSpec,
    name: PixioStringRef,
    value: f32,
) {
    if let Some(s) = unsafe { spec_mut(spec) } {
        let name = unsafe { name.to_owned_lossy() };
        s.attribute(&name, AttrValue::Float(value));
    }
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_attribute_string(
    spec: *mut PixioImageSpec,
    name: PixioStringRef,
    value: PixioStringRef,
) {
    if let Some(s) = unsafe { spec_mut(spec) } {
        let name = unsafe { name.to_owned_lossy() };
        let value = unsafe { value.to_owned_lossy() };
        s.attribute(&name, AttrValue::Str(value));
    }
}

/// Removes matching attributes. `searchtype` with an Unknown basetype
/// matches any type; `case_sensitive` overrides the case-sensitive
/// default used by lookups.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_erase_attribute(
    spec: *mut PixioImageSpec,
    name: PixioStringRef,
    searchtype: PixioTypeDesc,
    case_sensitive: bool,
) {
    let Some(s) = (unsafe { spec_mut(spec) }) else {
        return;
    };
    let filter = TypeDesc::from_raw(searchtype)
        .ok()
        .filter(|td| td.basetype != BaseType::Unknown);
    let name = unsafe { name.to_owned_lossy() };
    s.erase_attribute(&name, filter, case_sensitive);
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_get_int_attribute(
    spec: *const PixioImageSpec,
    name: PixioStringRef,
    default_val: c_int,
) -> c_int {
    unsafe { spec_ref(spec) }.map_or(default_val, |s| {
        let name = unsafe { name.to_owned_lossy() };
        s.get_int_attribute(&name, default_val)
    })
}

#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_get_float_attribute(
    spec: *const PixioImageSpec,
    name: PixioStringRef,
    default_val: f32,
) -> f32 {
    unsafe { spec_ref(spec) }.map_or(default_val, |s| {
        let name = unsafe { name.to_owned_lossy() };
        s.get_float_attribute(&name, default_val)
    })
}

/// Owned copy of a string attribute, or of `default_val` when absent or
/// not a string. Never fails.
#[no_mangle]
pub unsafe extern "C" fn pixio_imagespec_get_string_attribute(
    spec: *const PixioImageSpec,
    name: PixioStringRef,
    default_val: PixioStringRef,
) -> *mut c_char {
    let default_val = unsafe { default_val.to_owned_lossy() };
    let text = unsafe { spec_ref(spec) }.map_or_else(
        || default_val.clone(),
        |s| {
            let name = unsafe { name.to_owned_lossy() };
            s.get_string_attribute(&name, &default_val).to_string()
        },
    );
    make_cstring(&text)
}
