use pixio::{AttrValue, ImageSpec, TypeDesc};

#[test]
fn new_spec_defaults() {
    let spec = ImageSpec::new(TypeDesc::FLOAT);
    assert_eq!(spec.width, 0);
    assert_eq!(spec.height, 0);
    assert_eq!(spec.depth, 1);
    assert_eq!(spec.nchannels, 0);
    assert_eq!(spec.alpha_channel, -1);
    assert_eq!(spec.z_channel, -1);
    assert_eq!(spec.tile_width, 0);
    assert!(!spec.deep);
}

#[test]
fn default_channel_names_for_four_channels() {
    let spec = ImageSpec::new_2d(TypeDesc::FLOAT, 16, 16, 4);
    assert_eq!(spec.channel_name(0), "R");
    assert_eq!(spec.channel_name(1), "G");
    assert_eq!(spec.channel_name(2), "B");
    assert_eq!(spec.channel_name(3), "A");
    assert_eq!(spec.alpha_channel, 3);
    // Out of range is a defined sentinel, not an error.
    assert_eq!(spec.channel_name(4), "");
    assert_eq!(spec.channel_name(-1), "");
}

#[test]
fn default_channel_names_for_small_and_large_counts() {
    let one = ImageSpec::new_2d(TypeDesc::UINT8, 4, 4, 1);
    assert_eq!(one.channel_name(0), "Y");
    assert_eq!(one.alpha_channel, -1);

    let two = ImageSpec::new_2d(TypeDesc::UINT8, 4, 4, 2);
    assert_eq!(two.channel_name(0), "Y");
    assert_eq!(two.channel_name(1), "A");
    assert_eq!(two.alpha_channel, 1);

    let six = ImageSpec::new_2d(TypeDesc::UINT8, 4, 4, 6);
    assert_eq!(six.channel_name(3), "A");
    assert_eq!(six.channel_name(4), "channel4");
    assert_eq!(six.channel_name(5), "channel5");
}

#[test]
fn setters_do_no_cross_field_validation() {
    let mut spec = ImageSpec::new_2d(TypeDesc::UINT8, 4, 4, 3);
    spec.nchannels = 5;
    // Names are stale until the caller refreshes them.
    assert_eq!(spec.channel_names.len(), 3);
    spec.default_channel_names();
    assert_eq!(spec.channel_names.len(), 5);
}

#[test]
fn derived_sizes() {
    let spec = ImageSpec::new_2d(TypeDesc::FLOAT, 640, 480, 3);
    assert_eq!(spec.channel_bytes(), 4);
    assert_eq!(spec.pixel_bytes(false), 12);
    assert_eq!(spec.scanline_bytes(false), 640 * 12);
    assert_eq!(spec.image_pixels(), 640 * 480);
    assert_eq!(spec.image_bytes(false), 640 * 480 * 12);
    // Untiled.
    assert_eq!(spec.tile_pixels(), 0);
    assert_eq!(spec.tile_bytes(false), 0);
}

#[test]
fn tile_sizes_once_tiled() {
    let mut spec = ImageSpec::new_2d(TypeDesc::UINT16, 4096, 4096, 4);
    spec.tile_width = 64;
    spec.tile_height = 64;
    spec.tile_depth = 1;
    assert_eq!(spec.tile_pixels(), 64 * 64);
    assert_eq!(spec.tile_bytes(false), 64 * 64 * 8);
}

#[test]
fn degenerate_geometry_yields_zero_not_wraparound() {
    let mut spec = ImageSpec::new_2d(TypeDesc::FLOAT, 0, 480, 3);
    assert_eq!(spec.image_pixels(), 0);
    assert_eq!(spec.image_bytes(false), 0);
    assert_eq!(spec.scanline_bytes(false), 0);
    spec.width = -7;
    assert_eq!(spec.image_bytes(false), 0);
}

#[test]
fn large_image_exceeds_32_bits_but_is_size_safe_on_64_bit_hosts() {
    let spec = ImageSpec::new_2d(TypeDesc::FLOAT, 10_000, 10_000, 4);
    let bytes = spec.image_bytes(false);
    assert_eq!(bytes, 1_600_000_000);
    assert!(bytes > u64::from(u32::MAX));
    assert_eq!(spec.size_safe(), usize::try_from(bytes).is_ok());
}

#[test]
fn astronomical_geometry_is_not_size_safe() {
    let mut spec = ImageSpec::new_2d(TypeDesc::DOUBLE, i32::MAX, i32::MAX, 4);
    spec.depth = i32::MAX;
    assert!(!spec.size_safe());
    // The saturating count is still returned rather than wrapping.
    assert_eq!(spec.image_bytes(false), u64::MAX);
}

#[test]
fn per_channel_native_formats() {
    let mut spec = ImageSpec::new_2d(TypeDesc::FLOAT, 8, 8, 3);
    spec.channel_formats = vec![TypeDesc::UINT8, TypeDesc::UINT16, TypeDesc::FLOAT];
    assert_eq!(spec.pixel_bytes(false), 12);
    assert_eq!(spec.pixel_bytes(true), 1 + 2 + 4);
    assert_eq!(spec.channel_bytes_chan(1, true), 2);
    assert_eq!(spec.channel_bytes_chan(1, false), 4);
    assert_eq!(spec.channel_bytes_chan(9, true), 0);
    assert_eq!(spec.pixel_bytes_chans(1, 3, true), 6);
    assert_eq!(spec.pixel_bytes_chans(3, 1, true), 0);
}

#[test]
fn attribute_bag_set_get_replace() {
    let mut spec = ImageSpec::new(TypeDesc::UINT8);
    spec.attribute("Orientation", AttrValue::Int(1));
    spec.attribute("PixelAspectRatio", AttrValue::Float(1.5));
    spec.attribute("Software", AttrValue::Str("pixio".to_string()));

    assert_eq!(spec.get_int_attribute("Orientation", 0), 1);
    assert_eq!(spec.get_float_attribute("PixelAspectRatio", 0.0), 1.5);
    assert_eq!(spec.get_string_attribute("Software", ""), "pixio");

    spec.attribute("Orientation", AttrValue::Int(6));
    assert_eq!(spec.get_int_attribute("Orientation", 0), 6);
    assert_eq!(spec.attributes.len(), 3);
}

#[test]
fn typed_getters_fall_back_on_absence_or_mismatch() {
    let mut spec = ImageSpec::new(TypeDesc::UINT8);
    spec.attribute("Software", AttrValue::Str("pixio".to_string()));

    assert_eq!(spec.get_int_attribute("missing", 42), 42);
    assert_eq!(spec.get_int_attribute("Software", 42), 42);
    assert_eq!(spec.get_float_attribute("Software", 2.5), 2.5);
    assert_eq!(spec.get_string_attribute("missing", "fallback"), "fallback");
    // Integers convert to float.
    spec.attribute("count", AttrValue::Int(3));
    assert_eq!(spec.get_float_attribute("count", 0.0), 3.0);
}

#[test]
fn attribute_names_are_case_sensitive_by_default() {
    let mut spec = ImageSpec::new(TypeDesc::UINT8);
    spec.attribute("Orientation", AttrValue::Int(1));
    assert_eq!(spec.get_int_attribute("orientation", 0), 0);
    assert!(spec.find_attribute("orientation", None, false).is_some());
}

#[test]
fn erase_attribute_with_case_flag_and_type_filter() {
    let mut spec = ImageSpec::new(TypeDesc::UINT8);
    spec.attribute("DateTime", AttrValue::Str("2019".to_string()));
    spec.attribute("exposure", AttrValue::Float(0.5));

    // Wrong-type filter leaves the entry alone.
    spec.erase_attribute("exposure", Some(TypeDesc::INT32), true);
    assert!(spec.find_attribute("exposure", None, true).is_some());

    // Case-insensitive erase overrides the case-sensitive default.
    spec.erase_attribute("datetime", None, false);
    assert!(spec.find_attribute("DateTime", None, true).is_none());

    spec.erase_attribute("exposure", Some(TypeDesc::FLOAT), true);
    assert!(spec.find_attribute("exposure", None, true).is_none());
}

#[test]
fn clone_is_independent() {
    let mut spec = ImageSpec::new_2d(TypeDesc::UINT8, 4, 4, 3);
    spec.attribute("Software", AttrValue::Str("pixio".to_string()));
    let mut copy = spec.clone();
    copy.width = 99;
    copy.attribute("Software", AttrValue::Str("other".to_string()));
    assert_eq!(spec.width, 4);
    assert_eq!(spec.get_string_attribute("Software", ""), "pixio");
}

#[test]
fn json_serialization_contains_the_record() {
    let mut spec = ImageSpec::new_2d(TypeDesc::FLOAT, 32, 16, 4);
    spec.attribute("Software", AttrValue::Str("pixio".to_string()));
    let json = spec.to_json().expect("serializable");
    assert!(json.contains("\"width\": 32"));
    assert!(json.contains("\"height\": 16"));
    assert!(json.contains("Software"));
}
