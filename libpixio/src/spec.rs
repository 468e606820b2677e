//! Image metadata records.

use serde::{Deserialize, Serialize};

use crate::error::{PixioError, Result};
use crate::typedesc::{BaseType, TypeDesc};

/// One entry of the open-ended attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Double(f64),
    Str(String),
    IntVec(Vec<i32>),
    FloatVec(Vec<f32>),
}

impl AttrValue {
    /// The type descriptor this value marshals as.
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Self::Int(_) => TypeDesc::INT32,
            Self::UInt(_) => TypeDesc::UINT32,
            Self::Float(_) => TypeDesc::FLOAT,
            Self::Double(_) => TypeDesc::DOUBLE,
            Self::Str(_) => TypeDesc::STRING,
            Self::IntVec(v) => TypeDesc {
                arraylen: v.len() as i32,
                ..TypeDesc::INT32
            },
            Self::FloatVec(v) => TypeDesc {
                arraylen: v.len() as i32,
                ..TypeDesc::FLOAT
            },
        }
    }
}

/// Metadata describing one image: geometry, pixel format, tiling, channel
/// layout, and arbitrary named attributes.
///
/// Setters perform no cross-field validation; changing `nchannels` does not
/// resize `channel_names`. Call [`ImageSpec::default_channel_names`] (or set
/// the names explicitly) after changing the channel count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Origin of the pixel data window.
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Size of the pixel data window. `depth > 1` indicates a volume.
    pub width: i32,
    pub height: i32,
    pub depth: i32,
    /// Origin of the full (display) window.
    pub full_x: i32,
    pub full_y: i32,
    pub full_z: i32,
    /// Size of the full (display) window.
    pub full_width: i32,
    pub full_height: i32,
    pub full_depth: i32,
    /// Tile size; 0 means the image is not tiled.
    pub tile_width: i32,
    pub tile_height: i32,
    pub tile_depth: i32,
    pub nchannels: i32,
    /// Working format shared by all channels unless `channel_formats` is set.
    pub format: TypeDesc,
    /// Per-channel native formats; empty when all channels share `format`.
    pub channel_formats: Vec<TypeDesc>,
    pub channel_names: Vec<String>,
    /// Index of the alpha channel, or -1.
    pub alpha_channel: i32,
    /// Index of the depth channel, or -1.
    pub z_channel: i32,
    /// Whether pixels hold variable-length sample lists.
    pub deep: bool,
    pub attributes: Vec<Attribute>,
}

impl ImageSpec {
    /// A zero-sized spec with the given working format.
    pub fn new(format: TypeDesc) -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            width: 0,
            height: 0,
            depth: 1,
            full_x: 0,
            full_y: 0,
            full_z: 0,
            full_width: 0,
            full_height: 0,
            full_depth: 0,
            tile_width: 0,
            tile_height: 0,
            tile_depth: 0,
            nchannels: 0,
            format,
            channel_formats: Vec::new(),
            channel_names: Vec::new(),
            alpha_channel: -1,
            z_channel: -1,
            deep: false,
            attributes: Vec::new(),
        }
    }

    /// A 2D spec with the full window equal to the data window and default
    /// channel names.
    pub fn new_2d(format: TypeDesc, width: i32, height: i32, nchannels: i32) -> Self {
        let mut spec = Self::new(format);
        spec.width = width;
        spec.height = height;
        spec.full_width = width;
        spec.full_height = height;
        spec.full_depth = 1;
        spec.depth = 1;
        spec.nchannels = nchannels;
        spec.default_channel_names();
        spec
    }

    /// Resets channel names to the conventional defaults for `nchannels`,
    /// and re-derives `alpha_channel`/`z_channel` from them.
    pub fn default_channel_names(&mut self) {
        self.channel_names.clear();
        self.alpha_channel = -1;
        self.z_channel = -1;
        if self.nchannels <= 0 {
            return;
        }
        match self.nchannels {
            1 => self.channel_names.push("Y".to_string()),
            2 => {
                self.channel_names.push("Y".to_string());
                self.channel_names.push("A".to_string());
                self.alpha_channel = 1;
            }
            n => {
                const RGBA: [&str; 4] = ["R", "G", "B", "A"];
                for c in 0..n {
                    if (c as usize) < RGBA.len() {
                        self.channel_names.push(RGBA[c as usize].to_string());
                        if c == 3 {
                            self.alpha_channel = 3;
                        }
                    } else {
                        self.channel_names.push(format!("channel{c}"));
                    }
                }
            }
        }
    }

    /// Name of channel `index`, or the empty string when out of range.
    pub fn channel_name(&self, index: i32) -> &str {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.channel_names.get(i))
            .map_or("", String::as_str)
    }

    /// Format of channel `chan`: its per-channel format when one is set,
    /// otherwise the shared working format.
    pub fn channel_format(&self, chan: i32) -> TypeDesc {
        usize::try_from(chan)
            .ok()
            .and_then(|i| self.channel_formats.get(i).copied())
            .unwrap_or(self.format)
    }

    /// Bytes of one channel sample in the working format.
    pub fn channel_bytes(&self) -> usize {
        self.format.total_bytes()
    }

    /// Bytes of one sample of channel `chan`; 0 when out of range.
    pub fn channel_bytes_chan(&self, chan: i32, native: bool) -> usize {
        if chan < 0 || chan >= self.nchannels {
            return 0;
        }
        if native {
            self.channel_format(chan).total_bytes()
        } else {
            self.channel_bytes()
        }
    }

    /// Bytes of one whole pixel.
    pub fn pixel_bytes(&self, native: bool) -> usize {
        if self.nchannels < 0 {
            return 0;
        }
        if native && !self.channel_formats.is_empty() {
            (0..self.nchannels)
                .map(|c| self.channel_format(c).total_bytes())
                .sum()
        } else {
            self.channel_bytes() * self.nchannels as usize
        }
    }

    /// Bytes of one pixel restricted to channels `[chbegin, chend)`;
    /// 0 for an empty or out-of-range span.
    pub fn pixel_bytes_chans(&self, chbegin: i32, chend: i32, native: bool) -> usize {
        if chbegin < 0 || chend > self.nchannels || chbegin >= chend {
            return 0;
        }
        if native && !self.channel_formats.is_empty() {
            (chbegin..chend)
                .map(|c| self.channel_format(c).total_bytes())
                .sum()
        } else {
            self.channel_bytes() * (chend - chbegin) as usize
        }
    }

    fn dim(v: i32) -> u128 {
        if v > 0 {
            v as u128
        } else {
            0
        }
    }

    fn scanline_bytes_wide(&self, native: bool) -> u128 {
        Self::dim(self.width) * self.pixel_bytes(native) as u128
    }

    fn image_bytes_wide(&self, native: bool) -> u128 {
        self.image_pixels() as u128 * self.pixel_bytes(native) as u128
    }

    /// Bytes in one scanline; 0 for degenerate geometry.
    pub fn scanline_bytes(&self, native: bool) -> u64 {
        u64::try_from(self.scanline_bytes_wide(native)).unwrap_or(u64::MAX)
    }

    /// Pixels in one tile; 0 when the image is untiled or the tile
    /// geometry is degenerate.
    pub fn tile_pixels(&self) -> u64 {
        let n = Self::dim(self.tile_width) * Self::dim(self.tile_height) * Self::dim(self.tile_depth);
        u64::try_from(n).unwrap_or(u64::MAX)
    }

    /// Bytes in one tile.
    pub fn tile_bytes(&self, native: bool) -> u64 {
        let n = self.tile_pixels() as u128 * self.pixel_bytes(native) as u128;
        u64::try_from(n).unwrap_or(u64::MAX)
    }

    /// Pixels in the whole data window; 0 for degenerate geometry.
    pub fn image_pixels(&self) -> u64 {
        let n = Self::dim(self.width) * Self::dim(self.height) * Self::dim(self.depth);
        u64::try_from(n).unwrap_or(u64::MAX)
    }

    /// Bytes in the whole image, saturating at `u64::MAX`.
    pub fn image_bytes(&self, native: bool) -> u64 {
        u64::try_from(self.image_bytes_wide(native)).unwrap_or(u64::MAX)
    }

    /// Whether `image_bytes` (in either format) fits this host's `usize`.
    /// Callers must check this before trusting a byte count for allocation.
    pub fn size_safe(&self) -> bool {
        let limit = usize::MAX as u128;
        self.image_bytes_wide(false) <= limit && self.image_bytes_wide(true) <= limit
    }

    fn name_matches(entry: &str, name: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            entry == name
        } else {
            entry.eq_ignore_ascii_case(name)
        }
    }

    fn type_matches(value: &AttrValue, searchtype: Option<TypeDesc>) -> bool {
        match searchtype {
            None => true,
            Some(td) if td.basetype == BaseType::Unknown => true,
            Some(td) => {
                let have = value.type_desc();
                td.basetype == have.basetype
                    && td.aggregate == have.aggregate
                    && td.arraylen == have.arraylen
            }
        }
    }

    /// Sets attribute `name`, replacing any existing entry with the same
    /// (case-sensitive) name.
    pub fn attribute(&mut self, name: &str, value: AttrValue) {
        if let Some(entry) = self.attributes.iter_mut().find(|a| a.name == name) {
            entry.value = value;
        } else {
            self.attributes.push(Attribute {
                name: name.to_string(),
                value,
            });
        }
    }

    /// Finds an attribute by name, optionally filtered by type.
    pub fn find_attribute(
        &self,
        name: &str,
        searchtype: Option<TypeDesc>,
        case_sensitive: bool,
    ) -> Option<&Attribute> {
        self.attributes.iter().find(|a| {
            Self::name_matches(&a.name, name, case_sensitive)
                && Self::type_matches(&a.value, searchtype)
        })
    }

    /// Removes every attribute matching `name` (and `searchtype`, when
    /// given). The case-sensitivity flag overrides the case-sensitive
    /// default used elsewhere.
    pub fn erase_attribute(
        &mut self,
        name: &str,
        searchtype: Option<TypeDesc>,
        case_sensitive: bool,
    ) {
        self.attributes.retain(|a| {
            !(Self::name_matches(&a.name, name, case_sensitive)
                && Self::type_matches(&a.value, searchtype))
        });
    }

    /// Integer attribute lookup; returns `default` when the name is absent
    /// or holds an incompatible type. Never fails.
    pub fn get_int_attribute(&self, name: &str, default: i32) -> i32 {
        match self.find_attribute(name, None, true).map(|a| &a.value) {
            Some(AttrValue::Int(v)) => *v,
            Some(AttrValue::UInt(v)) => i32::try_from(*v).unwrap_or(default),
            _ => default,
        }
    }

    /// Float attribute lookup; integer values convert, anything else
    /// returns `default`. Never fails.
    pub fn get_float_attribute(&self, name: &str, default: f32) -> f32 {
        match self.find_attribute(name, None, true).map(|a| &a.value) {
            Some(AttrValue::Float(v)) => *v,
            Some(AttrValue::Double(v)) => *v as f32,
            Some(AttrValue::Int(v)) => *v as f32,
            Some(AttrValue::UInt(v)) => *v as f32,
            _ => default,
        }
    }

    /// String attribute lookup; returns `default` when absent or not a
    /// string. Never fails.
    pub fn get_string_attribute<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.find_attribute(name, None, true).map(|a| &a.value) {
            Some(AttrValue::Str(s)) => s.as_str(),
            _ => default,
        }
    }

    /// Serializes the whole record to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PixioError::Serialization(e.to_string()))
    }
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self::new(TypeDesc::UNKNOWN)
    }
}
