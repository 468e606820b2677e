//! Pixel marshaling between engine buffers and caller-described layouts.
//!
//! Everything here is pure buffer math: resolving the auto-stride
//! sentinel, bounding a strided destination, and converting samples
//! between the engine's native buffers and any numeric [`BaseType`]
//! through a normalized-float path. No I/O happens in this module.

use image::DynamicImage;

use crate::error::{PixioError, Result};
use crate::typedesc::BaseType;
use crate::AUTO_STRIDE;

/// A half-open pixel region in absolute (data-window) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub xbegin: i32,
    pub xend: i32,
    pub ybegin: i32,
    pub yend: i32,
    pub zbegin: i32,
    pub zend: i32,
}

impl Region {
    pub const fn width(&self) -> i32 {
        self.xend - self.xbegin
    }

    pub const fn height(&self) -> i32 {
        self.yend - self.ybegin
    }

    pub const fn depth(&self) -> i32 {
        self.zend - self.zbegin
    }

    /// Checks that the region is non-empty and lies within a data window
    /// anchored at `(x, y, z)` with the given size.
    pub fn validate(&self, x: i32, y: i32, z: i32, w: i32, h: i32, d: i32) -> Result<()> {
        let inside = self.xbegin >= x
            && self.xend <= x.saturating_add(w)
            && self.ybegin >= y
            && self.yend <= y.saturating_add(h)
            && self.zbegin >= z
            && self.zend <= z.saturating_add(d);
        if !inside || self.width() <= 0 || self.height() <= 0 || self.depth() <= 0 {
            return Err(PixioError::InvalidRegion(format!(
                "[{},{})x[{},{})x[{},{}) outside data window {}x{}x{} at ({x},{y},{z})",
                self.xbegin, self.xend, self.ybegin, self.yend, self.zbegin, self.zend, w, h, d,
            )));
        }
        Ok(())
    }
}

/// Resolved byte strides for a strided pixel layout.
#[derive(Debug, Clone, Copy)]
pub struct Strides {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

/// Resolves the [`AUTO_STRIDE`] sentinel to contiguous defaults.
///
/// `sample_bytes` is the size of one channel sample in the destination
/// format and `nch` the number of channels written per pixel. Negative
/// strides other than the sentinel are rejected.
pub fn resolve_strides(
    sample_bytes: usize,
    nch: usize,
    width: usize,
    height: usize,
    xstride: isize,
    ystride: isize,
    zstride: isize,
) -> Result<Strides> {
    let resolve = |stride: isize, auto: usize| -> Result<usize> {
        if stride == AUTO_STRIDE {
            Ok(auto)
        } else if stride < 0 {
            Err(PixioError::InvalidStride(stride))
        } else {
            Ok(stride as usize)
        }
    };
    let pixel = sample_bytes
        .checked_mul(nch)
        .ok_or(PixioError::SizeOverflow)?;
    let x = resolve(xstride, pixel)?;
    let y = resolve(ystride, x.checked_mul(width).ok_or(PixioError::SizeOverflow)?)?;
    let z = resolve(
        zstride,
        y.checked_mul(height).ok_or(PixioError::SizeOverflow)?,
    )?;
    Ok(Strides { x, y, z })
}

/// Number of bytes a strided region spans, from the first byte of the
/// first pixel to one past the last byte of the last pixel.
pub fn span_bytes(
    strides: Strides,
    width: usize,
    height: usize,
    depth: usize,
    pixel_bytes: usize,
) -> Result<usize> {
    if width == 0 || height == 0 || depth == 0 {
        return Ok(0);
    }
    let tail = |count: usize, stride: usize| (count - 1).checked_mul(stride);
    tail(depth, strides.z)
        .zip(tail(height, strides.y))
        .zip(tail(width, strides.x))
        .and_then(|((z, y), x)| z.checked_add(y)?.checked_add(x)?.checked_add(pixel_bytes))
        .ok_or(PixioError::SizeOverflow)
}

fn unsupported(base: BaseType) -> PixioError {
    PixioError::UnsupportedFormat(base.name().to_string())
}

/// Writes one normalized sample into `dst` at `offset` as `base`.
pub fn put_sample(dst: &mut [u8], offset: usize, base: BaseType, v: f32) -> Result<()> {
    let clamped = v.clamp(0.0, 1.0);
    let signed = v.clamp(-1.0, 1.0) as f64;
    match base {
        BaseType::UInt8 => {
            dst[offset] = (clamped * 255.0).round() as u8;
        }
        BaseType::Int8 => {
            dst[offset] = ((signed * 127.0).round() as i8) as u8;
        }
        BaseType::UInt16 => {
            let b = ((clamped * 65535.0).round() as u16).to_ne_bytes();
            dst[offset..offset + 2].copy_from_slice(&b);
        }
        BaseType::Int16 => {
            let b = ((signed * 32767.0).round() as i16).to_ne_bytes();
            dst[offset..offset + 2].copy_from_slice(&b);
        }
        BaseType::UInt32 => {
            let b = ((f64::from(clamped) * 4_294_967_295.0).round() as u32).to_ne_bytes();
            dst[offset..offset + 4].copy_from_slice(&b);
        }
        BaseType::Int32 => {
            let b = ((signed * 2_147_483_647.0).round() as i32).to_ne_bytes();
            dst[offset..offset + 4].copy_from_slice(&b);
        }
        BaseType::UInt64 => {
            let b = ((f64::from(clamped) * 1.844_674_407_370_955_2e19).round() as u64).to_ne_bytes();
            dst[offset..offset + 8].copy_from_slice(&b);
        }
        BaseType::Int64 => {
            let b = ((signed * 9.223_372_036_854_776e18).round() as i64).to_ne_bytes();
            dst[offset..offset + 8].copy_from_slice(&b);
        }
        BaseType::Float => {
            dst[offset..offset + 4].copy_from_slice(&v.to_ne_bytes());
        }
        BaseType::Double => {
            dst[offset..offset + 8].copy_from_slice(&f64::from(v).to_ne_bytes());
        }
        BaseType::Unknown | BaseType::None | BaseType::Half | BaseType::String | BaseType::Ptr => {
            return Err(unsupported(base));
        }
    }
    Ok(())
}

/// Reads one sample stored as `base` from `src` at `offset`, normalized to
/// float (integers map onto \[0,1\] / \[-1,1\]).
pub fn get_sample(src: &[u8], offset: usize, base: BaseType) -> Result<f32> {
    let b2 = |s: &[u8]| [s[offset], s[offset + 1]];
    let b4 = |s: &[u8]| [s[offset], s[offset + 1], s[offset + 2], s[offset + 3]];
    let b8 = |s: &[u8]| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&s[offset..offset + 8]);
        b
    };
    Ok(match base {
        BaseType::UInt8 => f32::from(src[offset]) / 255.0,
        BaseType::Int8 => f32::from(src[offset] as i8) / 127.0,
        BaseType::UInt16 => f32::from(u16::from_ne_bytes(b2(src))) / 65535.0,
        BaseType::Int16 => f32::from(i16::from_ne_bytes(b2(src))) / 32767.0,
        BaseType::UInt32 => (f64::from(u32::from_ne_bytes(b4(src))) / 4_294_967_295.0) as f32,
        BaseType::Int32 => (f64::from(i32::from_ne_bytes(b4(src))) / 2_147_483_647.0) as f32,
        BaseType::UInt64 => (u64::from_ne_bytes(b8(src)) as f64 / 1.844_674_407_370_955_2e19) as f32,
        BaseType::Int64 => (i64::from_ne_bytes(b8(src)) as f64 / 9.223_372_036_854_776e18) as f32,
        BaseType::Float => f32::from_ne_bytes(b4(src)),
        BaseType::Double => f64::from_ne_bytes(b8(src)) as f32,
        BaseType::Unknown | BaseType::None | BaseType::Half | BaseType::String | BaseType::Ptr => {
            return Err(unsupported(base));
        }
    })
}

/// Reads one normalized sample of channel `c` at image coordinates
/// `(x, y)` from an engine buffer.
pub fn image_sample(img: &DynamicImage, x: u32, y: u32, c: usize) -> f32 {
    let n8 = |v: u8| f32::from(v) / 255.0;
    let n16 = |v: u16| f32::from(v) / 65535.0;
    match img {
        DynamicImage::ImageLuma8(b) => n8(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageLumaA8(b) => n8(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageRgb8(b) => n8(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageRgba8(b) => n8(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageLuma16(b) => n16(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageLumaA16(b) => n16(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageRgb16(b) => n16(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageRgba16(b) => n16(b.get_pixel(x, y).0[c]),
        DynamicImage::ImageRgb32F(b) => b.get_pixel(x, y).0[c],
        DynamicImage::ImageRgba32F(b) => b.get_pixel(x, y).0[c],
        other => {
            let p = other.to_rgba32f().get_pixel(x, y).0;
            p[c.min(3)]
        }
    }
}

/// Copies a region of an engine image into a strided caller buffer,
/// converting each sample to `base`.
///
/// `origin` is the data-window origin the region coordinates are relative
/// to. The optional `progress` hook runs synchronously on this thread; a
/// `true` return interrupts the copy.
#[allow(clippy::too_many_arguments)]
pub fn copy_image_region<'cb>(
    img: &DynamicImage,
    origin: (i32, i32),
    region: &Region,
    chbegin: usize,
    chend: usize,
    base: BaseType,
    dst: &mut [u8],
    strides: Strides,
    mut progress: Option<&mut (dyn FnMut(f32) -> bool + 'cb)>,
) -> Result<()> {
    if chend <= chbegin {
        return Err(PixioError::InvalidRegion("empty channel range".to_string()));
    }
    let sample_bytes = base.bytes();
    let height = region.height() as usize;
    for zi in 0..region.depth() as usize {
        for yi in 0..height {
            if let Some(cb) = progress.as_deref_mut() {
                if yi % 32 == 0 && cb(yi as f32 / height as f32) {
                    return Err(PixioError::Interrupted);
                }
            }
            let py = (region.ybegin - origin.1) as u32 + yi as u32;
            for xi in 0..region.width() as usize {
                let px = (region.xbegin - origin.0) as u32 + xi as u32;
                let pixel_off = zi * strides.z + yi * strides.y + xi * strides.x;
                for (ci, c) in (chbegin..chend).enumerate() {
                    let v = image_sample(img, px, py, c);
                    put_sample(dst, pixel_off + ci * sample_bytes, base, v)?;
                }
            }
        }
    }
    Ok(())
}

/// Converts a strided caller buffer into normalized staging samples,
/// the write-path inverse of [`copy_image_region`].
///
/// `staging` is dense `width * height * nch` floats; `rows` selects which
/// scanlines of it to fill from `src`.
#[allow(clippy::too_many_arguments)]
pub fn copy_into_staging<'cb>(
    src: &[u8],
    base: BaseType,
    nch: usize,
    width: usize,
    rows: std::ops::Range<usize>,
    strides: Strides,
    staging: &mut [f32],
    mut progress: Option<&mut (dyn FnMut(f32) -> bool + 'cb)>,
) -> Result<()> {
    let sample_bytes = base.bytes();
    let nrows = rows.len();
    for (yi, y) in rows.enumerate() {
        if let Some(cb) = progress.as_deref_mut() {
            if yi % 32 == 0 && cb(yi as f32 / nrows as f32) {
                return Err(PixioError::Interrupted);
            }
        }
        for x in 0..width {
            let pixel_off = yi * strides.y + x * strides.x;
            for c in 0..nch {
                let v = get_sample(src, pixel_off + c * sample_bytes, base)?;
                staging[(y * width + x) * nch + c] = v;
            }
        }
    }
    Ok(())
}
