//! Write streams.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use log::debug;

use crate::error::{PixioError, Result};
use crate::format;
use crate::input::StreamState;
use crate::pixels::{self, Strides};
use crate::spec::ImageSpec;
use crate::typedesc::{Aggregate, BaseType, TypeDesc};
use crate::{AUTO_STRIDE, MAX_ENGINE_CHANNELS};

/// How `open` positions a write stream.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create or truncate the file.
    Create = 0,
    /// Append another subimage.
    AppendSubimage = 1,
    /// Append another miplevel of the current subimage.
    AppendMipLevel = 2,
}

/// An image stream open for writing.
///
/// Pixels accumulate in a normalized staging buffer sized by the declared
/// spec; `close` hands the finished image to the engine's encoder. A
/// handle whose `open` failed stays reusable; writes after `close` fail
/// cleanly. Not safe for concurrent use without external serialization.
pub struct ImageOutput {
    path: PathBuf,
    format: ImageFormat,
    state: StreamState,
    spec: ImageSpec,
    staging: Vec<f32>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DepthClass {
    U8,
    U16,
    F32,
}

impl ImageOutput {
    /// Resolves a writable format plugin from the filename extension
    /// without creating the file.
    pub fn create(filename: impl AsRef<Path>, _plugin_searchpath: Option<&str>) -> Result<Self> {
        let path = filename.as_ref().to_path_buf();
        let fmt = format::resolve(&path)?;
        if !format::can_write(fmt) {
            return Err(PixioError::UnsupportedFormat(format!(
                "{} cannot be written",
                format::short_name(fmt)
            )));
        }
        debug!("output: resolved {} plugin for {}", format::short_name(fmt), path.display());
        Ok(Self {
            path,
            format: fmt,
            state: StreamState::Fresh,
            spec: ImageSpec::default(),
            staging: Vec::new(),
        })
    }

    /// Short name of the resolved format plugin.
    pub fn format_name(&self) -> &'static str {
        format::short_name(self.format)
    }

    /// The spec declared at open time. Borrowed: valid only while the
    /// handle lives.
    pub fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    /// Capability query for the resolved plugin.
    pub fn supports(&self, feature: &str) -> bool {
        format::output_supports(self.format, feature)
    }

    /// Declares the target file and its spec. The spec is copied; the
    /// caller keeps ownership of its argument.
    pub fn open(&mut self, filename: impl AsRef<Path>, spec: &ImageSpec, mode: OpenMode) -> Result<()> {
        if mode != OpenMode::Create {
            return Err(PixioError::UnsupportedFormat(
                "append modes are not supported by this engine".to_string(),
            ));
        }
        let path = filename.as_ref().to_path_buf();
        let fmt = format::resolve(&path)?;
        if !format::can_write(fmt) {
            return Err(PixioError::UnsupportedFormat(format!(
                "{} cannot be written",
                format::short_name(fmt)
            )));
        }
        if spec.width <= 0 || spec.height <= 0 {
            return Err(PixioError::InvalidRegion(format!(
                "cannot write a {}x{} image",
                spec.width, spec.height
            )));
        }
        if spec.depth != 1 {
            return Err(PixioError::UnsupportedFormat("volumes".to_string()));
        }
        if spec.deep {
            return Err(PixioError::UnsupportedFormat("deep data".to_string()));
        }
        if spec.tile_width > 0 {
            return Err(PixioError::UnsupportedFormat("tiled output".to_string()));
        }
        if spec.nchannels < 1 || spec.nchannels > MAX_ENGINE_CHANNELS {
            return Err(PixioError::ChannelOutOfRange(spec.nchannels));
        }
        if !spec.size_safe() {
            return Err(PixioError::SizeOverflow);
        }
        let samples = spec.image_pixels() as usize * spec.nchannels as usize;
        self.path = path;
        self.format = fmt;
        self.spec = spec.clone();
        self.staging = vec![0.0; samples];
        self.state = StreamState::Open;
        debug!("output: opened {} ({}x{})", self.path.display(), spec.width, spec.height);
        Ok(())
    }

    /// Multi-subimage form of `open`, pre-declaring every subimage's spec.
    /// The spec slice is copied before use; the engine's formats hold a
    /// single subimage, so more than one spec fails cleanly.
    pub fn open_multi(&mut self, filename: impl AsRef<Path>, specs: &[ImageSpec]) -> Result<()> {
        match specs {
            [] => Err(PixioError::InvalidRegion("no subimage specs".to_string())),
            [only] => self.open(filename, only, OpenMode::Create),
            _ => Err(PixioError::UnsupportedFormat(
                "multiple subimages".to_string(),
            )),
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.state == StreamState::Open {
            Ok(())
        } else {
            Err(PixioError::NotOpen)
        }
    }

    fn check_sample_format(format: TypeDesc) -> Result<BaseType> {
        if format.aggregate != Aggregate::Scalar || format.is_array() {
            return Err(PixioError::UnsupportedFormat(format.to_string()));
        }
        Ok(format.basetype)
    }

    /// Writes scanline `y` of depth plane `z` from caller data in the
    /// given sample format.
    pub fn write_scanline(
        &mut self,
        y: i32,
        z: i32,
        format: TypeDesc,
        data: &[u8],
        xstride: isize,
    ) -> Result<()> {
        self.require_open()?;
        let base = Self::check_sample_format(format)?;
        let spec = &self.spec;
        if y < spec.y || y >= spec.y + spec.height || z != spec.z {
            return Err(PixioError::InvalidRegion(format!(
                "scanline y={y} z={z} outside the declared image"
            )));
        }
        let nch = spec.nchannels as usize;
        let width = spec.width as usize;
        let strides = pixels::resolve_strides(
            base.bytes(),
            nch,
            width,
            1,
            xstride,
            AUTO_STRIDE,
            AUTO_STRIDE,
        )?;
        Self::check_span(data, strides, width, 1, base.bytes() * nch)?;
        let row = (y - spec.y) as usize;
        pixels::copy_into_staging(
            data,
            base,
            nch,
            width,
            row..row + 1,
            Strides { y: 0, ..strides },
            &mut self.staging,
            None,
        )
    }

    /// Writes the entire declared image in one call.
    pub fn write_image<'cb>(
        &mut self,
        format: TypeDesc,
        data: &[u8],
        xstride: isize,
        ystride: isize,
        zstride: isize,
        progress: Option<&mut (dyn FnMut(f32) -> bool + 'cb)>,
    ) -> Result<()> {
        self.require_open()?;
        let base = Self::check_sample_format(format)?;
        let spec = &self.spec;
        let nch = spec.nchannels as usize;
        let (width, height) = (spec.width as usize, spec.height as usize);
        let strides =
            pixels::resolve_strides(base.bytes(), nch, width, height, xstride, ystride, zstride)?;
        Self::check_span(data, strides, width, height, base.bytes() * nch)?;
        pixels::copy_into_staging(
            data,
            base,
            nch,
            width,
            0..height,
            strides,
            &mut self.staging,
            progress,
        )
    }

    fn check_span(
        data: &[u8],
        strides: Strides,
        width: usize,
        height: usize,
        pixel_bytes: usize,
    ) -> Result<()> {
        let span = pixels::span_bytes(strides, width, height, 1, pixel_bytes)?;
        if data.len() < span {
            return Err(PixioError::WriteFailed(format!(
                "buffer holds {} bytes, image needs {span}",
                data.len()
            )));
        }
        Ok(())
    }

    /// Flushes the staged pixels through the engine's encoder and ends
    /// the stream.
    pub fn close(&mut self) -> Result<()> {
        if self.state == StreamState::Open {
            let result = self.encode();
            self.staging = Vec::new();
            self.state = StreamState::Closed;
            result?;
            debug!("output: wrote {}", self.path.display());
        } else {
            self.state = StreamState::Closed;
        }
        Ok(())
    }

    fn depth_class(&self) -> DepthClass {
        let bytes = self.spec.format.basetype.bytes();
        match self.format {
            ImageFormat::Png | ImageFormat::Tiff => {
                if bytes >= 2 {
                    DepthClass::U16
                } else {
                    DepthClass::U8
                }
            }
            ImageFormat::Farbfeld => DepthClass::U16,
            ImageFormat::Hdr | ImageFormat::OpenExr => DepthClass::F32,
            _ => DepthClass::U8,
        }
    }

    fn staged(&self, x: usize, y: usize, c: usize) -> f32 {
        let nch = self.spec.nchannels as usize;
        let width = self.spec.width as usize;
        let sample = |ch: usize| self.staging[(y * width + x) * nch + ch];
        if c < nch {
            return sample(c);
        }
        // Expanding beyond the declared channels: luminance replicates,
        // a declared alpha carries over, a missing alpha pads opaque.
        match (c, nch) {
            (3, 2) => sample(1),
            (3, _) => 1.0,
            _ => sample(0),
        }
    }

    fn encode(&self) -> Result<()> {
        let spec = &self.spec;
        let (w, h) = (spec.width as u32, spec.height as u32);
        let nch = spec.nchannels as usize;
        let class = self.depth_class();
        // Channel count the target format actually stores.
        let out_nch = match (self.format, class) {
            (ImageFormat::Jpeg, _) => {
                if nch >= 3 {
                    3
                } else {
                    1
                }
            }
            (ImageFormat::Hdr, _) => 3,
            (ImageFormat::OpenExr, _) => {
                if nch == 4 {
                    4
                } else {
                    3
                }
            }
            (_, DepthClass::F32) => nch.clamp(3, 4),
            _ => nch,
        };
        let collect = |scale: f32| -> Vec<f32> {
            let mut v = Vec::with_capacity(w as usize * h as usize * out_nch);
            for y in 0..h as usize {
                for x in 0..w as usize {
                    for c in 0..out_nch {
                        v.push(self.staged(x, y, c).clamp(0.0, 1.0) * scale);
                    }
                }
            }
            v
        };
        let bad = || PixioError::WriteFailed("staging buffer shape mismatch".to_string());
        let img: DynamicImage = match class {
            DepthClass::U8 => {
                let raw: Vec<u8> = collect(255.0).iter().map(|v| v.round() as u8).collect();
                match out_nch {
                    1 => image::GrayImage::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
                    2 => image::GrayAlphaImage::from_raw(w, h, raw).map(DynamicImage::ImageLumaA8),
                    3 => image::RgbImage::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
                    _ => image::RgbaImage::from_raw(w, h, raw).map(DynamicImage::ImageRgba8),
                }
                .ok_or_else(bad)?
            }
            DepthClass::U16 => {
                let raw: Vec<u16> = collect(65535.0).iter().map(|v| v.round() as u16).collect();
                match out_nch {
                    1 => image::ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageLuma16),
                    2 => image::ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageLumaA16),
                    3 => image::ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgb16),
                    _ => image::ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgba16),
                }
                .ok_or_else(bad)?
            }
            DepthClass::F32 => {
                let mut raw = Vec::with_capacity(w as usize * h as usize * out_nch);
                for y in 0..h as usize {
                    for x in 0..w as usize {
                        for c in 0..out_nch {
                            raw.push(self.staged(x, y, c));
                        }
                    }
                }
                match out_nch {
                    4 => image::ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgba32F),
                    _ => image::ImageBuffer::from_raw(w, h, raw).map(DynamicImage::ImageRgb32F),
                }
                .ok_or_else(bad)?
            }
        };
        img.save_with_format(&self.path, self.format)?;
        Ok(())
    }
}
