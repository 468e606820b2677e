//! Read streams.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::debug;

use crate::error::{PixioError, Result};
use crate::format;
use crate::pixels::{self, Region};
use crate::spec::ImageSpec;
use crate::typedesc::{Aggregate, BaseType, TypeDesc};
use crate::AUTO_STRIDE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Fresh,
    Open,
    Closed,
}

/// An image stream open for reading.
///
/// Lifecycle: [`ImageInput::create`] resolves the format plugin without
/// touching the file; opening decodes it and exposes its spec; `close`
/// ends the stream. A failed open leaves the handle reusable, a failed
/// seek leaves the cursor where it was, and any operation on a closed
/// stream fails cleanly.
///
/// Handles are not safe for concurrent use from multiple threads without
/// external serialization.
#[derive(Debug)]
pub struct ImageInput {
    path: PathBuf,
    format: image::ImageFormat,
    state: StreamState,
    image: Option<DynamicImage>,
    spec: ImageSpec,
    subimage: i32,
    miplevel: i32,
}

impl ImageInput {
    /// Resolves a format plugin from the filename extension without
    /// opening the file. The search path is accepted for call
    /// compatibility; the engine's plugins are compiled in.
    pub fn create(filename: impl AsRef<Path>, _plugin_searchpath: Option<&str>) -> Result<Self> {
        let path = filename.as_ref().to_path_buf();
        let fmt = format::resolve(&path)?;
        debug!("input: resolved {} plugin for {}", format::short_name(fmt), path.display());
        Ok(Self {
            path,
            format: fmt,
            state: StreamState::Fresh,
            image: None,
            spec: ImageSpec::default(),
            subimage: 0,
            miplevel: 0,
        })
    }

    /// Creates and opens a stream in one step. `config`, when given, is a
    /// borrowed hint (e.g. a preferred working format); it is never
    /// mutated or retained.
    pub fn open(filename: impl AsRef<Path>, config: Option<&ImageSpec>) -> Result<Self> {
        let mut input = Self::create(filename.as_ref(), None)?;
        input.open_with_config(filename.as_ref(), config)?;
        Ok(input)
    }

    /// Opens (or re-opens) this stream on `filename`.
    pub fn open_path(&mut self, filename: impl AsRef<Path>) -> Result<()> {
        self.open_with_config(filename.as_ref(), None)
    }

    fn open_with_config(&mut self, path: &Path, config: Option<&ImageSpec>) -> Result<()> {
        let fmt = format::resolve(path)?;
        let img = image::io::Reader::open(path)
            .map_err(|e| PixioError::OpenFailed(format!("{}: {e}", path.display())))?
            .with_guessed_format()?
            .decode()?;
        let mut spec = format::spec_from_image(&img);
        if let Some(cfg) = config {
            // Working-format hint; the native format stays what was decoded.
            if cfg.format.basetype == BaseType::Float {
                spec.format = TypeDesc::FLOAT;
            }
        }
        self.path = path.to_path_buf();
        self.format = fmt;
        self.image = Some(img);
        self.spec = spec;
        self.subimage = 0;
        self.miplevel = 0;
        self.state = StreamState::Open;
        debug!("input: opened {} ({}x{})", self.path.display(), self.spec.width, self.spec.height);
        Ok(())
    }

    /// Short name of the resolved format plugin.
    pub fn format_name(&self) -> &'static str {
        format::short_name(self.format)
    }

    /// Whether `filename`'s content looks like this stream's format.
    pub fn valid_file(&self, filename: impl AsRef<Path>) -> bool {
        format::sniff_matches(filename.as_ref(), self.format)
    }

    /// The spec of the current subimage. Borrowed: valid only while the
    /// stream stays open.
    pub fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    /// Capability query for the resolved plugin.
    pub fn supports(&self, feature: &str) -> bool {
        format::input_supports(self.format, feature)
    }

    pub fn current_subimage(&self) -> i32 {
        self.subimage
    }

    pub fn current_miplevel(&self) -> i32 {
        self.miplevel
    }

    /// Moves the cursor to another subimage/miplevel. On failure the
    /// cursor (and the spec) stay at the prior position.
    pub fn seek_subimage(&mut self, subimage: i32, miplevel: i32) -> Result<()> {
        self.require_open()?;
        if subimage == 0 && miplevel == 0 {
            self.subimage = 0;
            self.miplevel = 0;
            Ok(())
        } else {
            Err(PixioError::SubimageNotFound { subimage, miplevel })
        }
    }

    fn require_open(&self) -> Result<&DynamicImage> {
        match self.state {
            StreamState::Open => self.image.as_ref().ok_or(PixioError::NotOpen),
            StreamState::Fresh | StreamState::Closed => Err(PixioError::NotOpen),
        }
    }

    fn check_sample_format(format: TypeDesc) -> Result<BaseType> {
        if format.aggregate != Aggregate::Scalar || format.is_array() {
            return Err(PixioError::UnsupportedFormat(format.to_string()));
        }
        Ok(format.basetype)
    }

    fn channel_span(&self, chbegin: i32, chend: i32) -> Result<(usize, usize)> {
        if chbegin < 0 || chend > self.spec.nchannels || chbegin >= chend {
            return Err(PixioError::ChannelOutOfRange(if chbegin < 0 {
                chbegin
            } else {
                chend
            }));
        }
        Ok((chbegin as usize, chend as usize))
    }

    #[allow(clippy::too_many_arguments)]
    fn read_region<'cb>(
        &self,
        region: Region,
        chbegin: i32,
        chend: i32,
        format: TypeDesc,
        data: &mut [u8],
        xstride: isize,
        ystride: isize,
        zstride: isize,
        progress: Option<&mut (dyn FnMut(f32) -> bool + 'cb)>,
    ) -> Result<()> {
        let img = self.require_open()?;
        let base = Self::check_sample_format(format)?;
        let (cb, ce) = self.channel_span(chbegin, chend)?;
        let spec = &self.spec;
        region.validate(spec.x, spec.y, spec.z, spec.width, spec.height, spec.depth)?;
        let strides = pixels::resolve_strides(
            base.bytes(),
            ce - cb,
            region.width() as usize,
            region.height() as usize,
            xstride,
            ystride,
            zstride,
        )?;
        let span = pixels::span_bytes(
            strides,
            region.width() as usize,
            region.height() as usize,
            region.depth() as usize,
            base.bytes() * (ce - cb),
        )?;
        if data.len() < span {
            return Err(PixioError::ReadFailed(format!(
                "buffer holds {} bytes, region needs {span}",
                data.len()
            )));
        }
        pixels::copy_image_region(
            img,
            (spec.x, spec.y),
            &region,
            cb,
            ce,
            base,
            data,
            strides,
            progress,
        )
    }

    /// Reads scanline `y` of depth plane `z` in the given sample format.
    pub fn read_scanline(
        &self,
        y: i32,
        z: i32,
        format: TypeDesc,
        data: &mut [u8],
        xstride: isize,
    ) -> Result<()> {
        let spec = &self.spec;
        let region = Region {
            xbegin: spec.x,
            xend: spec.x + spec.width,
            ybegin: y,
            yend: y + 1,
            zbegin: z,
            zend: z + 1,
        };
        self.read_region(
            region,
            0,
            spec.nchannels,
            format,
            data,
            xstride,
            AUTO_STRIDE,
            AUTO_STRIDE,
            None,
        )
    }

    /// Float convenience form of [`ImageInput::read_scanline`].
    pub fn read_scanline_f32(&self, y: i32, z: i32, data: &mut [f32]) -> Result<()> {
        let img = self.require_open()?;
        let spec = &self.spec;
        let region = Region {
            xbegin: spec.x,
            xend: spec.x + spec.width,
            ybegin: y,
            yend: y + 1,
            zbegin: z,
            zend: z + 1,
        };
        region.validate(spec.x, spec.y, spec.z, spec.width, spec.height, spec.depth)?;
        let nch = spec.nchannels as usize;
        let needed = spec.width as usize * nch;
        if data.len() < needed {
            return Err(PixioError::ReadFailed(format!(
                "buffer holds {} floats, scanline needs {needed}",
                data.len()
            )));
        }
        let py = (y - spec.y) as u32;
        for x in 0..spec.width as usize {
            for c in 0..nch {
                data[x * nch + c] = pixels::image_sample(img, x as u32, py, c);
            }
        }
        Ok(())
    }

    /// Reads the tile whose origin is `(x, y, z)`. Fails unless the open
    /// image is tiled.
    pub fn read_tile(
        &self,
        x: i32,
        y: i32,
        z: i32,
        format: TypeDesc,
        data: &mut [u8],
    ) -> Result<()> {
        self.require_open()?;
        let spec = &self.spec;
        if spec.tile_width <= 0 {
            return Err(PixioError::UnsupportedFormat(
                "tile reads on an untiled image".to_string(),
            ));
        }
        let region = Region {
            xbegin: x,
            xend: (x + spec.tile_width).min(spec.x + spec.width),
            ybegin: y,
            yend: (y + spec.tile_height).min(spec.y + spec.height),
            zbegin: z,
            zend: (z + spec.tile_depth.max(1)).min(spec.z + spec.depth),
        };
        self.read_region(
            region,
            0,
            spec.nchannels,
            format,
            data,
            AUTO_STRIDE,
            AUTO_STRIDE,
            AUTO_STRIDE,
            None,
        )
    }

    /// Float convenience form of [`ImageInput::read_tile`].
    pub fn read_tile_f32(&self, x: i32, y: i32, z: i32, data: &mut [f32]) -> Result<()> {
        let len = data.len() * std::mem::size_of::<f32>();
        let mut bytes = vec![0u8; len];
        self.read_tile(x, y, z, TypeDesc::FLOAT, &mut bytes)?;
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            data[i] = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }

    /// Reads the entire current subimage.
    pub fn read_image<'cb>(
        &self,
        format: TypeDesc,
        data: &mut [u8],
        progress: Option<&mut (dyn FnMut(f32) -> bool + 'cb)>,
    ) -> Result<()> {
        let spec = &self.spec;
        self.read_image_channels(
            0,
            spec.nchannels,
            format,
            data,
            AUTO_STRIDE,
            AUTO_STRIDE,
            AUTO_STRIDE,
            progress,
        )
    }

    /// Channel-range, strided form of [`ImageInput::read_image`].
    #[allow(clippy::too_many_arguments)]
    pub fn read_image_channels<'cb>(
        &self,
        chbegin: i32,
        chend: i32,
        format: TypeDesc,
        data: &mut [u8],
        xstride: isize,
        ystride: isize,
        zstride: isize,
        progress: Option<&mut (dyn FnMut(f32) -> bool + 'cb)>,
    ) -> Result<()> {
        let spec = &self.spec;
        let region = Region {
            xbegin: spec.x,
            xend: spec.x + spec.width,
            ybegin: spec.y,
            yend: spec.y + spec.height,
            zbegin: spec.z,
            zend: spec.z + spec.depth,
        };
        self.read_region(
            region, chbegin, chend, format, data, xstride, ystride, zstride, progress,
        )
    }

    /// Float convenience form of [`ImageInput::read_image`].
    pub fn read_image_f32(&self, data: &mut [f32]) -> Result<()> {
        let img = self.require_open()?;
        let spec = &self.spec;
        let nch = spec.nchannels as usize;
        let needed = spec.image_pixels() as usize * nch;
        if data.len() < needed {
            return Err(PixioError::ReadFailed(format!(
                "buffer holds {} floats, image needs {needed}",
                data.len()
            )));
        }
        let (w, h) = (spec.width as usize, spec.height as usize);
        for y in 0..h {
            for x in 0..w {
                for c in 0..nch {
                    data[(y * w + x) * nch + c] = pixels::image_sample(img, x as u32, y as u32, c);
                }
            }
        }
        Ok(())
    }

    /// Ends the stream. Further reads and seeks fail cleanly; only
    /// dropping the handle is expected afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.image = None;
        self.state = StreamState::Closed;
        Ok(())
    }
}
