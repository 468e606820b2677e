//! Format identity resolution and capability queries.
//!
//! The decoding engine ships one plugin per file format; this module maps
//! filenames to a plugin identity without opening anything, names plugins,
//! and answers `supports()`-style capability questions for them.

use std::io::Read;
use std::path::Path;

use image::{ColorType, DynamicImage, ImageFormat};

use crate::error::{PixioError, Result};
use crate::spec::ImageSpec;
use crate::typedesc::{BaseType, TypeDesc};

/// Resolves a plugin from a filename extension, without I/O.
pub(crate) fn resolve(path: &Path) -> Result<ImageFormat> {
    ImageFormat::from_path(path)
        .map_err(|_| PixioError::UnknownFormat(path.display().to_string()))
}

/// Short plugin name, e.g. `"png"`.
pub(crate) fn short_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Pnm => "pnm",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Tga => "tga",
        ImageFormat::Dds => "dds",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Ico => "ico",
        ImageFormat::Hdr => "hdr",
        ImageFormat::OpenExr => "openexr",
        ImageFormat::Farbfeld => "farbfeld",
        ImageFormat::Avif => "avif",
        _ => "unknown",
    }
}

/// Whether the plugin can encode at all.
pub(crate) fn can_write(format: ImageFormat) -> bool {
    format.can_write()
}

/// Capability answers for an input plugin.
pub(crate) fn input_supports(_format: ImageFormat, _feature: &str) -> bool {
    // The engine decodes whole images: no native tile, mip, or deep access.
    false
}

/// Capability answers for an output plugin.
pub(crate) fn output_supports(format: ImageFormat, feature: &str) -> bool {
    match feature {
        "alpha" => matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Tiff
                | ImageFormat::Tga
                | ImageFormat::WebP
                | ImageFormat::Avif
                | ImageFormat::Farbfeld
        ),
        _ => false,
    }
}

/// Whether the bytes of `path` actually look like `format`.
pub(crate) fn sniff_matches(path: &Path, format: ImageFormat) -> bool {
    let mut head = [0u8; 256];
    let n = match std::fs::File::open(path).and_then(|mut f| f.read(&mut head)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    image::guess_format(&head[..n]).map_or(false, |guessed| guessed == format)
}

/// Builds the native spec of a decoded engine image.
pub(crate) fn spec_from_image(img: &DynamicImage) -> ImageSpec {
    let color = img.color();
    let basetype = match color {
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => BaseType::UInt16,
        ColorType::Rgb32F | ColorType::Rgba32F => BaseType::Float,
        _ => BaseType::UInt8,
    };
    let nchannels = i32::from(color.channel_count());
    ImageSpec::new_2d(
        TypeDesc::scalar(basetype),
        img.width() as i32,
        img.height() as i32,
        nchannels,
    )
}
