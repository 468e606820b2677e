#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! pixio - image I/O entities behind a flat C ABI
//!
//! This library models images as a small set of entities: an [`ImageSpec`]
//! metadata record, [`ImageInput`]/[`ImageOutput`] stream handles, and a
//! shared [`ImageCache`] with per-thread scratch state. Pixel decoding and
//! encoding are delegated to the `image` crate; this layer owns the
//! metadata model, the stream state machines, the cache bookkeeping, and
//! the `extern "C"` surface (the `ffi` module) through which all of it is
//! reachable from other languages as opaque pointers and free functions.

pub mod cache;
pub mod error;
mod format;
pub mod input;
pub mod output;
pub mod pixels;
pub mod spec;
pub mod typedesc;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use cache::{ImageCache, Perthread};
pub use error::{PixioError, Result};
pub use input::ImageInput;
pub use output::{ImageOutput, OpenMode};
pub use spec::{AttrValue, Attribute, ImageSpec};
pub use typedesc::{Aggregate, BaseType, RawTypeDesc, TypeDesc, VecSemantics};

/// Stride sentinel requesting a contiguous default. Reserved: never a real
/// byte offset.
pub const AUTO_STRIDE: isize = isize::MIN;

/// Most channels the decoding engine can produce or consume per pixel.
pub const MAX_ENGINE_CHANNELS: i32 = 4;

/// Default cache memory budget in megabytes.
pub const DEFAULT_CACHE_MEMORY_MB: f32 = 1024.0;
