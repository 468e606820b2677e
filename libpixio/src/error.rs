use thiserror::Error;

/// Result type for pixio operations
pub type Result<T> = std::result::Result<T, PixioError>;

/// Errors that can occur when working with image streams and caches
#[derive(Error, Debug)]
pub enum PixioError {
    #[error("could not open image: {0}")]
    OpenFailed(String),

    #[error("unrecognized image format: {0}")]
    UnknownFormat(String),

    #[error("operation requires an open stream")]
    NotOpen,

    #[error("non-existent subimage: subimage={subimage}, miplevel={miplevel}")]
    SubimageNotFound { subimage: i32, miplevel: i32 },

    #[error("channel index out of range: {0}")]
    ChannelOutOfRange(i32),

    #[error("invalid type descriptor: basetype={basetype}, aggregate={aggregate}, vecsemantics={vecsemantics}, arraylen={arraylen}")]
    InvalidTypeDesc {
        basetype: u8,
        aggregate: u8,
        vecsemantics: u8,
        arraylen: i32,
    },

    #[error("unsupported data format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid stride: {0}")]
    InvalidStride(isize),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("image geometry does not fit in memory")]
    SizeOverflow,

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("writing failed: {0}")]
    WriteFailed(String),

    #[error("reading failed: {0}")]
    ReadFailed(String),

    #[error("operation was interrupted by the progress callback")]
    Interrupted,

    #[error("cache entry is no longer valid: {0}")]
    Invalidated(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("image codec error: {0}")]
    CodecError(#[from] image::ImageError),
}

impl PixioError {
    /// Returns true if retrying the same call on the same handle can succeed
    /// without changing the handle's state first.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SubimageNotFound { .. }
                | Self::ChannelOutOfRange(_)
                | Self::InvalidRegion(_)
                | Self::UnknownAttribute(_)
        )
    }
}
