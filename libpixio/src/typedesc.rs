//! ABI-stable type descriptors.
//!
//! A [`TypeDesc`] tags one pixel or attribute element: its scalar base
//! type, how scalars aggregate (vector, matrix), an optional semantic
//! hint, and an array length. The struct layout and every enum
//! discriminant are part of the C ABI and must match the declarations
//! shipped to host languages exactly; changing either is a breaking
//! ABI change that no runtime check can detect.

use serde::{Deserialize, Serialize};

use crate::error::{PixioError, Result};

/// Scalar type at the heart of a datum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Unknown = 0,
    None = 1,
    UInt8 = 2,
    Int8 = 3,
    UInt16 = 4,
    Int16 = 5,
    UInt32 = 6,
    Int32 = 7,
    UInt64 = 8,
    Int64 = 9,
    Half = 10,
    Float = 11,
    Double = 12,
    String = 13,
    Ptr = 14,
}

/// How many scalars aggregate into one element.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregate {
    Scalar = 1,
    Vec2 = 2,
    Vec3 = 3,
    Vec4 = 4,
    Matrix33 = 9,
    Matrix44 = 16,
}

/// What an aggregate represents.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VecSemantics {
    NoSemantics = 0,
    Color = 1,
    /// Spatial location
    Point = 2,
    /// Spatial direction
    Vector = 3,
    /// Surface normal
    Normal = 4,
    /// SMPTE timecode (int\[2\])
    Timecode = 5,
    /// SMPTE keycode (int\[7\])
    Keycode = 6,
    /// Paired numerator and denominator
    Rational = 7,
}

/// Description of one data element's type.
///
/// `arraylen` is 0 for a non-array, -1 for an unsized array, and the
/// element count for a fixed array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDesc {
    pub basetype: BaseType,
    pub aggregate: Aggregate,
    pub vecsemantics: VecSemantics,
    pub reserved: u8,
    pub arraylen: i32,
}

/// Untrusted wire form of [`TypeDesc`]: same layout, raw bytes.
///
/// Values arriving from the host side of the boundary come in as
/// `RawTypeDesc` and must pass [`TypeDesc::from_raw`] before use;
/// values built on this side are trusted by construction.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawTypeDesc {
    pub basetype: u8,
    pub aggregate: u8,
    pub vecsemantics: u8,
    pub reserved: u8,
    pub arraylen: i32,
}

impl BaseType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Unknown,
            1 => Self::None,
            2 => Self::UInt8,
            3 => Self::Int8,
            4 => Self::UInt16,
            5 => Self::Int16,
            6 => Self::UInt32,
            7 => Self::Int32,
            8 => Self::UInt64,
            9 => Self::Int64,
            10 => Self::Half,
            11 => Self::Float,
            12 => Self::Double,
            13 => Self::String,
            14 => Self::Ptr,
            _ => return None,
        })
    }

    /// Storage size of one scalar of this base type, in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::Unknown | Self::None => 0,
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 | Self::Half => 2,
            Self::UInt32 | Self::Int32 | Self::Float => 4,
            Self::UInt64 | Self::Int64 | Self::Double => 8,
            Self::String | Self::Ptr => std::mem::size_of::<*const u8>(),
        }
    }

    /// Lowercase name used in serialized specs and image info queries.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::None => "none",
            Self::UInt8 => "uint8",
            Self::Int8 => "int8",
            Self::UInt16 => "uint16",
            Self::Int16 => "int16",
            Self::UInt32 => "uint32",
            Self::Int32 => "int32",
            Self::UInt64 => "uint64",
            Self::Int64 => "int64",
            Self::Half => "half",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Ptr => "ptr",
        }
    }
}

impl Aggregate {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Scalar,
            2 => Self::Vec2,
            3 => Self::Vec3,
            4 => Self::Vec4,
            9 => Self::Matrix33,
            16 => Self::Matrix44,
            _ => return None,
        })
    }

    /// Number of scalars in one aggregate element.
    pub const fn elems(self) -> usize {
        self as usize
    }
}

impl VecSemantics {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::NoSemantics,
            1 => Self::Color,
            2 => Self::Point,
            3 => Self::Vector,
            4 => Self::Normal,
            5 => Self::Timecode,
            6 => Self::Keycode,
            7 => Self::Rational,
            _ => return None,
        })
    }
}

impl TypeDesc {
    pub const UNKNOWN: Self = Self::scalar(BaseType::Unknown);
    pub const UINT8: Self = Self::scalar(BaseType::UInt8);
    pub const INT8: Self = Self::scalar(BaseType::Int8);
    pub const UINT16: Self = Self::scalar(BaseType::UInt16);
    pub const INT16: Self = Self::scalar(BaseType::Int16);
    pub const UINT32: Self = Self::scalar(BaseType::UInt32);
    pub const INT32: Self = Self::scalar(BaseType::Int32);
    pub const UINT64: Self = Self::scalar(BaseType::UInt64);
    pub const INT64: Self = Self::scalar(BaseType::Int64);
    pub const HALF: Self = Self::scalar(BaseType::Half);
    pub const FLOAT: Self = Self::scalar(BaseType::Float);
    pub const DOUBLE: Self = Self::scalar(BaseType::Double);
    pub const STRING: Self = Self::scalar(BaseType::String);

    pub const COLOR: Self = Self {
        basetype: BaseType::Float,
        aggregate: Aggregate::Vec3,
        vecsemantics: VecSemantics::Color,
        reserved: 0,
        arraylen: 0,
    };

    pub const TIMECODE: Self = Self {
        basetype: BaseType::UInt32,
        aggregate: Aggregate::Scalar,
        vecsemantics: VecSemantics::Timecode,
        reserved: 0,
        arraylen: 2,
    };

    pub const KEYCODE: Self = Self {
        basetype: BaseType::Int32,
        aggregate: Aggregate::Scalar,
        vecsemantics: VecSemantics::Keycode,
        reserved: 0,
        arraylen: 7,
    };

    /// A plain scalar of the given base type.
    pub const fn scalar(basetype: BaseType) -> Self {
        Self {
            basetype,
            aggregate: Aggregate::Scalar,
            vecsemantics: VecSemantics::NoSemantics,
            reserved: 0,
            arraylen: 0,
        }
    }

    /// Lowers to the wire form. Total: every valid descriptor has one.
    pub const fn to_raw(self) -> RawTypeDesc {
        RawTypeDesc {
            basetype: self.basetype as u8,
            aggregate: self.aggregate as u8,
            vecsemantics: self.vecsemantics as u8,
            reserved: 0,
            arraylen: self.arraylen,
        }
    }

    /// Validates a wire-form descriptor.
    ///
    /// Out-of-range basetype/aggregate/vecsemantics values and
    /// `arraylen < -1` are rejected, never coerced. The reserved byte is
    /// normalized to zero.
    pub fn from_raw(raw: RawTypeDesc) -> Result<Self> {
        let invalid = || PixioError::InvalidTypeDesc {
            basetype: raw.basetype,
            aggregate: raw.aggregate,
            vecsemantics: raw.vecsemantics,
            arraylen: raw.arraylen,
        };
        let basetype = BaseType::from_u8(raw.basetype).ok_or_else(invalid)?;
        let aggregate = Aggregate::from_u8(raw.aggregate).ok_or_else(invalid)?;
        let vecsemantics = VecSemantics::from_u8(raw.vecsemantics).ok_or_else(invalid)?;
        if raw.arraylen < -1 {
            return Err(invalid());
        }
        Ok(Self {
            basetype,
            aggregate,
            vecsemantics,
            reserved: 0,
            arraylen: raw.arraylen,
        })
    }

    pub const fn is_array(self) -> bool {
        self.arraylen != 0
    }

    /// Array element count: 1 for a non-array, 0 for an unsized array.
    pub const fn num_elements(self) -> usize {
        match self.arraylen {
            0 => 1,
            n if n > 0 => n as usize,
            _ => 0,
        }
    }

    /// Bytes in one (non-array) element.
    pub const fn element_bytes(self) -> usize {
        self.basetype.bytes() * self.aggregate.elems()
    }

    /// Total storage bytes, accounting for the array length.
    pub const fn total_bytes(self) -> usize {
        self.element_bytes() * self.num_elements()
    }
}

impl Default for TypeDesc {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl std::fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.basetype.name())?;
        match self.aggregate {
            Aggregate::Scalar => {}
            Aggregate::Vec2 => write!(f, "[2]")?,
            Aggregate::Vec3 => write!(f, "[3]")?,
            Aggregate::Vec4 => write!(f, "[4]")?,
            Aggregate::Matrix33 => write!(f, "[3x3]")?,
            Aggregate::Matrix44 => write!(f, "[4x4]")?,
        }
        match self.arraylen {
            0 => {}
            -1 => write!(f, "[]")?,
            n => write!(f, "x{n}")?,
        }
        Ok(())
    }
}
