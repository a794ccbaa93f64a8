//! Runtime scalar kinds for typed arrays

use std::fmt;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::array::ArrayData;
use crate::error::{Error, Result};

/// Element kind of a [`DataArray`](crate::array::DataArray)
///
/// The discriminant order is the persisted choice index used by pipeline
/// files, so new kinds may only be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// 8-bit signed integer
    Int8,

    /// 8-bit unsigned integer
    UInt8,

    /// 16-bit signed integer
    Int16,

    /// 16-bit unsigned integer
    UInt16,

    /// 32-bit signed integer
    Int32,

    /// 32-bit unsigned integer
    UInt32,

    /// 64-bit signed integer
    Int64,

    /// 64-bit unsigned integer
    UInt64,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,
}

impl ScalarKind {
    /// Every supported kind, in persisted order
    pub const ALL: [ScalarKind; 10] = [
        ScalarKind::Int8,
        ScalarKind::UInt8,
        ScalarKind::Int16,
        ScalarKind::UInt16,
        ScalarKind::Int32,
        ScalarKind::UInt32,
        ScalarKind::Int64,
        ScalarKind::UInt64,
        ScalarKind::Float32,
        ScalarKind::Float64,
    ];

    /// Get the size of one element in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            ScalarKind::Int8 | ScalarKind::UInt8 => 1,
            ScalarKind::Int16 | ScalarKind::UInt16 => 2,
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float32 => 4,
            ScalarKind::Int64 | ScalarKind::UInt64 | ScalarKind::Float64 => 8,
        }
    }

    /// Persisted choice index of this kind
    pub fn index(self) -> i64 {
        self as i64
    }

    /// Look up a kind by its persisted choice index
    pub fn from_index(index: i64) -> Result<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| Error::parameter(format!("unknown scalar type index {index}")))
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Int8 => "Int8",
            ScalarKind::UInt8 => "UInt8",
            ScalarKind::Int16 => "Int16",
            ScalarKind::UInt16 => "UInt16",
            ScalarKind::Int32 => "Int32",
            ScalarKind::UInt32 => "UInt32",
            ScalarKind::Int64 => "Int64",
            ScalarKind::UInt64 => "UInt64",
            ScalarKind::Float32 => "Float32",
            ScalarKind::Float64 => "Float64",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust element type that can back a [`DataArray`](crate::array::DataArray)
///
/// Sealed: the kind set is closed, so the ten primitive impls below are the
/// only ones.
pub trait Scalar: Pod + Default + PartialEq + fmt::Debug + sealed::Sealed {
    /// The runtime kind tag for this type
    const KIND: ScalarKind;

    /// Borrow the typed storage if `data` holds this type
    fn slice(data: &ArrayData) -> Option<&[Self]>;

    /// Mutably borrow the typed storage if `data` holds this type
    fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]>;

    /// Wrap a vector in the matching storage variant
    fn wrap(values: Vec<Self>) -> ArrayData;

    /// Lossy widening conversion used by kind-agnostic readers
    fn to_f64(self) -> f64;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const KIND: ScalarKind = ScalarKind::$variant;

                fn slice(data: &ArrayData) -> Option<&[Self]> {
                    match data {
                        ArrayData::$variant(values) => Some(values.as_slice()),
                        _ => None,
                    }
                }

                fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]> {
                    match data {
                        ArrayData::$variant(values) => Some(values.as_mut_slice()),
                        _ => None,
                    }
                }

                fn wrap(values: Vec<Self>) -> ArrayData {
                    ArrayData::$variant(values)
                }

                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ScalarKind::Int8, 1)]
    #[test_case(ScalarKind::UInt16, 2)]
    #[test_case(ScalarKind::Int32, 4)]
    #[test_case(ScalarKind::Float32, 4)]
    #[test_case(ScalarKind::UInt64, 8)]
    #[test_case(ScalarKind::Float64, 8)]
    fn test_size_bytes(kind: ScalarKind, expected: usize) {
        assert_eq!(kind.size_bytes(), expected);
    }

    #[test]
    fn test_index_roundtrip() {
        for kind in ScalarKind::ALL {
            assert_eq!(ScalarKind::from_index(kind.index()).unwrap(), kind);
        }
        assert_eq!(ScalarKind::from_index(8).unwrap(), ScalarKind::Float32);
    }

    #[test]
    fn test_index_out_of_range() {
        assert!(matches!(ScalarKind::from_index(10), Err(Error::Parameter(_))));
        assert!(matches!(ScalarKind::from_index(-1), Err(Error::Parameter(_))));
    }

    #[test]
    fn test_rust_types_map_to_kinds() {
        assert_eq!(<u8 as Scalar>::KIND, ScalarKind::UInt8);
        assert_eq!(<i64 as Scalar>::KIND, ScalarKind::Int64);
        assert_eq!(<f32 as Scalar>::KIND, ScalarKind::Float32);
    }
}
