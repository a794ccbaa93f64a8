//! Typed, tuple-structured numeric arrays whose element kind is chosen at run time

use std::mem::size_of;

use crate::error::{Error, Result};
use crate::scalar::{Scalar, ScalarKind};

/// Storage of a [`DataArray`]: one variant per supported kind
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// 8-bit signed integers
    Int8(Vec<i8>),
    /// 8-bit unsigned integers
    UInt8(Vec<u8>),
    /// 16-bit signed integers
    Int16(Vec<i16>),
    /// 16-bit unsigned integers
    UInt16(Vec<u16>),
    /// 32-bit signed integers
    Int32(Vec<i32>),
    /// 32-bit unsigned integers
    UInt32(Vec<u32>),
    /// 64-bit signed integers
    Int64(Vec<i64>),
    /// 64-bit unsigned integers
    UInt64(Vec<u64>),
    /// 32-bit floats
    Float32(Vec<f32>),
    /// 64-bit floats
    Float64(Vec<f64>),
}

/// Run `$body` with `$values` bound to the inner `Vec` of any variant
macro_rules! with_values {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            ArrayData::Int8($values) => $body,
            ArrayData::UInt8($values) => $body,
            ArrayData::Int16($values) => $body,
            ArrayData::UInt16($values) => $body,
            ArrayData::Int32($values) => $body,
            ArrayData::UInt32($values) => $body,
            ArrayData::Int64($values) => $body,
            ArrayData::UInt64($values) => $body,
            ArrayData::Float32($values) => $body,
            ArrayData::Float64($values) => $body,
        }
    };
}

fn zeroed_vec<T: Scalar>(len: usize) -> Result<Vec<T>> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailed {
            requested_bytes: len.saturating_mul(size_of::<T>()),
        })?;
    values.resize(len, T::default());
    Ok(values)
}

fn resize_vec<T: Scalar>(values: &mut Vec<T>, len: usize) -> Result<()> {
    if len > values.len() {
        values
            .try_reserve_exact(len - values.len())
            .map_err(|_| Error::AllocationFailed {
                requested_bytes: len.saturating_mul(size_of::<T>()),
            })?;
    }
    values.resize(len, T::default());
    Ok(())
}

impl ArrayData {
    /// Allocate `len` zeroed elements of `kind`
    pub fn zeroed(kind: ScalarKind, len: usize) -> Result<Self> {
        Ok(match kind {
            ScalarKind::Int8 => ArrayData::Int8(zeroed_vec(len)?),
            ScalarKind::UInt8 => ArrayData::UInt8(zeroed_vec(len)?),
            ScalarKind::Int16 => ArrayData::Int16(zeroed_vec(len)?),
            ScalarKind::UInt16 => ArrayData::UInt16(zeroed_vec(len)?),
            ScalarKind::Int32 => ArrayData::Int32(zeroed_vec(len)?),
            ScalarKind::UInt32 => ArrayData::UInt32(zeroed_vec(len)?),
            ScalarKind::Int64 => ArrayData::Int64(zeroed_vec(len)?),
            ScalarKind::UInt64 => ArrayData::UInt64(zeroed_vec(len)?),
            ScalarKind::Float32 => ArrayData::Float32(zeroed_vec(len)?),
            ScalarKind::Float64 => ArrayData::Float64(zeroed_vec(len)?),
        })
    }

    /// An empty vector of `kind`
    pub fn empty(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Int8 => ArrayData::Int8(Vec::new()),
            ScalarKind::UInt8 => ArrayData::UInt8(Vec::new()),
            ScalarKind::Int16 => ArrayData::Int16(Vec::new()),
            ScalarKind::UInt16 => ArrayData::UInt16(Vec::new()),
            ScalarKind::Int32 => ArrayData::Int32(Vec::new()),
            ScalarKind::UInt32 => ArrayData::UInt32(Vec::new()),
            ScalarKind::Int64 => ArrayData::Int64(Vec::new()),
            ScalarKind::UInt64 => ArrayData::UInt64(Vec::new()),
            ScalarKind::Float32 => ArrayData::Float32(Vec::new()),
            ScalarKind::Float64 => ArrayData::Float64(Vec::new()),
        }
    }

    /// The kind stored in this variant
    pub fn kind(&self) -> ScalarKind {
        match self {
            ArrayData::Int8(_) => ScalarKind::Int8,
            ArrayData::UInt8(_) => ScalarKind::UInt8,
            ArrayData::Int16(_) => ScalarKind::Int16,
            ArrayData::UInt16(_) => ScalarKind::UInt16,
            ArrayData::Int32(_) => ScalarKind::Int32,
            ArrayData::UInt32(_) => ScalarKind::UInt32,
            ArrayData::Int64(_) => ScalarKind::Int64,
            ArrayData::UInt64(_) => ScalarKind::UInt64,
            ArrayData::Float32(_) => ScalarKind::Float32,
            ArrayData::Float64(_) => ScalarKind::Float64,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        with_values!(self, values => values.len())
    }

    /// Check if there are no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the elements as raw bytes in host order
    pub fn as_bytes(&self) -> &[u8] {
        with_values!(self, values => bytemuck::cast_slice(values.as_slice()))
    }

    /// Mutable byte view of the elements in host order
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        with_values!(self, values => bytemuck::cast_slice_mut(values.as_mut_slice()))
    }

    fn resize(&mut self, len: usize) -> Result<()> {
        with_values!(self, values => resize_vec(values, len))
    }

    fn release(&mut self) {
        with_values!(self, values => *values = Vec::new());
    }
}

/// A homogeneous numeric buffer of `tuple_count * component_count` elements
///
/// Element `c` of tuple `t` lives at `t * component_count + c` (row-major).
/// An array created with [`DataArray::placeholder`] records its shape but
/// owns no storage until [`DataArray::allocate`] is called; preflight uses
/// these so downstream filters can validate shapes without any allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    /// Name of the array, unique within its group
    name: String,

    /// Number of tuples
    tuple_count: usize,

    /// Number of scalar values per tuple
    component_count: usize,

    /// Element storage
    data: ArrayData,

    /// Whether `data` holds every element
    allocated: bool,
}

fn element_count(kind: ScalarKind, tuple_count: usize, component_count: usize) -> Result<usize> {
    if component_count == 0 {
        return Err(Error::parameter("component count must be at least 1"));
    }
    let len = tuple_count
        .checked_mul(component_count)
        .ok_or(Error::AllocationFailed {
            requested_bytes: usize::MAX,
        })?;
    len.checked_mul(kind.size_bytes())
        .ok_or(Error::AllocationFailed {
            requested_bytes: usize::MAX,
        })?;
    Ok(len)
}

impl DataArray {
    /// Create a zero-filled array
    pub fn create(
        kind: ScalarKind,
        tuple_count: usize,
        component_count: usize,
        name: &str,
    ) -> Result<Self> {
        let len = element_count(kind, tuple_count, component_count)?;
        let data = ArrayData::zeroed(kind, len)?;

        tracing::trace!(name, %kind, tuple_count, component_count, "created data array");

        Ok(Self {
            name: name.to_string(),
            tuple_count,
            component_count,
            data,
            allocated: true,
        })
    }

    /// Create an array that records its shape but holds no storage
    pub fn placeholder(
        kind: ScalarKind,
        tuple_count: usize,
        component_count: usize,
        name: &str,
    ) -> Result<Self> {
        element_count(kind, tuple_count, component_count)?;

        Ok(Self {
            name: name.to_string(),
            tuple_count,
            component_count,
            data: ArrayData::empty(kind),
            allocated: false,
        })
    }

    /// Create an array from existing values
    pub fn from_vec<T: Scalar>(name: &str, component_count: usize, values: Vec<T>) -> Result<Self> {
        if component_count == 0 {
            return Err(Error::parameter("component count must be at least 1"));
        }
        if values.len() % component_count != 0 {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: component_count,
                actual: values.len() % component_count,
            });
        }

        Ok(Self {
            name: name.to_string(),
            tuple_count: values.len() / component_count,
            component_count,
            data: T::wrap(values),
            allocated: true,
        })
    }

    /// Get the name of this array
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename this array
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Get the element kind
    pub fn kind(&self) -> ScalarKind {
        self.data.kind()
    }

    /// Number of tuples
    pub fn tuple_count(&self) -> usize {
        self.tuple_count
    }

    /// Number of scalar values per tuple
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// Total number of scalar values (`tuple_count * component_count`)
    pub fn len(&self) -> usize {
        self.tuple_count * self.component_count
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the element data in bytes once allocated
    pub fn byte_len(&self) -> usize {
        self.len() * self.kind().size_bytes()
    }

    /// Whether element storage exists
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Give a placeholder its zero-filled storage; no-op when already allocated
    pub fn allocate(&mut self) -> Result<()> {
        if !self.allocated {
            self.data = ArrayData::zeroed(self.kind(), self.len())?;
            self.allocated = true;
        }
        Ok(())
    }

    /// A placeholder with the same name, kind and shape
    pub fn structure_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tuple_count: self.tuple_count,
            component_count: self.component_count,
            data: ArrayData::empty(self.kind()),
            allocated: false,
        }
    }

    /// Change the tuple count, keeping existing tuples and zero-filling new ones
    pub fn resize(&mut self, tuple_count: usize) -> Result<()> {
        let len = element_count(self.kind(), tuple_count, self.component_count)?;
        if self.allocated {
            self.data.resize(len)?;
        }
        self.tuple_count = tuple_count;
        Ok(())
    }

    /// Drop the storage, turning this array back into a placeholder
    pub fn release(&mut self) {
        self.data.release();
        self.allocated = false;
    }

    /// Borrow the storage variant
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Raw bytes of every element in host order; empty for placeholders
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Mutable raw bytes of every element in host order
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_bytes_mut()
    }

    /// Mutable raw bytes starting at `tuple_offset`, for bulk I/O
    pub fn tuple_bytes_mut(&mut self, tuple_offset: usize) -> Result<&mut [u8]> {
        if !self.allocated {
            return Err(Error::parameter(format!(
                "array '{}' has no storage",
                self.name
            )));
        }
        if tuple_offset > self.tuple_count {
            return Err(Error::ShapeMismatch {
                name: self.name.clone(),
                expected: self.tuple_count,
                actual: tuple_offset,
            });
        }
        let start = tuple_offset * self.component_count * self.kind().size_bytes();
        Ok(&mut self.data.as_bytes_mut()[start..])
    }

    /// Reverse the byte order of every element in place
    pub fn byte_swap_elements(&mut self) {
        let size = self.kind().size_bytes();
        if size > 1 {
            for element in self.data.as_bytes_mut().chunks_exact_mut(size) {
                element.reverse();
            }
        }
    }

    /// Typed view of the elements
    pub fn as_slice<T: Scalar>(&self) -> Result<&[T]> {
        T::slice(&self.data).ok_or_else(|| self.type_mismatch(T::KIND))
    }

    /// Mutable typed view of the elements
    pub fn as_mut_slice<T: Scalar>(&mut self) -> Result<&mut [T]> {
        let actual = self.kind();
        let name = &self.name;
        T::slice_mut(&mut self.data).ok_or_else(|| Error::TypeMismatch {
            name: name.clone(),
            expected: T::KIND,
            actual,
        })
    }

    /// Element at flat `index` widened to `f64`
    pub fn value_as_f64(&self, index: usize) -> Option<f64> {
        with_values!(&self.data, values => values.get(index).map(|v| v.to_f64()))
    }

    /// Components of tuple `tuple` widened to `f64`
    pub fn tuple_as_f64(&self, tuple: usize) -> Option<Vec<f64>> {
        let start = tuple.checked_mul(self.component_count)?;
        (start..start + self.component_count)
            .map(|i| self.value_as_f64(i))
            .collect()
    }

    /// Copy tuple `src` over tuple `dst` within this array
    pub fn copy_tuple(&mut self, src: usize, dst: usize) -> Result<()> {
        let tuples = self.tuple_count;
        if src >= tuples || dst >= tuples {
            return Err(Error::ShapeMismatch {
                name: self.name.clone(),
                expected: tuples,
                actual: src.max(dst),
            });
        }
        if !self.allocated || src == dst {
            return Ok(());
        }
        let c = self.component_count;
        with_values!(&mut self.data, values => values.copy_within(src * c..(src + 1) * c, dst * c));
        Ok(())
    }

    fn type_mismatch(&self, expected: ScalarKind) -> Error {
        Error::TypeMismatch {
            name: self.name.clone(),
            expected,
            actual: self.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn any_kind() -> impl Strategy<Value = ScalarKind> {
        (0usize..ScalarKind::ALL.len()).prop_map(|i| ScalarKind::ALL[i])
    }

    proptest! {
        #[test]
        fn create_sizes_buffer_exactly(
            kind in any_kind(),
            tuples in 0usize..64,
            components in 1usize..5,
        ) {
            let array = DataArray::create(kind, tuples, components, "a").unwrap();
            prop_assert_eq!(array.as_bytes().len(), tuples * components * kind.size_bytes());
            prop_assert_eq!(array.byte_len(), array.as_bytes().len());
            prop_assert!(array.as_bytes().iter().all(|b| *b == 0));
        }

        #[test]
        fn resize_preserves_prefix_and_zero_fills(
            kind in any_kind(),
            tuples in 0usize..32,
            new_tuples in 0usize..32,
            components in 1usize..4,
        ) {
            let mut array = DataArray::create(kind, tuples, components, "a").unwrap();
            for (i, byte) in array.as_bytes_mut().iter_mut().enumerate() {
                *byte = (i % 251) as u8 + 1;
            }
            let before = array.as_bytes().to_vec();

            array.resize(new_tuples).unwrap();

            let tuple_bytes = components * kind.size_bytes();
            let kept = tuples.min(new_tuples) * tuple_bytes;
            prop_assert_eq!(array.tuple_count(), new_tuples);
            prop_assert_eq!(array.as_bytes().len(), new_tuples * tuple_bytes);
            prop_assert_eq!(&array.as_bytes()[..kept], &before[..kept]);
            prop_assert!(array.as_bytes()[kept..].iter().all(|b| *b == 0));
        }

        #[test]
        fn double_swap_is_identity(kind in any_kind(), seed in any::<u64>()) {
            let mut array = DataArray::create(kind, 7, 3, "a").unwrap();
            for (i, byte) in array.as_bytes_mut().iter_mut().enumerate() {
                *byte = (seed.rotate_left(i as u32) & 0xff) as u8;
            }
            let original = array.as_bytes().to_vec();

            array.byte_swap_elements();
            array.byte_swap_elements();

            prop_assert_eq!(array.as_bytes(), original.as_slice());
        }
    }

    #[test_case(ScalarKind::UInt16)]
    #[test_case(ScalarKind::Int32)]
    #[test_case(ScalarKind::Float64)]
    fn test_swap_reverses_each_element(kind: ScalarKind) {
        let mut array = DataArray::create(kind, 2, 1, "a").unwrap();
        let size = kind.size_bytes();
        for (i, byte) in array.as_bytes_mut().iter_mut().enumerate() {
            *byte = i as u8;
        }

        array.byte_swap_elements();

        let first: Vec<u8> = (0..size as u8).rev().collect();
        assert_eq!(&array.as_bytes()[..size], first.as_slice());
    }

    #[test]
    fn test_swap_u16_value() {
        let mut array = DataArray::from_vec("a", 1, vec![0x1234u16, 0xABCD]).unwrap();
        array.byte_swap_elements();
        assert_eq!(array.as_slice::<u16>().unwrap(), &[0x3412, 0xCDAB]);
    }

    #[test]
    fn test_zero_components_rejected() {
        let err = DataArray::create(ScalarKind::Int32, 4, 0, "a").unwrap_err();
        assert!(matches!(err, Error::Parameter(_)));
    }

    #[test]
    fn test_overflowing_size_is_allocation_error() {
        let err = DataArray::create(ScalarKind::Float64, usize::MAX / 2, 3, "a").unwrap_err();
        assert!(matches!(err, Error::AllocationFailed { .. }));
    }

    #[test]
    fn test_typed_access_checks_kind() {
        let array = DataArray::create(ScalarKind::Float32, 2, 3, "centroids").unwrap();
        assert_eq!(array.as_slice::<f32>().unwrap().len(), 6);
        let err = array.as_slice::<i32>().unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch { expected: ScalarKind::Int32, actual: ScalarKind::Float32, .. }
        ));
    }

    #[test]
    fn test_placeholder_then_allocate() {
        let mut array = DataArray::placeholder(ScalarKind::UInt8, 1000, 2, "p").unwrap();
        assert!(!array.is_allocated());
        assert!(array.as_bytes().is_empty());
        assert_eq!(array.byte_len(), 2000);
        assert!(array.tuple_bytes_mut(0).is_err());

        array.resize(10).unwrap();
        array.allocate().unwrap();

        assert!(array.is_allocated());
        assert_eq!(array.as_bytes().len(), 20);
    }

    #[test]
    fn test_tuple_bytes_offset() {
        let mut array = DataArray::create(ScalarKind::Int16, 4, 2, "a").unwrap();
        assert_eq!(array.tuple_bytes_mut(1).unwrap().len(), 12);
        assert_eq!(array.tuple_bytes_mut(4).unwrap().len(), 0);
        assert!(array.tuple_bytes_mut(5).is_err());
    }

    #[test]
    fn test_copy_tuple() {
        let mut array = DataArray::from_vec("a", 2, vec![1i32, 2, 3, 4, 5, 6]).unwrap();
        array.copy_tuple(2, 0).unwrap();
        assert_eq!(array.as_slice::<i32>().unwrap(), &[5, 6, 3, 4, 5, 6]);
        assert!(array.copy_tuple(3, 0).is_err());
    }

    #[test]
    fn test_value_as_f64() {
        let array = DataArray::from_vec("a", 3, vec![1.5f32, -2.0, 4.0]).unwrap();
        assert_eq!(array.value_as_f64(1), Some(-2.0));
        assert_eq!(array.tuple_as_f64(0), Some(vec![1.5, -2.0, 4.0]));
        assert_eq!(array.value_as_f64(3), None);
    }
}
