//! Attribute groups: named arrays sharing one tuple shape

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::array::DataArray;
use crate::error::{Error, Result};
use crate::scalar::{Scalar, ScalarKind};

/// What one tuple of a group stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupType {
    /// One tuple per vertex
    Vertex,
    /// One tuple per edge
    Edge,
    /// One tuple per face
    Face,
    /// One tuple per grid voxel
    Cell,
    /// One tuple per vertex feature
    VertexFeature,
    /// One tuple per edge feature
    EdgeFeature,
    /// One tuple per face feature
    FaceFeature,
    /// One tuple per segmented cell feature, index 0 reserved
    CellFeature,
    /// One tuple per vertex ensemble
    VertexEnsemble,
    /// One tuple per edge ensemble
    EdgeEnsemble,
    /// One tuple per face ensemble
    FaceEnsemble,
    /// One tuple per material phase, index 0 reserved
    CellEnsemble,
    /// No particular meaning
    Generic,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A named map of arrays that all have the same tuple count
///
/// The tuple count is the product of the group's tuple dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeGroup {
    /// Name of the group, unique within its container
    name: String,

    /// Meaning of a tuple
    group_type: GroupType,

    /// Ordered shape; the tuple count is its product
    tuple_dims: Vec<usize>,

    /// Arrays by name
    arrays: HashMap<String, DataArray>,
}

impl AttributeGroup {
    /// Create an empty group
    pub fn new(name: &str, tuple_dims: Vec<usize>, group_type: GroupType) -> Self {
        Self {
            name: name.to_string(),
            group_type,
            tuple_dims,
            arrays: HashMap::new(),
        }
    }

    /// Get the name of this group
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the tuple meaning
    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    /// Ordered tuple shape used to validate new arrays
    pub fn tuple_dimensions(&self) -> &[usize] {
        &self.tuple_dims
    }

    /// Tuple count every array must have
    pub fn num_tuples(&self) -> usize {
        self.tuple_dims.iter().product()
    }

    /// Number of arrays
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Check if the group has no arrays
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Array names in sorted order
    pub fn array_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.arrays.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an array exists
    pub fn contains_array(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    /// Iterate over the arrays in arbitrary order
    pub fn arrays(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.values()
    }

    /// Iterate mutably over the arrays in arbitrary order
    pub fn arrays_mut(&mut self) -> impl Iterator<Item = &mut DataArray> {
        self.arrays.values_mut()
    }

    /// Create a zero-filled array sized to this group
    pub fn create_array(
        &mut self,
        kind: ScalarKind,
        name: &str,
        component_count: usize,
    ) -> Result<&mut DataArray> {
        self.check_free(name)?;
        let array = DataArray::create(kind, self.num_tuples(), component_count, name)?;
        Ok(self.store(array))
    }

    /// Create a shape-only array sized to this group
    pub fn create_placeholder_array(
        &mut self,
        kind: ScalarKind,
        name: &str,
        component_count: usize,
    ) -> Result<&mut DataArray> {
        self.check_free(name)?;
        let array = DataArray::placeholder(kind, self.num_tuples(), component_count, name)?;
        Ok(self.store(array))
    }

    /// Add an array, rejecting duplicate names and foreign shapes
    pub fn add_array(&mut self, array: DataArray) -> Result<&mut DataArray> {
        self.check_free(array.name())?;
        self.check_shape(&array)?;
        Ok(self.store(array))
    }

    /// Add an array, replacing any array of the same name
    pub fn insert_array(&mut self, array: DataArray) -> Result<Option<DataArray>> {
        self.check_shape(&array)?;
        tracing::debug!(group = %self.name, array = array.name(), "inserting array");
        Ok(self.arrays.insert(array.name().to_string(), array))
    }

    /// Get an array by name
    pub fn get_array(&self, name: &str) -> Result<&DataArray> {
        self.arrays
            .get(name)
            .ok_or_else(|| Error::not_found("array", name))
    }

    /// Get a mutable array by name
    pub fn get_array_mut(&mut self, name: &str) -> Result<&mut DataArray> {
        self.arrays
            .get_mut(name)
            .ok_or_else(|| Error::not_found("array", name))
    }

    /// Get an array and check its element kind and component count
    pub fn get_typed_array<T: Scalar>(
        &self,
        name: &str,
        component_count: usize,
    ) -> Result<&DataArray> {
        let array = self.get_array(name)?;
        check_typed::<T>(array, component_count)?;
        Ok(array)
    }

    /// Mutable twin of [`AttributeGroup::get_typed_array`]
    pub fn get_typed_array_mut<T: Scalar>(
        &mut self,
        name: &str,
        component_count: usize,
    ) -> Result<&mut DataArray> {
        let array = self.get_array_mut(name)?;
        check_typed::<T>(array, component_count)?;
        Ok(array)
    }

    /// Remove an array and hand it back
    pub fn remove_array(&mut self, name: &str) -> Result<DataArray> {
        self.arrays
            .remove(name)
            .ok_or_else(|| Error::not_found("array", name))
    }

    /// Change the tuple shape, resizing every array
    pub fn resize_tuples(&mut self, tuple_dims: Vec<usize>) -> Result<()> {
        let tuples: usize = tuple_dims.iter().product();
        for array in self.arrays.values_mut() {
            array.resize(tuples)?;
        }
        tracing::debug!(group = %self.name, ?tuple_dims, "resized group");
        self.tuple_dims = tuple_dims;
        Ok(())
    }

    /// Copy of this group whose arrays are all placeholders
    pub fn structure_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            group_type: self.group_type,
            tuple_dims: self.tuple_dims.clone(),
            arrays: self
                .arrays
                .iter()
                .map(|(name, array)| (name.clone(), array.structure_clone()))
                .collect(),
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn check_free(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::parameter("array name must not be empty"));
        }
        if self.arrays.contains_key(name) {
            return Err(Error::DuplicateName {
                scope: self.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn check_shape(&self, array: &DataArray) -> Result<()> {
        if array.tuple_count() != self.num_tuples() {
            return Err(Error::ShapeMismatch {
                name: array.name().to_string(),
                expected: self.num_tuples(),
                actual: array.tuple_count(),
            });
        }
        Ok(())
    }

    fn store(&mut self, array: DataArray) -> &mut DataArray {
        tracing::debug!(
            group = %self.name,
            array = array.name(),
            kind = %array.kind(),
            "adding array"
        );
        self.arrays
            .entry(array.name().to_string())
            .or_insert(array)
    }
}

fn check_typed<T: Scalar>(array: &DataArray, component_count: usize) -> Result<()> {
    if array.kind() != T::KIND {
        return Err(Error::TypeMismatch {
            name: array.name().to_string(),
            expected: T::KIND,
            actual: array.kind(),
        });
    }
    if array.component_count() != component_count {
        return Err(Error::ShapeMismatch {
            name: array.name().to_string(),
            expected: component_count,
            actual: array.component_count(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_group() -> AttributeGroup {
        AttributeGroup::new("CellFeatureData", vec![5], GroupType::CellFeature)
    }

    #[test]
    fn test_create_array_uses_group_tuples() {
        let mut group = AttributeGroup::new("CellData", vec![2, 3, 4], GroupType::Cell);
        let array = group.create_array(ScalarKind::Int32, "FeatureIds", 1).unwrap();
        assert_eq!(array.tuple_count(), 24);
        assert_eq!(group.num_tuples(), 24);
    }

    #[test]
    fn test_duplicate_name_leaves_group_unchanged() {
        let mut group = feature_group();
        group
            .create_array(ScalarKind::Float32, "Centroids", 3)
            .unwrap()
            .as_mut_slice::<f32>()
            .unwrap()[0] = 7.0;
        let before = group.clone();

        let err = group.create_array(ScalarKind::Int8, "Centroids", 1).unwrap_err();

        assert!(matches!(err, Error::DuplicateName { .. }));
        assert_eq!(group, before);
        assert_eq!(group.get_array("Centroids").unwrap().kind(), ScalarKind::Float32);
    }

    #[test]
    fn test_add_array_checks_shape() {
        let mut group = feature_group();
        let array = DataArray::create(ScalarKind::UInt8, 4, 1, "Active").unwrap();
        let err = group.add_array(array).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 5, actual: 4, .. }));
        assert!(group.is_empty());
    }

    #[test]
    fn test_insert_array_replaces_placeholder() {
        let mut group = feature_group();
        group
            .create_placeholder_array(ScalarKind::Float32, "Centroids", 3)
            .unwrap();
        let real = DataArray::create(ScalarKind::Float32, 5, 3, "Centroids").unwrap();

        let previous = group.insert_array(real).unwrap();

        assert!(!previous.unwrap().is_allocated());
        assert!(group.get_array("Centroids").unwrap().is_allocated());
    }

    #[test]
    fn test_get_missing_array() {
        let group = feature_group();
        assert!(matches!(
            group.get_array("Nope"),
            Err(Error::NotFound { kind: "array", .. })
        ));
    }

    #[test]
    fn test_typed_lookup() {
        let mut group = feature_group();
        group.create_array(ScalarKind::Int32, "Phases", 1).unwrap();
        assert!(group.get_typed_array::<i32>("Phases", 1).is_ok());
        assert!(matches!(
            group.get_typed_array::<f32>("Phases", 1),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            group.get_typed_array::<i32>("Phases", 3),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_resize_cascades() {
        let mut group = feature_group();
        group.create_array(ScalarKind::Int32, "A", 1).unwrap();
        group.create_array(ScalarKind::Float64, "B", 3).unwrap();

        group.resize_tuples(vec![9]).unwrap();

        assert_eq!(group.num_tuples(), 9);
        assert!(group.arrays().all(|a| a.tuple_count() == 9));
        assert_eq!(group.get_array("B").unwrap().as_bytes().len(), 9 * 3 * 8);
    }

    #[test]
    fn test_structure_clone_drops_storage() {
        let mut group = feature_group();
        group.create_array(ScalarKind::Int32, "A", 2).unwrap();
        let skeleton = group.structure_clone();
        let array = skeleton.get_array("A").unwrap();
        assert!(!array.is_allocated());
        assert_eq!(array.tuple_count(), 5);
        assert_eq!(array.component_count(), 2);
    }
}
