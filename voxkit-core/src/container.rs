//! Data containers: a geometry plus named attribute groups

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::geometry::ImageGeometry;
use crate::group::{AttributeGroup, GroupType};

/// A geometry descriptor and the attribute groups defined on it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataContainer {
    /// Name of the container, unique within its registry
    name: String,

    /// Voxel grid, if one has been set
    geometry: Option<ImageGeometry>,

    /// Groups by name
    groups: HashMap<String, AttributeGroup>,
}

impl DataContainer {
    /// Create an empty container without geometry
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            geometry: None,
            groups: HashMap::new(),
        }
    }

    /// Get the name of this container
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// The geometry, if any
    pub fn geometry(&self) -> Option<&ImageGeometry> {
        self.geometry.as_ref()
    }

    /// The image geometry, or [`Error::GeometryMismatch`] when none is set
    pub fn image_geometry(&self) -> Result<&ImageGeometry> {
        self.geometry.as_ref().ok_or_else(|| {
            Error::GeometryMismatch(format!(
                "data container '{}' has no image geometry",
                self.name
            ))
        })
    }

    /// Set the geometry
    ///
    /// Rejected when an existing Cell group does not match the new voxel
    /// count; callers that change the grid resize the groups first.
    pub fn set_geometry(&mut self, geometry: ImageGeometry) -> Result<()> {
        for group in self.groups.values() {
            if group.group_type() == GroupType::Cell
                && group.num_tuples() != geometry.num_voxels()
            {
                return Err(Error::ShapeMismatch {
                    name: group.name().to_string(),
                    expected: geometry.num_voxels(),
                    actual: group.num_tuples(),
                });
            }
        }
        tracing::debug!(container = %self.name, dims = ?geometry.dimensions, "set geometry");
        self.geometry = Some(geometry);
        Ok(())
    }

    /// Group names in sorted order
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Iterate over the groups in arbitrary order
    pub fn groups(&self) -> impl Iterator<Item = &AttributeGroup> {
        self.groups.values()
    }

    /// Iterate mutably over the groups in arbitrary order
    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut AttributeGroup> {
        self.groups.values_mut()
    }

    /// Check if a group exists
    pub fn contains_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Create an empty group
    pub fn create_group(
        &mut self,
        name: &str,
        tuple_dims: Vec<usize>,
        group_type: GroupType,
    ) -> Result<&mut AttributeGroup> {
        self.add_group(AttributeGroup::new(name, tuple_dims, group_type))
    }

    /// Add an existing group
    pub fn add_group(&mut self, group: AttributeGroup) -> Result<&mut AttributeGroup> {
        if group.name().is_empty() {
            return Err(Error::parameter("attribute group name must not be empty"));
        }
        if self.groups.contains_key(group.name()) {
            return Err(Error::NameCollision {
                kind: "attribute group",
                name: group.name().to_string(),
            });
        }
        self.check_cell_shape(&group)?;

        tracing::debug!(
            container = %self.name,
            group = group.name(),
            group_type = %group.group_type(),
            tuples = group.num_tuples(),
            "adding attribute group"
        );
        Ok(self
            .groups
            .entry(group.name().to_string())
            .or_insert(group))
    }

    /// Get a group by name
    pub fn get_group(&self, name: &str) -> Result<&AttributeGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| Error::not_found("attribute group", name))
    }

    /// Get a mutable group by name
    pub fn get_group_mut(&mut self, name: &str) -> Result<&mut AttributeGroup> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| Error::not_found("attribute group", name))
    }

    /// Get a group and check that it holds `expected_tuples` tuples
    pub fn get_group_or_fail(&self, name: &str, expected_tuples: usize) -> Result<&AttributeGroup> {
        let group = self.get_group(name)?;
        check_tuples(group, expected_tuples)?;
        Ok(group)
    }

    /// Mutable twin of [`DataContainer::get_group_or_fail`]
    pub fn get_group_or_fail_mut(
        &mut self,
        name: &str,
        expected_tuples: usize,
    ) -> Result<&mut AttributeGroup> {
        let group = self.get_group_mut(name)?;
        check_tuples(group, expected_tuples)?;
        Ok(group)
    }

    /// Remove a group and hand it back
    pub fn remove_group(&mut self, name: &str) -> Result<AttributeGroup> {
        self.groups
            .remove(name)
            .ok_or_else(|| Error::not_found("attribute group", name))
    }

    /// Rename a group
    pub fn rename_group(&mut self, from: &str, to: &str) -> Result<()> {
        if self.groups.contains_key(to) {
            return Err(Error::NameCollision {
                kind: "attribute group",
                name: to.to_string(),
            });
        }
        let mut group = self.remove_group(from)?;
        group.set_name(to);
        self.groups.insert(to.to_string(), group);
        Ok(())
    }

    /// Copy of this container whose arrays are all placeholders
    pub fn structure_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            geometry: self.geometry,
            groups: self
                .groups
                .iter()
                .map(|(name, group)| (name.clone(), group.structure_clone()))
                .collect(),
        }
    }

    fn check_cell_shape(&self, group: &AttributeGroup) -> Result<()> {
        if let (GroupType::Cell, Some(geometry)) = (group.group_type(), &self.geometry) {
            if group.num_tuples() != geometry.num_voxels() {
                return Err(Error::ShapeMismatch {
                    name: group.name().to_string(),
                    expected: geometry.num_voxels(),
                    actual: group.num_tuples(),
                });
            }
        }
        Ok(())
    }
}

fn check_tuples(group: &AttributeGroup, expected: usize) -> Result<()> {
    if group.num_tuples() != expected {
        return Err(Error::ShapeMismatch {
            name: group.name().to_string(),
            expected,
            actual: group.num_tuples(),
        });
    }
    Ok(())
}
