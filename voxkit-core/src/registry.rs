//! The run-scoped registry of data containers, and paths into it

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::array::DataArray;
use crate::container::DataContainer;
use crate::error::{Error, Result};
use crate::group::AttributeGroup;

/// Address of an array (or, with an empty array name, a group)
///
/// Persisted as `container|group|array`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DataArrayPath {
    /// Data container name
    pub container: String,

    /// Attribute group name
    pub group: String,

    /// Array name, empty when the path names a group
    pub array: String,
}

impl DataArrayPath {
    /// Create a path to an array
    pub fn new(container: &str, group: &str, array: &str) -> Self {
        Self {
            container: container.to_string(),
            group: group.to_string(),
            array: array.to_string(),
        }
    }

    /// Create a path to a group
    pub fn group(container: &str, group: &str) -> Self {
        Self::new(container, group, "")
    }

    /// Check if every component is empty
    pub fn is_empty(&self) -> bool {
        self.container.is_empty() && self.group.is_empty() && self.array.is_empty()
    }
}

impl fmt::Display for DataArrayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.container, self.group, self.array)
    }
}

impl FromStr for DataArrayPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let parts: Vec<&str> = s.split('|').collect();
        match parts.as_slice() {
            [container, group] => Ok(Self::group(container, group)),
            [container, group, array] => Ok(Self::new(container, group, array)),
            _ => Err(Error::parameter(format!("malformed data array path '{s}'"))),
        }
    }
}

/// Every data container of one pipeline run
///
/// The only state filters share; exactly one filter mutates it at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataContainerRegistry {
    /// Containers by name
    containers: HashMap<String, DataContainer>,
}

impl DataContainerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of containers
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Check if the registry holds no containers
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Container names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a container exists
    pub fn contains(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    /// Get a container or [`Error::MissingContainer`]
    pub fn get_or_fail(&self, name: &str) -> Result<&DataContainer> {
        self.containers
            .get(name)
            .ok_or_else(|| Error::MissingContainer(name.to_string()))
    }

    /// Mutable twin of [`DataContainerRegistry::get_or_fail`]
    pub fn get_or_fail_mut(&mut self, name: &str) -> Result<&mut DataContainer> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| Error::MissingContainer(name.to_string()))
    }

    /// Create an empty container, or [`Error::NameCollision`] if the name is taken
    pub fn create_or_fail(&mut self, name: &str) -> Result<&mut DataContainer> {
        self.insert(DataContainer::new(name))
    }

    /// Return the named container, creating it only when absent
    pub fn create_or_reuse(&mut self, name: &str) -> Result<&mut DataContainer> {
        if name.is_empty() {
            return Err(Error::parameter("data container name must not be empty"));
        }
        Ok(self
            .containers
            .entry(name.to_string())
            .or_insert_with(|| DataContainer::new(name)))
    }

    /// Add a container, or [`Error::NameCollision`] if the name is taken
    pub fn insert(&mut self, container: DataContainer) -> Result<&mut DataContainer> {
        if container.name().is_empty() {
            return Err(Error::parameter("data container name must not be empty"));
        }
        if self.containers.contains_key(container.name()) {
            return Err(Error::NameCollision {
                kind: "data container",
                name: container.name().to_string(),
            });
        }
        tracing::debug!(container = container.name(), "adding data container");
        Ok(self
            .containers
            .entry(container.name().to_string())
            .or_insert(container))
    }

    /// Remove a container and hand it back
    pub fn remove(&mut self, name: &str) -> Result<DataContainer> {
        self.containers
            .remove(name)
            .ok_or_else(|| Error::MissingContainer(name.to_string()))
    }

    /// Deep copy of `name` stored under `new_name`
    pub fn duplicate(&mut self, name: &str, new_name: &str) -> Result<&mut DataContainer> {
        let mut copy = self.get_or_fail(name)?.clone();
        copy.set_name(new_name);
        self.insert(copy)
    }

    /// Resolve the group a path points at
    pub fn resolve_group(&self, path: &DataArrayPath) -> Result<&AttributeGroup> {
        self.get_or_fail(&path.container)?.get_group(&path.group)
    }

    /// Resolve the array a path points at
    pub fn resolve_array(&self, path: &DataArrayPath) -> Result<&DataArray> {
        self.resolve_group(path)?.get_array(&path.array)
    }

    /// Copy of the whole registry whose arrays are all placeholders
    pub fn structure_clone(&self) -> Self {
        Self {
            containers: self
                .containers
                .iter()
                .map(|(name, dc)| (name.clone(), dc.structure_clone()))
                .collect(),
        }
    }
}
