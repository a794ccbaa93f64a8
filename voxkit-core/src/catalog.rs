//! Registry of filter constructors keyed by class name

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::filter::Filter;

/// Display information for a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterMetadata {
    /// Library that ships the filter
    pub compiled_library_name: &'static str,

    /// Top-level menu group
    pub group_name: &'static str,

    /// Sub-group within the menu group
    pub sub_group_name: &'static str,

    /// Label shown to users
    pub human_label: &'static str,
}

type Constructor = Box<dyn Fn() -> Box<dyn Filter> + Send + Sync>;

/// Maps class names to filter constructors
///
/// An explicit object, built once by the caller and passed to whatever needs
/// to instantiate filters by name.
#[derive(Default)]
pub struct FilterCatalog {
    constructors: BTreeMap<String, Constructor>,
}

impl FilterCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `class_name`
    pub fn register<F>(&mut self, class_name: &str, constructor: F) -> Result<()>
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(class_name) {
            return Err(Error::DuplicateName {
                scope: "filter catalog".to_string(),
                name: class_name.to_string(),
            });
        }
        tracing::debug!(class_name, "registering filter");
        self.constructors
            .insert(class_name.to_string(), Box::new(constructor));
        Ok(())
    }

    /// Register a filter type by its default value
    pub fn register_default<F>(&mut self) -> Result<()>
    where
        F: Filter + Default + 'static,
    {
        let class_name = F::default().class_name();
        self.register(class_name, || -> Box<dyn Filter> { Box::new(F::default()) })
    }

    /// Instantiate the filter registered under `class_name`
    pub fn create(&self, class_name: &str) -> Result<Box<dyn Filter>> {
        self.constructors
            .get(class_name)
            .map(|constructor| constructor())
            .ok_or_else(|| Error::not_found("filter", class_name))
    }

    /// Registered class names in sorted order
    pub fn class_names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Metadata of the filter registered under `class_name`
    pub fn metadata(&self, class_name: &str) -> Result<FilterMetadata> {
        Ok(self.create(class_name)?.metadata())
    }

    /// Number of registered filters
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for FilterCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCatalog")
            .field("class_names", &self.class_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterContext;
    use crate::params::{ParametersReader, ParametersWriter};
    use crate::registry::DataContainerRegistry;

    #[derive(Default)]
    struct Noop;

    impl Filter for Noop {
        fn class_name(&self) -> &'static str {
            "Noop"
        }

        fn metadata(&self) -> FilterMetadata {
            FilterMetadata {
                compiled_library_name: "Test",
                group_name: "Test",
                sub_group_name: "Misc",
                human_label: "No Op",
            }
        }

        fn data_check(&mut self, _: &mut DataContainerRegistry, _: &mut FilterContext) {}

        fn execute(&mut self, _: &mut DataContainerRegistry, _: &mut FilterContext) {}

        fn read_parameters(&mut self, _: &mut dyn ParametersReader, _: usize) -> Result<()> {
            Ok(())
        }

        fn write_parameters(&self, _: &mut dyn ParametersWriter, index: usize) -> Result<usize> {
            Ok(index + 1)
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut catalog = FilterCatalog::new();
        catalog.register_default::<Noop>().unwrap();

        assert_eq!(catalog.class_names(), vec!["Noop".to_string()]);
        assert_eq!(catalog.create("Noop").unwrap().class_name(), "Noop");
        assert_eq!(catalog.metadata("Noop").unwrap().human_label, "No Op");
    }

    #[test]
    fn test_unknown_filter() {
        let catalog = FilterCatalog::new();
        assert!(matches!(
            catalog.create("Missing"),
            Err(Error::NotFound { kind: "filter", .. })
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut catalog = FilterCatalog::new();
        catalog.register_default::<Noop>().unwrap();
        assert!(matches!(
            catalog.register_default::<Noop>(),
            Err(Error::DuplicateName { .. })
        ));
        assert_eq!(catalog.len(), 1);
    }
}
