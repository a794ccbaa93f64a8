//! Core data model and filter contract for voxel analysis pipelines
//!
//! This crate provides the hierarchical data model (typed arrays grouped into
//! attribute groups, grouped into data containers held by a registry) and the
//! two-phase filter contract that every processing step implements. Filters
//! are validated against a placeholder copy of the registry before any of
//! them executes, so a misconfigured pipeline fails before it reads or
//! computes anything.

#![warn(missing_docs)]

pub mod array;
pub mod catalog;
pub mod container;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod group;
pub mod message;
pub mod params;
pub mod pipeline;
pub mod registry;
pub mod scalar;

// Re-export key types for convenience
pub use array::{ArrayData, DataArray};
pub use catalog::{FilterCatalog, FilterMetadata};
pub use container::DataContainer;
pub use error::{Error, Result};
pub use filter::{Filter, FilterContext, FilterEvent, FilterMessage, FilterState};
pub use geometry::{GeometryKind, ImageGeometry};
pub use group::{AttributeGroup, GroupType};
pub use message::{MessageObserver, Phase, PipelineMessage, Severity};
pub use params::{
    read_pipeline, write_pipeline, JsonParametersReader, JsonParametersWriter, ParametersReader,
    ParametersWriter,
};
pub use pipeline::{
    CancelHandle, FilterTiming, Pipeline, PipelineConfig, PipelineReport, RunOutcome,
};
pub use registry::{DataArrayPath, DataContainerRegistry};
pub use scalar::{Scalar, ScalarKind};
