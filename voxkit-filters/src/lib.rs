//! Bundled filters for voxkit pipelines
//!
//! This crate provides the reference filters: raw binary ingestion, feature
//! centroids and volume cropping, plus [`register_filters`] to install them
//! into a [`FilterCatalog`].

#![warn(missing_docs)]

mod error;

pub mod common;
pub mod crop_volume;
pub mod feature_centroids;
pub mod raw_binary_reader;

pub use common::Endian;
pub use crop_volume::{CropVolume, CropVolumeParameters};
pub use error::{Error, Result};
pub use feature_centroids::{FindFeatureCentroids, FindFeatureCentroidsParameters};
pub use raw_binary_reader::{RawBinaryReader, RawBinaryReaderParameters, DEFAULT_CHUNK_SIZE};

use voxkit_core::FilterCatalog;

/// Install every bundled filter into `catalog`
pub fn register_filters(catalog: &mut FilterCatalog) -> voxkit_core::Result<()> {
    catalog.register_default::<RawBinaryReader>()?;
    catalog.register_default::<FindFeatureCentroids>()?;
    catalog.register_default::<CropVolume>()?;
    Ok(())
}

/// A catalog holding every bundled filter
pub fn default_catalog() -> voxkit_core::Result<FilterCatalog> {
    let mut catalog = FilterCatalog::new();
    register_filters(&mut catalog)?;
    Ok(catalog)
}
