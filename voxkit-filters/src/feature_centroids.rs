//! Per-feature centroids of a segmented voxel grid

use serde::{Deserialize, Serialize};
use voxkit_core::{
    DataArray, DataContainerRegistry, Filter, FilterContext, FilterMetadata, ImageGeometry,
    ParametersReader, ParametersWriter, ScalarKind,
};

use crate::common::{
    DEFAULT_CELL_FEATURE_GROUP_NAME, DEFAULT_CELL_GROUP_NAME, DEFAULT_DATA_CONTAINER_NAME,
    DEFAULT_FEATURE_IDS_ARRAY_NAME,
};

/// Feature ids missing, of the wrong kind, or of the wrong shape
pub const ERR_FEATURE_IDS: i32 = -300;
/// Feature group missing
pub const ERR_FEATURE_GROUP: i32 = -301;
/// Existing centroids array of the wrong kind or shape
pub const ERR_CENTROIDS: i32 = -302;
/// A feature id outside the feature group
pub const ERR_FEATURE_ID_RANGE: i32 = -303;
/// No image geometry
pub const ERR_GEOMETRY: i32 = -390;
/// Data container missing
pub const ERR_MISSING_CONTAINER: i32 = -999;

/// Parameters of [`FindFeatureCentroids`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindFeatureCentroidsParameters {
    /// Container holding the grid
    pub data_container_name: String,

    /// Per-voxel group
    pub cell_attribute_matrix_name: String,

    /// Per-voxel Int32 feature ids
    pub feature_ids_array_name: String,

    /// Per-feature group receiving the centroids
    pub cell_feature_attribute_matrix_name: String,

    /// Name of the Float32 x3 output array
    pub centroids_array_name: String,
}

impl Default for FindFeatureCentroidsParameters {
    fn default() -> Self {
        Self {
            data_container_name: DEFAULT_DATA_CONTAINER_NAME.to_string(),
            cell_attribute_matrix_name: DEFAULT_CELL_GROUP_NAME.to_string(),
            feature_ids_array_name: DEFAULT_FEATURE_IDS_ARRAY_NAME.to_string(),
            cell_feature_attribute_matrix_name: DEFAULT_CELL_FEATURE_GROUP_NAME.to_string(),
            centroids_array_name: "Centroids".to_string(),
        }
    }
}

/// Computes the mean voxel coordinate of every feature
///
/// Coordinates are `index * spacing` per axis; the origin is not applied.
/// Feature 0 and features without voxels keep a zero centroid.
#[derive(Debug, Clone, Default)]
pub struct FindFeatureCentroids {
    params: FindFeatureCentroidsParameters,
}

impl FindFeatureCentroids {
    /// Create the filter with the given parameters
    pub fn new(params: FindFeatureCentroidsParameters) -> Self {
        Self { params }
    }

    /// Parameters
    pub fn parameters(&self) -> &FindFeatureCentroidsParameters {
        &self.params
    }

    /// Mutable parameters
    pub fn parameters_mut(&mut self) -> &mut FindFeatureCentroidsParameters {
        &mut self.params
    }

    /// Returns the grid and the feature tuple count
    fn check(
        &self,
        registry: &mut DataContainerRegistry,
        ctx: &mut FilterContext,
    ) -> Option<(ImageGeometry, usize)> {
        let p = &self.params;
        let dc = ctx.check(
            registry.get_or_fail_mut(&p.data_container_name),
            ERR_MISSING_CONTAINER,
        )?;
        let geometry = *ctx.check(dc.image_geometry(), ERR_GEOMETRY)?;

        let cells = ctx.check(
            dc.get_group_or_fail(&p.cell_attribute_matrix_name, geometry.num_voxels()),
            ERR_FEATURE_IDS,
        )?;
        ctx.check(
            cells.get_typed_array::<i32>(&p.feature_ids_array_name, 1),
            ERR_FEATURE_IDS,
        )?;

        let features = ctx.check(
            dc.get_group_mut(&p.cell_feature_attribute_matrix_name),
            ERR_FEATURE_GROUP,
        )?;
        if features.contains_array(&p.centroids_array_name) {
            ctx.check(
                features.get_typed_array::<f32>(&p.centroids_array_name, 3),
                ERR_CENTROIDS,
            )?;
        } else {
            ctx.check(
                features.create_placeholder_array(ScalarKind::Float32, &p.centroids_array_name, 3),
                ERR_CENTROIDS,
            )?;
        }
        Some((geometry, features.num_tuples()))
    }
}

/// Mean coordinate of every feature id, flattened as `[x, y, z]` per feature
///
/// `feature_ids` holds one id per voxel of `geometry`. Fails with the
/// offending voxel index and id when an id is outside `0..feature_count`.
///
/// # Panics
///
/// Panics if `feature_ids` is shorter than the voxel count of `geometry`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn compute_centroids(
    geometry: &ImageGeometry,
    feature_ids: &[i32],
    feature_count: usize,
) -> Result<Vec<f32>, (usize, i32)> {
    #[derive(Clone, Copy, Default)]
    struct Accumulator {
        count: u64,
        sum: [f64; 3],
    }

    let mut acc = vec![Accumulator::default(); feature_count];
    let [nx, ny, nz] = geometry.dimensions;

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let voxel = geometry.voxel_index(x, y, z);
                let id = feature_ids[voxel];
                let Some(slot) = usize::try_from(id).ok().and_then(|i| acc.get_mut(i)) else {
                    return Err((voxel, id));
                };
                slot.count += 1;
                for (sum, c) in slot.sum.iter_mut().zip(geometry.coordinate_of(x, y, z)) {
                    *sum += f64::from(c);
                }
            }
        }
    }

    let mut centroids = vec![0.0f32; feature_count * 3];
    for (feature, a) in acc.iter().enumerate().skip(1) {
        if a.count == 0 {
            continue;
        }
        for axis in 0..3 {
            centroids[feature * 3 + axis] = (a.sum[axis] / a.count as f64) as f32;
        }
    }
    Ok(centroids)
}

impl Filter for FindFeatureCentroids {
    fn class_name(&self) -> &'static str {
        "FindFeatureCentroids"
    }

    fn metadata(&self) -> FilterMetadata {
        FilterMetadata {
            compiled_library_name: "Generic",
            group_name: "Generic",
            sub_group_name: "Morphological",
            human_label: "Find Feature Centroids",
        }
    }

    fn data_check(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
        self.check(registry, ctx);
    }

    fn execute(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
        let Some((geometry, feature_count)) = self.check(registry, ctx) else {
            return;
        };
        if feature_count == 0 {
            ctx.status("Complete");
            return;
        }
        let p = &self.params;

        let Some(dc) = ctx.check(
            registry.get_or_fail_mut(&p.data_container_name),
            ERR_MISSING_CONTAINER,
        ) else {
            return;
        };
        let Some(ids) = ctx.check(
            dc.get_group(&p.cell_attribute_matrix_name)
                .and_then(|g| g.get_array(&p.feature_ids_array_name))
                .and_then(DataArray::as_slice::<i32>),
            ERR_FEATURE_IDS,
        ) else {
            return;
        };
        if ids.len() != geometry.num_voxels() {
            ctx.error(
                ERR_FEATURE_IDS,
                format!(
                    "Feature ids hold {} values but the grid has {} voxels",
                    ids.len(),
                    geometry.num_voxels()
                ),
            );
            return;
        }

        let centroids = match compute_centroids(&geometry, ids, feature_count) {
            Ok(centroids) => centroids,
            Err((voxel, id)) => {
                ctx.error(
                    ERR_FEATURE_ID_RANGE,
                    format!(
                        "Voxel {voxel} has feature id {id}, outside 0..{feature_count}"
                    ),
                );
                return;
            }
        };

        let Some(array) = ctx.check(
            DataArray::from_vec(&p.centroids_array_name, 3, centroids),
            ERR_CENTROIDS,
        ) else {
            return;
        };
        let Some(features) = ctx.check(
            dc.get_group_mut(&p.cell_feature_attribute_matrix_name),
            ERR_FEATURE_GROUP,
        ) else {
            return;
        };
        if ctx.check(features.insert_array(array), ERR_CENTROIDS).is_some() {
            ctx.status("Complete");
        }
    }

    fn read_parameters(
        &mut self,
        reader: &mut dyn ParametersReader,
        index: usize,
    ) -> voxkit_core::Result<()> {
        reader.open_filter_group(index)?;
        let d = &self.params;
        self.params = FindFeatureCentroidsParameters {
            data_container_name: reader.read_string("DataContainerName", &d.data_container_name),
            cell_attribute_matrix_name: reader
                .read_string("CellAttributeMatrixName", &d.cell_attribute_matrix_name),
            feature_ids_array_name: reader
                .read_string("FeatureIdsArrayName", &d.feature_ids_array_name),
            cell_feature_attribute_matrix_name: reader.read_string(
                "CellFeatureAttributeMatrixName",
                &d.cell_feature_attribute_matrix_name,
            ),
            centroids_array_name: reader.read_string("CentroidsArrayName", &d.centroids_array_name),
        };
        reader.close_filter_group()
    }

    fn write_parameters(
        &self,
        writer: &mut dyn ParametersWriter,
        index: usize,
    ) -> voxkit_core::Result<usize> {
        let p = &self.params;
        writer.open_filter_group(index, self.class_name())?;
        writer.write_string("DataContainerName", &p.data_container_name)?;
        writer.write_string("CellAttributeMatrixName", &p.cell_attribute_matrix_name)?;
        writer.write_string("FeatureIdsArrayName", &p.feature_ids_array_name)?;
        writer.write_string(
            "CellFeatureAttributeMatrixName",
            &p.cell_feature_attribute_matrix_name,
        )?;
        writer.write_string("CentroidsArrayName", &p.centroids_array_name)?;
        writer.close_filter_group()?;
        Ok(index + 1)
    }
}

#[cfg(test)]
mod tests {
    use voxkit_core::{GroupType, Pipeline, RunOutcome};

    use super::*;

    #[test]
    fn test_two_slabs() {
        let geometry = ImageGeometry::new([2, 2, 2], [0.0; 3], [1.0; 3]);
        let ids = [1, 2, 1, 2, 1, 2, 1, 2];
        let c = compute_centroids(&geometry, &ids, 3).unwrap();
        assert_eq!(&c[0..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&c[3..6], &[0.0, 0.5, 0.5]);
        assert_eq!(&c[6..9], &[1.0, 0.5, 0.5]);
    }

    #[test]
    fn test_split_along_y() {
        let geometry = ImageGeometry::new([2, 2, 2], [0.0; 3], [1.0; 3]);
        let ids = [1, 1, 2, 2, 1, 1, 2, 2];
        let c = compute_centroids(&geometry, &ids, 3).unwrap();
        assert_eq!(&c[0..3], &[0.0; 3]);
        assert_eq!(&c[3..6], &[0.5, 0.0, 0.5]);
        assert_eq!(&c[6..9], &[0.5, 1.0, 0.5]);
    }

    #[test]
    fn test_spacing_scales_coordinates() {
        let geometry = ImageGeometry::new([3, 1, 1], [5.0; 3], [2.0, 1.0, 1.0]);
        let c = compute_centroids(&geometry, &[1, 1, 1], 2).unwrap();
        assert_eq!(&c[3..6], &[2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_feature_stays_zero() {
        let geometry = ImageGeometry::new([2, 1, 1], [0.0; 3], [1.0; 3]);
        let c = compute_centroids(&geometry, &[1, 1], 3).unwrap();
        assert_eq!(&c[6..9], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unallocated_feature_ids_fail_execute() {
        let mut registry = DataContainerRegistry::new();
        let dc = registry.create_or_fail(DEFAULT_DATA_CONTAINER_NAME).unwrap();
        dc.set_geometry(ImageGeometry::new([2, 2, 2], [0.0; 3], [1.0; 3]))
            .unwrap();
        dc.create_group(DEFAULT_CELL_GROUP_NAME, vec![2, 2, 2], GroupType::Cell)
            .unwrap()
            .create_placeholder_array(ScalarKind::Int32, DEFAULT_FEATURE_IDS_ARRAY_NAME, 1)
            .unwrap();
        dc.create_group(DEFAULT_CELL_FEATURE_GROUP_NAME, vec![3], GroupType::CellFeature)
            .unwrap();

        let mut pipeline = Pipeline::new("centroids");
        pipeline.push(Box::new(FindFeatureCentroids::default()));
        let report = pipeline.run(&mut registry);

        assert_eq!(report.outcome, RunOutcome::ExecuteFailed { filter_index: 0 });
        assert_eq!(report.errors().next().unwrap().code, ERR_FEATURE_IDS);
    }

    #[test]
    fn test_out_of_range_id() {
        let geometry = ImageGeometry::new([2, 1, 1], [0.0; 3], [1.0; 3]);
        assert_eq!(compute_centroids(&geometry, &[1, 4], 3), Err((1, 4)));
        assert_eq!(compute_centroids(&geometry, &[-1, 0], 3), Err((0, -1)));
    }
}
