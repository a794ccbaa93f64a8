//! Crop a voxel grid to an inclusive sub-box

use serde::{Deserialize, Serialize};
use voxkit_core::{
    DataContainer, DataContainerRegistry, Filter, FilterContext, FilterMetadata, GroupType,
    ImageGeometry, ParametersReader, ParametersWriter,
};

use crate::common::{
    DEFAULT_CELL_FEATURE_GROUP_NAME, DEFAULT_CELL_GROUP_NAME, DEFAULT_DATA_CONTAINER_NAME,
    DEFAULT_FEATURE_IDS_ARRAY_NAME,
};

/// Feature ids missing when renumbering
pub const ERR_FEATURE_IDS: i32 = -300;
/// Feature group missing when renumbering
pub const ERR_FEATURE_GROUP: i32 = -301;
/// A feature id outside the feature group
pub const ERR_FEATURE_ID_RANGE: i32 = -303;
/// No image geometry
pub const ERR_GEOMETRY: i32 = -390;
/// Data container missing
pub const ERR_MISSING_CONTAINER: i32 = -999;
/// A minimum bound exceeds its maximum
pub const ERR_BOUNDS_INVERTED: i32 = -5550;
/// A bound lies outside the grid
pub const ERR_BOUNDS_OUTSIDE: i32 = -5551;
/// The new container name is taken
pub const ERR_NEW_CONTAINER_EXISTS: i32 = -5552;
/// Cropping a group failed
pub const ERR_RESIZE: i32 = -5553;

/// Parameters of [`CropVolume`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropVolumeParameters {
    /// Container to crop
    pub data_container_name: String,

    /// Container created when saving as new
    pub new_data_container_name: String,

    /// Per-voxel group holding the feature ids
    pub cell_attribute_matrix_name: String,

    /// Per-feature group compacted when renumbering
    pub cell_feature_attribute_matrix_name: String,

    /// Per-voxel Int32 feature ids
    pub feature_ids_array_name: String,

    /// Inclusive lower x bound
    pub x_min: i64,
    /// Inclusive lower y bound
    pub y_min: i64,
    /// Inclusive lower z bound
    pub z_min: i64,
    /// Inclusive upper x bound
    pub x_max: i64,
    /// Inclusive upper y bound
    pub y_max: i64,
    /// Inclusive upper z bound
    pub z_max: i64,

    /// Compact surviving feature ids to `1..m`
    pub renumber_features: bool,

    /// Leave the source untouched and crop a copy
    pub save_as_new_data_container: bool,

    /// Move the origin to the first kept voxel
    pub update_origin: bool,
}

impl Default for CropVolumeParameters {
    fn default() -> Self {
        Self {
            data_container_name: DEFAULT_DATA_CONTAINER_NAME.to_string(),
            new_data_container_name: "CroppedDataContainer".to_string(),
            cell_attribute_matrix_name: DEFAULT_CELL_GROUP_NAME.to_string(),
            cell_feature_attribute_matrix_name: DEFAULT_CELL_FEATURE_GROUP_NAME.to_string(),
            feature_ids_array_name: DEFAULT_FEATURE_IDS_ARRAY_NAME.to_string(),
            x_min: 0,
            y_min: 0,
            z_min: 0,
            x_max: 0,
            y_max: 0,
            z_max: 0,
            renumber_features: false,
            save_as_new_data_container: false,
            update_origin: true,
        }
    }
}

/// Validated crop box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CropBox {
    min: [usize; 3],
    max: [usize; 3],
}

impl CropBox {
    fn dimensions(&self) -> [usize; 3] {
        [
            self.max[0] - self.min[0] + 1,
            self.max[1] - self.min[1] + 1,
            self.max[2] - self.min[2] + 1,
        ]
    }
}

/// Crops every Cell group of a container to a sub-box of its grid
#[derive(Debug, Clone, Default)]
pub struct CropVolume {
    params: CropVolumeParameters,
}

impl CropVolume {
    /// Create the filter with the given parameters
    pub fn new(params: CropVolumeParameters) -> Self {
        Self { params }
    }

    /// Parameters
    pub fn parameters(&self) -> &CropVolumeParameters {
        &self.params
    }

    /// Mutable parameters
    pub fn parameters_mut(&mut self) -> &mut CropVolumeParameters {
        &mut self.params
    }

    /// Validate, then prepare the target container; returns its name and the box
    fn check(
        &self,
        registry: &mut DataContainerRegistry,
        ctx: &mut FilterContext,
    ) -> Option<(String, CropBox)> {
        let p = &self.params;
        let dc = ctx.check(registry.get_or_fail(&p.data_container_name), ERR_MISSING_CONTAINER)?;
        let geometry = *ctx.check(dc.image_geometry(), ERR_GEOMETRY)?;

        if p.renumber_features {
            let cells = ctx.check(dc.get_group(&p.cell_attribute_matrix_name), ERR_FEATURE_IDS)?;
            ctx.check(
                cells.get_typed_array::<i32>(&p.feature_ids_array_name, 1),
                ERR_FEATURE_IDS,
            )?;
            ctx.check(
                dc.get_group(&p.cell_feature_attribute_matrix_name),
                ERR_FEATURE_GROUP,
            )?;
        }

        let min = [p.x_min, p.y_min, p.z_min];
        let max = [p.x_max, p.y_max, p.z_max];
        if min.iter().zip(&max).any(|(lo, hi)| lo > hi) {
            ctx.error(
                ERR_BOUNDS_INVERTED,
                format!("Minimum bounds {min:?} exceed maximum bounds {max:?}"),
            );
            return None;
        }

        let to_index = |v: i64, axis: usize| {
            usize::try_from(v)
                .ok()
                .filter(|&i| i < geometry.dimensions[axis])
        };
        let (Some(x0), Some(y0), Some(z0), Some(x1), Some(y1), Some(z1)) = (
            to_index(min[0], 0),
            to_index(min[1], 1),
            to_index(min[2], 2),
            to_index(max[0], 0),
            to_index(max[1], 1),
            to_index(max[2], 2),
        ) else {
            ctx.error(
                ERR_BOUNDS_OUTSIDE,
                format!(
                    "Bounds {min:?}..={max:?} fall outside the grid {:?}",
                    geometry.dimensions
                ),
            );
            return None;
        };

        let target = if p.save_as_new_data_container {
            if registry.contains(&p.new_data_container_name) {
                ctx.error(
                    ERR_NEW_CONTAINER_EXISTS,
                    format!(
                        "Data container '{}' already exists",
                        p.new_data_container_name
                    ),
                );
                return None;
            }
            ctx.check(
                registry.duplicate(&p.data_container_name, &p.new_data_container_name),
                ERR_NEW_CONTAINER_EXISTS,
            )?;
            p.new_data_container_name.clone()
        } else {
            p.data_container_name.clone()
        };

        Some((
            target,
            CropBox {
                min: [x0, y0, z0],
                max: [x1, y1, z1],
            },
        ))
    }

    fn renumber(&self, dc: &mut DataContainer, ctx: &mut FilterContext) {
        let p = &self.params;

        let Some(voxels) = ctx.check(dc.image_geometry(), ERR_GEOMETRY).map(|g| g.num_voxels())
        else {
            return;
        };
        let Some(feature_count) = ctx
            .check(dc.get_group(&p.cell_feature_attribute_matrix_name), ERR_FEATURE_GROUP)
            .map(|g| g.num_tuples())
        else {
            return;
        };

        let Some(ids) = ctx.check(
            dc.get_group_mut(&p.cell_attribute_matrix_name)
                .and_then(|g| g.get_typed_array_mut::<i32>(&p.feature_ids_array_name, 1))
                .and_then(|a| a.as_mut_slice::<i32>()),
            ERR_FEATURE_IDS,
        ) else {
            return;
        };
        if ids.len() != voxels {
            ctx.error(
                ERR_FEATURE_IDS,
                format!(
                    "Feature ids hold {} values but the cropped grid has {voxels} voxels",
                    ids.len()
                ),
            );
            return;
        }

        let mut present = vec![false; feature_count];
        for &id in ids.iter() {
            match usize::try_from(id).ok().filter(|&i| i < feature_count) {
                Some(i) => present[i] = true,
                None => {
                    ctx.error(
                        ERR_FEATURE_ID_RANGE,
                        format!("Feature id {id} is outside 0..{feature_count}"),
                    );
                    return;
                }
            }
        }

        // new_id[old] for every surviving old id; feature 0 always maps to 0
        let mut new_id = vec![0usize; feature_count];
        let mut next = 1;
        for old in 1..feature_count {
            if present[old] {
                new_id[old] = next;
                next += 1;
            }
        }
        if next == feature_count {
            return;
        }

        for id in ids.iter_mut() {
            let old = usize::try_from(*id).unwrap_or_default();
            *id = i32::try_from(new_id[old]).unwrap_or(i32::MAX);
        }

        let Some(features) = ctx.check(
            dc.get_group_mut(&p.cell_feature_attribute_matrix_name),
            ERR_FEATURE_GROUP,
        ) else {
            return;
        };
        for array in features.arrays_mut() {
            for old in 1..feature_count {
                if present[old]
                    && new_id[old] != old
                    && ctx.check(array.copy_tuple(old, new_id[old]), ERR_RESIZE).is_none()
                {
                    return;
                }
            }
        }
        if ctx.check(features.resize_tuples(vec![next]), ERR_RESIZE).is_some() {
            tracing::debug!(
                before = feature_count - 1,
                after = next - 1,
                "renumbered features"
            );
        }
    }
}

/// Crop every Cell group of `dc` to `crop` and shrink its grid
///
/// Tuples are moved forward in place, so the source index of every copy is
/// never behind its destination.
#[allow(clippy::cast_precision_loss)]
fn crop_container(
    dc: &mut DataContainer,
    crop: CropBox,
    update_origin: bool,
) -> voxkit_core::Result<()> {
    let geometry = *dc.image_geometry()?;
    let dims = crop.dimensions();

    for group in dc.groups_mut() {
        if group.group_type() != GroupType::Cell {
            continue;
        }
        for array in group.arrays_mut() {
            if !array.is_allocated() {
                continue;
            }
            let mut dst = 0;
            for z in crop.min[2]..=crop.max[2] {
                for y in crop.min[1]..=crop.max[1] {
                    for x in crop.min[0]..=crop.max[0] {
                        array.copy_tuple(geometry.voxel_index(x, y, z), dst)?;
                        dst += 1;
                    }
                }
            }
        }
        group.resize_tuples(dims.to_vec())?;
    }

    let mut origin = geometry.origin;
    if update_origin {
        for axis in 0..3 {
            origin[axis] += crop.min[axis] as f32 * geometry.spacing[axis];
        }
    }
    dc.set_geometry(ImageGeometry::new(dims, origin, geometry.spacing))
}

impl Filter for CropVolume {
    fn class_name(&self) -> &'static str {
        "CropVolume"
    }

    fn metadata(&self) -> FilterMetadata {
        FilterMetadata {
            compiled_library_name: "Sampling",
            group_name: "Sampling",
            sub_group_name: "Crop/Cut",
            human_label: "Crop Volume",
        }
    }

    fn data_check(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
        let Some((target, crop)) = self.check(registry, ctx) else {
            return;
        };
        // Placeholder arrays only change shape here
        if let Some(dc) = ctx.check(registry.get_or_fail_mut(&target), ERR_MISSING_CONTAINER) {
            ctx.check(crop_container(dc, crop, self.params.update_origin), ERR_RESIZE);
        }
    }

    fn execute(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
        let Some((target, crop)) = self.check(registry, ctx) else {
            return;
        };
        let Some(dc) = ctx.check(registry.get_or_fail_mut(&target), ERR_MISSING_CONTAINER) else {
            return;
        };
        if ctx
            .check(crop_container(dc, crop, self.params.update_origin), ERR_RESIZE)
            .is_none()
        {
            return;
        }
        if self.params.renumber_features {
            self.renumber(dc, ctx);
            if ctx.has_error() {
                return;
            }
        }
        ctx.status("Complete");
    }

    fn read_parameters(
        &mut self,
        reader: &mut dyn ParametersReader,
        index: usize,
    ) -> voxkit_core::Result<()> {
        reader.open_filter_group(index)?;
        let d = &self.params;
        self.params = CropVolumeParameters {
            data_container_name: reader.read_string("DataContainerName", &d.data_container_name),
            new_data_container_name: reader
                .read_string("NewDataContainerName", &d.new_data_container_name),
            cell_attribute_matrix_name: reader
                .read_string("CellAttributeMatrixName", &d.cell_attribute_matrix_name),
            cell_feature_attribute_matrix_name: reader.read_string(
                "CellFeatureAttributeMatrixName",
                &d.cell_feature_attribute_matrix_name,
            ),
            feature_ids_array_name: reader
                .read_string("FeatureIdsArrayName", &d.feature_ids_array_name),
            x_min: reader.read_i64("XMin", d.x_min),
            y_min: reader.read_i64("YMin", d.y_min),
            z_min: reader.read_i64("ZMin", d.z_min),
            x_max: reader.read_i64("XMax", d.x_max),
            y_max: reader.read_i64("YMax", d.y_max),
            z_max: reader.read_i64("ZMax", d.z_max),
            renumber_features: reader.read_bool("RenumberFeatures", d.renumber_features),
            save_as_new_data_container: reader
                .read_bool("SaveAsNewDataContainer", d.save_as_new_data_container),
            update_origin: reader.read_bool("UpdateOrigin", d.update_origin),
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
        writer.write_string("NewDataContainerName", &p.new_data_container_name)?;
        writer.write_string("CellAttributeMatrixName", &p.cell_attribute_matrix_name)?;
        writer.write_string(
            "CellFeatureAttributeMatrixName",
            &p.cell_feature_attribute_matrix_name,
        )?;
        writer.write_string("FeatureIdsArrayName", &p.feature_ids_array_name)?;
        writer.write_i64("XMin", p.x_min)?;
        writer.write_i64("YMin", p.y_min)?;
        writer.write_i64("ZMin", p.z_min)?;
        writer.write_i64("XMax", p.x_max)?;
        writer.write_i64("YMax", p.y_max)?;
        writer.write_i64("ZMax", p.z_max)?;
        writer.write_bool("RenumberFeatures", p.renumber_features)?;
        writer.write_bool("SaveAsNewDataContainer", p.save_as_new_data_container)?;
        writer.write_bool("UpdateOrigin", p.update_origin)?;
        writer.close_filter_group()?;
        Ok(index + 1)
    }
}
