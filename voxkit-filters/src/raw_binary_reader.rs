//! Raw binary reader
//!
//! Reads a headerless (or fixed-header) file of packed scalars into one
//! typed array of a data container. Preflight only looks at the file size;
//! execute reads the file in bounded chunks straight into the array storage
//! and swaps bytes when the file's byte order differs from the host's.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use voxkit_core::{
    DataArray, DataArrayPath, DataContainerRegistry, Filter, FilterContext, FilterMetadata,
    GroupType, ImageGeometry, ParametersReader, ParametersWriter, ScalarKind,
};

use crate::common::{
    count_to_i64, i64_to_count, Endian, DEFAULT_CELL_ENSEMBLE_GROUP_NAME,
    DEFAULT_CELL_FEATURE_GROUP_NAME, DEFAULT_CELL_GROUP_NAME, DEFAULT_DATA_CONTAINER_NAME,
};
use crate::error::{Error, Result};

/// Upper bound on the bytes requested by a single read call
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Input file is empty
pub const ERR_EMPTY_INPUT_FILE: i32 = -387;
/// Input file does not exist
pub const ERR_INPUT_FILE_MISSING: i32 = -388;
/// No image geometry, or a zero dimension
pub const ERR_GEOMETRY: i32 = -390;
/// Component count below one, or unsupported group type
pub const ERR_COMPONENTS_OR_GROUP_TYPE: i32 = -391;
/// Existing group requested without an existing container
pub const ERR_EXISTING_GROUP_NEEDS_CONTAINER: i32 = -392;
/// Scalar type index out of range
pub const ERR_SCALAR_TYPE: i32 = -393;
/// Output array name is empty
pub const ERR_EMPTY_OUTPUT_NAME: i32 = -398;
/// Referenced container is missing
pub const ERR_MISSING_CONTAINER: i32 = -999;
/// Referenced group is missing
pub const ERR_MISSING_GROUP: i32 = -10000;
/// File could not be opened
pub const ERR_FILE_NOT_OPEN: i32 = -1000;
/// File holds fewer bytes than the array needs
pub const ERR_FILE_TOO_SMALL: i32 = -1010;
/// Warning: file holds more bytes than the array needs
pub const WARN_FILE_TOO_BIG: i32 = -1020;
/// File ended before the array was filled
pub const ERR_READ_EOF: i32 = -1030;
/// Seeking past the header or reading the file failed
pub const ERR_READ_FAILED: i32 = -1031;
/// Array storage could not be reserved
pub const ERR_ALLOCATION: i32 = -1040;
/// Output container, group or array name is taken
pub const ERR_NAME_COLLISION: i32 = -1050;

/// Kind of group that receives a newly created array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetGroup {
    /// One tuple per voxel (persisted as 0)
    Cell,
    /// One tuple per feature plus feature 0 (persisted as 1)
    CellFeature,
    /// One tuple per phase plus phase 0 (persisted as 2)
    CellEnsemble,
}

impl TargetGroup {
    /// Decode a persisted index
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(TargetGroup::Cell),
            1 => Some(TargetGroup::CellFeature),
            2 => Some(TargetGroup::CellEnsemble),
            _ => None,
        }
    }
}

/// Parameters of [`RawBinaryReader`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBinaryReaderParameters {
    /// File to read
    pub input_file: PathBuf,

    /// Index into [`ScalarKind::ALL`]
    pub scalar_type: i64,

    /// Components per tuple
    pub number_of_components: i64,

    /// Byte order of the file
    pub endian: Endian,

    /// Header bytes to skip before the data
    pub skip_header_bytes: u64,

    /// Put the array into an existing container
    pub add_to_existing_data_container: bool,

    /// Container used when adding to an existing container with a new group
    pub existing_data_container_name: String,

    /// Container created otherwise
    pub new_data_container_name: String,

    /// Grid dimensions of a new container
    pub dimensions: [usize; 3],

    /// Grid origin of a new container
    pub origin: [f32; 3],

    /// Voxel spacing of a new container
    pub resolution: [f32; 3],

    /// Put the array into an existing group
    pub add_to_existing_attribute_matrix: bool,

    /// Existing group that receives the array
    pub attribute_matrix_path: DataArrayPath,

    /// Kind of group to create, see [`TargetGroup`]
    pub attribute_matrix_type: i64,

    /// Feature count of a new CellFeature group (feature 0 excluded)
    pub num_features: usize,

    /// Phase count of a new CellEnsemble group (phase 0 excluded)
    pub num_phases: usize,

    /// Name of the array to create
    pub output_array_name: String,

    /// Name of a new Cell group
    pub cell_attribute_matrix_name: String,

    /// Name of a new CellFeature group
    pub cell_feature_attribute_matrix_name: String,

    /// Name of a new CellEnsemble group
    pub cell_ensemble_attribute_matrix_name: String,
}

impl Default for RawBinaryReaderParameters {
    fn default() -> Self {
        Self {
            input_file: PathBuf::new(),
            scalar_type: 0,
            number_of_components: 1,
            endian: Endian::Little,
            skip_header_bytes: 0,
            add_to_existing_data_container: false,
            existing_data_container_name: DEFAULT_DATA_CONTAINER_NAME.to_string(),
            new_data_container_name: DEFAULT_DATA_CONTAINER_NAME.to_string(),
            dimensions: [0; 3],
            origin: [0.0; 3],
            resolution: [1.0; 3],
            add_to_existing_attribute_matrix: false,
            attribute_matrix_path: DataArrayPath::group(
                DEFAULT_DATA_CONTAINER_NAME,
                DEFAULT_CELL_GROUP_NAME,
            ),
            attribute_matrix_type: 0,
            num_features: 0,
            num_phases: 0,
            output_array_name: String::new(),
            cell_attribute_matrix_name: DEFAULT_CELL_GROUP_NAME.to_string(),
            cell_feature_attribute_matrix_name: DEFAULT_CELL_FEATURE_GROUP_NAME.to_string(),
            cell_ensemble_attribute_matrix_name: DEFAULT_CELL_ENSEMBLE_GROUP_NAME.to_string(),
        }
    }
}

/// Reads a raw binary file into a new typed array
#[derive(Debug, Clone)]
pub struct RawBinaryReader {
    /// Persisted parameters
    params: RawBinaryReaderParameters,

    /// Bytes requested per read call; not persisted
    chunk_size: usize,
}

impl Default for RawBinaryReader {
    fn default() -> Self {
        Self::new(RawBinaryReaderParameters::default())
    }
}

/// Where the array goes and how big it is
struct Target {
    container: String,
    group: String,
    tuples: usize,
    components: usize,
    kind: ScalarKind,
}

impl RawBinaryReader {
    /// Create a reader with the given parameters
    pub fn new(params: RawBinaryReaderParameters) -> Self {
        Self {
            params,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the read chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Parameters
    pub fn parameters(&self) -> &RawBinaryReaderParameters {
        &self.params
    }

    /// Mutable parameters
    pub fn parameters_mut(&mut self) -> &mut RawBinaryReaderParameters {
        &mut self.params
    }

    /// Validate, resolve or create the destination and check the file size
    fn check(
        &self,
        registry: &mut DataContainerRegistry,
        ctx: &mut FilterContext,
    ) -> Option<Target> {
        let p = &self.params;

        let mut file_size = None;
        if p.input_file.as_os_str().is_empty() {
            ctx.error(ERR_EMPTY_INPUT_FILE, "The input file must be set");
        } else {
            match fs::metadata(&p.input_file) {
                Ok(meta) if meta.is_file() => file_size = Some(meta.len()),
                _ => ctx.error(
                    ERR_INPUT_FILE_MISSING,
                    format!("The input file {} does not exist", p.input_file.display()),
                ),
            }
        }

        if p.output_array_name.is_empty() {
            ctx.error(ERR_EMPTY_OUTPUT_NAME, "The output array name must not be empty");
        }

        let components = usize::try_from(p.number_of_components)
            .ok()
            .filter(|&c| c >= 1);
        if components.is_none() {
            ctx.error(
                ERR_COMPONENTS_OR_GROUP_TYPE,
                "The number of components must be at least 1",
            );
        }

        let kind = ctx.check(ScalarKind::from_index(p.scalar_type), ERR_SCALAR_TYPE);

        if !p.add_to_existing_data_container && p.dimensions.contains(&0) {
            ctx.error(
                ERR_GEOMETRY,
                format!("Every dimension must be at least 1, got {:?}", p.dimensions),
            );
        }

        if p.add_to_existing_attribute_matrix && !p.add_to_existing_data_container {
            ctx.error(
                ERR_EXISTING_GROUP_NEEDS_CONTAINER,
                "An existing attribute group requires an existing data container",
            );
        }

        if ctx.has_error() {
            return None;
        }
        let (file_size, components, kind) = (file_size?, components?, kind?);

        let (container, group, tuples) = if p.add_to_existing_attribute_matrix {
            self.existing_group(registry, ctx)?
        } else {
            self.new_group(registry, ctx)?
        };

        let destination = ctx.check(
            registry
                .get_or_fail_mut(&container)
                .and_then(|dc| dc.get_group_mut(&group)),
            ERR_MISSING_GROUP,
        )?;
        if ctx.is_preflight() {
            ctx.check(
                destination.create_placeholder_array(kind, &p.output_array_name, components),
                ERR_NAME_COLLISION,
            )?;
        } else if destination.contains_array(&p.output_array_name) {
            ctx.error(
                ERR_NAME_COLLISION,
                format!("Array '{}' already exists in '{group}'", p.output_array_name),
            );
            return None;
        }

        let Some(required) = tuples
            .checked_mul(components)
            .and_then(|n| n.checked_mul(kind.size_bytes()))
            .and_then(|n| u64::try_from(n).ok())
        else {
            ctx.error(ERR_ALLOCATION, "The requested array size overflows");
            return None;
        };

        let available = file_size.checked_sub(p.skip_header_bytes).unwrap_or(0);
        if available < required {
            let err = voxkit_core::Error::ReadUnderflow {
                available,
                required,
            };
            ctx.error(
                ERR_FILE_TOO_SMALL,
                format!(
                    "The file size is {file_size} bytes with a {} byte header. {err}",
                    p.skip_header_bytes
                ),
            );
            return None;
        }
        if available > required {
            ctx.warning(
                WARN_FILE_TOO_BIG,
                format!(
                    "The file holds {available} bytes after the header but only {required} \
                     are needed; only the first part will be read"
                ),
            );
        }

        Some(Target {
            container,
            group,
            tuples,
            components,
            kind,
        })
    }

    fn existing_group(
        &self,
        registry: &DataContainerRegistry,
        ctx: &mut FilterContext,
    ) -> Option<(String, String, usize)> {
        let path = &self.params.attribute_matrix_path;
        let dc = ctx.check(registry.get_or_fail(&path.container), ERR_MISSING_CONTAINER)?;
        let group = ctx.check(dc.get_group(&path.group), ERR_MISSING_GROUP)?;

        match group.group_type() {
            GroupType::Cell | GroupType::CellFeature | GroupType::CellEnsemble => {}
            other => {
                ctx.error(
                    ERR_COMPONENTS_OR_GROUP_TYPE,
                    format!("Attribute group '{}' has unsupported type {other}", path.group),
                );
                return None;
            }
        }
        Some((path.container.clone(), path.group.clone(), group.num_tuples()))
    }

    fn new_group(
        &self,
        registry: &mut DataContainerRegistry,
        ctx: &mut FilterContext,
    ) -> Option<(String, String, usize)> {
        let p = &self.params;

        let Some(target) = TargetGroup::from_index(p.attribute_matrix_type) else {
            ctx.error(
                ERR_COMPONENTS_OR_GROUP_TYPE,
                format!("Unsupported attribute group type {}", p.attribute_matrix_type),
            );
            return None;
        };

        let container_name = if p.add_to_existing_data_container {
            &p.existing_data_container_name
        } else {
            &p.new_data_container_name
        };

        let dc = if p.add_to_existing_data_container {
            ctx.check(registry.get_or_fail_mut(container_name), ERR_MISSING_CONTAINER)?
        } else {
            let dc = ctx.check(registry.create_or_fail(container_name), ERR_NAME_COLLISION)?;
            let geometry = ImageGeometry::new(p.dimensions, p.origin, p.resolution);
            ctx.check(dc.set_geometry(geometry), ERR_GEOMETRY)?;
            dc
        };

        let (group_name, tuple_dims, group_type) = match target {
            TargetGroup::Cell => {
                let geometry = ctx.check(dc.image_geometry(), ERR_GEOMETRY)?;
                (
                    &p.cell_attribute_matrix_name,
                    geometry.tuple_dimensions(),
                    GroupType::Cell,
                )
            }
            TargetGroup::CellFeature => (
                &p.cell_feature_attribute_matrix_name,
                vec![p.num_features + 1],
                GroupType::CellFeature,
            ),
            TargetGroup::CellEnsemble => (
                &p.cell_ensemble_attribute_matrix_name,
                vec![p.num_phases + 1],
                GroupType::CellEnsemble,
            ),
        };

        let group = ctx.check(
            dc.create_group(group_name, tuple_dims, group_type),
            ERR_NAME_COLLISION,
        )?;
        Some((container_name.clone(), group_name.clone(), group.num_tuples()))
    }
}

impl Filter for RawBinaryReader {
    fn class_name(&self) -> &'static str {
        "RawBinaryReader"
    }

    fn metadata(&self) -> FilterMetadata {
        FilterMetadata {
            compiled_library_name: "Core",
            group_name: "IO",
            sub_group_name: "Input",
            human_label: "Raw Binary Reader",
        }
    }

    fn data_check(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
        self.check(registry, ctx);
    }

    fn execute(&mut self, registry: &mut DataContainerRegistry, ctx: &mut FilterContext) {
        let Some(target) = self.check(registry, ctx) else {
            return;
        };
        let p = &self.params;

        let Some(mut array) = ctx.check(
            DataArray::create(target.kind, target.tuples, target.components, &p.output_array_name),
            ERR_ALLOCATION,
        ) else {
            return;
        };

        if let Err(err) = read_raw_into(
            &p.input_file,
            p.skip_header_bytes,
            array.as_bytes_mut(),
            self.chunk_size,
        ) {
            ctx.error(read_error_code(&err), err.to_string());
            return;
        }

        if p.endian != Endian::native() {
            array.byte_swap_elements();
        }

        let byte_len = array.byte_len();
        let Some(group) = ctx.check(
            registry
                .get_or_fail_mut(&target.container)
                .and_then(|dc| dc.get_group_mut(&target.group)),
            ERR_MISSING_GROUP,
        ) else {
            return;
        };
        if ctx.check(group.insert_array(array), ERR_NAME_COLLISION).is_none() {
            return;
        }

        ctx.status(format!(
            "Read {byte_len} bytes into {}|{}|{}",
            target.container, target.group, p.output_array_name
        ));
    }

    fn read_parameters(
        &mut self,
        reader: &mut dyn ParametersReader,
        index: usize,
    ) -> voxkit_core::Result<()> {
        reader.open_filter_group(index)?;
        let d = self.params.clone();
        self.params = RawBinaryReaderParameters {
            input_file: PathBuf::from(
                reader.read_string("InputFile", &d.input_file.to_string_lossy()),
            ),
            scalar_type: reader.read_i64("ScalarType", d.scalar_type),
            number_of_components: reader.read_i64("NumberOfComponents", d.number_of_components),
            endian: Endian::from_index(reader.read_i64("Endian", d.endian.index())),
            skip_header_bytes: u64::try_from(reader.read_i64(
                "SkipHeaderBytes",
                i64::try_from(d.skip_header_bytes).unwrap_or(i64::MAX),
            ))
            .unwrap_or(d.skip_header_bytes),
            add_to_existing_data_container: reader
                .read_bool("AddToExistingDataContainer", d.add_to_existing_data_container),
            existing_data_container_name: reader
                .read_string("ExistingDataContainerName", &d.existing_data_container_name),
            new_data_container_name: reader
                .read_string("NewDataContainerName", &d.new_data_container_name),
            dimensions: reader.read_usize_vec3("Dimensions", d.dimensions),
            origin: reader.read_f32_vec3("Origin", d.origin),
            resolution: reader.read_f32_vec3("Resolution", d.resolution),
            add_to_existing_attribute_matrix: reader
                .read_bool("AddToExistingAttributeMatrix", d.add_to_existing_attribute_matrix),
            attribute_matrix_path: reader
                .read_array_path("AttributeMatrixPath", &d.attribute_matrix_path),
            attribute_matrix_type: reader.read_i64("AttributeMatrixType", d.attribute_matrix_type),
            num_features: i64_to_count(
                reader.read_i64("NumFeatures", count_to_i64(d.num_features)),
                d.num_features,
            ),
            num_phases: i64_to_count(
                reader.read_i64("NumPhases", count_to_i64(d.num_phases)),
                d.num_phases,
            ),
            output_array_name: reader.read_string("OutputArrayName", &d.output_array_name),
            cell_attribute_matrix_name: reader
                .read_string("CellAttributeMatrixName", &d.cell_attribute_matrix_name),
            cell_feature_attribute_matrix_name: reader.read_string(
                "CellFeatureAttributeMatrixName",
                &d.cell_feature_attribute_matrix_name,
            ),
            cell_ensemble_attribute_matrix_name: reader.read_string(
                "CellEnsembleAttributeMatrixName",
                &d.cell_ensemble_attribute_matrix_name,
            ),
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
        writer.write_string("InputFile", &p.input_file.to_string_lossy())?;
        writer.write_i64("ScalarType", p.scalar_type)?;
        writer.write_i64("NumberOfComponents", p.number_of_components)?;
        writer.write_i64("Endian", p.endian.index())?;
        writer.write_i64(
            "SkipHeaderBytes",
            i64::try_from(p.skip_header_bytes).unwrap_or(i64::MAX),
        )?;
        writer.write_bool("AddToExistingDataContainer", p.add_to_existing_data_container)?;
        writer.write_string("ExistingDataContainerName", &p.existing_data_container_name)?;
        writer.write_string("NewDataContainerName", &p.new_data_container_name)?;
        writer.write_usize_vec3("Dimensions", p.dimensions)?;
        writer.write_f32_vec3("Origin", p.origin)?;
        writer.write_f32_vec3("Resolution", p.resolution)?;
        writer.write_bool("AddToExistingAttributeMatrix", p.add_to_existing_attribute_matrix)?;
        writer.write_array_path("AttributeMatrixPath", &p.attribute_matrix_path)?;
        writer.write_i64("AttributeMatrixType", p.attribute_matrix_type)?;
        writer.write_i64("NumFeatures", count_to_i64(p.num_features))?;
        writer.write_i64("NumPhases", count_to_i64(p.num_phases))?;
        writer.write_string("OutputArrayName", &p.output_array_name)?;
        writer.write_string("CellAttributeMatrixName", &p.cell_attribute_matrix_name)?;
        writer.write_string(
            "CellFeatureAttributeMatrixName",
            &p.cell_feature_attribute_matrix_name,
        )?;
        writer.write_string(
            "CellEnsembleAttributeMatrixName",
            &p.cell_ensemble_attribute_matrix_name,
        )?;
        writer.close_filter_group()?;
        Ok(index + 1)
    }
}

/// Message code for a failed [`read_raw_into`]
fn read_error_code(err: &Error) -> i32 {
    match err {
        Error::Open { .. } => ERR_FILE_NOT_OPEN,
        err if err.is_premature_eof() => ERR_READ_EOF,
        _ => ERR_READ_FAILED,
    }
}

/// Fill `dest` from `path`, starting `skip` bytes in, `chunk_size` bytes per read
///
/// Bytes past `skip + dest.len()` are never read.
pub fn read_raw_into(path: &Path, skip: u64, dest: &mut [u8], chunk_size: usize) -> Result<()> {
    let mut file = File::open(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;
    file.seek(SeekFrom::Start(skip))?;

    let chunk_size = chunk_size.max(1);
    let required = dest.len();
    let mut filled = 0;
    while filled < required {
        let end = required.min(filled + chunk_size);
        match file.read(&mut dest[filled..end]) {
            Ok(0) => {
                return Err(voxkit_core::Error::PrematureEof {
                    read: filled as u64,
                    required: required as u64,
                }
                .into())
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }

    tracing::debug!(path = %path.display(), skip, bytes = required, chunk_size, "read raw data");
    Ok(())
}
