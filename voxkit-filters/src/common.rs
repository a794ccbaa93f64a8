//! Shared defaults and helpers for the bundled filters

use serde::{Deserialize, Serialize};

/// Default name of the voxel data container
pub const DEFAULT_DATA_CONTAINER_NAME: &str = "VolumeDataContainer";

/// Default name of the per-voxel group
pub const DEFAULT_CELL_GROUP_NAME: &str = "CellData";

/// Default name of the per-feature group
pub const DEFAULT_CELL_FEATURE_GROUP_NAME: &str = "CellFeatureData";

/// Default name of the per-phase group
pub const DEFAULT_CELL_ENSEMBLE_GROUP_NAME: &str = "CellEnsembleData";

/// Default name of the per-voxel feature id array
pub const DEFAULT_FEATURE_IDS_ARRAY_NAME: &str = "FeatureIds";

/// Byte order of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endian {
    /// Least significant byte first (persisted as 0)
    #[default]
    Little,
    /// Most significant byte first (persisted as 1)
    Big,
}

impl Endian {
    /// Byte order of the running host
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// Persisted index
    pub fn index(self) -> i64 {
        match self {
            Endian::Little => 0,
            Endian::Big => 1,
        }
    }

    /// Decode a persisted index; anything but 1 is little endian
    pub fn from_index(index: i64) -> Self {
        if index == 1 {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

/// Persist a count as a JSON-friendly integer
pub(crate) fn count_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Read back a persisted count, keeping `default` for negative values
pub(crate) fn i64_to_count(value: i64, default: usize) -> usize {
    usize::try_from(value).unwrap_or(default)
}
