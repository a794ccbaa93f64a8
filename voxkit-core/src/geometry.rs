//! Physical grid description of a data container

use serde::{Deserialize, Serialize};

/// Kind of geometry attached to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    /// Regular rectilinear voxel grid
    Image,
}

/// A regular 3-D voxel grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageGeometry {
    /// Number of voxels along x, y, z
    pub dimensions: [usize; 3],

    /// Physical position of voxel (0, 0, 0)
    pub origin: [f32; 3],

    /// Voxel edge length along x, y, z
    pub spacing: [f32; 3],
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            dimensions: [0; 3],
            origin: [0.0; 3],
            spacing: [1.0; 3],
        }
    }
}

impl ImageGeometry {
    /// Create a grid with the given dimensions, origin and spacing
    pub fn new(dimensions: [usize; 3], origin: [f32; 3], spacing: [f32; 3]) -> Self {
        Self {
            dimensions,
            origin,
            spacing,
        }
    }

    /// Always [`GeometryKind::Image`]
    pub fn kind(&self) -> GeometryKind {
        GeometryKind::Image
    }

    /// Total number of voxels (`x * y * z`)
    pub fn num_voxels(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Tuple dimensions a Cell group on this grid must have
    pub fn tuple_dimensions(&self) -> Vec<usize> {
        self.dimensions.to_vec()
    }

    /// Flat voxel index with x varying fastest
    pub fn voxel_index(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.dimensions;
        (z * ny + y) * nx + x
    }

    /// Physical coordinate of a voxel as `index * spacing` (origin not applied)
    #[allow(clippy::cast_precision_loss)]
    pub fn coordinate_of(&self, x: usize, y: usize, z: usize) -> [f32; 3] {
        [
            x as f32 * self.spacing[0],
            y as f32 * self.spacing[1],
            z as f32 * self.spacing[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_index_x_fastest() {
        let geom = ImageGeometry::new([4, 3, 2], [0.0; 3], [1.0; 3]);
        assert_eq!(geom.num_voxels(), 24);
        assert_eq!(geom.voxel_index(0, 0, 0), 0);
        assert_eq!(geom.voxel_index(1, 0, 0), 1);
        assert_eq!(geom.voxel_index(0, 1, 0), 4);
        assert_eq!(geom.voxel_index(0, 0, 1), 12);
        assert_eq!(geom.voxel_index(3, 2, 1), 23);
    }

    #[test]
    fn test_coordinate_ignores_origin() {
        let geom = ImageGeometry::new([2, 2, 2], [10.0, 10.0, 10.0], [0.5, 2.0, 1.0]);
        assert_eq!(geom.coordinate_of(1, 1, 1), [0.5, 2.0, 1.0]);
    }
}
