//! # Geometry
//!
//! CPU-side mesh data and the pure math built on top of it.
//!
//! - [`Geometry`] - Triangle mesh attributes as loaded from an asset
//! - [`bounds`] - Axis-aligned bounding volumes
//! - [`framing`] - Camera auto-framing from a bounding volume
//! - [`primitives`] - Procedural shapes used by demos and tests
//!
//! ## Usage
//!
//! ```rust
//! use meshkiln::gfx::geometry::{framing::frame_bounds, primitives::cube};
//!
//! let cube = cube(2.0, [0.0, 0.0, 0.0]);
//! let bounds = cube.bounds().unwrap();
//! let framing = frame_bounds(&bounds, 75f32.to_radians(), 1.5, 3.0);
//! assert!(framing.far_plane > framing.camera_distance);
//! ```

pub mod bounds;
pub mod framing;
pub mod primitives;

pub use bounds::Aabb;
pub use framing::{frame_bounds, Framing};

use crate::gfx::scene::vertex::Vertex3D;

/// Triangle mesh attributes ready for GPU upload
///
/// Positions and normals are per-vertex; `uvs` is the primary texture
/// coordinate set and `uv2` the secondary set sampled by the AO map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub uv2: Option<Vec<[f32; 2]>>,
    /// Triangle list indices (counter-clockwise winding)
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn new(positions: Vec<[f32; 3]>, normals: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals,
            uvs: None,
            uv2: None,
            indices,
        }
    }

    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Bounding volume of all positions, `None` for an empty mesh
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.positions)
    }

    /// Moves every position by `offset`
    pub fn translate(&mut self, offset: [f32; 3]) {
        for p in self.positions.iter_mut() {
            p[0] += offset[0];
            p[1] += offset[1];
            p[2] += offset[2];
        }
    }

    /// Interleaves the attributes into the vertex format used by the renderer
    ///
    /// Missing UV sets are filled with zeros; a missing secondary set falls
    /// back to the primary one.
    pub fn to_vertices(&self) -> Vec<Vertex3D> {
        (0..self.positions.len())
            .map(|i| {
                let uv = self
                    .uvs
                    .as_ref()
                    .and_then(|uvs| uvs.get(i).copied())
                    .unwrap_or([0.0, 0.0]);
                let uv2 = self
                    .uv2
                    .as_ref()
                    .and_then(|uvs| uvs.get(i).copied())
                    .unwrap_or(uv);
                Vertex3D {
                    position: self.positions[i],
                    normal: self.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                    uv,
                    uv2,
                }
            })
            .collect()
    }

    /// Computes smooth per-vertex normals by averaging adjacent face normals
    pub fn calculate_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
        let mut normals = vec![[0.0f32; 3]; positions.len()];

        for triangle in indices.chunks_exact(3) {
            let [i0, i1, i2] = [
                triangle[0] as usize,
                triangle[1] as usize,
                triangle[2] as usize,
            ];
            if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
                continue;
            }

            let (v0, v1, v2) = (positions[i0], positions[i1], positions[i2]);
            let edge1 = [v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]];
            let edge2 = [v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]];
            let face_normal = [
                edge1[1] * edge2[2] - edge1[2] * edge2[1],
                edge1[2] * edge2[0] - edge1[0] * edge2[2],
                edge1[0] * edge2[1] - edge1[1] * edge2[0],
            ];

            // Unnormalized face normals weight larger faces more
            for &vertex_idx in &[i0, i1, i2] {
                normals[vertex_idx][0] += face_normal[0];
                normals[vertex_idx][1] += face_normal[1];
                normals[vertex_idx][2] += face_normal[2];
            }
        }

        for normal in normals.iter_mut() {
            let length = (normal[0].powi(2) + normal[1].powi(2) + normal[2].powi(2)).sqrt();
            if length > 0.0 {
                normal[0] /= length;
                normal[1] /= length;
                normal[2] /= length;
            } else {
                *normal = [0.0, 1.0, 0.0];
            }
        }

        normals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_normals_of_flat_triangle() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = Geometry::calculate_normals(&positions, &[0, 1, 2]);
        for n in normals {
            assert_eq!(n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_to_vertices_falls_back_to_primary_uvs() {
        let geometry = Geometry::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0, 1.0]; 3],
            vec![0, 1, 2],
        )
        .with_uvs(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);

        let vertices = geometry.to_vertices();
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].uv, [1.0, 0.0]);
        assert_eq!(vertices[1].uv2, [1.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let normals = Geometry::calculate_normals(&positions, &[0, 1, 7]);
        assert_eq!(normals, vec![[0.0, 1.0, 0.0]; 2]);
    }
}
