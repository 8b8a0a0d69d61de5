//! # Primitive Shape Generation
//!
//! Procedural shapes with outward normals and 0..1 texture coordinates.

use super::Geometry;

/// Generate an axis-aligned cube with edge length `size` centered at `center`
///
/// Each face has its own four vertices so normals stay flat.
pub fn cube(size: f32, center: [f32; 3]) -> Geometry {
    let h = size / 2.0;

    #[rustfmt::skip]
    let corners: [[f32; 3]; 24] = [
        // Front face (+Z)
        [-h, -h,  h], [ h, -h,  h], [ h,  h,  h], [-h,  h,  h],
        // Back face (-Z)
        [-h, -h, -h], [-h,  h, -h], [ h,  h, -h], [ h, -h, -h],
        // Left face (-X)
        [-h, -h, -h], [-h, -h,  h], [-h,  h,  h], [-h,  h, -h],
        // Right face (+X)
        [ h, -h,  h], [ h, -h, -h], [ h,  h, -h], [ h,  h,  h],
        // Top face (+Y)
        [-h,  h,  h], [ h,  h,  h], [ h,  h, -h], [-h,  h, -h],
        // Bottom face (-Y)
        [-h, -h, -h], [ h, -h, -h], [ h, -h,  h], [-h, -h,  h],
    ];

    let face_normals: [[f32; 3]; 6] = [
        [0.0, 0.0, 1.0],
        [0.0, 0.0, -1.0],
        [-1.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
    ];

    let positions = corners
        .iter()
        .map(|c| [c[0] + center[0], c[1] + center[1], c[2] + center[2]])
        .collect();
    let normals = face_normals
        .iter()
        .flat_map(|n| std::iter::repeat(*n).take(4))
        .collect();
    let uvs = (0..6)
        .flat_map(|_| [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]])
        .collect();

    // Two counter-clockwise triangles per face
    let indices = (0..6u32)
        .flat_map(|face| {
            let base = face * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect();

    Geometry::new(positions, normals, indices).with_uvs(uvs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_generation() {
        let cube = cube(2.0, [5.0, 5.0, 5.0]);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.normals.len(), 24);

        let bounds = cube.bounds().unwrap();
        assert_eq!(bounds.min, cgmath::Vector3::new(4.0, 4.0, 4.0));
        assert_eq!(bounds.max, cgmath::Vector3::new(6.0, 6.0, 6.0));
    }
}
