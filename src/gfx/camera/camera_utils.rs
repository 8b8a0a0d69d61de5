use cgmath::{Matrix4, Point3, SquareMatrix, Vector3};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

pub trait Camera {
    fn build_view_projection_matrix(&self) -> Matrix4<f32>;

    /// World-space eye position
    fn eye_position(&self) -> Vector3<f32>;

    fn uniform(&self) -> CameraUniform {
        let eye = self.eye_position();
        CameraUniform {
            view_position: [eye.x, eye.y, eye.z, 1.0],
            view_proj: convert_matrix4_to_array(self.build_view_projection_matrix()),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct CameraUniform {
    /// The eye position of the camera in homogenous coordinates.
    ///
    /// Homogenous coordinates are used to fullfill the 16 byte alignment requirement.
    pub view_position: [f32; 4],

    /// Contains the view projection matrix.
    pub view_proj: [[f32; 4]; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: convert_matrix4_to_array(Matrix4::identity()),
        }
    }
}

pub fn convert_matrix4_to_array(matrix4: Matrix4<f32>) -> [[f32; 4]; 4] {
    matrix4.into()
}

/// Orthographic camera looking straight down (-Y) onto a bounding volume
///
/// The eye sits `max_dim` above the volume's center, the view covers
/// `[-max_dim/2, max_dim/2]` on both horizontal axes and the far plane is
/// `2 * max_dim`. Image up is world -Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopDownOrthoCamera {
    pub center: Vector3<f32>,
    pub max_dim: f32,
}

impl TopDownOrthoCamera {
    pub fn new(center: Vector3<f32>, max_dim: f32) -> Self {
        Self { center, max_dim }
    }

    pub fn near(&self) -> f32 {
        (self.max_dim * 0.05).min(0.1)
    }

    pub fn far(&self) -> f32 {
        self.max_dim * 2.0
    }

    pub fn half_extent(&self) -> f32 {
        self.max_dim / 2.0
    }
}

impl Camera for TopDownOrthoCamera {
    fn build_view_projection_matrix(&self) -> Matrix4<f32> {
        let eye = Point3::new(self.center.x, self.center.y + self.max_dim, self.center.z);
        let target = Point3::new(self.center.x, self.center.y, self.center.z);
        let view = Matrix4::look_at_rh(eye, target, -Vector3::unit_z());
        let h = self.half_extent();
        let proj = OPENGL_TO_WGPU_MATRIX * cgmath::ortho(-h, h, -h, h, self.near(), self.far());
        proj * view
    }

    fn eye_position(&self) -> Vector3<f32> {
        Vector3::new(self.center.x, self.center.y + self.max_dim, self.center.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector4;

    #[test]
    fn test_top_down_camera_maps_bounds_to_clip_edges() {
        let camera = TopDownOrthoCamera::new(Vector3::new(0.0, 0.0, 0.0), 2.0);
        let m = camera.build_view_projection_matrix();

        // World +X stays right, world -Z is image up
        let right = m * Vector4::new(1.0, 0.0, 0.0, 1.0);
        let up = m * Vector4::new(0.0, 0.0, -1.0, 1.0);
        assert!((right.x - 1.0).abs() < 1e-5);
        assert!((up.y - 1.0).abs() < 1e-5);

        // Top and bottom of the volume land inside the depth range
        let top = m * Vector4::new(0.0, 1.0, 0.0, 1.0);
        let bottom = m * Vector4::new(0.0, -1.0, 0.0, 1.0);
        assert!(top.z > 0.0 && top.z < 1.0);
        assert!(bottom.z > top.z && bottom.z < 1.0);
    }

    #[test]
    fn test_top_down_camera_is_affine() {
        let camera = TopDownOrthoCamera::new(Vector3::new(0.0, 0.0, 0.0), 2.0);
        let m = camera.build_view_projection_matrix();

        // Every corner of the volume's top face reaches the image edge
        for (x, z) in [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)] {
            let clip = m * Vector4::new(x, 1.0, z, 1.0);
            assert!((clip.w - 1.0).abs() < 1e-6);
            assert!((clip.x - x).abs() < 1e-5);
            assert!((clip.y + z).abs() < 1e-5);
            assert!(clip.z >= 0.0 && clip.z <= 1.0);
        }
    }

    #[test]
    fn test_clip_correction_remaps_depth() {
        let near = OPENGL_TO_WGPU_MATRIX * Vector4::new(0.0, 0.0, -1.0, 1.0);
        let far = OPENGL_TO_WGPU_MATRIX * Vector4::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!((near.z, near.w), (0.0, 1.0));
        assert_eq!((far.z, far.w), (1.0, 1.0));
    }
}
