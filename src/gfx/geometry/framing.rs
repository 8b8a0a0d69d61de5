//! Camera auto-framing
//!
//! Places a perspective camera on the +Z axis so that a bounding volume fits
//! the vertical field of view, and derives a far plane that keeps the whole
//! volume unclipped.

use super::bounds::Aabb;

/// Smallest edge length used for framing; zero-size volumes are floored to it
pub const MIN_EXTENT: f32 = 1e-3;

/// Result of framing a bounding volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    /// Distance of the camera from the volume's center along +Z
    pub camera_distance: f32,
    pub far_plane: f32,
}

/// Frames `bounds` for a camera with vertical field of view `fov` (radians)
///
/// `margin` scales the fitted distance so the model does not touch the
/// viewport edges; `far_multiplier` scales the camera-to-far-edge distance.
pub fn frame_bounds(bounds: &Aabb, fov: f32, margin: f32, far_multiplier: f32) -> Framing {
    let max_dim = bounds.max_dim();
    let max_dim = if max_dim.is_finite() {
        max_dim.max(MIN_EXTENT)
    } else {
        MIN_EXTENT
    };

    let camera_distance = (max_dim / 2.0 / (fov / 2.0).tan()).abs() * margin;

    // A degenerate box still spans MIN_EXTENT around its center
    let min_z = if bounds.size().z < MIN_EXTENT {
        bounds.center().z - MIN_EXTENT / 2.0
    } else {
        bounds.min.z
    };
    let min_z = if min_z.is_finite() { min_z } else { 0.0 };

    let camera_to_far_edge = if min_z < 0.0 {
        -min_z + camera_distance
    } else {
        camera_distance - min_z
    };
    let camera_to_far_edge = camera_to_far_edge.max(MIN_EXTENT);

    Framing {
        camera_distance,
        far_plane: camera_to_far_edge * far_multiplier,
    }
}
