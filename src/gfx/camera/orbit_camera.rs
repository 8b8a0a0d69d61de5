use super::camera_controller::CameraInput;
use super::camera_utils::{Camera, OPENGL_TO_WGPU_MATRIX};
use crate::config::{CameraConfig, ControlsConfig};
use crate::gfx::geometry::Framing;
use cgmath::*;

/// Perspective camera orbiting a target point, y-up
///
/// Input is accumulated into pending deltas and released gradually by
/// [`OrbitCamera::update`], one damping step per frame. The projection matrix
/// is cached and only rebuilt when the aspect ratio or clip planes change.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub distance: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub eye: Vector3<f32>,
    pub target: Vector3<f32>,
    pub up: Vector3<f32>,
    pub bounds: OrbitCameraBounds,
    pub aspect: f32,
    fovy: Rad<f32>,
    pub znear: f32,
    zfar: f32,
    damping: f32,
    pending: PendingMotion,
    projection: Matrix4<f32>,
    projection_dirty: bool,
    projection_updates: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingMotion {
    yaw: f32,
    pitch: f32,
    pan: Vector2<f32>,
}

impl Default for PendingMotion {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            pan: Vector2::zero(),
        }
    }
}

impl PendingMotion {
    const EPSILON: f32 = 1e-6;

    fn is_settled(&self) -> bool {
        self.yaw.abs() < Self::EPSILON
            && self.pitch.abs() < Self::EPSILON
            && self.pan.x.abs() < Self::EPSILON
            && self.pan.y.abs() < Self::EPSILON
    }
}

impl Camera for OrbitCamera {
    fn build_view_projection_matrix(&self) -> Matrix4<f32> {
        let eye = Point3::from_vec(self.eye);
        let target = Point3::from_vec(self.target);
        let view = Matrix4::look_at_rh(eye, target, self.up);
        self.projection * view
    }

    fn eye_position(&self) -> Vector3<f32> {
        self.eye
    }
}

impl OrbitCamera {
    /// Camera on the +Z axis at `camera.initial_distance`, looking at the origin
    pub fn new(camera: &CameraConfig, controls: &ControlsConfig, aspect: f32) -> Self {
        let mut orbit = Self {
            distance: camera.initial_distance,
            pitch: 0.0,
            yaw: 0.0,
            eye: Vector3::zero(), // Will be auto-calculted in `update_eye()` nevertheless.
            target: Vector3::zero(),
            up: Vector3::unit_y(),
            bounds: OrbitCameraBounds {
                min_distance: controls.min_distance,
                max_distance: controls.max_distance,
                ..OrbitCameraBounds::default()
            },
            aspect,
            fovy: Deg(camera.fov_degrees).into(),
            znear: camera.near,
            zfar: camera.far,
            damping: controls.damping,
            pending: PendingMotion::default(),
            projection: Matrix4::identity(),
            projection_dirty: true,
            projection_updates: 0,
        };
        orbit.update_eye();
        orbit.refresh_projection();
        orbit
    }

    pub fn fovy(&self) -> Rad<f32> {
        self.fovy
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    /// How many times the projection matrix has been rebuilt
    pub fn projection_updates(&self) -> u64 {
        self.projection_updates
    }

    /// Places the camera for a freshly framed object centered at the origin
    ///
    /// The orbit limits are widened so the framed distance is reachable with
    /// room to zoom out.
    pub fn frame(&mut self, framing: &Framing) {
        self.target = Vector3::zero();
        self.pitch = 0.0;
        self.yaw = 0.0;
        self.pending = PendingMotion::default();
        self.bounds.max_distance = self.bounds.max_distance.max(framing.camera_distance * 2.0);
        self.bounds.min_distance = self.bounds.min_distance.min(framing.camera_distance * 0.5);
        self.distance = framing.camera_distance;
        self.set_zfar(framing.far_plane);
        self.update_eye();
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance.clamp(self.bounds.min_distance, self.bounds.max_distance);
        self.update_eye();
    }

    /// Multiplicative zoom; positive values move the camera away
    pub fn add_zoom(&mut self, amount: f32) {
        self.set_distance(self.distance * amount.exp());
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(self.bounds.min_pitch, self.bounds.max_pitch);
        self.update_eye();
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = yaw;
        self.update_eye();
    }

    /// Queues an input for damped integration
    pub fn apply_input(&mut self, input: CameraInput) {
        match input {
            CameraInput::Rotate { yaw, pitch } => {
                self.pending.yaw += yaw;
                self.pending.pitch += pitch;
            }
            CameraInput::Pan { right, up } => {
                self.pending.pan += Vector2::new(right, up);
            }
            CameraInput::Zoom(amount) => self.add_zoom(amount),
        }
    }

    /// Releases one damping step of the pending motion
    ///
    /// Returns `true` while the camera is still moving.
    pub fn update(&mut self) -> bool {
        if self.pending.is_settled() {
            self.pending = PendingMotion::default();
            return false;
        }

        let step = if self.damping > 0.0 { self.damping } else { 1.0 };

        let yaw = self.pending.yaw * step;
        let pitch = self.pending.pitch * step;
        let pan = self.pending.pan * step;
        self.pending.yaw -= yaw;
        self.pending.pitch -= pitch;
        self.pending.pan -= pan;

        self.yaw += yaw;
        self.pitch = (self.pitch + pitch).clamp(self.bounds.min_pitch, self.bounds.max_pitch);
        self.pan(pan);
        self.update_eye();
        true
    }

    /// Moves the target in the horizontal plane, relative to the view heading
    fn pan(&mut self, delta: Vector2<f32>) {
        if delta.x == 0.0 && delta.y == 0.0 {
            return;
        }
        let right = Vector3::new(self.yaw.cos(), 0.0, -self.yaw.sin());
        let forward = Vector3::new(-self.yaw.sin(), 0.0, -self.yaw.cos());

        // Scale by distance for consistent feel at all zoom levels
        let pan_scale = self.distance * 0.1;
        self.target += (right * -delta.x + forward * delta.y) * pan_scale;
    }

    /// Updates the eye after changing `distance`, `pitch`, `yaw` or `target`.
    fn update_eye(&mut self) {
        self.eye =
            calculate_cartesian_eye_position(self.pitch, self.yaw, self.distance, self.target);
    }

    pub fn resize_projection(&mut self, width: u32, height: u32) {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        if aspect != self.aspect {
            self.aspect = aspect;
            self.projection_dirty = true;
        }
    }

    pub fn set_zfar(&mut self, zfar: f32) {
        let zfar = zfar.max(self.znear * 2.0);
        if zfar != self.zfar {
            self.zfar = zfar;
            self.projection_dirty = true;
        }
    }

    /// Rebuilds the projection matrix if the viewport or clip planes changed
    pub fn refresh_projection(&mut self) -> bool {
        if !self.projection_dirty {
            return false;
        }
        self.projection =
            OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar);
        self.projection_dirty = false;
        self.projection_updates += 1;
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrbitCameraBounds {
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
}

impl Default for OrbitCameraBounds {
    fn default() -> Self {
        Self {
            min_distance: 1.0,
            max_distance: 500.0,
            min_pitch: -std::f32::consts::PI / 2.0 + 0.01,
            max_pitch: std::f32::consts::PI / 2.0 - 0.01,
        }
    }
}

fn calculate_cartesian_eye_position(
    pitch: f32,
    yaw: f32,
    distance: f32,
    target: Vector3<f32>,
) -> Vector3<f32> {
    Vector3::new(
        distance * yaw.sin() * pitch.cos(),
        distance * pitch.sin(),
        distance * yaw.cos() * pitch.cos(),
    ) + target
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> OrbitCamera {
        OrbitCamera::new(&CameraConfig::default(), &ControlsConfig::default(), 1.5)
    }

    #[test]
    fn test_initial_position_on_positive_z() {
        let camera = camera();
        assert!((camera.eye - Vector3::new(0.0, 0.0, 10.0)).magnitude() < 1e-5);
        assert_eq!(camera.projection_updates(), 1);
    }

    #[test]
    fn test_damped_rotation_converges() {
        let mut camera = camera();
        camera.apply_input(CameraInput::Rotate { yaw: 1.0, pitch: 0.0 });

        assert!(camera.update());
        assert!((camera.yaw - 0.05).abs() < 1e-6);

        let mut frames = 1;
        while camera.update() {
            frames += 1;
            assert!(frames < 10_000);
        }
        assert!((camera.yaw - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_projection_rebuilt_only_on_change() {
        let mut camera = camera();
        assert!(!camera.refresh_projection());

        camera.resize_projection(300, 200);
        assert!(!camera.refresh_projection(), "same aspect ratio");

        camera.resize_projection(800, 400);
        assert!(camera.refresh_projection());
        assert!(!camera.refresh_projection());
        assert_eq!(camera.projection_updates(), 2);
    }

    #[test]
    fn test_frame_widens_orbit_limits() {
        let mut camera = camera();
        camera.frame(&Framing {
            camera_distance: 800.0,
            far_plane: 2400.0,
        });
        assert_eq!(camera.distance, 800.0);
        assert!(camera.bounds.max_distance >= 1600.0);
        assert_eq!(camera.zfar(), 2400.0);

        camera.add_zoom(0.5);
        assert!(camera.distance > 800.0);
    }

    #[test]
    fn test_pan_settles_and_frame_clears_it() {
        let mut camera = camera();
        assert!(!camera.update(), "nothing pending at rest");

        camera.apply_input(CameraInput::Pan { right: 1.0, up: 0.0 });
        assert!(camera.update());
        assert!(camera.target.magnitude() > 0.0);

        camera.frame(&Framing {
            camera_distance: 5.0,
            far_plane: 15.0,
        });
        assert_eq!(camera.target, Vector3::zero());
        assert!(!camera.update(), "framing drops queued motion");
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut camera = camera();
        camera.apply_input(CameraInput::Zoom(-100.0));
        assert_eq!(camera.distance, camera.bounds.min_distance);
    }
}
