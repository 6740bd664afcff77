use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Camera settings applied at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            position: Vec3::new(0.0, 0.0, 5.0),
        }
    }
}

/// Perspective camera looking at a target point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub target: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        Self {
            position: config.position,
            target: Vec3::ZERO,
            fov: config.fov_degrees.to_radians(),
            aspect,
            near: config.near,
            far: config.far,
        }
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new(&CameraConfig::default(), 1.0)
    }
}

/// Orbit-style camera controller: rotates and zooms the camera around a target.
///
/// Input accumulates as pending deltas; `update` applies a `damping_factor`
/// share of them each call (1.0 applies everything at once).
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    yaw: f32,
    pitch: f32,
    distance: f32,
    pending_yaw: f32,
    pending_pitch: f32,
    pending_zoom: f32,
}

impl OrbitControls {
    /// Controls orbiting the camera's current target from its current position.
    pub fn new(camera: &PerspectiveCamera) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(f32::EPSILON);
        Self {
            target: camera.target,
            damping_factor: 1.0,
            min_distance: 0.5,
            max_distance: 500.0,
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / distance).clamp(-1.0, 1.0).asin(),
            distance,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            pending_zoom: 0.0,
        }
    }

    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        self.pending_yaw += yaw;
        self.pending_pitch += pitch;
    }

    /// Positive values move the camera closer.
    pub fn zoom(&mut self, amount: f32) {
        self.pending_zoom += amount;
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Apply pending input and reposition the camera. Returns whether the
    /// camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let k = self.damping_factor.clamp(f32::EPSILON, 1.0);
        let (dy, dp, dz) = (
            self.pending_yaw * k,
            self.pending_pitch * k,
            self.pending_zoom * k,
        );
        self.pending_yaw -= dy;
        self.pending_pitch -= dp;
        self.pending_zoom -= dz;

        self.yaw += dy;
        self.pitch = (self.pitch + dp).clamp(-89.0_f32.to_radians(), 89.0_f32.to_radians());
        self.distance = (self.distance - dz).clamp(self.min_distance, self.max_distance);

        let offset = Vec3::new(
            self.distance * self.pitch.cos() * self.yaw.sin(),
            self.distance * self.pitch.sin(),
            self.distance * self.pitch.cos() * self.yaw.cos(),
        );
        let position = self.target + offset;
        let moved = position.distance_squared(camera.position) > 1e-10 || camera.target != self.target;
        camera.position = position;
        camera.target = self.target;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera() {
        let cam = PerspectiveCamera::default();
        assert_eq!(cam.position.z, 5.0);
        let vp = cam.view_projection();
        assert!(!vp.col(0).x.is_nan());
        assert!((cam.fov - 75.0_f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn idle_controls_keep_camera_in_place() {
        let mut cam = PerspectiveCamera::default();
        let mut controls = OrbitControls::new(&cam);
        let start = cam.position;
        assert!(!controls.update(&mut cam));
        assert!(cam.position.distance(start) < 1e-4);
    }

    #[test]
    fn rotation_keeps_distance() {
        let mut cam = PerspectiveCamera::default();
        let mut controls = OrbitControls::new(&cam);
        controls.rotate(0.5, 0.2);
        assert!(controls.update(&mut cam));
        assert!((cam.position.length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn damping_spreads_input_over_updates() {
        let mut cam = PerspectiveCamera::default();
        let mut controls = OrbitControls::new(&cam);
        controls.damping_factor = 0.5;
        controls.zoom(2.0);
        controls.update(&mut cam);
        assert!((controls.distance() - 4.0).abs() < 1e-4);
        controls.update(&mut cam);
        assert!((controls.distance() - 3.5).abs() < 1e-4);
    }
}
