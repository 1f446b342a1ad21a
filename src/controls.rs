use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use crate::camera::Camera;

const MIN_POLAR_ANGLE: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Pointer moved by `delta` pixels while `button` was held.
    Drag { button: PointerButton, delta: Vec2 },
    /// Positive values zoom in.
    Wheel { delta: f32 },
    DoubleClick,
}

#[derive(Debug, Clone, Copy)]
struct SavedState {
    target: Vec3,
    eye: Vec3,
}

/// Orbits the camera around `target`. Left drag rotates, right drag pans, the
/// wheel dollies and a double click restores the last saved state.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enabled: bool,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_zoom: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vec3,
    saved: SavedState,
    pending_reset: Option<Vec3>,
}

impl OrbitControls {
    pub fn new(camera: &Camera) -> Self {
        Self {
            target: camera.target,
            enabled: true,
            enable_damping: false,
            damping_factor: 0.05,
            enable_zoom: true,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            saved: SavedState {
                target: camera.target,
                eye: camera.eye,
            },
            pending_reset: None,
        }
    }

    pub fn handle_event(&mut self, event: PointerEvent, camera: &Camera, viewport_height: u32) {
        if !self.enabled {
            return;
        }

        let height = viewport_height.max(1) as f32;

        match event {
            PointerEvent::Drag {
                button: PointerButton::Primary,
                delta,
            } => {
                self.rotate_left(TAU * delta.x / height * self.rotate_speed);
                self.rotate_up(TAU * delta.y / height * self.rotate_speed);
            }
            PointerEvent::Drag {
                button: PointerButton::Secondary,
                delta,
            } => self.pan(delta, camera, height),
            PointerEvent::Wheel { delta } if self.enable_zoom => {
                let zoom_scale = 0.95_f32.powf(self.zoom_speed);
                if delta > 0.0 {
                    self.scale *= zoom_scale;
                } else if delta < 0.0 {
                    self.scale /= zoom_scale;
                }
            }
            PointerEvent::Wheel { .. } => {}
            PointerEvent::DoubleClick => self.reset(),
        }
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    fn pan(&mut self, delta: Vec2, camera: &Camera, height: f32) {
        let offset = camera.eye - self.target;
        let target_distance = offset.length() * (camera.fov_y / 2.0).tan();

        let forward = camera.forward();
        let right = forward.cross(camera.up).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();

        self.pan_offset -= right * (2.0 * delta.x * target_distance / height);
        self.pan_offset += up * (2.0 * delta.y * target_distance / height);
    }

    /// Applies pending input to the camera. With damping enabled the input
    /// decays over subsequent calls, so this is meant to run every frame.
    pub fn update(&mut self, camera: &mut Camera) {
        let factor = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };

        if let Some(eye) = self.pending_reset.take() {
            camera.eye = eye;
        }

        let offset = camera.eye - self.target;
        self.target += self.pan_offset * factor;

        let radius = offset.length();

        if radius > f32::EPSILON {
            let theta = offset.x.atan2(offset.z) + self.theta_delta * factor;
            let phi = ((offset.y / radius).clamp(-1.0, 1.0).acos() + self.phi_delta * factor)
                .clamp(MIN_POLAR_ANGLE, PI - MIN_POLAR_ANGLE);
            let radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);

            let sin_phi = phi.sin();
            let offset = Vec3::new(
                radius * sin_phi * theta.sin(),
                radius * phi.cos(),
                radius * sin_phi * theta.cos(),
            );

            camera.eye = self.target + offset;
        }

        camera.look_at(self.target);

        if self.enable_damping {
            self.theta_delta *= 1.0 - self.damping_factor;
            self.phi_delta *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vec3::ZERO;
        }

        self.scale = 1.0;
    }

    pub fn save_state(&mut self, camera: &Camera) {
        self.saved = SavedState {
            target: self.target,
            eye: camera.eye,
        };
    }

    /// Returns to the last saved state on the next update.
    pub fn reset(&mut self) {
        self.clear_motion();
        self.target = self.saved.target;
        self.pending_reset = Some(self.saved.eye);
    }

    fn clear_motion(&mut self) {
        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;
        self.pending_reset = None;
    }

    /// Stops reacting to input and drops any motion still in flight.
    pub fn dispose(&mut self) {
        self.enabled = false;
        self.clear_motion();
    }

    #[cfg(test)]
    fn is_settled(&self) -> bool {
        self.theta_delta.abs() < 1e-4 && self.phi_delta.abs() < 1e-4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at(eye: Vec3) -> Camera {
        let mut camera = Camera::perspective(75.0, 1.0, 0.1, 1000.0);
        camera.eye = eye;
        camera.look_at(Vec3::ZERO);
        camera
    }

    #[test]
    fn update_without_input_keeps_camera_in_place() {
        let mut camera = camera_at(Vec3::new(1.0, 2.0, 5.0));
        let mut controls = OrbitControls::new(&camera);
        controls.enable_damping = true;

        controls.update(&mut camera);

        assert!(camera.eye.abs_diff_eq(Vec3::new(1.0, 2.0, 5.0), 1e-4));
        assert_eq!(camera.target, Vec3::ZERO);
    }

    #[test]
    fn damped_rotation_spreads_over_frames_and_preserves_distance() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&camera);
        controls.enable_damping = true;
        controls.damping_factor = 0.25;

        controls.rotate_left(-1.0);
        controls.update(&mut camera);
        let first_angle = camera.eye.x.atan2(camera.eye.z);
        assert!((first_angle - 0.25).abs() < 1e-4);

        for _ in 0..100 {
            controls.update(&mut camera);
        }

        let settled_angle = camera.eye.x.atan2(camera.eye.z);
        assert!((settled_angle - 1.0).abs() < 1e-3);
        assert!((camera.eye.length() - 5.0).abs() < 1e-3);
        assert!(controls.is_settled());
    }

    #[test]
    fn polar_angle_stays_off_the_poles() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&camera);

        controls.rotate_up(10.0);
        controls.update(&mut camera);

        assert!(camera.eye.y > 4.99);
        assert!(camera.eye.z > 0.0);
        assert!(camera.eye.is_finite());
    }

    #[test]
    fn wheel_zooms_towards_target() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0));
        let mut controls = OrbitControls::new(&camera);

        controls.handle_event(PointerEvent::Wheel { delta: 1.0 }, &camera, 400);
        controls.update(&mut camera);
        assert!((camera.eye.z - 9.5).abs() < 1e-4);

        controls.handle_event(PointerEvent::Wheel { delta: -1.0 }, &camera, 400);
        controls.update(&mut camera);
        assert!((camera.eye.z - 10.0).abs() < 1e-4);
    }

    #[test]
    fn zoom_can_be_disabled() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 10.0));
        let mut controls = OrbitControls::new(&camera);
        controls.enable_zoom = false;

        controls.handle_event(PointerEvent::Wheel { delta: 1.0 }, &camera, 400);
        controls.update(&mut camera);

        assert!((camera.eye.z - 10.0).abs() < 1e-4);
    }

    #[test]
    fn secondary_drag_pans_target_and_camera_together() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&camera);

        let drag = PointerEvent::Drag {
            button: PointerButton::Secondary,
            delta: Vec2::new(100.0, 0.0),
        };
        controls.handle_event(drag, &camera, 400);
        controls.update(&mut camera);

        assert!(controls.target.x < 0.0);
        assert!(controls.target.y.abs() < 1e-5);
        assert!((camera.eye - controls.target).abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-4));
    }

    #[test]
    fn double_click_restores_saved_state() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&camera);
        controls.save_state(&camera);

        controls.rotate_left(1.0);
        controls.handle_event(PointerEvent::Wheel { delta: 1.0 }, &camera, 400);
        controls.update(&mut camera);
        assert!(!camera.eye.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-3));

        controls.handle_event(PointerEvent::DoubleClick, &camera, 400);
        controls.update(&mut camera);

        assert!(camera.eye.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-4));
        assert_eq!(controls.target, Vec3::ZERO);
    }

    #[test]
    fn disposed_controls_ignore_input() {
        let mut camera = camera_at(Vec3::new(0.0, 0.0, 5.0));
        let mut controls = OrbitControls::new(&camera);
        controls.rotate_left(1.0);

        controls.dispose();
        let drag = PointerEvent::Drag {
            button: PointerButton::Primary,
            delta: Vec2::new(200.0, 0.0),
        };
        controls.handle_event(drag, &camera, 400);
        controls.update(&mut camera);

        assert!(!controls.enabled);
        assert!(camera.eye.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-4));
    }
}
