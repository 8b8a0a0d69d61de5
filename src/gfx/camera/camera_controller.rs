use winit::{
    dpi::PhysicalPosition,
    event::{DeviceEvent, ElementState, KeyEvent, MouseScrollDelta},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::config::ControlsConfig;

/// Camera motion request, already scaled by the controller's speeds
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraInput {
    /// Orbit angles in radians
    Rotate { yaw: f32, pitch: f32 },
    /// Pan in view-relative units, scaled by the camera distance when applied
    Pan { right: f32, up: f32 },
    /// Logarithmic zoom; positive moves away from the target
    Zoom(f32),
}

/// Turns raw winit device events into [`CameraInput`] values
///
/// Drag orbits, shift-drag pans and the wheel zooms.
pub struct CameraController {
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    is_shift_held: bool,
    is_mouse_pressed: bool,
}

impl CameraController {
    pub fn new(controls: &ControlsConfig) -> Self {
        Self {
            rotate_speed: controls.rotate_speed,
            zoom_speed: controls.zoom_speed,
            pan_speed: controls.pan_speed,
            is_shift_held: false,
            is_mouse_pressed: false,
        }
    }

    pub fn process_events(&mut self, event: &DeviceEvent) -> Option<CameraInput> {
        match event {
            DeviceEvent::Button {
                button: 0, // Left Mouse Button
                state,
            } => {
                self.is_mouse_pressed = *state == ElementState::Pressed;
                None
            }
            DeviceEvent::MouseWheel { delta } => {
                let scroll_amount = -match delta {
                    MouseScrollDelta::LineDelta(_, scroll) => *scroll,
                    MouseScrollDelta::PixelDelta(PhysicalPosition { y: scroll, .. }) => {
                        *scroll as f32 / 100.0
                    }
                };
                Some(CameraInput::Zoom(scroll_amount * self.zoom_speed))
            }
            DeviceEvent::MouseMotion { delta } if self.is_mouse_pressed => {
                let (dx, dy) = (delta.0 as f32, delta.1 as f32);
                if self.is_shift_held {
                    Some(CameraInput::Pan {
                        right: dx * self.pan_speed,
                        up: dy * self.pan_speed,
                    })
                } else {
                    Some(CameraInput::Rotate {
                        yaw: -dx * self.rotate_speed,
                        pitch: dy * self.rotate_speed,
                    })
                }
            }
            _ => None,
        }
    }

    pub fn process_keyed_events(&mut self, event: &KeyEvent) {
        if let KeyEvent {
            physical_key: PhysicalKey::Code(KeyCode::ShiftLeft | KeyCode::ShiftRight),
            state,
            ..
        } = event
        {
            self.is_shift_held = *state == ElementState::Pressed;
        }
    }

    /// Returns true if currently rotating
    pub fn is_rotating(&self) -> bool {
        self.is_mouse_pressed && !self.is_shift_held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_rotates_only_while_pressed() {
        let mut controller = CameraController::new(&ControlsConfig::default());
        let motion = DeviceEvent::MouseMotion { delta: (10.0, 0.0) };
        assert_eq!(controller.process_events(&motion), None);

        controller.process_events(&DeviceEvent::Button {
            button: 0,
            state: ElementState::Pressed,
        });
        assert!(controller.is_rotating());
        match controller.process_events(&motion) {
            Some(CameraInput::Rotate { yaw, pitch }) => {
                assert!((yaw + 0.05).abs() < 1e-6);
                assert_eq!(pitch, 0.0);
            }
            other => panic!("expected rotation, got {other:?}"),
        }
    }

    #[test]
    fn test_wheel_zooms() {
        let mut controller = CameraController::new(&ControlsConfig::default());
        let input = controller.process_events(&DeviceEvent::MouseWheel {
            delta: MouseScrollDelta::LineDelta(0.0, 1.0),
        });
        assert_eq!(input, Some(CameraInput::Zoom(-0.1)));
    }
}
