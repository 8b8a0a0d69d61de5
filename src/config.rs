//! Viewer configuration
//!
//! All tunables of the viewer live in [`ViewerConfig`]. Every field has a
//! default matching the stock viewer, so a JSON file only needs to mention
//! the values it overrides:
//!
//! ```no_run
//! use meshkiln::config::ViewerConfig;
//!
//! let config = ViewerConfig::from_json_str(r#"{ "camera": { "fov_degrees": 60.0 } }"#)?;
//! assert_eq!(config.bake.resolution, 1024);
//! # Ok::<(), meshkiln::error::ConfigError>(())
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Resolution of the square AO bake target
pub const AO_BAKE_RESOLUTION: u32 = 1024;

/// Largest texture side either renderer accepts
pub const MAX_TEXTURE_DIMENSION: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub framing: FramingConfig,
    pub controls: ControlsConfig,
    pub lights: LightsConfig,
    /// Linear RGB clear color of the live view
    pub background: [f32; 3],
    pub grid: GridConfig,
    pub bake: BakeConfig,
    pub pbr: PbrConfig,
    pub loader: LoaderConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            camera: CameraConfig::default(),
            framing: FramingConfig::default(),
            controls: ControlsConfig::default(),
            lights: LightsConfig::default(),
            background: hex_to_rgb(0x111827),
            grid: GridConfig::default(),
            bake: BakeConfig::default(),
            pbr: PbrConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "meshkiln".to_string(),
            width: 1200,
            height: 800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view, fixed for the lifetime of a session
    pub fov_degrees: f32,
    pub near: f32,
    /// Far plane used before any object has been framed
    pub far: f32,
    /// Distance of the camera from the origin before any object has been framed
    pub initial_distance: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            initial_distance: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Headroom so the model does not touch the viewport edges
    pub margin: f32,
    /// Safety multiplier against far-plane clipping of off-center models
    pub far_multiplier: f32,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            margin: 1.5,
            far_multiplier: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Fraction of the pending orbit motion applied per frame
    pub damping: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            damping: 0.05,
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            pan_speed: 0.01,
            min_distance: 1.0,
            max_distance: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub directional_color: [f32; 3],
    pub directional_intensity: f32,
    /// Position of the directional light; it shines towards the origin
    pub directional_position: [f32; 3],
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            ambient_color: [1.0, 1.0, 1.0],
            ambient_intensity: 1.5,
            directional_color: [1.0, 1.0, 1.0],
            directional_intensity: 2.5,
            directional_position: [5.0, 10.0, 7.5],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub visible: bool,
    pub size: f32,
    pub divisions: u32,
    pub color: [f32; 3],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            visible: true,
            size: 100.0,
            divisions: 100,
            color: hex_to_rgb(0x444444),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Edge length of the square bake target in pixels
    pub resolution: u32,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            resolution: AO_BAKE_RESOLUTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbrConfig {
    /// Metalness of synthesized materials (biased towards dielectric surfaces)
    pub metalness: f32,
    pub ao_intensity: f32,
}

impl Default for PbrConfig {
    fn default() -> Self {
        Self {
            metalness: 0.1,
            ao_intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Bytes read per progress step
    pub chunk_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
        }
    }
}

impl ViewerConfig {
    /// Parses and validates a JSON config
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Vertical field of view in radians
    pub fn fov_radians(&self) -> f32 {
        self.camera.fov_degrees.to_radians()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.camera.fov_degrees > 0.0 && self.camera.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid {
                field: "camera.fov_degrees",
                reason: format!("{} is outside (0, 180)", self.camera.fov_degrees),
            });
        }
        if self.camera.near <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "camera.near",
                reason: "must be positive".to_string(),
            });
        }
        if self.framing.margin <= 0.0 || self.framing.far_multiplier <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "framing",
                reason: "margin and far multiplier must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.controls.damping) {
            return Err(ConfigError::Invalid {
                field: "controls.damping",
                reason: format!("{} is outside [0, 1]", self.controls.damping),
            });
        }
        if self.controls.min_distance > self.controls.max_distance {
            return Err(ConfigError::Invalid {
                field: "controls.min_distance",
                reason: "exceeds controls.max_distance".to_string(),
            });
        }
        if self.bake.resolution == 0 || self.bake.resolution > MAX_TEXTURE_DIMENSION {
            return Err(ConfigError::Invalid {
                field: "bake.resolution",
                reason: format!(
                    "{} is outside 1..={}",
                    self.bake.resolution, MAX_TEXTURE_DIMENSION
                ),
            });
        }
        if self.loader.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "loader.chunk_size",
                reason: "must be at least one byte".to_string(),
            });
        }
        Ok(())
    }
}

/// Converts a `0xRRGGBB` sRGB color into linear RGB
pub fn hex_to_rgb(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stock_viewer() {
        let config = ViewerConfig::default();
        assert_eq!(config.camera.fov_degrees, 75.0);
        assert_eq!(config.bake.resolution, AO_BAKE_RESOLUTION);
        assert_eq!(config.pbr.metalness, 0.1);
        assert_eq!(config.pbr.ao_intensity, 1.0);
        assert_eq!(config.controls.damping, 0.05);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            ViewerConfig::from_json_str(r#"{ "bake": { "resolution": 512 }, "grid": { "visible": false } }"#)
                .unwrap();
        assert_eq!(config.bake.resolution, 512);
        assert!(!config.grid.visible);
        assert_eq!(config.grid.divisions, 100);
        assert_eq!(config.camera.near, 0.1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = ViewerConfig::from_json_str(r#"{ "bake": { "resolution": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "bake.resolution", .. }));

        let err = ViewerConfig::from_json_str(r#"{ "bake": { "resolution": 5000 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "bake.resolution", .. }));

        let err = ViewerConfig::from_json_str(r#"{ "camera": { "fov_degrees": 0.0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "camera.fov_degrees", .. }));

        let err = ViewerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_hex_to_rgb_endpoints() {
        assert_eq!(hex_to_rgb(0x000000), [0.0, 0.0, 0.0]);
        let white = hex_to_rgb(0xffffff);
        assert!(white.iter().all(|c| (c - 1.0).abs() < 1e-6));
    }
}
