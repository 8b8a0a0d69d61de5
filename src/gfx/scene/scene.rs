use crate::{
    config::{GridConfig, LightsConfig, ViewerConfig},
    gfx::scene::{node::LoadedObject, vertex::LineVertex},
};

/// Ambient plus one directional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub ambient_color: [f32; 3],
    pub ambient_intensity: f32,
    pub directional_color: [f32; 3],
    pub directional_intensity: f32,
    /// The directional light shines from here towards the origin
    pub directional_position: [f32; 3],
}

impl From<&LightsConfig> for LightRig {
    fn from(config: &LightsConfig) -> Self {
        Self {
            ambient_color: config.ambient_color,
            ambient_intensity: config.ambient_intensity,
            directional_color: config.directional_color,
            directional_intensity: config.directional_intensity,
            directional_position: config.directional_position,
        }
    }
}

impl LightRig {
    /// Unit vector pointing from the surface towards the light
    pub fn direction_to_light(&self) -> [f32; 3] {
        let [x, y, z] = self.directional_position;
        let length = (x * x + y * y + z * z).sqrt();
        if length > 0.0 {
            [x / length, y / length, z / length]
        } else {
            [0.0, 1.0, 0.0]
        }
    }
}

/// Square line grid on the XZ plane, centered at the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    pub size: f32,
    pub divisions: u32,
    pub color: [f32; 3],
}

impl From<&GridConfig> for GridSettings {
    fn from(config: &GridConfig) -> Self {
        Self {
            size: config.size,
            divisions: config.divisions.max(1),
            color: config.color,
        }
    }
}

impl GridSettings {
    /// Line list: `divisions + 1` lines along each axis
    pub fn line_vertices(&self) -> Vec<LineVertex> {
        let half = self.size / 2.0;
        let step = self.size / self.divisions as f32;
        let mut vertices = Vec::with_capacity((self.divisions as usize + 1) * 4);
        for i in 0..=self.divisions {
            let offset = -half + step * i as f32;
            vertices.push(LineVertex { position: [-half, 0.0, offset] });
            vertices.push(LineVertex { position: [half, 0.0, offset] });
            vertices.push(LineVertex { position: [offset, 0.0, -half] });
            vertices.push(LineVertex { position: [offset, 0.0, half] });
        }
        vertices
    }
}

/// Everything drawn by a session besides the camera
pub struct Scene {
    /// Linear RGB clear color
    pub background: [f32; 3],
    pub lights: LightRig,
    pub grid: GridSettings,
    pub grid_visible: bool,
    object: Option<LoadedObject>,
}

impl Scene {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            background: config.background,
            lights: LightRig::from(&config.lights),
            grid: GridSettings::from(&config.grid),
            grid_visible: config.grid.visible,
            object: None,
        }
    }

    pub fn object(&self) -> Option<&LoadedObject> {
        self.object.as_ref()
    }

    pub fn object_mut(&mut self) -> Option<&mut LoadedObject> {
        self.object.as_mut()
    }

    /// Swaps in a new object, handing back the previous one
    pub fn replace_object(&mut self, object: LoadedObject) -> Option<LoadedObject> {
        self.object.replace(object)
    }

    pub fn take_object(&mut self) -> Option<LoadedObject> {
        self.object.take()
    }

    /// Disjoint borrows of the state an AO bake overrides
    pub fn bake_parts(&mut self) -> BakeParts<'_> {
        BakeParts {
            background: &mut self.background,
            grid_visible: &mut self.grid_visible,
            lights: &self.lights,
            object: self.object.as_mut(),
        }
    }
}

pub struct BakeParts<'a> {
    pub background: &'a mut [f32; 3],
    pub grid_visible: &'a mut bool,
    pub lights: &'a LightRig,
    pub object: Option<&'a mut LoadedObject>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_line_count() {
        let grid = GridSettings {
            size: 10.0,
            divisions: 10,
            color: [0.5; 3],
        };
        let vertices = grid.line_vertices();
        assert_eq!(vertices.len(), 44);
        assert_eq!(vertices[0].position, [-5.0, 0.0, -5.0]);
        assert_eq!(vertices.last().unwrap().position, [5.0, 0.0, 5.0]);
    }

    #[test]
    fn test_scene_defaults() {
        let scene = Scene::new(&ViewerConfig::default());
        assert_eq!(scene.lights.ambient_intensity, 1.5);
        assert_eq!(scene.lights.directional_intensity, 2.5);
        assert!(scene.grid_visible);
        assert!(scene.object().is_none());
    }
}
