//! Global uniform bindings for camera and scene lighting
//!
//! One uniform buffer holds the per-frame data shared by every draw: the
//! camera matrices and the ambient plus directional light. It is bound to
//! slot 0 in all render pipelines.

use crate::{
    gfx::{camera::camera_utils::CameraUniform, scene::LightRig},
    wgpu_utils::{
        binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc},
        uniform_buffer::UniformBuffer,
    },
};

/// Global uniform buffer content structure
///
/// MUST match the `Globals` struct in the shaders exactly.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalUBOContent {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
    /// rgb = color, a = intensity
    ambient: [f32; 4],
    /// xyz = direction towards the light
    light_direction: [f32; 4],
    /// rgb = color, a = intensity
    light_color: [f32; 4],
}

impl GlobalUBOContent {
    pub fn new(camera: CameraUniform, lights: &LightRig) -> Self {
        let [dx, dy, dz] = lights.direction_to_light();
        let [ar, ag, ab] = lights.ambient_color;
        let [lr, lg, lb] = lights.directional_color;
        Self {
            view_position: camera.view_position,
            view_proj: camera.view_proj,
            ambient: [ar, ag, ab, lights.ambient_intensity],
            light_direction: [dx, dy, dz, 0.0],
            light_color: [lr, lg, lb, lights.directional_intensity],
        }
    }
}

pub type GlobalUBO = UniformBuffer<GlobalUBOContent>;

/// Writes the frame's camera and light data
pub fn update_global_ubo(
    ubo: &mut GlobalUBO,
    queue: &wgpu::Queue,
    camera: CameraUniform,
    lights: &LightRig,
) {
    ubo.write(queue, &GlobalUBOContent::new(camera, lights));
}

/// Layout of the global uniform bind group
///
/// The live view and the offscreen capture each own a uniform buffer and a
/// bind group created from this one layout.
pub struct GlobalBindings {
    bind_group_layout: BindGroupLayoutWithDesc,
}

impl GlobalBindings {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = BindGroupLayoutBuilder::new()
            .uniform(wgpu::ShaderStages::VERTEX_FRAGMENT)
            .create(device, "Globals Bind Group");

        GlobalBindings { bind_group_layout }
    }

    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        ubo: &GlobalUBO,
        label: &str,
    ) -> wgpu::BindGroup {
        BindGroupBuilder::new(&self.bind_group_layout)
            .resource(ubo.binding_resource())
            .create(device, label)
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_layout() {
        assert_eq!(std::mem::size_of::<GlobalUBOContent>(), 128);

        let lights = LightRig {
            ambient_color: [1.0; 3],
            ambient_intensity: 1.5,
            directional_color: [1.0; 3],
            directional_intensity: 2.5,
            directional_position: [0.0, 10.0, 0.0],
        };
        let content = GlobalUBOContent::new(CameraUniform::default(), &lights);
        assert_eq!(content.light_direction, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(content.ambient[3], 1.5);
    }
}
