//! Typed uniform buffers

use std::marker::PhantomData;

use wgpu::util::DeviceExt;

/// A uniform buffer holding exactly one `T`
///
/// The last bytes written are kept so a frame whose camera, light or material
/// parameters did not change costs no queue write.
pub struct UniformBuffer<T> {
    buffer: wgpu::Buffer,
    last_written: Vec<u8>,
    _content: PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    pub fn new(device: &wgpu::Device, label: &str, content: &T) -> Self {
        let bytes = bytemuck::bytes_of(content);
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytes,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            buffer,
            last_written: bytes.to_vec(),
            _content: PhantomData,
        }
    }

    /// Starts out zeroed; the first `write` always uploads
    pub fn zeroed(device: &wgpu::Device, label: &str) -> Self {
        let mut ubo = Self::new(device, label, &T::zeroed());
        ubo.last_written.clear();
        ubo
    }

    /// Uploads `content` unless it equals the previous write
    ///
    /// Returns whether a write was queued.
    pub fn write(&mut self, queue: &wgpu::Queue, content: &T) -> bool {
        let bytes = bytemuck::bytes_of(content);
        if self.last_written == bytes {
            return false;
        }
        queue.write_buffer(&self.buffer, 0, bytes);
        self.last_written.clear();
        self.last_written.extend_from_slice(bytes);
        true
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    /// Frees the GPU memory now instead of at drop
    pub fn destroy(&self) {
        self.buffer.destroy();
    }
}
