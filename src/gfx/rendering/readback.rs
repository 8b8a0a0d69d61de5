//! Texture readback into tightly packed RGBA8 images

use futures::channel::oneshot;
use image::RgbaImage;

use crate::error::RenderError;

const BYTES_PER_PIXEL: usize = 4;

/// Rounds a row size up to wgpu's copy row alignment (256 bytes)
pub fn align_bytes_per_row(value: usize) -> usize {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    value.div_ceil(align) * align
}

/// Strips the row padding of a GPU copy and converts BGRA to RGBA if needed
pub fn depad_rows(
    padded: &[u8],
    width: u32,
    height: u32,
    padded_bytes_per_row: usize,
    swap_red_blue: bool,
) -> Vec<u8> {
    let tight_bytes_per_row = BYTES_PER_PIXEL * width as usize;
    let mut tight = Vec::with_capacity(tight_bytes_per_row * height as usize);
    for row in padded.chunks(padded_bytes_per_row).take(height as usize) {
        tight.extend_from_slice(&row[..tight_bytes_per_row]);
    }
    if swap_red_blue {
        for pixel in tight.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }
    }
    tight
}

/// Copies an RGBA8 or BGRA8 texture to the CPU
///
/// Blocks until the GPU finished the copy.
pub fn read_texture_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<RgbaImage, RenderError> {
    let (width, height) = (texture.width(), texture.height());
    let swap_red_blue = match texture.format() {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
        other => {
            return Err(RenderError::Readback(format!(
                "unsupported readback format {other:?}"
            )))
        }
    };

    let padded_bytes_per_row = align_bytes_per_row(BYTES_PER_PIXEL * width as usize);
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size: (padded_bytes_per_row * height as usize) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row as u32),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|err| RenderError::Readback(err.to_string()))?;

    pollster::block_on(receiver)
        .map_err(|_| RenderError::Readback("map callback was dropped".to_string()))?
        .map_err(|err| RenderError::Readback(err.to_string()))?;

    let pixels = {
        let data = slice.get_mapped_range();
        depad_rows(&data, width, height, padded_bytes_per_row, swap_red_blue)
    };
    staging.unmap();
    staging.destroy();

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| RenderError::Readback("readback size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_bytes_per_row() {
        assert_eq!(align_bytes_per_row(4), 256);
        assert_eq!(align_bytes_per_row(256), 256);
        assert_eq!(align_bytes_per_row(4096), 4096);
        assert_eq!(align_bytes_per_row(4100), 4352);
    }

    #[test]
    fn test_depad_and_swizzle() {
        // Two rows of one BGRA pixel, each padded to 8 bytes
        let padded = [3, 2, 1, 255, 0, 0, 0, 0, 30, 20, 10, 255, 0, 0, 0, 0];
        let tight = depad_rows(&padded, 1, 2, 8, true);
        assert_eq!(tight, vec![1, 2, 3, 255, 10, 20, 30, 255]);
    }
}
