// Frame capture - read the presented swapchain image back and save it
//
// Copies the image into a host-visible staging buffer with a one-shot
// command buffer, then encodes it as a PNG.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::path::Path;
use std::sync::Arc;

use super::buffer::DeviceBuffer;
use super::{sync, Swapchain, VulkanDevice};

/// Fixed output file written when the save flag is set
pub const CAPTURE_FILE: &str = "draw-cube.png";

/// Save the swapchain image at `image_index` to `path` as a PNG.
///
/// The image is expected to be in PRESENT_SRC layout (i.e. the render pass
/// has finished and its fence has been observed signaled).
pub fn save_frame<P: AsRef<Path>>(
    device: &Arc<VulkanDevice>,
    swapchain: &Swapchain,
    image_index: u32,
    command_pool: vk::CommandPool,
    path: P,
) -> Result<()> {
    let extent = swapchain.extent;
    let image = swapchain.images[image_index as usize];
    let size = vk::DeviceSize::from(extent.width) * vk::DeviceSize::from(extent.height) * 4;

    let mut staging = DeviceBuffer::new(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuToCpu,
        "capture",
    )?;

    let result = copy_image_to_staging(device, swapchain, image, &staging, command_pool)
        .and_then(|()| encode_png(&staging, swapchain.format, extent, path.as_ref()));

    staging.destroy(device);
    result
}

fn copy_image_to_staging(
    device: &Arc<VulkanDevice>,
    swapchain: &Swapchain,
    image: vk::Image,
    staging: &DeviceBuffer,
    command_pool: vk::CommandPool,
) -> Result<()> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info)? }[0];

    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    let copy_result = unsafe {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.device.begin_command_buffer(cmd, &begin_info)?;

        // PRESENT_SRC -> TRANSFER_SRC so the copy may read the image
        let to_transfer = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
            .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range);

        device.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: swapchain.extent.width,
                height: swapchain.extent.height,
                depth: 1,
            });

        device.device.cmd_copy_image_to_buffer(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            staging.buffer,
            &[region],
        );

        // Back to PRESENT_SRC; the image still belongs to the swapchain
        let to_present = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_READ)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ)
            .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range);

        device.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_present],
        );

        device.device.end_command_buffer(cmd)?;

        let fence = device
            .device
            .create_fence(&vk::FenceCreateInfo::default(), None)?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let submit_result = device
            .device
            .queue_submit(device.graphics_queue, &[submit_info], fence)
            .context("Failed to submit capture commands")
            .and_then(|()| sync::wait_for_fence(&device.device, fence));

        device.device.destroy_fence(fence, None);
        submit_result
    };

    unsafe {
        device.device.free_command_buffers(command_pool, &[cmd]);
    }

    copy_result
}

fn encode_png(
    staging: &DeviceBuffer,
    format: vk::Format,
    extent: vk::Extent2D,
    path: &Path,
) -> Result<()> {
    let byte_count = (extent.width * extent.height * 4) as usize;
    let mapped = staging.mapped()?;
    let rgba = to_rgba(format, &mapped[..byte_count]);

    let image = image::RgbaImage::from_raw(extent.width, extent.height, rgba)
        .context("Capture buffer does not match the image extent")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {:?}", path))?;

    log::info!("Saved frame to {:?}", path);
    Ok(())
}

/// Reorder raw swapchain pixels into RGBA byte order
fn to_rgba(format: vk::Format, data: &[u8]) -> Vec<u8> {
    match format {
        vk::Format::B8G8R8A8_SRGB | vk::Format::B8G8R8A8_UNORM => data
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], px[3]])
            .collect(),
        // Everything else the surface realistically reports is already RGBA
        _ => data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_pixels_swizzle_to_rgba() {
        let bgra = [10u8, 20, 30, 255, 40, 50, 60, 128];
        let rgba = to_rgba(vk::Format::B8G8R8A8_SRGB, &bgra);
        assert_eq!(rgba, vec![30, 20, 10, 255, 60, 50, 40, 128]);
    }

    #[test]
    fn rgba_pixels_pass_through() {
        let pixels = [1u8, 2, 3, 4];
        assert_eq!(to_rgba(vk::Format::R8G8B8A8_SRGB, &pixels), pixels.to_vec());
    }
}
