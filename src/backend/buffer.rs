// GPU buffers and the depth attachment
//
// Memory comes from the device's gpu-allocator instance. Every object here
// is created once during setup, written at most once from the host, and
// destroyed explicitly during teardown.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::VulkanDevice;

/// A buffer with its backing allocation
pub struct DeviceBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
}

impl DeviceBuffer {
    pub fn new(
        device: &VulkanDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .device
                .create_buffer(&buffer_info, None)
                .context("Failed to create buffer")?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for {} buffer", name))?;

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")?;
        }

        Ok(Self {
            buffer,
            size,
            allocation: Some(allocation),
        })
    }

    /// Create a host-visible buffer pre-filled with `data`
    pub fn new_with_data(
        device: &VulkanDevice,
        usage: vk::BufferUsageFlags,
        data: &[u8],
        name: &str,
    ) -> Result<Self> {
        let mut buffer = Self::new(
            device,
            data.len() as vk::DeviceSize,
            usage,
            MemoryLocation::CpuToGpu,
            name,
        )?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Copy `data` into the mapped allocation, starting at offset 0
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let allocation = self.allocation.as_mut().context("Buffer already destroyed")?;
        let mapped = allocation
            .mapped_slice_mut()
            .context("Buffer memory is not host visible")?;
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read back the mapped contents (host-visible buffers only)
    pub fn mapped(&self) -> Result<&[u8]> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_slice())
            .context("Buffer memory is not host visible")
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer allocation: {}", e);
            }
        }
        unsafe {
            device.device.destroy_buffer(self.buffer, None);
        }
        self.buffer = vk::Buffer::null();
    }
}

/// D32 depth attachment sized to the swapchain
pub struct DepthBuffer {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    allocation: Option<Allocation>,
}

impl DepthBuffer {
    pub fn new(device: &VulkanDevice, extent: vk::Extent2D) -> Result<Self> {
        let format = vk::Format::D32_SFLOAT;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .device
                .create_image(&image_info, None)
                .context("Failed to create depth image")?
        };

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: "depth",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .context("Failed to allocate depth image memory")?;

        unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .context("Failed to bind depth image memory")?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .device
                .create_image_view(&view_info, None)
                .context("Failed to create depth image view")?
        };

        Ok(Self {
            image,
            view,
            format,
            allocation: Some(allocation),
        })
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe {
            device.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.allocator.lock().free(allocation) {
                log::error!("Failed to free depth allocation: {}", e);
            }
        }
        unsafe {
            device.device.destroy_image(self.image, None);
        }
    }
}
