// Descriptor layouts, pool, and the uniform set
//
// The shaders read their uniform block from set 2, binding 0. The pipeline
// layout therefore spans three identical set layouts so that set index 2 is
// addressable; only the last set is ever written or bound.

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Number of descriptor sets in the pipeline layout
pub const DESCRIPTOR_SET_COUNT: usize = 3;
/// The set index the shaders bind their uniforms to
pub const UNIFORM_SET_INDEX: u32 = 2;

/// Create `DESCRIPTOR_SET_COUNT` identical layouts, each with a single
/// uniform-buffer binding visible to both shader stages.
pub fn create_set_layouts(device: &VulkanDevice) -> Result<Vec<vk::DescriptorSetLayout>> {
    let binding = vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);

    let bindings = [binding];
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

    (0..DESCRIPTOR_SET_COUNT)
        .map(|_| unsafe {
            device
                .device
                .create_descriptor_set_layout(&create_info, None)
                .context("Failed to create descriptor set layout")
        })
        .collect()
}

pub fn create_descriptor_pool(device: &VulkanDevice) -> Result<vk::DescriptorPool> {
    let pool_size = vk::DescriptorPoolSize::default()
        .ty(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(DESCRIPTOR_SET_COUNT as u32);

    let pool_sizes = [pool_size];
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(DESCRIPTOR_SET_COUNT as u32)
        .pool_sizes(&pool_sizes);

    unsafe {
        device
            .device
            .create_descriptor_pool(&pool_info, None)
            .context("Failed to create descriptor pool")
    }
}

pub fn allocate_sets(
    device: &VulkanDevice,
    pool: vk::DescriptorPool,
    layouts: &[vk::DescriptorSetLayout],
) -> Result<Vec<vk::DescriptorSet>> {
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(layouts);

    unsafe {
        device
            .device
            .allocate_descriptor_sets(&alloc_info)
            .context("Failed to allocate descriptor sets")
    }
}

/// Point `set` binding 0 at the uniform buffer
pub fn write_uniform_set(
    device: &VulkanDevice,
    set: vk::DescriptorSet,
    buffer: vk::Buffer,
    range: vk::DeviceSize,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range);

    let buffer_infos = [buffer_info];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&buffer_infos);

    unsafe {
        device.device.update_descriptor_sets(&[write], &[]);
    }
}
