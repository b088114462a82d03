// Backend module - Vulkan bootstrap and teardown helpers
//
// Thin wrappers around ash: device/queue creation, swapchain, buffers,
// descriptors, pipeline state, per-frame sync, and frame capture.

pub mod buffer;
pub mod capture;
pub mod descriptor;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
