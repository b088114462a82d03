// Synchronization primitives for the single frame
//
// One semaphore (GPU-side: gates rendering on image acquisition) and one
// fence (host-side: signals draw completion). Both live for exactly one
// frame and are destroyed once the frame is done.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Per-wait timeout for the fence poll, in nanoseconds (100ms)
pub const FENCE_TIMEOUT_NS: u64 = 100_000_000;

/// Synchronization objects for one frame
pub struct FrameSync {
    pub image_acquired: vk::Semaphore,
    pub draw_fence: vk::Fence,
}

impl FrameSync {
    /// Create the semaphore and an unsignaled fence
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default();

        unsafe {
            Ok(Self {
                image_acquired: device.device.create_semaphore(&semaphore_info, None)?,
                draw_fence: device.device.create_fence(&fence_info, None)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_acquired, None);
            device.destroy_fence(self.draw_fence, None);
        }
    }
}

/// Block until `fence` signals, polling with `FENCE_TIMEOUT_NS` per wait.
///
/// Only a timeout keeps the loop going; every other failure is returned.
/// There is no retry cap and no way to cancel the wait.
pub fn wait_for_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    poll_fence(|| unsafe { device.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS) })?;
    Ok(())
}

fn poll_fence(
    mut wait: impl FnMut() -> std::result::Result<(), vk::Result>,
) -> std::result::Result<(), vk::Result> {
    loop {
        match wait() {
            Ok(()) => return Ok(()),
            Err(vk::Result::TIMEOUT) => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_exits_on_signal() {
        assert_eq!(poll_fence(|| Ok(())), Ok(()));
    }

    #[test]
    fn poll_retries_through_timeouts() {
        let mut waits = 0;
        let result = poll_fence(|| {
            waits += 1;
            if waits < 5 {
                Err(vk::Result::TIMEOUT)
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Ok(()));
        assert_eq!(waits, 5);
    }

    #[test]
    fn poll_surfaces_non_timeout_errors() {
        let mut waits = 0;
        let result = poll_fence(|| {
            waits += 1;
            if waits == 1 {
                Err(vk::Result::TIMEOUT)
            } else {
                Err(vk::Result::ERROR_DEVICE_LOST)
            }
        });
        assert_eq!(result, Err(vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(waits, 2);
    }
}
