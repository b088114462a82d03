// Shader module loading
//
// Vulkan consumes SPIR-V; build.rs compiles the GLSL sources in shaders/
// and this module loads the resulting .spv files at run time.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;

/// Load a SPIR-V file from disk and create a shader module from it
pub fn load_shader_module<P: AsRef<Path>>(
    device: &VulkanDevice,
    path: P,
) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader {:?} (run glslc on shaders/?)", path))?;

    let code = ash::util::read_spv(&mut Cursor::new(&bytes))
        .with_context(|| format!("Invalid SPIR-V in {:?}", path))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}
