// Fixed geometry and per-frame uniforms for the sample.
//
// The "cube" is its eight corners drawn as points: each vertex carries the
// clip-space x/y of a corner plus the rasterized point size in z.

use ash::vk;

/// Number of vertices issued by the single draw call.
pub const POINT_COUNT: u32 = 8;

/// Allocated size of the uniform buffer. Larger than the block itself so the
/// whole range can be covered by one barrier regardless of device alignment.
pub const UNIFORM_BUFFER_SIZE: vk::DeviceSize = 256;

/// One point vertex: x, y in clip space, z is the point size in pixels.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PointVertex {
    pub position_size: [f32; 3],
}

pub const VERTEX_STRIDE: u32 = std::mem::size_of::<PointVertex>() as u32;

// TODO: replace the corner points with a real solid-cube vertex buffer so the
// sample draws the cube its name promises.
pub const CUBE_POINTS: [PointVertex; POINT_COUNT as usize] = [
    PointVertex { position_size: [-0.5, -0.5, 8.0] },
    PointVertex { position_size: [0.5, -0.5, 8.0] },
    PointVertex { position_size: [0.5, 0.5, 8.0] },
    PointVertex { position_size: [-0.5, 0.5, 8.0] },
    PointVertex { position_size: [-0.25, -0.25, 8.0] },
    PointVertex { position_size: [0.25, -0.25, 8.0] },
    PointVertex { position_size: [0.25, 0.25, 8.0] },
    PointVertex { position_size: [-0.25, 0.25, 8.0] },
];

/// Returns the vertex array as raw bytes for the upload.
pub fn vertex_bytes() -> &'static [u8] {
    unsafe {
        std::slice::from_raw_parts(
            CUBE_POINTS.as_ptr().cast::<u8>(),
            std::mem::size_of_val(&CUBE_POINTS),
        )
    }
}

/// Uniform block read by both shader stages (set 2, binding 0).
///
/// Layout matches the std140 `FrameUniforms` block in shaders/cube.vert.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FrameUniforms {
    /// x, y, width, height of the viewport
    pub viewport: [f32; 4],
    /// Per-axis scale applied to the point coordinate in the fragment stage
    pub viewport_scale: [f32; 4],
    /// near, far, far - near, padding
    pub depth_range: [f32; 4],
}

impl FrameUniforms {
    pub fn for_extent(extent: vk::Extent2D) -> Self {
        Self {
            viewport: [0.0, 0.0, extent.width as f32, extent.height as f32],
            viewport_scale: [1.0, 1.0, 1.0, 1.0],
            depth_range: [0.0, 1.0, 1.0, 0.0],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                (self as *const Self).cast::<u8>(),
                std::mem::size_of::<Self>(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_data_is_eight_points_at_stride_12() {
        assert_eq!(POINT_COUNT, 8);
        assert_eq!(VERTEX_STRIDE, 12);
        assert_eq!(vertex_bytes().len(), 96);
    }

    #[test]
    fn uniforms_fit_the_allocated_buffer() {
        let uniforms = FrameUniforms::for_extent(vk::Extent2D { width: 400, height: 300 });
        assert!(uniforms.as_bytes().len() as vk::DeviceSize <= UNIFORM_BUFFER_SIZE);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 48);
    }

    #[test]
    fn uniforms_carry_the_window_extent() {
        let uniforms = FrameUniforms::for_extent(vk::Extent2D { width: 400, height: 300 });
        assert_eq!(uniforms.viewport, [0.0, 0.0, 400.0, 300.0]);
        assert_eq!(uniforms.depth_range[2], uniforms.depth_range[1] - uniforms.depth_range[0]);
    }
}
