// =============================================================================
// DRAW CUBE - single-frame Vulkan sample
// =============================================================================
//
// Renders one frame of a cube (currently its eight corners, drawn as points)
// and presents it. The flow is strictly linear:
//
//   1. Bootstrap: instance, device, queues, surface, swapchain, pipeline state
//   2. Record and submit a single command buffer with one draw call
//   3. Poll the completion fence, present, optionally save the frame
//   4. Tear everything down in reverse creation order and exit 0
//
// There is no render loop; after the frame is on screen the app waits the
// configured dwell time and shuts down.
//
// =============================================================================

mod backend;
mod config;
mod cube;

use anyhow::{Context, Result};
use ash::vk;
use backend::buffer::{DepthBuffer, DeviceBuffer};
use backend::sync::FrameSync;
use backend::{capture, descriptor, pipeline, shader, sync, Swapchain, VulkanDevice};
use clap::Parser;
use config::{CliArgs, Config};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let args = CliArgs::parse();

    init_logging();

    let config = Config::load(&args);
    log::info!("Starting single-frame draw");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.take_failure().map_or(Ok(()), Err)
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// All Vulkan resources of the sample.
///
/// Everything is created once during setup and destroyed exactly once in
/// Drop, in the exact reverse of creation order.
struct App {
    config: Config,

    // Window & surface
    window: Option<Arc<Window>>,
    surface: Option<vk::SurfaceKHR>,
    surface_loader: Option<ash::khr::surface::Instance>,

    // Vulkan core
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,

    // Commands
    command_pool: Option<vk::CommandPool>,
    command_buffer: Option<vk::CommandBuffer>,

    // Frame resources, in creation order
    depth: Option<DepthBuffer>,
    uniform_buffer: Option<DeviceBuffer>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    pipeline_layout: Option<vk::PipelineLayout>,
    render_pass: Option<vk::RenderPass>,
    shader_modules: Option<(vk::ShaderModule, vk::ShaderModule)>,
    framebuffers: Vec<vk::Framebuffer>,
    vertex_buffer: Option<DeviceBuffer>,
    descriptor_pool: Option<vk::DescriptorPool>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    pipeline_cache: Option<vk::PipelineCache>,
    pipeline: Option<vk::Pipeline>,

    // The one frame
    frame_done: bool,
    deadline: Option<Instant>,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            surface: None,
            surface_loader: None,
            device: None,
            swapchain: None,
            command_pool: None,
            command_buffer: None,
            depth: None,
            uniform_buffer: None,
            set_layouts: Vec::new(),
            pipeline_layout: None,
            render_pass: None,
            shader_modules: None,
            framebuffers: Vec::new(),
            vertex_buffer: None,
            descriptor_pool: None,
            descriptor_sets: Vec::new(),
            pipeline_cache: None,
            pipeline: None,
            frame_done: false,
            deadline: None,
            failure: None,
        }
    }

    /// The first error that forced the app to exit, if any
    fn take_failure(&mut self) -> Option<anyhow::Error> {
        self.failure.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        event_loop.exit();
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Create every Vulkan object the frame needs, in the order the
    /// teardown will later reverse.
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

        log::info!("Initializing Vulkan...");

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        // Instance, physical device, logical device, queues, allocator
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let device = VulkanDevice::new(&self.config.window.title, display_handle, enable_validation)?;

        // Surface
        let surface_loader = ash::khr::surface::Instance::new(&device.entry, &device.instance);
        let surface = unsafe {
            ash_window::create_surface(
                &device.entry,
                &device.instance,
                display_handle,
                window_handle,
                None,
            )
            .context("Failed to create window surface")?
        };

        let surface_support = unsafe {
            surface_loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface,
            )?
        };
        if !surface_support {
            anyhow::bail!("GPU doesn't support presenting to this surface");
        }

        self.device = Some(device.clone());
        self.surface = Some(surface);

        // Command pool and the one primary command buffer
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue_family);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None)? };
        self.command_pool = Some(command_pool);

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info)? };
        self.command_buffer = Some(command_buffers[0]);

        // Swapchain and depth attachment
        let size = window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            surface,
            &surface_loader,
            size.width,
            size.height,
            self.config.get_present_mode(),
        )?;
        self.surface_loader = Some(surface_loader);
        let depth = DepthBuffer::new(&device, swapchain.extent)?;

        // Uniform buffer, written once on the host before submission
        let mut uniform_buffer = DeviceBuffer::new(
            &device,
            cube::UNIFORM_BUFFER_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "uniforms",
        )?;
        uniform_buffer.write(cube::FrameUniforms::for_extent(swapchain.extent).as_bytes())?;

        // Descriptor layouts, pipeline layout, render pass
        let set_layouts = descriptor::create_set_layouts(&device)?;
        let pipeline_layout = pipeline::create_pipeline_layout(&device, &set_layouts)?;
        let render_pass =
            pipeline::create_render_pass(&device, swapchain.format, depth.format)?;

        // Shaders
        let vert_shader = shader::load_shader_module(&device, "shaders/cube.vert.spv")?;
        let frag_shader = shader::load_shader_module(&device, "shaders/cube.frag.spv")?;

        // Framebuffers and the fixed vertex data
        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            depth.view,
            render_pass,
            swapchain.extent,
        )?;
        let vertex_buffer = DeviceBuffer::new_with_data(
            &device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            cube::vertex_bytes(),
            "vertices",
        )?;

        // Descriptor pool and sets; the uniforms live in set 2
        let descriptor_pool = descriptor::create_descriptor_pool(&device)?;
        let descriptor_sets = descriptor::allocate_sets(&device, descriptor_pool, &set_layouts)?;
        descriptor::write_uniform_set(
            &device,
            descriptor_sets[descriptor::UNIFORM_SET_INDEX as usize],
            uniform_buffer.buffer,
            cube::UNIFORM_BUFFER_SIZE,
        );

        // Pipeline cache, then the pipeline itself
        let pipeline_cache = pipeline::create_pipeline_cache(&device)?;
        let graphics_pipeline = pipeline::create_graphics_pipeline(
            &device,
            pipeline_layout,
            render_pass,
            pipeline_cache,
            vert_shader,
            frag_shader,
        )?;

        self.swapchain = Some(swapchain);
        self.depth = Some(depth);
        self.uniform_buffer = Some(uniform_buffer);
        self.set_layouts = set_layouts;
        self.pipeline_layout = Some(pipeline_layout);
        self.render_pass = Some(render_pass);
        self.shader_modules = Some((vert_shader, frag_shader));
        self.framebuffers = framebuffers;
        self.vertex_buffer = Some(vertex_buffer);
        self.descriptor_pool = Some(descriptor_pool);
        self.descriptor_sets = descriptor_sets;
        self.pipeline_cache = Some(pipeline_cache);
        self.pipeline = Some(graphics_pipeline);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    // =========================================================================
    // THE SINGLE FRAME
    // =========================================================================

    /// Acquire, record, submit, wait, present. Each step is a hard
    /// precondition for the next; any failure propagates and ends the run.
    fn render_frame(&mut self) -> Result<()> {
        let device = self.device.as_ref().context("Device not initialized")?;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let cmd = self.command_buffer.context("Command buffer not allocated")?;
        let uniform_buffer = self.uniform_buffer.as_ref().context("Uniforms not created")?;
        let vertex_buffer = self.vertex_buffer.as_ref().context("Vertices not created")?;

        // Per-frame sync objects; destroyed at the end of this frame
        let frame_sync = FrameSync::new(device)?;
        let result = self.submit_and_present(
            device.clone(),
            swapchain,
            cmd,
            uniform_buffer.buffer,
            vertex_buffer.buffer,
            &frame_sync,
        );
        frame_sync.destroy(&device.device);
        result
    }

    fn submit_and_present(
        &self,
        device: Arc<VulkanDevice>,
        swapchain: &Swapchain,
        cmd: vk::CommandBuffer,
        uniform_buffer: vk::Buffer,
        vertex_buffer: vk::Buffer,
        frame_sync: &FrameSync,
    ) -> Result<()> {
        // Step 1: acquire the next swapchain image. Suboptimal and
        // out-of-date surfaces are fatal here, not recovered.
        let image_index = swapchain.acquire_next_image(u64::MAX, frame_sync.image_acquired)?;

        // Step 2: record the command buffer
        let clear_values = pipeline::clear_values(self.config.graphics.clear_color);
        let render_pass = self.render_pass.context("Render pass not created")?;
        let graphics_pipeline = self.pipeline.context("Pipeline not created")?;
        let pipeline_layout = self.pipeline_layout.context("Pipeline layout not created")?;
        let descriptor_set = self.descriptor_sets[descriptor::UNIFORM_SET_INDEX as usize];

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default();
            device.device.begin_command_buffer(cmd, &begin_info)?;

            // Make the host-written uniform data visible before the GPU
            // reads it anywhere in this submission
            let uniform_barrier = vk::BufferMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::HOST_WRITE)
                .dst_access_mask(vk::AccessFlags::UNIFORM_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(uniform_buffer)
                .offset(0)
                .size(cube::UNIFORM_BUFFER_SIZE);

            device.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::HOST,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[uniform_barrier],
                &[],
            );

            let rp_begin = vk::RenderPassBeginInfo::default()
                .render_pass(render_pass)
                .framebuffer(self.framebuffers[image_index as usize])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: swapchain.extent,
                })
                .clear_values(&clear_values);

            device
                .device
                .cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

            device.device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                graphics_pipeline,
            );

            // The shaders read their uniforms from set index 2
            device.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline_layout,
                descriptor::UNIFORM_SET_INDEX,
                &[descriptor_set],
                &[],
            );

            device
                .device
                .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: swapchain.extent.width as f32,
                height: swapchain.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent,
            };
            device.device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.device.cmd_set_scissor(cmd, 0, &[scissor]);

            // The one draw call of the whole program
            device.device.cmd_draw(cmd, cube::POINT_COUNT, 1, 0, 0);

            device.device.cmd_end_render_pass(cmd);
            device.device.end_command_buffer(cmd)?;
        }

        // Step 3: submit, waiting on the acquire semaphore at the
        // color-attachment-output stage, signaling the draw fence
        let wait_semaphores = [frame_sync.image_acquired];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], frame_sync.draw_fence)
                .context("Failed to submit the draw")?;
        }

        // Step 4: poll the fence until the GPU is done; only a timeout
        // keeps the loop alive
        sync::wait_for_fence(&device.device, frame_sync.draw_fence)?;

        // Step 5: present on the present queue
        swapchain.present(device.present_queue, image_index, &[])?;

        // Step 6: optional frame capture
        if self.config.debug.save_image {
            let command_pool = self.command_pool.context("Command pool not created")?;
            capture::save_frame(
                &device,
                swapchain,
                image_index,
                command_pool,
                capture::CAPTURE_FILE,
            )?;
        }

        Ok(())
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        if let Err(e) = self.init_vulkan(window.clone()) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
            return;
        }

        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                if self.frame_done {
                    return;
                }

                match self.render_frame() {
                    Ok(()) => {
                        self.frame_done = true;
                        let deadline = Instant::now()
                            + Duration::from_secs_f32(self.config.graphics.display_seconds);
                        self.deadline = Some(deadline);
                        event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
                        log::info!(
                            "Frame presented; exiting in {:.1}s",
                            self.config.graphics.display_seconds
                        );
                    }
                    Err(e) => {
                        self.fail(event_loop, e.context("Failed to render the frame"));
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                event_loop.exit();
            } else {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let Some(device) = self.device.clone() else {
            return;
        };

        // Nothing may still be in flight; the frame fence was already
        // observed signaled, this covers presentation
        let _ = device.wait_idle();

        unsafe {
            // Destroy in reverse order of creation

            if let Some(pipeline) = self.pipeline.take() {
                device.device.destroy_pipeline(pipeline, None);
            }
            if let Some(cache) = self.pipeline_cache.take() {
                device.device.destroy_pipeline_cache(cache, None);
            }
            // Destroying the pool frees its descriptor sets
            if let Some(pool) = self.descriptor_pool.take() {
                device.device.destroy_descriptor_pool(pool, None);
            }
            self.descriptor_sets.clear();

            if let Some(mut buffer) = self.vertex_buffer.take() {
                buffer.destroy(&device);
            }
            for framebuffer in self.framebuffers.drain(..) {
                device.device.destroy_framebuffer(framebuffer, None);
            }
            if let Some((vert, frag)) = self.shader_modules.take() {
                device.device.destroy_shader_module(frag, None);
                device.device.destroy_shader_module(vert, None);
            }
            if let Some(render_pass) = self.render_pass.take() {
                device.device.destroy_render_pass(render_pass, None);
            }
            if let Some(layout) = self.pipeline_layout.take() {
                device.device.destroy_pipeline_layout(layout, None);
            }
            for set_layout in self.set_layouts.drain(..) {
                device.device.destroy_descriptor_set_layout(set_layout, None);
            }

            if let Some(mut buffer) = self.uniform_buffer.take() {
                buffer.destroy(&device);
            }
            if let Some(mut depth) = self.depth.take() {
                depth.destroy(&device);
            }

            // The swapchain's Drop destroys its views and handle
            self.swapchain = None;

            if let (Some(pool), Some(cmd)) = (self.command_pool, self.command_buffer.take()) {
                device.device.free_command_buffers(pool, &[cmd]);
            }
            if let Some(pool) = self.command_pool.take() {
                device.device.destroy_command_pool(pool, None);
            }

            if let (Some(surface), Some(ref loader)) = (self.surface.take(), &self.surface_loader)
            {
                loader.destroy_surface(surface, None);
            }

            // The device (and with it instance and allocator) drops last,
            // when the final Arc goes away
        }

        self.device = None;
        log::info!("Cleanup complete");
    }
}
