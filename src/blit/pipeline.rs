//! wgpu blit backend.

use std::sync::Arc;

use wgpu::*;
use winit::window::Window;

use crate::error::RenderError;
use crate::layout::PixelRect;

use super::{BlitBackend, BlitStats, UploadPlan, plan_upload};

const SURFACE_FRAME_LATENCY: u32 = 2;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    tex_coords: [f32; 2],
}

/// Pipeline, destination texture, quad geometry, and their bind group.
///
/// Created together on context acquisition and dropped together when the
/// backend is released; the window's GPU context itself is never forcibly
/// invalidated, so an immediate remount onto the same window skips a full
/// re-initialization.
struct FrameResources {
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    bind_group: BindGroup,
    texture: Texture,
    sampler: Sampler,
    vertex_buffer: Buffer,
}

/// Production [`BlitBackend`] on a winit window.
///
/// One destination texture the size of the framebuffer, a unit quad
/// stretched over the surface, and exactly one draw call per frame. All
/// compositing happened in the rasterizer; the fragment stage samples the
/// texture untouched.
pub struct WgpuBlit {
    device: Arc<Device>,
    queue: Arc<Queue>,
    surface: Surface<'static>,
    config: SurfaceConfiguration,
    resources: FrameResources,
    needs_full_upload: bool,
}

impl WgpuBlit {
    /// Acquire a GPU context on `window` sized for a `width x height`
    /// framebuffer. Fatal when no adapter fits; the caller supplies a
    /// fallback backend instead.
    pub async fn new(window: Arc<Window>, width: u32, height: u32) -> Result<Self, RenderError> {
        // Platform-specific backend selection for better VM compatibility
        // Windows: Use DX12 (Vulkan may not work in VMs like Parallels)
        // macOS: Use Metal (native)
        // Linux: Try Vulkan first, fall back to GL for VM compatibility
        #[cfg(target_os = "windows")]
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::DX12,
            ..Default::default()
        });
        #[cfg(target_os = "macos")]
        let instance = Instance::default();
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::VULKAN | Backends::GL,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::AdapterNotFound)?;

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("blit device"),
                required_features: Features::empty(),
                required_limits: Limits::default(),
                memory_hints: MemoryHints::default(),
                ..Default::default()
            })
            .await?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let surface_caps = surface.get_capabilities(&adapter);
        // Non-sRGB keeps the rasterizer's bytes unmodified on screen.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let present_mode = if surface_caps.present_modes.contains(&PresentMode::Fifo) {
            PresentMode::Fifo
        } else {
            surface_caps.present_modes[0]
        };

        let alpha_mode = if surface_caps
            .alpha_modes
            .contains(&CompositeAlphaMode::Opaque)
        {
            CompositeAlphaMode::Opaque
        } else if surface_caps.alpha_modes.contains(&CompositeAlphaMode::Auto) {
            CompositeAlphaMode::Auto
        } else {
            surface_caps.alpha_modes[0]
        };

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: SURFACE_FRAME_LATENCY,
        };
        surface.configure(&device, &config);

        let resources = FrameResources::new(&device, surface_format, config.width, config.height);
        log::info!(
            "Blit context ready: {}x{} {:?}, present mode {:?}",
            config.width,
            config.height,
            surface_format,
            present_mode,
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            resources,
            needs_full_upload: true,
        })
    }

    fn upload_full(&self, frame: &[u8]) {
        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture: &self.resources.texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            frame,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.config.width),
                rows_per_image: Some(self.config.height),
            },
            Extent3d {
                width: self.config.width,
                height: self.config.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Upload one sub-rectangle, addressing into the full bitmap via the
    /// copy offset and the framebuffer-wide row stride.
    fn upload_region(&self, frame: &[u8], rect: PixelRect) {
        let stride = 4 * self.config.width;
        self.queue.write_texture(
            TexelCopyTextureInfo {
                texture: &self.resources.texture,
                mip_level: 0,
                origin: Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: TextureAspect::All,
            },
            frame,
            TexelCopyBufferLayout {
                offset: (rect.y as u64 * stride as u64) + (rect.x as u64 * 4),
                bytes_per_row: Some(stride),
                rows_per_image: Some(rect.height),
            },
            Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl BlitBackend for WgpuBlit {
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.config.width && height == self.config.height {
            return Ok(());
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.resources
            .recreate_texture(&self.device, width, height);
        self.needs_full_upload = true;
        Ok(())
    }

    fn present(
        &mut self,
        frame: &[u8],
        regions: Option<&[PixelRect]>,
    ) -> Result<BlitStats, RenderError> {
        let expected = self.config.width as usize * self.config.height as usize * 4;
        if frame.len() != expected {
            return Err(RenderError::InvalidFrameData {
                expected,
                actual: frame.len(),
            });
        }

        let plan = plan_upload(
            self.config.width,
            self.config.height,
            regions,
            self.needs_full_upload,
        );
        let mut stats = BlitStats {
            draw_calls: 1,
            ..Default::default()
        };
        match &plan {
            UploadPlan::Full => {
                self.upload_full(frame);
                stats.bytes_uploaded = expected;
                stats.upload_rects = 1;
                stats.full_upload = true;
            }
            UploadPlan::Regions(rects) => {
                for rect in rects {
                    self.upload_region(frame, *rect);
                    stats.bytes_uploaded += rect.byte_count();
                }
                stats.upload_rects = rects.len();
            }
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("blit encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("blit pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&self.resources.pipeline);
            render_pass.set_bind_group(0, &self.resources.bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.resources.vertex_buffer.slice(..));
            render_pass.draw(0..4, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.needs_full_upload = false;
        Ok(stats)
    }
}

impl FrameResources {
    fn new(device: &Device, surface_format: TextureFormat, width: u32, height: u32) -> Self {
        let shader = device.create_shader_module(include_wgsl!("../shaders/blit.wgsl"));

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("blit bind group layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("blit pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("blit pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as BufferAddress,
                    step_mode: VertexStepMode::Vertex,
                    attributes: &vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    // The frame is opaque and covers the whole surface.
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::ALL,
                })],
            }),
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("blit sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });

        let vertex_buffer = {
            use wgpu::util::DeviceExt;

            let vertices = [
                Vertex {
                    position: [0.0, 0.0],
                    tex_coords: [0.0, 0.0],
                },
                Vertex {
                    position: [1.0, 0.0],
                    tex_coords: [1.0, 0.0],
                },
                Vertex {
                    position: [0.0, 1.0],
                    tex_coords: [0.0, 1.0],
                },
                Vertex {
                    position: [1.0, 1.0],
                    tex_coords: [1.0, 1.0],
                },
            ];
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("blit vertex buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: BufferUsages::VERTEX,
            })
        };

        let (texture, bind_group) =
            Self::create_texture(device, &bind_group_layout, &sampler, width, height);

        Self {
            pipeline,
            bind_group_layout,
            bind_group,
            texture,
            sampler,
            vertex_buffer,
        }
    }

    fn create_texture(
        device: &Device,
        layout: &BindGroupLayout,
        sampler: &Sampler,
        width: u32,
        height: u32,
    ) -> (Texture, BindGroup) {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("frame texture"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("blit bind group"),
            layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(sampler),
                },
            ],
        });
        (texture, bind_group)
    }

    fn recreate_texture(&mut self, device: &Device, width: u32, height: u32) {
        let (texture, bind_group) =
            Self::create_texture(device, &self.bind_group_layout, &self.sampler, width, height);
        self.texture = texture;
        self.bind_group = bind_group;
    }
}

impl std::fmt::Debug for WgpuBlit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBlit")
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .field("format", &self.config.format)
            .finish_non_exhaustive()
    }
}
