//! [`GraphicsDevice`] on top of `wgpu`.
//!
//! Resources live in handle tables. Draw calls are recorded on `submit` and
//! encoded on `frame`, one render pass per view, with a dynamic-offset
//! uniform slot per draw holding its model-view-projection matrix. Programs
//! expect that uniform at group 0, binding 0, and vertex inputs at the
//! locations given by [`Attrib::location`](crate::vertex::Attrib::location).

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use anyhow::Context;
use wgpu::util::DeviceExt;

use crate::commands::{DrawCall, DrawState, sort_draws};
use crate::gfx::{
    BufferFlags, ClearFlags, DebugFlags, GraphicsDevice, HandleTable, IndexBufferHandle, Init, ProgramHandle,
    RendererType, ResetFlags, ShaderHandle, VertexBufferHandle, ViewId,
};
use crate::vertex::{AttribType, VertexAttribute, VertexLayout};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
const DEFAULT_DRAW_CAPACITY: usize = 64;
const SPIRV_MAGIC: [u8; 4] = 0x0723_0203u32.to_le_bytes();

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    model_view_proj: glam::Mat4,
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;

struct VertexBuffer {
    buffer: wgpu::Buffer,
    layout: VertexLayout,
}

struct IndexBuffer {
    buffer: wgpu::Buffer,
    format: wgpu::IndexFormat,
}

struct Program {
    vertex: Rc<wgpu::ShaderModule>,
    fragment: Rc<wgpu::ShaderModule>,
}

#[derive(Debug, Copy, Clone)]
struct ViewClear {
    flags: ClearFlags,
    color: wgpu::Color,
    depth: f32,
    stencil: u8,
}

#[derive(Debug, Copy, Clone, Default)]
struct View {
    clear: Option<ViewClear>,
    rect: Option<(u16, u16, u16, u16)>,
    view: glam::Mat4,
    proj: glam::Mat4,
}

type PipelineKey = (u16, VertexLayout);

pub struct WgpuDevice {
    renderer: RendererType,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    depth_view: wgpu::TextureView,
    msaa_view: Option<wgpu::TextureView>,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_capacity: usize,
    uniform_stride: u64,
    shaders: HandleTable<Rc<wgpu::ShaderModule>>,
    programs: HandleTable<Program>,
    vertex_buffers: HandleTable<VertexBuffer>,
    index_buffers: HandleTable<IndexBuffer>,
    pipelines: HashMap<PipelineKey, Option<wgpu::RenderPipeline>>,
    views: BTreeMap<ViewId, View>,
    state: DrawState,
    draws: Vec<DrawCall>,
    debug: DebugFlags,
    frame_count: u32,
    warned_invalid_program: bool,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("renderer", &self.renderer)
            .field("width", &self.surface_config.width)
            .field("height", &self.surface_config.height)
            .field("sample_count", &self.sample_count)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

fn requested_backends(renderer: RendererType) -> wgpu::Backends {
    match renderer {
        RendererType::Vulkan => wgpu::Backends::VULKAN,
        RendererType::Metal => wgpu::Backends::METAL,
        RendererType::Direct3D11 | RendererType::Direct3D12 => wgpu::Backends::DX12,
        RendererType::OpenGL | RendererType::OpenGLES => wgpu::Backends::GL,
        _ => wgpu::Backends::PRIMARY | wgpu::Backends::GL,
    }
}

fn renderer_type_for(backend: wgpu::Backend) -> RendererType {
    match backend {
        wgpu::Backend::Vulkan => RendererType::Vulkan,
        wgpu::Backend::Metal => RendererType::Metal,
        wgpu::Backend::Dx12 => RendererType::Direct3D12,
        wgpu::Backend::Gl if cfg!(target_os = "android") => RendererType::OpenGLES,
        wgpu::Backend::Gl => RendererType::OpenGL,
        _ => RendererType::Noop,
    }
}

fn present_mode(flags: ResetFlags) -> wgpu::PresentMode {
    if flags.contains(ResetFlags::VSYNC) {
        wgpu::PresentMode::Fifo
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

/// `0xRRGGBBAA` to a normalized color.
fn clear_color(rgba: u32) -> wgpu::Color {
    let channel = |shift: u32| f64::from((rgba >> shift) & 0xff) / 255.0;
    wgpu::Color {
        r: channel(24),
        g: channel(16),
        b: channel(8),
        a: channel(0),
    }
}

/// SPIR-V is recognized by its magic number, anything else must be WGSL.
fn shader_source(code: &[u8]) -> Option<wgpu::ShaderSource<'_>> {
    if code.len() >= 4 && code.len() % 4 == 0 && code[..4] == SPIRV_MAGIC {
        return Some(wgpu::util::make_spirv(code));
    }
    std::str::from_utf8(code)
        .ok()
        .map(|src| wgpu::ShaderSource::Wgsl(src.into()))
}

fn vertex_format(attr: &VertexAttribute) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    Some(match (attr.ty, attr.num, attr.normalized) {
        (AttribType::Float, 1, _) => F::Float32,
        (AttribType::Float, 2, _) => F::Float32x2,
        (AttribType::Float, 3, _) => F::Float32x3,
        (AttribType::Float, 4, _) => F::Float32x4,
        (AttribType::Half, 2, _) => F::Float16x2,
        (AttribType::Half, 4, _) => F::Float16x4,
        (AttribType::Uint8, 2, true) => F::Unorm8x2,
        (AttribType::Uint8, 4, true) => F::Unorm8x4,
        (AttribType::Uint8, 2, false) => F::Uint8x2,
        (AttribType::Uint8, 4, false) => F::Uint8x4,
        (AttribType::Int16, 2, true) => F::Snorm16x2,
        (AttribType::Int16, 4, true) => F::Snorm16x4,
        (AttribType::Int16, 2, false) => F::Sint16x2,
        (AttribType::Int16, 4, false) => F::Sint16x4,
        _ => return None,
    })
}

fn vertex_attributes(layout: &VertexLayout) -> Option<Vec<wgpu::VertexAttribute>> {
    layout
        .attributes()
        .iter()
        .map(|attr| {
            let format = vertex_format(attr);
            if format.is_none() {
                log::error!("{:?} x{} {:?} has no vertex format", attr.ty, attr.num, attr.attrib);
            }
            Some(wgpu::VertexAttribute {
                format: format?,
                offset: u64::from(attr.offset),
                shader_location: attr.attrib.location(),
            })
        })
        .collect()
}

/// Format capabilities the device validates against. Without
/// `TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES` only the WebGPU guarantees
/// apply, whatever the adapter reports.
fn format_flags(
    adapter: &wgpu::Adapter,
    device_features: wgpu::Features,
    format: wgpu::TextureFormat,
) -> wgpu::TextureFormatFeatureFlags {
    if device_features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES) {
        adapter.get_texture_format_features(format).flags
    } else {
        format.guaranteed_format_features(device_features).flags
    }
}

/// Largest sample count up to `requested` that both targets accept.
fn clamp_sample_count(
    requested: u32,
    color: wgpu::TextureFormatFeatureFlags,
    depth: wgpu::TextureFormatFeatureFlags,
) -> u32 {
    [16, 8, 4, 2]
        .into_iter()
        .filter(|&count| count <= requested)
        .find(|&count| color.sample_count_supported(count) && depth.sample_count_supported(count))
        .unwrap_or(1)
}

fn supported_sample_count(
    adapter: &wgpu::Adapter,
    device_features: wgpu::Features,
    format: wgpu::TextureFormat,
    requested: u32,
) -> u32 {
    clamp_sample_count(
        requested,
        format_flags(adapter, device_features, format),
        format_flags(adapter, device_features, DEPTH_FORMAT),
    )
}

fn create_targets(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    sample_count: u32,
) -> (wgpu::TextureView, Option<wgpu::TextureView>) {
    let size = wgpu::Extent3d {
        width: config.width.max(1),
        height: config.height.max(1),
        depth_or_array_layers: 1,
    };
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size,
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let msaa_view = (sample_count > 1).then(|| {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("MSAA Color Texture"),
                size,
                mip_level_count: 1,
                sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: config.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    });
    (depth_view, msaa_view)
}

fn create_uniforms(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: usize,
    stride: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Draw Uniform Buffer"),
        size: capacity as u64 * stride,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Draw Uniforms Bind Group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(UNIFORM_SIZE),
            }),
        }],
    });
    (buffer, bind_group)
}

impl WgpuDevice {
    async fn new(init: &Init) -> anyhow::Result<Self> {
        let backends = requested_backends(init.renderer_type);
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let platform = &init.platform_data;
        // SAFETY: the shell keeps the native window alive until `shutdown`
        // has dropped the surface.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: platform.raw_display_handle(),
                raw_window_handle: platform.window,
            })
        }
        .context("creating surface from native window")?;
        log::debug!("Surface created for {:?} window.", platform.family);

        let preferred = (init.vendor_id != 0)
            .then(|| {
                instance
                    .enumerate_adapters(backends)
                    .into_iter()
                    .find(|a| a.get_info().vendor == u32::from(init.vendor_id) && a.is_surface_supported(&surface))
            })
            .flatten();
        let adapter = match preferred {
            Some(adapter) => adapter,
            None => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    compatible_surface: Some(&surface),
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    force_fallback_adapter: false,
                })
                .await
                .context("no adapter for surface")?,
        };
        let info = adapter.get_info();
        let renderer = renderer_type_for(info.backend);
        log::info!("Using {} ({:?}, renderer {:?})", info.name, info.backend, renderer);

        let base_limits = if info.backend == wgpu::Backend::Gl {
            wgpu::Limits::downlevel_webgl2_defaults()
        } else {
            wgpu::Limits::default()
        };
        let required_features = adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features,
                required_limits: base_limits.using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("requesting device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no formats")?;
        let resolution = init.resolution;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: resolution.width.max(1),
            height: resolution.height.max(1),
            present_mode: present_mode(resolution.reset),
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sample_count = supported_sample_count(
            &adapter,
            device.features(),
            surface_format,
            resolution.reset.msaa_samples(),
        );
        let (depth_view, msaa_view) = create_targets(&device, &surface_config, sample_count);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Uniforms Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(UNIFORM_SIZE),
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Program Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let uniform_stride = wgpu::util::align_to(UNIFORM_SIZE, alignment);
        let (uniform_buffer, uniform_bind_group) =
            create_uniforms(&device, &uniform_layout, DEFAULT_DRAW_CAPACITY, uniform_stride);

        log::debug!(
            "Device ready: {}x{}, {}x MSAA, transient vb limit {} bytes",
            surface_config.width,
            surface_config.height,
            sample_count,
            init.limits.transient_vb_size
        );

        Ok(Self {
            renderer,
            adapter,
            device,
            queue,
            surface,
            surface_config,
            sample_count,
            depth_view,
            msaa_view,
            pipeline_layout,
            uniform_layout,
            uniform_buffer,
            uniform_bind_group,
            uniform_capacity: DEFAULT_DRAW_CAPACITY,
            uniform_stride,
            shaders: HandleTable::new(),
            programs: HandleTable::new(),
            vertex_buffers: HandleTable::new(),
            index_buffers: HandleTable::new(),
            pipelines: HashMap::new(),
            views: BTreeMap::new(),
            state: DrawState::default(),
            draws: Vec::new(),
            debug: DebugFlags::empty(),
            frame_count: 0,
            warned_invalid_program: false,
        })
    }

    fn ensure_uniform_capacity(&mut self, draws: usize) {
        if draws <= self.uniform_capacity {
            return;
        }
        while self.uniform_capacity < draws {
            self.uniform_capacity *= 2;
        }
        let (buffer, bind_group) = create_uniforms(
            &self.device,
            &self.uniform_layout,
            self.uniform_capacity,
            self.uniform_stride,
        );
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
    }

    fn create_pipeline(
        &self,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
        layout: &VertexLayout,
    ) -> Option<wgpu::RenderPipeline> {
        let attributes = vertex_attributes(layout)?;
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: u64::from(layout.stride()),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Program Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: vertex,
                entry_point: None,
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: fragment,
                entry_point: None,
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.surface_config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            multisample: wgpu::MultisampleState {
                count: self.sample_count,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("Pipeline rejected: {err}");
            return None;
        }
        Some(pipeline)
    }

    fn prepare_pipeline(&mut self, draw: &DrawCall) -> Option<PipelineKey> {
        let layout = self.vertex_buffers.get(draw.vertex.handle.idx)?.layout.clone();
        let key = (draw.program.idx, layout);
        if !self.pipelines.contains_key(&key) {
            let program = self.programs.get(draw.program.idx)?;
            let (vertex, fragment) = (program.vertex.clone(), program.fragment.clone());
            let pipeline = self.create_pipeline(&vertex, &fragment, &key.1);
            self.pipelines.insert(key.clone(), pipeline);
        }
        Some(key)
    }

    fn render(&mut self, draws: &[DrawCall]) -> Result<(), wgpu::SurfaceError> {
        self.ensure_uniform_capacity(draws.len());
        let keys: Vec<Option<PipelineKey>> = draws.iter().map(|draw| self.prepare_pipeline(draw)).collect();

        let stride = self.uniform_stride as usize;
        let mut uniforms = vec![0u8; draws.len() * stride];
        for (i, draw) in draws.iter().enumerate() {
            let view = self.views.get(&draw.view).copied().unwrap_or_default();
            let slot = DrawUniforms {
                model_view_proj: view.proj * view.view * draw.transform,
            };
            uniforms[i * stride..i * stride + UNIFORM_SIZE as usize].copy_from_slice(bytemuck::bytes_of(&slot));
        }
        if !uniforms.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &uniforms);
        }

        let output = self.surface.get_current_texture()?;
        let target = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        let mut view_ids: Vec<ViewId> = self.views.keys().copied().chain(draws.iter().map(|d| d.view)).collect();
        view_ids.sort_unstable();
        view_ids.dedup();

        for view_id in view_ids {
            let view = self.views.get(&view_id).copied().unwrap_or_default();
            let clear = |flag: ClearFlags| view.clear.filter(|c| c.flags.contains(flag));
            let color_load = clear(ClearFlags::COLOR).map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(c.color));
            let depth_load = clear(ClearFlags::DEPTH).map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(c.depth));
            let stencil_load = clear(ClearFlags::STENCIL)
                .map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(u32::from(c.stencil)));
            let (color_view, resolve_target) = match &self.msaa_view {
                Some(msaa) => (msaa, Some(&target)),
                None => (&target, None),
            };

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("View Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: stencil_load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some((x, y, w, h)) = view.rect {
                let (width, height) = (self.surface_config.width, self.surface_config.height);
                let x = u32::from(x).min(width);
                let y = u32::from(y).min(height);
                let w = u32::from(w).min(width - x);
                let h = u32::from(h).min(height - y);
                if w > 0 && h > 0 {
                    pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
                }
            }

            for (i, draw) in draws.iter().enumerate().filter(|(_, d)| d.view == view_id) {
                let Some(pipeline) = keys[i].as_ref().and_then(|key| self.pipelines.get(key)).and_then(Option::as_ref)
                else {
                    continue;
                };
                let Some(vb) = self.vertex_buffers.get(draw.vertex.handle.idx) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.uniform_bind_group, &[(i as u64 * self.uniform_stride) as u32]);
                pass.set_vertex_buffer(0, vb.buffer.slice(..));

                let index = draw
                    .index
                    .and_then(|range| self.index_buffers.get(range.handle.idx).map(|ib| (range, ib)));
                match index {
                    Some((range, ib)) => {
                        pass.set_index_buffer(ib.buffer.slice(..), ib.format);
                        pass.draw_indexed(
                            range.first_index..range.first_index + range.num_indices,
                            draw.vertex.start_vertex as i32,
                            0..1,
                        );
                    }
                    None => {
                        let start = draw.vertex.start_vertex;
                        pass.draw(start..start + draw.vertex.num_vertices, 0..1);
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

impl GraphicsDevice for WgpuDevice {
    fn init(init: &Init) -> anyhow::Result<Self> {
        pollster::block_on(Self::new(init))
    }

    fn shutdown(self) {
        log::debug!(
            "Shutting down {:?} device after {} frames ({} shaders, {} programs, {} vertex buffers, {} index buffers alive)",
            self.renderer,
            self.frame_count,
            self.shaders.len(),
            self.programs.len(),
            self.vertex_buffers.len(),
            self.index_buffers.len()
        );
    }

    fn renderer_type(&self) -> RendererType {
        self.renderer
    }

    fn reset(&mut self, width: u32, height: u32, flags: ResetFlags) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface_config.present_mode = present_mode(flags);
        let sample_count = supported_sample_count(
            &self.adapter,
            self.device.features(),
            self.surface_config.format,
            flags.msaa_samples(),
        );
        if sample_count != self.sample_count {
            self.pipelines.clear();
            self.sample_count = sample_count;
        }
        self.surface.configure(&self.device, &self.surface_config);
        let (depth_view, msaa_view) = create_targets(&self.device, &self.surface_config, self.sample_count);
        self.depth_view = depth_view;
        self.msaa_view = msaa_view;
        log::debug!(
            "Reset to {}x{} ({:?}, {}x MSAA, anisotropy {})",
            self.surface_config.width,
            self.surface_config.height,
            self.surface_config.present_mode,
            self.sample_count,
            flags.contains(ResetFlags::MAX_ANISOTROPY)
        );
    }

    fn set_debug(&mut self, flags: DebugFlags) {
        self.debug = flags;
    }

    fn set_view_clear(&mut self, view: ViewId, flags: ClearFlags, rgba: u32, depth: f32, stencil: u8) {
        self.views.entry(view).or_default().clear = Some(ViewClear {
            flags,
            color: clear_color(rgba),
            depth,
            stencil,
        });
    }

    fn set_view_rect(&mut self, view: ViewId, x: u16, y: u16, width: u16, height: u16) {
        self.views.entry(view).or_default().rect = Some((x, y, width, height));
    }

    fn set_view_transform(&mut self, view: ViewId, view_mtx: &glam::Mat4, proj_mtx: &glam::Mat4) {
        let entry = self.views.entry(view).or_default();
        entry.view = *view_mtx;
        entry.proj = *proj_mtx;
    }

    fn create_shader(&mut self, code: &[u8]) -> ShaderHandle {
        let Some(source) = shader_source(code) else {
            log::error!("Shader bytecode is neither SPIR-V nor WGSL");
            return ShaderHandle::INVALID;
        };
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shader"),
            source,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("Shader rejected by {:?}: {err}", self.renderer);
            return ShaderHandle::INVALID;
        }
        self.shaders
            .insert(Rc::new(module))
            .map_or(ShaderHandle::INVALID, |idx| ShaderHandle { idx })
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        self.shaders.remove(handle.idx);
    }

    fn create_program(&mut self, vsh: ShaderHandle, fsh: ShaderHandle, destroy_shaders: bool) -> ProgramHandle {
        let program = match (self.shaders.get(vsh.idx), self.shaders.get(fsh.idx)) {
            (Some(vertex), Some(fragment)) => Some(Program {
                vertex: vertex.clone(),
                fragment: fragment.clone(),
            }),
            _ => {
                log::error!("Cannot link program from shaders {} and {}", vsh.idx, fsh.idx);
                None
            }
        };
        if destroy_shaders {
            self.destroy_shader(vsh);
            self.destroy_shader(fsh);
        }
        program
            .and_then(|program| self.programs.insert(program))
            .map_or(ProgramHandle::INVALID, |idx| ProgramHandle { idx })
    }

    fn destroy_program(&mut self, handle: ProgramHandle) {
        if self.programs.remove(handle.idx).is_some() {
            self.pipelines.retain(|(program, _), _| *program != handle.idx);
        }
    }

    fn create_vertex_buffer(&mut self, data: &[u8], layout: &VertexLayout) -> VertexBufferHandle {
        if data.is_empty() || vertex_attributes(layout).is_none() {
            return VertexBufferHandle::INVALID;
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: data,
            usage: wgpu::BufferUsages::VERTEX,
        });
        self.vertex_buffers
            .insert(VertexBuffer {
                buffer,
                layout: layout.clone(),
            })
            .map_or(VertexBufferHandle::INVALID, |idx| VertexBufferHandle { idx })
    }

    fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle) {
        self.vertex_buffers.remove(handle.idx);
    }

    fn create_index_buffer(&mut self, data: &[u8], flags: BufferFlags) -> IndexBufferHandle {
        if data.is_empty() {
            return IndexBufferHandle::INVALID;
        }
        let format = if flags.contains(BufferFlags::INDEX32) {
            wgpu::IndexFormat::Uint32
        } else {
            wgpu::IndexFormat::Uint16
        };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: data,
            usage: wgpu::BufferUsages::INDEX,
        });
        self.index_buffers
            .insert(IndexBuffer { buffer, format })
            .map_or(IndexBufferHandle::INVALID, |idx| IndexBufferHandle { idx })
    }

    fn destroy_index_buffer(&mut self, handle: IndexBufferHandle) {
        self.index_buffers.remove(handle.idx);
    }

    fn set_vertex_buffer(&mut self, stream: u8, handle: VertexBufferHandle, start_vertex: u32, num_vertices: u32) {
        if stream != 0 {
            log::warn!("Only vertex stream 0 is supported, ignoring stream {stream}");
            return;
        }
        self.state.set_vertex_buffer(handle, start_vertex, num_vertices);
    }

    fn set_index_buffer(&mut self, handle: IndexBufferHandle, first_index: u32, num_indices: u32) {
        self.state.set_index_buffer(handle, first_index, num_indices);
    }

    fn set_transform(&mut self, mtx: &glam::Mat4) {
        self.state.set_transform(*mtx);
    }

    fn submit(&mut self, view: ViewId, program: ProgramHandle, depth: u32) {
        match self.state.submit(view, program, depth) {
            Some(draw) => self.draws.push(draw),
            None if !program.is_valid() && !self.warned_invalid_program => {
                log::warn!("Discarding draws submitted with an invalid program");
                self.warned_invalid_program = true;
            }
            None => {}
        }
    }

    fn frame(&mut self) -> u32 {
        let mut draws = std::mem::take(&mut self.draws);
        sort_draws(&mut draws);
        match self.render(&draws) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
            }
            Err(wgpu::SurfaceError::Timeout) => log::warn!("Timed out acquiring surface texture"),
            Err(e) => log::error!("Unable to render {e}"),
        }
        if self.debug.contains(DebugFlags::STATS) {
            log::trace!("Frame {}: {} draws", self.frame_count, draws.len());
        }
        draws.clear();
        self.draws = draws;
        self.frame_count = self.frame_count.wrapping_add(1);
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::PosColorVertex;

    #[test]
    fn cube_layout_maps_to_vertex_formats() {
        let layout = PosColorVertex::layout(RendererType::Vulkan).unwrap();
        let attributes = vertex_attributes(&layout).unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].format, wgpu::VertexFormat::Float32x3);
        assert_eq!((attributes[0].offset, attributes[0].shader_location), (0, 0));
        assert_eq!(attributes[1].format, wgpu::VertexFormat::Unorm8x4);
        assert_eq!((attributes[1].offset, attributes[1].shader_location), (12, 1));
    }

    #[test]
    fn three_byte_colors_have_no_format() {
        let layout = VertexLayout::begin(RendererType::Vulkan)
            .add(crate::vertex::Attrib::Color0, 3, AttribType::Uint8, true)
            .end()
            .unwrap();
        assert!(vertex_attributes(&layout).is_none());
    }

    #[test]
    fn clear_color_unpacks_rgba() {
        let color = clear_color(0x443355FF);
        assert_eq!(color.r, f64::from(0x44u8) / 255.0);
        assert_eq!(color.g, f64::from(0x33u8) / 255.0);
        assert_eq!(color.b, f64::from(0x55u8) / 255.0);
        assert_eq!(color.a, 1.0);
    }

    #[test]
    fn shader_source_detection() {
        assert!(matches!(
            shader_source(b"@fragment fn fs_main() {}"),
            Some(wgpu::ShaderSource::Wgsl(_))
        ));
        let mut spirv = SPIRV_MAGIC.to_vec();
        spirv.extend_from_slice(&[0; 16]);
        assert!(matches!(shader_source(&spirv), Some(wgpu::ShaderSource::SpirV(_))));
        assert!(shader_source(&[0xff, 0xfe, 0x00]).is_none());
    }

    #[test]
    fn backend_mapping() {
        assert_eq!(renderer_type_for(wgpu::Backend::Vulkan), RendererType::Vulkan);
        assert_eq!(renderer_type_for(wgpu::Backend::Dx12), RendererType::Direct3D12);
        assert_eq!(renderer_type_for(wgpu::Backend::Metal), RendererType::Metal);
        assert_eq!(requested_backends(RendererType::Direct3D11), wgpu::Backends::DX12);
        assert!(requested_backends(RendererType::Count).contains(wgpu::Backends::GL));
    }

    #[test]
    fn guaranteed_formats_clamp_to_four_samples() {
        let features = wgpu::Features::empty();
        let color = wgpu::TextureFormat::Rgba8UnormSrgb.guaranteed_format_features(features).flags;
        let depth = DEPTH_FORMAT.guaranteed_format_features(features).flags;
        assert_eq!(clamp_sample_count(16, color, depth), 4);
        assert_eq!(clamp_sample_count(8, color, depth), 4);
        assert_eq!(clamp_sample_count(2, color, depth), 1);
        assert_eq!(clamp_sample_count(1, color, depth), 1);
    }

    #[test]
    fn sample_count_needs_both_targets() {
        use wgpu::TextureFormatFeatureFlags as F;
        let color = F::MULTISAMPLE_X2 | F::MULTISAMPLE_X4 | F::MULTISAMPLE_X8 | F::MULTISAMPLE_X16;
        let depth = F::MULTISAMPLE_X2 | F::MULTISAMPLE_X4 | F::MULTISAMPLE_X8;
        assert_eq!(clamp_sample_count(16, color, depth), 8);
        assert_eq!(clamp_sample_count(16, color, F::empty()), 1);
    }

    #[test]
    fn vsync_picks_fifo() {
        assert_eq!(present_mode(ResetFlags::VSYNC), wgpu::PresentMode::Fifo);
        assert_eq!(present_mode(ResetFlags::empty()), wgpu::PresentMode::AutoNoVsync);
    }
}
