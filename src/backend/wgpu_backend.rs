//! Headless wgpu device implementing both device domains.
//!
//! One `wgpu::Device` backs render and compute, so a compute view is the
//! same `wgpu::Buffer` registered under a second handle: the interop
//! contract without a copy. Wrapping fails unless the buffer was created
//! with STORAGE usage. Draws render into an offscreen color/depth target;
//! commands are buffered per draw and executed in a single render pass by
//! [`WgpuDevice::flush_frame`].

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::OffscreenConfig;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Debug shader: transforms by the per-draw uniforms and shades with a
/// fixed directional light.
pub const BASIC_SHADER: &str = r#"
struct MeshTransforms {
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> transforms: MeshTransforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = transforms.model * vec4<f32>(in.position, 1.0);
    out.clip_position = transforms.view_proj * world;
    out.normal = normalize((transforms.model * vec4<f32>(in.normal, 0.0)).xyz);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(vec3<f32>(0.4, 0.8, 0.6));
    let diffuse = max(dot(normalize(in.normal), light_dir), 0.0);
    let base = vec3<f32>(0.55, 0.6, 0.8);
    return vec4<f32>(base * (0.2 + 0.8 * diffuse), 1.0);
}
"#;

struct BufferEntry {
    buffer: wgpu::Buffer,
    usage: BufferUsage,
}

#[derive(Default)]
struct VertexArrayEntry {
    buffer: Option<BufferHandle>,
    layout: Option<VertexBufferLayout>,
}

struct ComputeViewEntry {
    buffer: u64,
    #[allow(dead_code)]
    role: BufferRole,
}

/// Buffered indexed draw, executed on `flush_frame`
struct PendingDraw {
    vertex_array: VertexArrayHandle,
    shader: ShaderHandle,
    index_buffer: BufferHandle,
    index_count: u32,
    transforms: MeshTransforms,
}

/// Headless wgpu device serving both the render and compute domains.
pub struct WgpuDevice {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    #[allow(dead_code)]
    color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    #[allow(dead_code)]
    depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,

    uniform_layout: wgpu::BindGroupLayout,

    // Resource storage
    buffers: HashMap<u64, BufferEntry>,
    vertex_arrays: HashMap<u64, VertexArrayEntry>,
    shaders: HashMap<u64, wgpu::ShaderModule>,
    pipelines: HashMap<(u64, u64), wgpu::RenderPipeline>,
    compute_views: HashMap<u64, ComputeViewEntry>,
    compute_buffers: HashMap<u64, wgpu::Buffer>,

    // Handle counters
    next_buffer_id: u64,
    next_vertex_array_id: u64,
    next_shader_id: u64,
    next_view_id: u64,
    next_compute_buffer_id: u64,

    pending_draws: Vec<PendingDraw>,
}

impl WgpuDevice {
    /// Blocks on adapter and device acquisition; no surface is created.
    pub fn new_headless(config: &OffscreenConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async(config))
    }

    async fn new_headless_async(config: &OffscreenConfig) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                BackendError::InitializationFailed("no compatible adapter found".into())
            })?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(config.label.as_str()),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let color_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-color"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-depth"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh-transforms"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        log::debug!(
            "created headless wgpu device ({}x{})",
            config.width,
            config.height
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            color_texture,
            color_view,
            depth_texture,
            depth_view,
            uniform_layout,
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            compute_views: HashMap::new(),
            compute_buffers: HashMap::new(),
            next_buffer_id: 1,
            next_vertex_array_id: 1,
            next_shader_id: 1,
            next_view_id: 1,
            next_compute_buffer_id: 1,
            pending_draws: Vec::new(),
        })
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::MAP_READ) {
            result |= wgpu::BufferUsages::MAP_READ;
        }
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        if usage.contains(BufferUsage::STORAGE) {
            result |= wgpu::BufferUsages::STORAGE;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32 => wgpu::VertexFormat::Float32,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
            VertexFormat::Uint32 => wgpu::VertexFormat::Uint32,
        }
    }

    /// Build and cache the pipeline for a shader / vertex-array pair.
    fn ensure_pipeline(
        &mut self,
        shader: ShaderHandle,
        vertex_array: VertexArrayHandle,
    ) -> BackendResult<()> {
        let key = (shader.0, vertex_array.0);
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let module = self
            .shaders
            .get(&shader.0)
            .ok_or(BackendError::UnknownHandle("shader"))?;
        let entry = self
            .vertex_arrays
            .get(&vertex_array.0)
            .ok_or(BackendError::UnknownHandle("vertex array"))?;
        let layout = entry
            .layout
            .as_ref()
            .ok_or(BackendError::UnknownHandle("vertex array has no attribute layout"))?;

        let attributes: Vec<wgpu::VertexAttribute> = layout
            .attributes
            .iter()
            .map(|attr| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(attr.format),
                offset: attr.offset,
                shader_location: attr.location,
            })
            .collect();

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("mesh-pipeline-layout"),
                bind_group_layouts: &[&self.uniform_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("mesh-pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: "vs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: layout.array_stride,
                        step_mode: match layout.step_mode {
                            VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
                            VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
                        },
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: "fs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    /// Executes all buffered draws in one pass over the offscreen target
    /// and submits the command buffer.
    pub fn flush_frame(&mut self) -> BackendResult<()> {
        let draws = std::mem::take(&mut self.pending_draws);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        // Per-draw uniform buffers must outlive the pass
        let bind_groups: Vec<wgpu::BindGroup> = draws
            .iter()
            .map(|draw| {
                let uniform = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("mesh-transforms"),
                        contents: bytemuck::bytes_of(&draw.transforms),
                        usage: wgpu::BufferUsages::UNIFORM,
                    });
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("mesh-transforms"),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform.as_entire_binding(),
                    }],
                })
            })
            .collect();

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mesh-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.03,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (draw, bind_group) in draws.iter().zip(&bind_groups) {
                let Some(pipeline) = self.pipelines.get(&(draw.shader.0, draw.vertex_array.0))
                else {
                    continue;
                };
                let Some(entry) = self.vertex_arrays.get(&draw.vertex_array.0) else {
                    continue;
                };
                let Some(vertex_buffer) = entry.buffer.and_then(|b| self.buffers.get(&b.0)) else {
                    continue;
                };
                let Some(index_buffer) = self.buffers.get(&draw.index_buffer.0) else {
                    continue;
                };

                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.set_vertex_buffer(0, vertex_buffer.buffer.slice(..));
                pass.set_index_buffer(index_buffer.buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("flushed frame with {} draws", draws.len());
        Ok(())
    }

    /// The `wgpu` buffer behind a solver binding. Views resolve to the
    /// same buffer the renderer draws from; that is the interop guarantee
    /// the external solver builds its bind groups on.
    pub fn resolve_compute_memory(&self, memory: ComputeMemory) -> Option<&wgpu::Buffer> {
        match memory {
            ComputeMemory::View(view) => {
                let entry = self.compute_views.get(&view.0)?;
                self.buffers.get(&entry.buffer).map(|b| &b.buffer)
            }
            ComputeMemory::Owned(buffer) => self.compute_buffers.get(&buffer.0),
        }
    }

    /// Raw device access for the external solver's pipeline setup.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Shared queue; submission order is the barrier between solver
    /// dispatch and drawing.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

impl RenderDevice for WgpuDevice {
    fn create_vertex_array(&mut self) -> BackendResult<VertexArrayHandle> {
        let id = self.next_vertex_array_id;
        self.next_vertex_array_id += 1;
        self.vertex_arrays.insert(id, VertexArrayEntry::default());
        Ok(VertexArrayHandle(id))
    }

    fn configure_vertex_attributes(
        &mut self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        layout: &VertexBufferLayout,
    ) -> BackendResult<()> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(BackendError::UnknownHandle("buffer"));
        }
        let entry = self
            .vertex_arrays
            .get_mut(&vertex_array.0)
            .ok_or(BackendError::UnknownHandle("vertex array"))?;
        entry.buffer = Some(buffer);
        entry.layout = Some(layout.clone());
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        // new wgpu buffers are zero-initialized
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            BufferEntry {
                buffer,
                usage: desc.usage,
            },
        );
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label.as_deref(),
                contents: data,
                usage: Self::convert_buffer_usage(desc.usage),
            });

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            BufferEntry {
                buffer,
                usage: desc.usage,
            },
        );
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(entry) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(&entry.buffer, offset, data);
        }
    }

    fn create_shader(&mut self, desc: &ShaderDescriptor) -> BackendResult<ShaderHandle> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });

        let id = self.next_shader_id;
        self.next_shader_id += 1;
        self.shaders.insert(id, module);
        Ok(ShaderHandle(id))
    }

    fn draw_indexed(
        &mut self,
        vertex_array: VertexArrayHandle,
        shader: ShaderHandle,
        index_buffer: BufferHandle,
        index_count: u32,
        transforms: &MeshTransforms,
    ) -> BackendResult<()> {
        if !self.buffers.contains_key(&index_buffer.0) {
            return Err(BackendError::UnknownHandle("index buffer"));
        }
        self.ensure_pipeline(shader, vertex_array)?;
        self.pending_draws.push(PendingDraw {
            vertex_array,
            shader,
            index_buffer,
            index_count,
            transforms: *transforms,
        });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(entry) = self.buffers.remove(&buffer.0) {
            entry.buffer.destroy();
        }
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        self.vertex_arrays.remove(&vertex_array.0);
        self.pipelines.retain(|(_, va), _| *va != vertex_array.0);
    }
}

impl ComputeDevice for WgpuDevice {
    fn wrap_render_buffer(
        &mut self,
        buffer: BufferHandle,
        role: BufferRole,
    ) -> BackendResult<ComputeViewHandle> {
        let entry = self
            .buffers
            .get(&buffer.0)
            .ok_or(BackendError::UnknownHandle("buffer"))?;
        if !entry.usage.contains(BufferUsage::STORAGE) {
            return Err(BackendError::InteropUnsupported(format!(
                "{role:?} buffer was created without STORAGE usage"
            )));
        }
        let id = self.next_view_id;
        self.next_view_id += 1;
        self.compute_views.insert(
            id,
            ComputeViewEntry {
                buffer: buffer.0,
                role,
            },
        );
        log::trace!("wrapped {role:?} buffer as compute view {id}");
        Ok(ComputeViewHandle(id))
    }

    fn create_compute_buffer(
        &mut self,
        desc: &BufferDescriptor,
    ) -> BackendResult<ComputeBufferHandle> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: Self::convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });

        let id = self.next_compute_buffer_id;
        self.next_compute_buffer_id += 1;
        self.compute_buffers.insert(id, buffer);
        Ok(ComputeBufferHandle(id))
    }

    fn release_view(&mut self, view: ComputeViewHandle) {
        self.compute_views.remove(&view.0);
    }

    fn destroy_compute_buffer(&mut self, buffer: ComputeBufferHandle) {
        if let Some(buffer) = self.compute_buffers.remove(&buffer.0) {
            buffer.destroy();
        }
    }
}
