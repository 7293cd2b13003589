//! wgpu implementation of `GpuDevice`. Every call that can trip wgpu validation runs inside
//! an error scope, so backend failures come back as `DeviceError::Backend` instead of panics.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{BufferKind, DeviceError, DrawCall, GpuDevice, PlaneFormat};
use crate::config::LensConfig;
use crate::mesh::GpuVertex;
use crate::shader::{ProgramLayout, SamplerBindings, ShaderStage};

pub struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
}

pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: PlaneFormat,
    width: u32,
    height: u32,
}

impl WgpuTexture {
    pub fn size(&self) -> (u32, u32) { (self.width, self.height) }
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    clear_color: wgpu::Color,
    sampler: wgpu::Sampler,
    /// Current render target; `None` means no context is current.
    target: Option<wgpu::TextureView>,
    lost: Arc<Mutex<Option<String>>>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, config: &LensConfig) -> Self {
        let lost = Arc::new(Mutex::new(None));
        let lost_flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("wgpu device lost ({reason:?}): {message}");
            *lost_flag.lock() = Some(format!("{reason:?}: {message}"));
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lens_plane_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self {
            device,
            queue,
            target_format: config.swapchain_format,
            clear_color: config.clear_color,
            sampler,
            target: None,
            lost,
        }
    }

    pub fn device(&self) -> &wgpu::Device { &self.device }
    pub fn queue(&self) -> &wgpu::Queue { &self.queue }
    pub fn target_format(&self) -> wgpu::TextureFormat { self.target_format }

    /// Bind the render target for this frame (e.g. a swapchain view).
    pub fn begin_frame(&mut self, target: wgpu::TextureView) {
        self.target = Some(target);
    }

    /// Unbind the render target. Draws fail with `NoContext` until the next `begin_frame`.
    pub fn end_frame(&mut self) -> Option<wgpu::TextureView> {
        self.target.take()
    }

    pub fn is_lost(&self) -> bool {
        self.lost.lock().is_some()
    }

    fn check_lost(&self) -> Result<(), DeviceError> {
        match self.lost.lock().as_ref() {
            Some(reason) => Err(DeviceError::ContextLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn texture_format(format: PlaneFormat) -> wgpu::TextureFormat {
        match format {
            PlaneFormat::Luma => wgpu::TextureFormat::R8Unorm,
            PlaneFormat::Chroma => wgpu::TextureFormat::Rg8Unorm,
        }
    }

    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }
}

impl GpuDevice for WgpuDevice {
    type Shader = wgpu::ShaderModule;
    type Program = WgpuProgram;
    type Buffer = WgpuBuffer;
    type Texture = WgpuTexture;

    fn is_context_current(&self) -> bool {
        self.target.is_some()
    }

    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String> {
        self.check_lost().map_err(|e| e.to_string())?;
        let label = match stage {
            ShaderStage::Vertex => "lens_mesh_vertex",
            ShaderStage::Fragment => "lens_mesh_fragment",
        };
        self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })
    }

    fn release_shader(&mut self, shader: Self::Shader) {
        drop(shader);
    }

    fn create_program(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
        layout: &ProgramLayout,
    ) -> Result<Self::Program, String> {
        self.check_lost().map_err(|e| e.to_string())?;
        let attributes = [
            wgpu::VertexAttribute {
                offset: GpuVertex::POSITION_OFFSET,
                shader_location: layout.attributes.position,
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: GpuVertex::TEX_COORD_OFFSET,
                shader_location: layout.attributes.tex_coord,
                format: wgpu::VertexFormat::Float32x2,
            },
        ];
        let target_format = self.target_format;
        let pipeline = self.scoped(|device| {
            // layout: None derives the bind group layout from the shaders
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("lens_mesh_pipeline"),
                layout: None,
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some(layout.vertex_entry.as_str()),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: GpuVertex::STRIDE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some(layout.fragment_entry.as_str()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;
        Ok(WgpuProgram { pipeline })
    }

    fn release_program(&mut self, program: Self::Program) {
        drop(program);
    }

    fn use_program(&mut self, program: &Self::Program, samplers: &SamplerBindings) -> Result<(), DeviceError> {
        self.check_lost()?;
        let group = samplers.group;
        self.scoped(|_| program.pipeline.get_bind_group_layout(group))
            .map(|_| ())
            .map_err(DeviceError::Backend)
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<Self::Buffer, DeviceError> {
        self.check_lost()?;
        let (label, usage) = match kind {
            BufferKind::Vertex => ("lens_mesh_vertex", wgpu::BufferUsages::VERTEX),
            BufferKind::Index => ("lens_mesh_index", wgpu::BufferUsages::INDEX),
        };
        let size = contents.len() as u64;
        let buffer = self
            .scoped(|device| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                self.queue.write_buffer(&buffer, 0, contents);
                buffer
            })
            .map_err(DeviceError::Backend)?;
        Ok(WgpuBuffer { buffer, size })
    }

    fn write_buffer(&mut self, buffer: &Self::Buffer, contents: &[u8]) -> Result<(), DeviceError> {
        self.check_lost()?;
        if contents.len() as u64 != buffer.size {
            return Err(DeviceError::Backend(format!(
                "buffer write of {} bytes into a {}-byte buffer",
                contents.len(),
                buffer.size
            )));
        }
        self.scoped(|_| self.queue.write_buffer(&buffer.buffer, 0, contents))
            .map_err(DeviceError::Backend)
    }

    fn release_buffer(&mut self, buffer: Self::Buffer) {
        buffer.buffer.destroy();
    }

    fn create_texture(&mut self, format: PlaneFormat, width: u32, height: u32) -> Result<Self::Texture, DeviceError> {
        self.check_lost()?;
        let max = self.max_texture_size();
        if width > max || height > max {
            return Err(DeviceError::Backend(format!("texture {width}x{height} exceeds the limit of {max}")));
        }
        let (texture, view) = self
            .scoped(|device| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(match format {
                        PlaneFormat::Luma => "lens_luma_plane",
                        PlaneFormat::Chroma => "lens_chroma_plane",
                    }),
                    size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: Self::texture_format(format),
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                let view = texture.create_view(&Default::default());
                (texture, view)
            })
            .map_err(DeviceError::Backend)?;
        Ok(WgpuTexture { texture, view, format, width, height })
    }

    fn write_texture(&mut self, texture: &Self::Texture, data: &[u8]) -> Result<(), DeviceError> {
        self.check_lost()?;
        let row = texture.width * texture.format.bytes_per_texel();
        let expected = row as usize * texture.height as usize;
        if data.len() != expected {
            return Err(DeviceError::Backend(format!(
                "plane upload of {} bytes into a {}x{} texture ({expected} bytes)",
                data.len(),
                texture.width,
                texture.height
            )));
        }
        self.scoped(|_| {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(row),
                    rows_per_image: Some(texture.height),
                },
                wgpu::Extent3d { width: texture.width, height: texture.height, depth_or_array_layers: 1 },
            )
        })
        .map_err(DeviceError::Backend)
    }

    fn release_texture(&mut self, texture: Self::Texture) {
        texture.texture.destroy();
    }

    fn draw_indexed(&mut self, call: DrawCall<'_, Self>) -> Result<(), DeviceError> {
        self.check_lost()?;
        let target = self.target.as_ref().ok_or(DeviceError::NoContext)?;
        let samplers = call.samplers;
        self.scoped(|device| {
            let bind_group_layout = call.program.pipeline.get_bind_group_layout(samplers.group);
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("lens_planes_bind_group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: samplers.luma,
                        resource: wgpu::BindingResource::TextureView(&call.luma.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: samplers.chroma,
                        resource: wgpu::BindingResource::TextureView(&call.chroma.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: samplers.sampler,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lens_mesh_frame"),
            });
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lens_mesh_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&call.program.pipeline);
            rp.set_bind_group(samplers.group, &bind_group, &[]);
            rp.set_vertex_buffer(0, call.vertices.buffer.slice(..));
            rp.set_index_buffer(call.indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
            rp.draw_indexed(0..call.index_count, 0, 0..1);
            drop(rp);
            self.queue.submit([encoder.finish()]);
        })
        .map_err(DeviceError::Backend)
    }
}
