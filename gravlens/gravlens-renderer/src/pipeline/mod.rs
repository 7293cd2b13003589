//! ShaderPipeline: compile/link a lens program, resolve its plane samplers and draw the
//! distortion mesh textured with one biplanar frame.

use std::sync::Arc;

use lens_api::{FrameFormatError, FramePlanes};
use thiserror::Error;

use crate::device::{BufferKind, DeviceError, DrawCall, GpuDevice, PlaneFormat};
use crate::mesh::Mesh;
use crate::shader::{self, CompileError, LinkError, ProgramLayout, SamplerBindings, ShaderStage};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("unresolved uniform: {0}")]
    UnresolvedUniform(String),
    #[error("bad frame: {0}")]
    FrameFormat(#[from] FrameFormatError),
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
    #[error("rendering context lost: {0}")]
    ContextLost(String),
    #[error("device error: {0}")]
    Device(String),
}

impl From<DeviceError> for PipelineError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::ContextLost(reason) => PipelineError::ContextLost(reason),
            DeviceError::NoContext => PipelineError::Precondition("no current rendering context"),
            DeviceError::Backend(msg) => PipelineError::Device(msg),
        }
    }
}

/// A linked vertex + fragment program. Owned by the caller, freed via
/// `ShaderPipeline::release_program`.
pub struct ShaderProgram<D: GpuDevice> {
    vertex_source: String,
    fragment_source: String,
    handle: D::Program,
    layout: ProgramLayout,
    samplers: Option<SamplerBindings>,
}

impl<D: GpuDevice> ShaderProgram<D> {
    pub fn vertex_source(&self) -> &str { &self.vertex_source }
    pub fn fragment_source(&self) -> &str { &self.fragment_source }
    pub fn handle(&self) -> &D::Program { &self.handle }
    pub fn layout(&self) -> &ProgramLayout { &self.layout }
    /// Set once the program has been activated.
    pub fn samplers(&self) -> Option<SamplerBindings> { self.samplers }
    pub fn is_active(&self) -> bool { self.samplers.is_some() }
}

struct MeshBuffers<D: GpuDevice> {
    mesh: Arc<Mesh>,
    vertices: D::Buffer,
    vertex_bytes: usize,
    indices: D::Buffer,
    index_bytes: usize,
}

struct PlaneTextures<D: GpuDevice> {
    size: (u32, u32),
    luma: D::Texture,
    chroma: D::Texture,
}

pub struct ShaderPipeline<D: GpuDevice> {
    device: D,
    mesh_buffers: Option<MeshBuffers<D>>,
    textures: Option<PlaneTextures<D>>,
}

impl<D: GpuDevice> ShaderPipeline<D> {
    pub fn new(device: D) -> Self {
        Self { device, mesh_buffers: None, textures: None }
    }

    pub fn device(&self) -> &D { &self.device }
    pub fn device_mut(&mut self) -> &mut D { &mut self.device }

    /// Compile both stages, check their interface and create the program. Intermediate
    /// shader objects are released on every path.
    pub fn compile(&mut self, vertex_source: &str, fragment_source: &str) -> Result<ShaderProgram<D>, PipelineError> {
        let vs_stage = shader::compile_stage(ShaderStage::Vertex, vertex_source).inspect_err(log_compile_error)?;
        let vs = self
            .device
            .create_shader(ShaderStage::Vertex, vertex_source)
            .map_err(|log| CompileError { stage: ShaderStage::Vertex, log })
            .inspect_err(log_compile_error)?;

        let fs_stage = match shader::compile_stage(ShaderStage::Fragment, fragment_source) {
            Ok(stage) => stage,
            Err(err) => {
                log_compile_error(&err);
                self.device.release_shader(vs);
                return Err(err.into());
            }
        };
        let fs = match self.device.create_shader(ShaderStage::Fragment, fragment_source) {
            Ok(fs) => fs,
            Err(log) => {
                let err = CompileError { stage: ShaderStage::Fragment, log };
                log_compile_error(&err);
                self.device.release_shader(vs);
                return Err(err.into());
            }
        };

        let linked = shader::link(&vs_stage, &fs_stage)
            .and_then(|layout| {
                self.device
                    .create_program(&vs, &fs, &layout)
                    .map(|handle| (handle, layout))
                    .map_err(LinkError)
            });
        self.device.release_shader(vs);
        self.device.release_shader(fs);

        let (handle, layout) = linked.inspect_err(|err| log::error!("{err}"))?;
        log::info!(
            "lens program linked: {} + {} (position @{}, tex_coord @{})",
            layout.vertex_entry,
            layout.fragment_entry,
            layout.attributes.position,
            layout.attributes.tex_coord
        );
        Ok(ShaderProgram {
            vertex_source: vertex_source.to_owned(),
            fragment_source: fragment_source.to_owned(),
            handle,
            layout,
            samplers: None,
        })
    }

    /// Make `program` current and cache its `sampler_y` / `sampler_uv` / sampler bindings.
    pub fn activate(&mut self, program: &mut ShaderProgram<D>) -> Result<(), PipelineError> {
        let samplers = program.layout.resolve_samplers().map_err(PipelineError::UnresolvedUniform)?;
        self.device.use_program(&program.handle, &samplers)?;
        program.samplers = Some(samplers);
        Ok(())
    }

    /// Draw `mesh` textured with `frame`. The frame is validated against its own plane sizes and
    /// the device texture limit before any GPU work.
    pub fn draw(&mut self, program: &ShaderProgram<D>, mesh: &Arc<Mesh>, frame: &FramePlanes) -> Result<(), PipelineError> {
        if !self.device.is_context_current() {
            return Err(PipelineError::Precondition("draw called without a current rendering context"));
        }
        let samplers = program
            .samplers
            .ok_or(PipelineError::Precondition("draw called before the program was activated"))?;
        frame.validate()?;
        frame.check_fits(self.device.max_texture_size())?;

        self.upload_mesh(mesh)?;
        self.upload_frame(frame)?;

        let (Some(buffers), Some(textures)) = (&self.mesh_buffers, &self.textures) else {
            return Err(PipelineError::Device("mesh or frame upload missing".into()));
        };
        self.device.draw_indexed(DrawCall {
            program: &program.handle,
            samplers,
            vertices: &buffers.vertices,
            indices: &buffers.indices,
            index_count: mesh.index_count() as u32,
            luma: &textures.luma,
            chroma: &textures.chroma,
        })?;
        Ok(())
    }

    pub fn release_program(&mut self, program: ShaderProgram<D>) {
        self.device.release_program(program.handle);
    }

    /// Free the mesh buffers and plane textures. Programs are released by their owner.
    pub fn release_all(&mut self) {
        if let Some(buffers) = self.mesh_buffers.take() {
            self.device.release_buffer(buffers.vertices);
            self.device.release_buffer(buffers.indices);
        }
        if let Some(textures) = self.textures.take() {
            self.device.release_texture(textures.luma);
            self.device.release_texture(textures.chroma);
        }
    }

    /// Swap in a fresh device after the old one was lost. Returns the old device.
    pub fn replace_device(&mut self, device: D) -> D {
        self.release_all();
        std::mem::replace(&mut self.device, device)
    }

    fn upload_mesh(&mut self, mesh: &Arc<Mesh>) -> Result<(), PipelineError> {
        if let Some(buffers) = &self.mesh_buffers {
            if Arc::ptr_eq(&buffers.mesh, mesh) {
                return Ok(());
            }
        }
        let vertices = mesh.gpu_vertices();
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(mesh.indices());

        if let Some(buffers) = self.mesh_buffers.as_mut() {
            if buffers.vertex_bytes == vertex_bytes.len() && buffers.index_bytes == index_bytes.len() {
                self.device.write_buffer(&buffers.vertices, vertex_bytes)?;
                self.device.write_buffer(&buffers.indices, index_bytes)?;
                buffers.mesh = Arc::clone(mesh);
                return Ok(());
            }
        }
        if let Some(stale) = self.mesh_buffers.take() {
            self.device.release_buffer(stale.vertices);
            self.device.release_buffer(stale.indices);
        }

        let vbuf = self.device.create_buffer(BufferKind::Vertex, vertex_bytes)?;
        let ibuf = match self.device.create_buffer(BufferKind::Index, index_bytes) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.device.release_buffer(vbuf);
                return Err(err.into());
            }
        };
        log::debug!(
            "mesh buffers allocated: {} vertices, {} indices",
            mesh.vertex_count(),
            mesh.index_count()
        );
        self.mesh_buffers = Some(MeshBuffers {
            mesh: Arc::clone(mesh),
            vertices: vbuf,
            vertex_bytes: vertex_bytes.len(),
            indices: ibuf,
            index_bytes: index_bytes.len(),
        });
        Ok(())
    }

    fn upload_frame(&mut self, frame: &FramePlanes) -> Result<(), PipelineError> {
        let size = frame.size();
        if self.textures.as_ref().is_some_and(|t| t.size != size) {
            if let Some(stale) = self.textures.take() {
                self.device.release_texture(stale.luma);
                self.device.release_texture(stale.chroma);
            }
        }
        if self.textures.is_none() {
            let (cw, ch) = FramePlanes::chroma_size(size.0, size.1);
            let luma = self.device.create_texture(PlaneFormat::Luma, size.0, size.1)?;
            let chroma = match self.device.create_texture(PlaneFormat::Chroma, cw, ch) {
                Ok(texture) => texture,
                Err(err) => {
                    self.device.release_texture(luma);
                    return Err(err.into());
                }
            };
            log::debug!("plane textures allocated: luma {}x{}, chroma {cw}x{ch}", size.0, size.1);
            self.textures = Some(PlaneTextures { size, luma, chroma });
        }
        if let Some(textures) = &self.textures {
            self.device.write_texture(&textures.luma, frame.luma())?;
            self.device.write_texture(&textures.chroma, frame.chroma())?;
        }
        Ok(())
    }
}

fn log_compile_error(err: &CompileError) {
    log::error!("{err}");
}
