//! GPU device seam. `ShaderPipeline` drives any `GpuDevice`; `WgpuDevice` renders for real,
//! `HeadlessDevice` runs on the CPU and counts live objects.

mod headless;
mod wgpu_device;

pub use headless::{HeadlessBuffer, HeadlessDevice, HeadlessProgram, HeadlessShader, HeadlessTexture, RecordedDraw, ResourceCounts};
pub use wgpu_device::{WgpuBuffer, WgpuDevice, WgpuProgram, WgpuTexture};

use thiserror::Error;

use crate::shader::{ProgramLayout, SamplerBindings, ShaderStage};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("rendering context lost: {0}")]
    ContextLost(String),
    #[error("no rendering context is current")]
    NoContext,
    #[error("{0}")]
    Backend(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Texture layout of one frame plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneFormat {
    /// One 8-bit channel (Y).
    Luma,
    /// Two 8-bit channels (Cb, Cr).
    Chroma,
}

impl PlaneFormat {
    pub fn bytes_per_texel(&self) -> u32 {
        match self {
            PlaneFormat::Luma => 1,
            PlaneFormat::Chroma => 2,
        }
    }
}

/// One indexed draw of the lens mesh with both plane textures bound.
pub struct DrawCall<'a, D: GpuDevice> {
    pub program: &'a D::Program,
    pub samplers: SamplerBindings,
    pub vertices: &'a D::Buffer,
    pub indices: &'a D::Buffer,
    pub index_count: u32,
    pub luma: &'a D::Texture,
    pub chroma: &'a D::Texture,
}

/// Minimal device surface needed by the lens pipeline. Handles are owned values;
/// releasing consumes them so a handle cannot be freed twice.
pub trait GpuDevice: Sized {
    type Shader;
    type Program;
    type Buffer;
    type Texture;

    /// True while a render target is bound. Device loss is reported by the calls that need it.
    fn is_context_current(&self) -> bool;

    /// Largest width or height a plane texture may have.
    fn max_texture_size(&self) -> u32;

    /// Create one shader stage. The error string is the backend's compiler log.
    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;
    fn release_shader(&mut self, shader: Self::Shader);

    /// Link two stages into a program with the given attribute locations.
    fn create_program(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
        layout: &ProgramLayout,
    ) -> Result<Self::Program, String>;
    fn release_program(&mut self, program: Self::Program);

    /// Make `program` current with its sampler bindings resolved.
    fn use_program(&mut self, program: &Self::Program, samplers: &SamplerBindings) -> Result<(), DeviceError>;

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<Self::Buffer, DeviceError>;
    /// Overwrite a buffer created with the same byte length.
    fn write_buffer(&mut self, buffer: &Self::Buffer, contents: &[u8]) -> Result<(), DeviceError>;
    fn release_buffer(&mut self, buffer: Self::Buffer);

    fn create_texture(&mut self, format: PlaneFormat, width: u32, height: u32) -> Result<Self::Texture, DeviceError>;
    /// Upload a tightly packed plane into a texture of matching size.
    fn write_texture(&mut self, texture: &Self::Texture, data: &[u8]) -> Result<(), DeviceError>;
    fn release_texture(&mut self, texture: Self::Texture);

    fn draw_indexed(&mut self, call: DrawCall<'_, Self>) -> Result<(), DeviceError>;
}
