//! CPU-only `GpuDevice`. Nothing is rasterized; it tracks live objects and records draws so
//! the pipeline and render loop can be exercised without a GPU.

use super::{BufferKind, DeviceError, DrawCall, GpuDevice, PlaneFormat};
use crate::shader::{ProgramLayout, SamplerBindings, ShaderStage};

/// Number of live objects of each kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub shaders: usize,
    pub programs: usize,
    pub buffers: usize,
    pub textures: usize,
}

impl ResourceCounts {
    pub fn total(&self) -> usize {
        self.shaders + self.programs + self.buffers + self.textures
    }
}

#[derive(Debug)]
pub struct HeadlessShader {
    id: u64,
    stage: ShaderStage,
}

impl HeadlessShader {
    pub fn stage(&self) -> ShaderStage { self.stage }
}

#[derive(Debug)]
pub struct HeadlessProgram {
    id: u64,
    layout: ProgramLayout,
}

impl HeadlessProgram {
    pub fn id(&self) -> u64 { self.id }
    pub fn layout(&self) -> &ProgramLayout { &self.layout }
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    id: u64,
    kind: BufferKind,
    len: usize,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 { self.id }
    pub fn kind(&self) -> BufferKind { self.kind }
    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
}

#[derive(Debug)]
pub struct HeadlessTexture {
    id: u64,
    format: PlaneFormat,
    width: u32,
    height: u32,
}

impl HeadlessTexture {
    pub fn id(&self) -> u64 { self.id }
    pub fn format(&self) -> PlaneFormat { self.format }
    pub fn size(&self) -> (u32, u32) { (self.width, self.height) }
}

/// One `draw_indexed` as seen by the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedDraw {
    pub program: u64,
    pub vertex_buffer: u64,
    pub index_buffer: u64,
    pub index_count: u32,
    pub luma_size: (u32, u32),
    pub chroma_size: (u32, u32),
    pub samplers: SamplerBindings,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: u64,
    live: ResourceCounts,
    context_current: bool,
    lost: bool,
    device_lost: bool,
    max_texture_size: u32,
    fail_next_program: Option<String>,
    active_program: Option<u64>,
    buffer_writes: usize,
    texture_writes: usize,
    draws: Vec<RecordedDraw>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

    /// A device with a current context.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: ResourceCounts::default(),
            context_current: true,
            lost: false,
            device_lost: false,
            max_texture_size: Self::DEFAULT_MAX_TEXTURE_SIZE,
            fail_next_program: None,
            active_program: None,
            buffer_writes: 0,
            texture_writes: 0,
            draws: Vec::new(),
        }
    }

    pub fn counts(&self) -> ResourceCounts { self.live }
    pub fn draws(&self) -> &[RecordedDraw] { &self.draws }
    pub fn buffer_writes(&self) -> usize { self.buffer_writes }
    pub fn texture_writes(&self) -> usize { self.texture_writes }
    pub fn active_program(&self) -> Option<u64> { self.active_program }

    pub fn set_context_current(&mut self, current: bool) {
        self.context_current = current;
    }

    /// Simulate a lost context. The next device call fails with `ContextLost`; the device is
    /// usable again afterwards, as if the platform had handed back a fresh context.
    pub fn lose_context(&mut self) {
        self.lost = true;
    }

    /// Simulate a lost device. Every call fails with `ContextLost` until the device is replaced;
    /// the render target stays bound.
    pub fn lose_device(&mut self) {
        self.device_lost = true;
        self.active_program = None;
    }

    pub fn with_max_texture_size(mut self, max: u32) -> Self {
        self.max_texture_size = max;
        self
    }

    /// Make the next `create_program` fail with `log`.
    pub fn fail_next_program(&mut self, log: impl Into<String>) {
        self.fail_next_program = Some(log.into());
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn take_lost(&mut self) -> Result<(), DeviceError> {
        if self.device_lost {
            return Err(DeviceError::ContextLost("headless device lost".into()));
        }
        if std::mem::take(&mut self.lost) {
            self.active_program = None;
            return Err(DeviceError::ContextLost("headless context lost".into()));
        }
        Ok(())
    }
}

impl GpuDevice for HeadlessDevice {
    type Shader = HeadlessShader;
    type Program = HeadlessProgram;
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;

    fn is_context_current(&self) -> bool {
        self.context_current
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn create_shader(&mut self, stage: ShaderStage, _source: &str) -> Result<Self::Shader, String> {
        self.take_lost().map_err(|e| e.to_string())?;
        self.live.shaders += 1;
        Ok(HeadlessShader { id: self.allocate(), stage })
    }

    fn release_shader(&mut self, shader: Self::Shader) {
        log::trace!("release shader {}", shader.id);
        self.live.shaders -= 1;
    }

    fn create_program(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
        layout: &ProgramLayout,
    ) -> Result<Self::Program, String> {
        self.take_lost().map_err(|e| e.to_string())?;
        if let Some(log) = self.fail_next_program.take() {
            return Err(log);
        }
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err("program needs one vertex and one fragment shader".into());
        }
        self.live.programs += 1;
        Ok(HeadlessProgram { id: self.allocate(), layout: layout.clone() })
    }

    fn release_program(&mut self, program: Self::Program) {
        if self.active_program == Some(program.id) {
            self.active_program = None;
        }
        self.live.programs -= 1;
    }

    fn use_program(&mut self, program: &Self::Program, _samplers: &SamplerBindings) -> Result<(), DeviceError> {
        self.take_lost()?;
        self.active_program = Some(program.id);
        Ok(())
    }

    fn create_buffer(&mut self, kind: BufferKind, contents: &[u8]) -> Result<Self::Buffer, DeviceError> {
        self.take_lost()?;
        self.live.buffers += 1;
        Ok(HeadlessBuffer { id: self.allocate(), kind, len: contents.len() })
    }

    fn write_buffer(&mut self, buffer: &Self::Buffer, contents: &[u8]) -> Result<(), DeviceError> {
        self.take_lost()?;
        if contents.len() != buffer.len {
            return Err(DeviceError::Backend(format!(
                "buffer write of {} bytes into a {}-byte buffer",
                contents.len(),
                buffer.len
            )));
        }
        self.buffer_writes += 1;
        Ok(())
    }

    fn release_buffer(&mut self, _buffer: Self::Buffer) {
        self.live.buffers -= 1;
    }

    fn create_texture(&mut self, format: PlaneFormat, width: u32, height: u32) -> Result<Self::Texture, DeviceError> {
        self.take_lost()?;
        if width > self.max_texture_size || height > self.max_texture_size {
            return Err(DeviceError::Backend(format!(
                "texture {width}x{height} exceeds the limit of {}",
                self.max_texture_size
            )));
        }
        self.live.textures += 1;
        Ok(HeadlessTexture { id: self.allocate(), format, width, height })
    }

    fn write_texture(&mut self, texture: &Self::Texture, data: &[u8]) -> Result<(), DeviceError> {
        self.take_lost()?;
        let expected = texture.width as usize * texture.height as usize * texture.format.bytes_per_texel() as usize;
        if data.len() != expected {
            return Err(DeviceError::Backend(format!(
                "plane upload of {} bytes into a {}x{} texture ({expected} bytes)",
                data.len(),
                texture.width,
                texture.height
            )));
        }
        self.texture_writes += 1;
        Ok(())
    }

    fn release_texture(&mut self, _texture: Self::Texture) {
        self.live.textures -= 1;
    }

    fn draw_indexed(&mut self, call: DrawCall<'_, Self>) -> Result<(), DeviceError> {
        self.take_lost()?;
        if !self.context_current {
            return Err(DeviceError::NoContext);
        }
        self.draws.push(RecordedDraw {
            program: call.program.id,
            vertex_buffer: call.vertices.id,
            index_buffer: call.indices.id,
            index_count: call.index_count,
            luma_size: call.luma.size(),
            chroma_size: call.chroma.size(),
            samplers: call.samplers,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_context_fails_once_then_recovers() {
        let mut device = HeadlessDevice::new();
        device.lose_context();
        assert!(matches!(
            device.create_buffer(BufferKind::Vertex, &[0; 16]),
            Err(DeviceError::ContextLost(_))
        ));
        let buffer = device.create_buffer(BufferKind::Vertex, &[0; 16]).unwrap();
        assert_eq!(device.counts().buffers, 1);
        device.release_buffer(buffer);
        assert_eq!(device.counts().total(), 0);
    }

    #[test]
    fn lost_device_stays_lost_but_keeps_its_target() {
        let mut device = HeadlessDevice::new();
        device.lose_device();
        assert!(device.is_context_current());
        for _ in 0..2 {
            assert!(matches!(
                device.create_texture(PlaneFormat::Luma, 4, 4),
                Err(DeviceError::ContextLost(_))
            ));
        }
        assert_eq!(device.counts().total(), 0);
    }

    #[test]
    fn texture_limit_is_enforced() {
        let mut device = HeadlessDevice::new().with_max_texture_size(64);
        assert_eq!(device.max_texture_size(), 64);
        assert!(matches!(device.create_texture(PlaneFormat::Luma, 65, 2), Err(DeviceError::Backend(_))));
        assert!(device.create_texture(PlaneFormat::Luma, 64, 64).is_ok());
    }

    #[test]
    fn texture_upload_size_is_checked() {
        let mut device = HeadlessDevice::new();
        let chroma = device.create_texture(PlaneFormat::Chroma, 4, 2).unwrap();
        assert!(device.write_texture(&chroma, &[0; 16]).is_ok());
        assert!(matches!(device.write_texture(&chroma, &[0; 8]), Err(DeviceError::Backend(_))));
        assert_eq!(device.texture_writes(), 1);
    }
}
