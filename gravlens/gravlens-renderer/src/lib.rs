//! GravLens renderer: lensing mesh model + biplanar YUV shader pipeline over a `GpuDevice`.

pub mod config;
pub mod device;
pub mod mesh;
pub mod pipeline;
pub mod shader;

pub use config::{ContentFit, LensConfig};
pub use device::{DeviceError, GpuDevice, HeadlessDevice, WgpuDevice};
pub use mesh::{compute_mesh, GpuVertex, LensMeshModel, Mesh, MeshVertex};
pub use pipeline::{PipelineError, ShaderPipeline, ShaderProgram};
pub use shader::{CompileError, LinkError, ShaderSources, ShaderStage};
