//! Vertex + fragment WGSL text. The built-in pair is embedded; hosts may load their own by name.

use std::path::Path;

const LENS_MESH_VERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/lens_mesh.vert.wgsl"));
const LENS_MESH_FRAG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/lens_mesh.frag.wgsl"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub const VERTEX_NAME: &'static str = "lens_mesh.vert.wgsl";
    pub const FRAGMENT_NAME: &'static str = "lens_mesh.frag.wgsl";

    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self { vertex: vertex.into(), fragment: fragment.into() }
    }

    /// The lens mesh shaders shipped with the renderer.
    pub fn builtin() -> Self {
        Self::new(LENS_MESH_VERT, LENS_MESH_FRAG)
    }

    /// Read `<dir>/<vertex_name>` and `<dir>/<fragment_name>`.
    pub fn load(dir: impl AsRef<Path>, vertex_name: &str, fragment_name: &str) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let vertex = std::fs::read_to_string(dir.join(vertex_name))?;
        let fragment = std::fs::read_to_string(dir.join(fragment_name))?;
        Ok(Self { vertex, fragment })
    }
}
