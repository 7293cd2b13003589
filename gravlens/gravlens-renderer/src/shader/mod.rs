//! WGSL front end: per-stage compile (naga parse + validate), link-time interface checks
//! and name-based reflection of vertex attributes and sampler bindings.

mod sources;

pub use sources::ShaderSources;

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{Binding, Handle, Module, Type, TypeInner};
use thiserror::Error;

/// Vertex input carrying the displaced NDC position.
pub const POSITION_ATTRIBUTE: &str = "position";
/// Vertex input carrying the texture coordinate.
pub const TEX_COORD_ATTRIBUTE: &str = "tex_coord";
/// Luma plane texture.
pub const LUMA_SAMPLER: &str = "sampler_y";
/// Interleaved chroma plane texture.
pub const CHROMA_SAMPLER: &str = "sampler_uv";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} shader failed to compile:\n{log}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub log: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("program link failed: {0}")]
pub struct LinkError(pub String);

/// A user-defined stage input or output (`@location(n)`).
#[derive(Clone, Debug, PartialEq)]
pub struct Varying {
    pub name: Option<String>,
    pub location: u32,
    pub ty: TypeInner,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Texture2d,
    Sampler,
    Other,
}

/// A `@group(g) @binding(b)` global found by reflection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceBinding {
    pub name: Option<String>,
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
}

/// One validated stage with its reflected interface.
#[derive(Clone, Debug)]
pub struct CompiledStage {
    stage: ShaderStage,
    entry_point: String,
    inputs: Vec<Varying>,
    outputs: Vec<Varying>,
    resources: Vec<ResourceBinding>,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage { self.stage }
    pub fn entry_point(&self) -> &str { &self.entry_point }
    pub fn inputs(&self) -> &[Varying] { &self.inputs }
    pub fn outputs(&self) -> &[Varying] { &self.outputs }
    pub fn resources(&self) -> &[ResourceBinding] { &self.resources }

    pub fn input(&self, name: &str) -> Option<&Varying> {
        self.inputs.iter().find(|v| v.name.as_deref() == Some(name))
    }
}

/// Vertex attribute locations bound before the program is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttributes {
    pub position: u32,
    pub tex_coord: u32,
}

/// Luma/chroma/sampler bindings, resolved by name when a program is activated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerBindings {
    pub group: u32,
    pub luma: u32,
    pub chroma: u32,
    pub sampler: u32,
}

/// Everything the device needs to build a program from two compiled stages.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub attributes: VertexAttributes,
    pub resources: Vec<ResourceBinding>,
}

impl ProgramLayout {
    pub fn resource(&self, name: &str) -> Option<&ResourceBinding> {
        self.resources.iter().find(|r| r.name.as_deref() == Some(name))
    }

    /// Look up the two plane textures and a filtering sampler in the same bind group.
    pub fn resolve_samplers(&self) -> Result<SamplerBindings, String> {
        let texture = |name: &str| match self.resource(name) {
            Some(r) if r.kind == ResourceKind::Texture2d => Ok(r),
            Some(_) => Err(format!("`{name}` is not a texture_2d")),
            None => Err(format!("no binding named `{name}`")),
        };
        let luma = texture(LUMA_SAMPLER)?;
        let chroma = texture(CHROMA_SAMPLER)?;
        if luma.group != chroma.group {
            return Err(format!(
                "`{LUMA_SAMPLER}` (group {}) and `{CHROMA_SAMPLER}` (group {}) must share a bind group",
                luma.group, chroma.group
            ));
        }
        let sampler = self
            .resources
            .iter()
            .find(|r| r.kind == ResourceKind::Sampler && r.group == luma.group)
            .ok_or_else(|| format!("no sampler in bind group {}", luma.group))?;
        Ok(SamplerBindings { group: luma.group, luma: luma.binding, chroma: chroma.binding, sampler: sampler.binding })
    }
}

/// Parse and validate one stage. The stage must declare a matching entry point.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledStage, CompileError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| CompileError { stage, log: e.emit_to_string(source) })?;
    Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| CompileError { stage, log: e.emit_to_string(source) })?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage.to_naga())
        .ok_or_else(|| CompileError { stage, log: format!("no @{stage} entry point") })?;

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_varyings(&module, arg.ty, arg.binding.as_ref(), arg.name.as_deref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_varyings(&module, result.ty, result.binding.as_ref(), None, &mut outputs);
    }

    Ok(CompiledStage {
        stage,
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        resources: reflect_resources(&module),
    })
}

/// Check the stage interface and resolve attribute locations by name.
pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<ProgramLayout, LinkError> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(LinkError(format!(
            "expected vertex + fragment stages, got {} + {}",
            vertex.stage, fragment.stage
        )));
    }

    let attribute = |name: &str| -> Result<u32, LinkError> {
        let input = vertex
            .input(name)
            .ok_or_else(|| LinkError(format!("vertex stage has no `{name}` input")))?;
        if !is_vec2_f32(&input.ty) {
            return Err(LinkError(format!("vertex input `{name}` must be vec2<f32>, found {:?}", input.ty)));
        }
        Ok(input.location)
    };
    let attributes = VertexAttributes {
        position: attribute(POSITION_ATTRIBUTE)?,
        tex_coord: attribute(TEX_COORD_ATTRIBUTE)?,
    };

    for input in fragment.inputs() {
        let output = vertex
            .outputs()
            .iter()
            .find(|o| o.location == input.location)
            .ok_or_else(|| {
                LinkError(format!("fragment input @location({}) is not written by the vertex stage", input.location))
            })?;
        if output.ty != input.ty {
            return Err(LinkError(format!(
                "@location({}) type mismatch: vertex writes {:?}, fragment reads {:?}",
                input.location, output.ty, input.ty
            )));
        }
    }

    let mut resources = vertex.resources.clone();
    resources.extend(fragment.resources.iter().cloned());

    Ok(ProgramLayout {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        attributes,
        resources,
    })
}

fn is_vec2_f32(ty: &TypeInner) -> bool {
    matches!(ty, TypeInner::Vector { size: naga::VectorSize::Bi, scalar } if *scalar == naga::Scalar::F32)
}

fn collect_varyings(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    name: Option<&str>,
    out: &mut Vec<Varying>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(Varying {
            name: name.map(str::to_owned),
            location: *location,
            ty: module.types[ty].inner.clone(),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_varyings(module, member.ty, member.binding.as_ref(), member.name.as_deref(), out);
                }
            }
        }
    }
}

fn reflect_resources(module: &Module) -> Vec<ResourceBinding> {
    module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            let kind = match &module.types[var.ty].inner {
                TypeInner::Image { dim: naga::ImageDimension::D2, arrayed: false, class: naga::ImageClass::Sampled { .. } } => {
                    ResourceKind::Texture2d
                }
                TypeInner::Sampler { comparison: false } => ResourceKind::Sampler,
                _ => ResourceKind::Other,
            };
            Some(ResourceBinding { name: var.name.clone(), group: binding.group, binding: binding.binding, kind })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWAPPED_VERTEX: &str = r#"
struct Out {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn main(@location(3) tex_coord: vec2<f32>, @location(5) position: vec2<f32>) -> Out {
    var out: Out;
    out.clip = vec4<f32>(position, 0.0, 1.0);
    out.uv = tex_coord;
    return out;
}
"#;

    const FRAGMENT_NEEDS_LOCATION_1: &str = r#"
@group(0) @binding(0) var sampler_y: texture_2d<f32>;
@group(0) @binding(1) var sampler_uv: texture_2d<f32>;
@group(0) @binding(2) var s: sampler;

@fragment
fn fs_main(@location(1) extra: vec4<f32>) -> @location(0) vec4<f32> {
    return extra;
}
"#;

    #[test]
    fn builtin_shaders_compile_and_link() {
        let sources = ShaderSources::builtin();
        let vs = compile_stage(ShaderStage::Vertex, &sources.vertex).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, &sources.fragment).unwrap();
        assert_eq!(vs.entry_point(), "vs_main");
        assert_eq!(fs.entry_point(), "fs_main");

        let layout = link(&vs, &fs).unwrap();
        assert_eq!(layout.attributes, VertexAttributes { position: 0, tex_coord: 1 });
        assert_eq!(
            layout.resolve_samplers().unwrap(),
            SamplerBindings { group: 0, luma: 0, chroma: 1, sampler: 2 }
        );
    }

    #[test]
    fn attributes_resolve_by_name_not_order() {
        let vs = compile_stage(ShaderStage::Vertex, SWAPPED_VERTEX).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, &ShaderSources::builtin().fragment).unwrap();
        let layout = link(&vs, &fs).unwrap();
        assert_eq!(layout.attributes, VertexAttributes { position: 5, tex_coord: 3 });
    }

    #[test]
    fn malformed_source_reports_stage_and_log() {
        let err = compile_stage(ShaderStage::Fragment, "@fragment fn fs_main( -> {").unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(!err.log.is_empty());
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = compile_stage(ShaderStage::Fragment, &ShaderSources::builtin().vertex).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(err.log.contains("entry point"));
    }

    #[test]
    fn unmatched_fragment_input_fails_link() {
        let vs = compile_stage(ShaderStage::Vertex, &ShaderSources::builtin().vertex).unwrap();
        let fs = compile_stage(ShaderStage::Fragment, FRAGMENT_NEEDS_LOCATION_1).unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.0.contains("@location(1)"), "{err}");
    }

    #[test]
    fn missing_attribute_fails_link() {
        let vs_src = r#"
@vertex
fn vs_main(@location(0) pos: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(pos, 0.0, 1.0);
}
"#;
        let vs = compile_stage(ShaderStage::Vertex, vs_src).unwrap();
        let fs_src = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
}
"#;
        let fs = compile_stage(ShaderStage::Fragment, fs_src).unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.0.contains("`position`"), "{err}");
    }

    #[test]
    fn missing_chroma_sampler_is_unresolved() {
        let layout = ProgramLayout {
            vertex_entry: "vs_main".into(),
            fragment_entry: "fs_main".into(),
            attributes: VertexAttributes { position: 0, tex_coord: 1 },
            resources: vec![
                ResourceBinding { name: Some("sampler_y".into()), group: 0, binding: 0, kind: ResourceKind::Texture2d },
                ResourceBinding { name: Some("s".into()), group: 0, binding: 2, kind: ResourceKind::Sampler },
            ],
        };
        let err = layout.resolve_samplers().unwrap_err();
        assert!(err.contains("sampler_uv"));
    }
}
