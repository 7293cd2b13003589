//! Print the lens mesh for a screen/lens setup; optionally write the GPU vertex buffer.
//! Run: cargo run -p debug --bin mesh_dump -- 800 600 400 300 100 0.5 [vertices.bin]

use gravlens_renderer::{LensConfig, LensMeshModel};
use lens_api::{LensParams, ScreenSpec};

fn arg<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> Result<T, String> {
    match args.get(index) {
        Some(raw) => raw.parse().map_err(|_| format!("bad argument #{index}: '{raw}'")),
        None => Ok(default),
    }
}

fn main() -> Result<(), String> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = LensConfig::from_env();
    let width: u32 = arg(&args, 0, 800)?;
    let height: u32 = arg(&args, 1, 600)?;
    let lens = LensParams::new(
        arg(&args, 2, width as f32 / 2.0)?,
        arg(&args, 3, height as f32 / 2.0)?,
        arg(&args, 4, config.default_lens_radius)?,
        arg(&args, 5, config.default_lens_strength)?,
    )
    .map_err(|e| e.to_string())?;
    let spec = ScreenSpec::new(width, height, config.mesh_factor, width, height).map_err(|e| e.to_string())?;

    let mesh = LensMeshModel::from_config(&config).compute_mesh(&spec, &lens);
    println!(
        "screen {}x{} factor {} -> grid {}x{} ({} vertices, {} indices)",
        width,
        height,
        spec.effective_mesh_factor(),
        mesh.cols(),
        mesh.rows(),
        mesh.vertex_count(),
        mesh.index_count()
    );

    let moved: Vec<_> = mesh
        .vertices()
        .iter()
        .filter(|v| v.base_position != v.displaced_position)
        .collect();
    println!("{} vertices displaced by the lens", moved.len());
    let max_shift = moved
        .iter()
        .map(|v| {
            let dx = v.displaced_position[0] - v.base_position[0];
            let dy = v.displaced_position[1] - v.base_position[1];
            dx.hypot(dy)
        })
        .fold(0.0f32, f32::max);
    println!("largest displacement: {max_shift:.2} px");
    for v in moved.iter().take(8) {
        println!(
            "  ({:7.2}, {:7.2}) -> ({:7.2}, {:7.2})  uv ({:.4}, {:.4})",
            v.base_position[0],
            v.base_position[1],
            v.displaced_position[0],
            v.displaced_position[1],
            v.tex_coord[0],
            v.tex_coord[1]
        );
    }

    if let Some(path) = args.get(6) {
        let gpu = mesh.gpu_vertices();
        std::fs::write(path, bytemuck::cast_slice::<_, u8>(&gpu)).map_err(|e| e.to_string())?;
        println!("wrote {} bytes to {path}", gpu.len() * std::mem::size_of::<gravlens_renderer::GpuVertex>());
    }
    Ok(())
}
