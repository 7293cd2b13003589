//! Lensing mesh model: regular screen-space grid, texture mapping and radial displacement.
//!
//! Vertices inside the lens radius are pushed away from the center by
//! `strength * (radius - dist)`, which is zero on the lens boundary so the field has no seam.
//! The extra offset is clamped to `max_displacement`; a vertex sitting on the center
//! (direction undefined) is pinned there.

use lens_api::{LensParams, ScreenSpec};

use crate::config::{ContentFit, LensConfig};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshVertex {
    /// Undistorted screen position (pixels, y down).
    pub base_position: [f32; 2],
    /// Texture coordinate in [0, 1], derived from the base position.
    pub tex_coord: [f32; 2],
    /// Screen position after lens displacement.
    pub displaced_position: [f32; 2],
}

/// Vertex layout uploaded to the GPU: NDC position + texture coordinate, stride 16.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

impl GpuVertex {
    pub const STRIDE: u64 = std::mem::size_of::<GpuVertex>() as u64;
    pub const POSITION_OFFSET: u64 = 0;
    pub const TEX_COORD_OFFSET: u64 = 8;
}

/// Triangulated grid generated for one (ScreenSpec, LensParams) pair. Never patched in place.
#[derive(Clone, Debug)]
pub struct Mesh {
    spec: ScreenSpec,
    lens: LensParams,
    cols: u32,
    rows: u32,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
}

impl Mesh {
    pub fn spec(&self) -> &ScreenSpec { &self.spec }
    pub fn lens(&self) -> &LensParams { &self.lens }
    pub fn cols(&self) -> u32 { self.cols }
    pub fn rows(&self) -> u32 { self.rows }
    pub fn vertices(&self) -> &[MeshVertex] { &self.vertices }
    pub fn indices(&self) -> &[u32] { &self.indices }
    pub fn vertex_count(&self) -> usize { self.vertices.len() }
    pub fn index_count(&self) -> usize { self.indices.len() }

    pub fn vertex(&self, col: u32, row: u32) -> &MeshVertex {
        &self.vertices[(row * self.cols + col) as usize]
    }

    /// Displaced positions converted to NDC (y up) for upload.
    pub fn gpu_vertices(&self) -> Vec<GpuVertex> {
        let w = self.spec.screen_width() as f32;
        let h = self.spec.screen_height() as f32;
        self.vertices
            .iter()
            .map(|v| GpuVertex {
                position: [
                    2.0 * v.displaced_position[0] / w - 1.0,
                    1.0 - 2.0 * v.displaced_position[1] / h,
                ],
                tex_coord: v.tex_coord,
            })
            .collect()
    }
}

/// Pure mesh generator. Same inputs always give bitwise-identical output.
#[derive(Clone, Debug, PartialEq)]
pub struct LensMeshModel {
    pub max_displacement: f32,
    pub epsilon: f32,
    pub content_fit: ContentFit,
    pub mirror_horizontal: bool,
}

impl Default for LensMeshModel {
    fn default() -> Self {
        Self::from_config(&LensConfig::default())
    }
}

impl LensMeshModel {
    pub fn from_config(config: &LensConfig) -> Self {
        Self {
            max_displacement: config.max_displacement,
            epsilon: config.displacement_epsilon,
            content_fit: config.content_fit,
            mirror_horizontal: config.mirror_horizontal,
        }
    }

    /// Grid size as (cols, rows); at least 2 x 2.
    pub fn grid_size(spec: &ScreenSpec) -> (u32, u32) {
        spec.grid_size()
    }

    pub fn compute_mesh(&self, spec: &ScreenSpec, lens: &LensParams) -> Mesh {
        let (cols, rows) = Self::grid_size(spec);
        let w = spec.screen_width() as f32;
        let h = spec.screen_height() as f32;
        let last_col = (cols - 1) as f32;
        let last_row = (rows - 1) as f32;

        let mut vertices = Vec::with_capacity(cols as usize * rows as usize);
        for j in 0..rows {
            let y = j as f32 * h / last_row;
            for i in 0..cols {
                let x = i as f32 * w / last_col;
                let base = [x, y];
                vertices.push(MeshVertex {
                    base_position: base,
                    tex_coord: self.tex_coord(spec, base),
                    displaced_position: self.displace(lens, base),
                });
            }
        }

        Mesh { spec: *spec, lens: *lens, cols, rows, vertices, indices: grid_indices(cols, rows) }
    }

    /// Map a screen position into the texture. Screen and texture sizes are handled per axis.
    pub fn tex_coord(&self, spec: &ScreenSpec, position: [f32; 2]) -> [f32; 2] {
        let w = spec.screen_width() as f32;
        let h = spec.screen_height() as f32;
        let tw = spec.texture_width() as f32;
        let th = spec.texture_height() as f32;
        let (u, v) = match self.content_fit {
            ContentFit::Stretch => (position[0] / w, position[1] / h),
            ContentFit::Cover => {
                // screen pixels per texel, large enough that the texture covers the screen
                let scale = (w / tw).max(h / th);
                let offset_x = (tw - w / scale) * 0.5;
                let offset_y = (th - h / scale) * 0.5;
                ((offset_x + position[0] / scale) / tw, (offset_y + position[1] / scale) / th)
            }
        };
        let u = u.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        if self.mirror_horizontal {
            [1.0 - u, v]
        } else {
            [u, v]
        }
    }

    /// Lens displacement of a single screen position.
    pub fn displace(&self, lens: &LensParams, position: [f32; 2]) -> [f32; 2] {
        let radius = lens.radius();
        if radius <= 0.0 {
            return position;
        }
        let [cx, cy] = lens.center();
        let dx = position[0] - cx;
        let dy = position[1] - cy;
        let dist = dx.hypot(dy);
        if dist >= radius {
            return position;
        }
        if dist <= self.epsilon {
            return [cx, cy];
        }
        let extra = (lens.strength() * (radius - dist)).clamp(-self.max_displacement, self.max_displacement);
        let scale = 1.0 + extra / dist;
        [cx + dx * scale, cy + dy * scale]
    }
}

/// Mesh with the default model (Cover fit, 256 px clamp).
pub fn compute_mesh(spec: &ScreenSpec, lens: &LensParams) -> Mesh {
    LensMeshModel::default().compute_mesh(spec, lens)
}

/// Two triangles per cell: [tl, bl, br] and [tl, br, tr]. Counter-clockwise once y points up.
fn grid_indices(cols: u32, rows: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity(6 * (cols as usize - 1) * (rows as usize - 1));
    for j in 0..rows - 1 {
        for i in 0..cols - 1 {
            let tl = j * cols + i;
            let tr = tl + 1;
            let bl = tl + cols;
            let br = bl + 1;
            indices.extend_from_slice(&[tl, bl, br, tl, br, tr]);
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(w: u32, h: u32, factor: u32) -> ScreenSpec {
        ScreenSpec::new(w, h, factor, w, h).unwrap()
    }

    fn lens(x: f32, y: f32, r: f32, s: f32) -> LensParams {
        LensParams::new(x, y, r, s).unwrap()
    }

    fn dist(a: [f32; 2], b: [f32; 2]) -> f32 {
        (a[0] - b[0]).hypot(a[1] - b[1])
    }

    #[test]
    fn grid_counts_800x600() {
        let mesh = compute_mesh(&spec(800, 600, 8), &LensParams::inactive());
        assert_eq!((mesh.cols(), mesh.rows()), (101, 76));
        assert_eq!(mesh.vertex_count(), 7676);
        assert_eq!(mesh.index_count(), 45000);
        assert!(mesh.indices().iter().all(|&i| (i as usize) < mesh.vertex_count()));
    }

    #[test]
    fn grid_rounds_up_and_clamps_factor() {
        let mesh = compute_mesh(&spec(801, 600, 8), &LensParams::inactive());
        assert_eq!((mesh.cols(), mesh.rows()), (102, 76));
        assert_eq!(mesh.vertex(101, 0).base_position, [801.0, 0.0]);

        let mesh = compute_mesh(&spec(40, 30, 1000), &LensParams::inactive());
        assert_eq!((mesh.cols(), mesh.rows()), (3, 2));
        assert_eq!(mesh.index_count(), 6 * 2);
    }

    #[test]
    fn index_count_matches_cells() {
        for (w, h, f) in [(320, 240, 7), (17, 5, 3), (2, 2, 1), (1920, 1080, 32)] {
            let mesh = compute_mesh(&spec(w, h, f), &lens(w as f32 / 2.0, h as f32 / 2.0, 30.0, 0.4));
            let (cols, rows) = (mesh.cols() as usize, mesh.rows() as usize);
            assert_eq!(mesh.vertex_count(), cols * rows);
            assert_eq!(mesh.index_count(), 6 * (cols - 1) * (rows - 1));
            assert!(mesh.indices().iter().all(|&i| (i as usize) < mesh.vertex_count()));
        }
    }

    #[test]
    fn mesh_is_deterministic() {
        let s = spec(800, 600, 8);
        let l = lens(400.0, 300.0, 100.0, 0.5);
        let a = compute_mesh(&s, &l);
        let b = compute_mesh(&s, &l);
        for (va, vb) in a.vertices().iter().zip(b.vertices()) {
            assert_eq!(va.displaced_position[0].to_bits(), vb.displaced_position[0].to_bits());
            assert_eq!(va.displaced_position[1].to_bits(), vb.displaced_position[1].to_bits());
            assert_eq!(va.tex_coord[0].to_bits(), vb.tex_coord[0].to_bits());
        }
        assert_eq!(a.indices(), b.indices());
    }

    #[test]
    fn vertices_outside_radius_are_untouched() {
        let s = spec(800, 600, 8);
        for l in [
            lens(400.0, 300.0, 100.0, 0.5),
            lens(0.0, 0.0, 250.0, 3.0),
            lens(799.0, 10.0, 60.0, -0.7),
            lens(400.0, 300.0, 0.0, 5.0),
        ] {
            let mesh = compute_mesh(&s, &l);
            for v in mesh.vertices() {
                if dist(v.base_position, l.center()) >= l.radius() {
                    assert_eq!(v.displaced_position, v.base_position);
                }
            }
        }
    }

    #[test]
    fn zero_radius_disables_the_lens() {
        let mesh = compute_mesh(&spec(64, 64, 8), &lens(32.0, 32.0, 0.0, 1.0));
        assert!(mesh.vertices().iter().all(|v| v.displaced_position == v.base_position));
    }

    #[test]
    fn center_vertex_is_clamped_not_nan() {
        let model = LensMeshModel::default();
        let l = lens(400.0, 300.0, 100.0, 0.5);
        let displaced = model.displace(&l, [400.0, 300.0]);
        assert!(displaced[0].is_finite() && displaced[1].is_finite());
        assert!(dist(displaced, [400.0, 300.0]) <= model.max_displacement);

        // 800x600 / 8 has 8 px cells, so (400, 304) is a grid point
        let on_grid = lens(400.0, 304.0, 100.0, 0.5);
        let mesh = compute_mesh(&spec(800, 600, 8), &on_grid);
        let center = mesh.vertex(50, 38);
        assert_eq!(center.base_position, [400.0, 304.0]);
        assert_eq!(center.displaced_position, [400.0, 304.0]);
        assert!(mesh.vertices().iter().all(|v| v.displaced_position.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn boundary_vertex_is_not_displaced() {
        let model = LensMeshModel::default();
        let l = lens(400.0, 300.0, 100.0, 0.5);
        assert_eq!(model.displace(&l, [500.0, 300.0]), [500.0, 300.0]);
    }

    #[test]
    fn displacement_is_continuous_at_the_boundary() {
        let model = LensMeshModel::default();
        let l = lens(400.0, 300.0, 100.0, 0.5);
        let eps = 1e-3;
        let inside = model.displace(&l, [500.0 - eps, 300.0]);
        let outside = model.displace(&l, [500.0 + eps, 300.0]);
        assert!(dist(inside, outside) < 1e-2);

        let diagonal = std::f32::consts::FRAC_1_SQRT_2;
        let inside = model.displace(&l, [400.0 + (100.0 - eps) * diagonal, 300.0 + (100.0 - eps) * diagonal]);
        let outside = model.displace(&l, [400.0 + (100.0 + eps) * diagonal, 300.0 + (100.0 + eps) * diagonal]);
        assert!(dist(inside, outside) < 1e-2);
    }

    #[test]
    fn inside_points_move_radially_outward() {
        let model = LensMeshModel::default();
        let l = lens(400.0, 300.0, 100.0, 0.5);
        let displaced = model.displace(&l, [450.0, 300.0]);
        // extra = 0.5 * (100 - 50) = 25
        assert!((displaced[0] - 475.0).abs() < 1e-4);
        assert_eq!(displaced[1], 300.0);
    }

    #[test]
    fn extra_displacement_respects_the_clamp() {
        let model = LensMeshModel { max_displacement: 10.0, ..LensMeshModel::default() };
        let l = lens(0.0, 0.0, 100.0, 5.0);
        let displaced = model.displace(&l, [20.0, 0.0]);
        assert!((displaced[0] - 30.0).abs() < 1e-4);

        let pulled = model.displace(&lens(0.0, 0.0, 100.0, -5.0), [20.0, 0.0]);
        assert!((pulled[0] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn triangles_wind_counter_clockwise_in_ndc() {
        let mesh = compute_mesh(&spec(64, 48, 8), &LensParams::inactive());
        let verts = mesh.gpu_vertices();
        for tri in mesh.indices().chunks_exact(3) {
            let [a, b, c] = [verts[tri[0] as usize], verts[tri[1] as usize], verts[tri[2] as usize]];
            let area = (b.position[0] - a.position[0]) * (c.position[1] - a.position[1])
                - (b.position[1] - a.position[1]) * (c.position[0] - a.position[0]);
            assert!(area > 0.0, "triangle {tri:?} is clockwise");
        }
    }

    #[test]
    fn ndc_corners() {
        let mesh = compute_mesh(&spec(800, 600, 8), &LensParams::inactive());
        let verts = mesh.gpu_vertices();
        assert_eq!(verts[0].position, [-1.0, 1.0]);
        assert_eq!(verts[verts.len() - 1].position, [1.0, -1.0]);
        assert_eq!(std::mem::size_of::<GpuVertex>() as u64, GpuVertex::STRIDE);
    }

    #[test]
    fn stretch_maps_screen_edges_to_texture_edges() {
        let model = LensMeshModel { content_fit: ContentFit::Stretch, ..LensMeshModel::default() };
        let s = ScreenSpec::new(800, 600, 8, 640, 480).unwrap();
        assert_eq!(model.tex_coord(&s, [0.0, 0.0]), [0.0, 0.0]);
        assert_eq!(model.tex_coord(&s, [800.0, 600.0]), [1.0, 1.0]);
        assert_eq!(model.tex_coord(&s, [400.0, 150.0]), [0.5, 0.25]);
    }

    #[test]
    fn cover_crops_the_longer_texture_axis() {
        let model = LensMeshModel::default();
        // 16:9 texture on a 4:3 screen: full height, cropped width
        let s = ScreenSpec::new(800, 600, 8, 1280, 720).unwrap();
        let top_left = model.tex_coord(&s, [0.0, 0.0]);
        let bottom_right = model.tex_coord(&s, [800.0, 600.0]);
        assert!(top_left[1].abs() < 1e-6);
        assert!((bottom_right[1] - 1.0).abs() < 1e-6);
        assert!(top_left[0] > 0.0 && bottom_right[0] < 1.0);
        assert!((top_left[0] + bottom_right[0] - 1.0).abs() < 1e-6, "crop is centered");
        let mid = model.tex_coord(&s, [400.0, 300.0]);
        assert!((mid[0] - 0.5).abs() < 1e-6 && (mid[1] - 0.5).abs() < 1e-6);

        let mesh = model.compute_mesh(&s, &LensParams::inactive());
        assert!(mesh
            .vertices()
            .iter()
            .all(|v| (0.0..=1.0).contains(&v.tex_coord[0]) && (0.0..=1.0).contains(&v.tex_coord[1])));
    }

    #[test]
    fn mirror_flips_u() {
        let model = LensMeshModel { mirror_horizontal: true, ..LensMeshModel::default() };
        let s = spec(100, 100, 10);
        assert_eq!(model.tex_coord(&s, [0.0, 0.0]), [1.0, 0.0]);
        assert_eq!(model.tex_coord(&s, [100.0, 50.0]), [0.0, 0.5]);
    }

    #[test]
    fn tex_coords_follow_base_not_displaced_position() {
        let s = spec(200, 200, 10);
        let plain = compute_mesh(&s, &LensParams::inactive());
        let lensed = compute_mesh(&s, &lens(100.0, 100.0, 80.0, 0.8));
        for (a, b) in plain.vertices().iter().zip(lensed.vertices()) {
            assert_eq!(a.tex_coord, b.tex_coord);
            assert_eq!(a.base_position, b.base_position);
        }
    }
}
