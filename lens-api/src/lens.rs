//! Screen geometry and lensing-object parameters. Both are validated on construction,
//! so the mesh model never sees a zero-sized screen or a negative radius.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDimension(&'static str),
    #[error("mesh factor must be a positive integer")]
    ZeroMeshFactor,
    #[error("lens radius must be >= 0 (got {0})")]
    NegativeRadius(f32),
    #[error("{0} must be finite")]
    NonFinite(&'static str),
    #[error("a {cols}x{rows} vertex grid needs more than u32::MAX indices")]
    GridTooLarge { cols: u64, rows: u64 },
}

/// Screen and texture dimensions plus the mesh density divisor.
/// Cell size is `screen_width / mesh_factor` before clamping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScreenSpec {
    screen_width: u32,
    screen_height: u32,
    texture_width: u32,
    texture_height: u32,
    mesh_factor: u32,
}

impl ScreenSpec {
    pub fn new(
        screen_width: u32,
        screen_height: u32,
        mesh_factor: u32,
        texture_width: u32,
        texture_height: u32,
    ) -> Result<Self, ConfigError> {
        if screen_width == 0 {
            return Err(ConfigError::ZeroDimension("screen width"));
        }
        if screen_height == 0 {
            return Err(ConfigError::ZeroDimension("screen height"));
        }
        if texture_width == 0 {
            return Err(ConfigError::ZeroDimension("texture width"));
        }
        if texture_height == 0 {
            return Err(ConfigError::ZeroDimension("texture height"));
        }
        if mesh_factor == 0 {
            return Err(ConfigError::ZeroMeshFactor);
        }
        let factor = u64::from(mesh_factor.min(screen_width.min(screen_height)));
        let cols = (u64::from(screen_width).div_ceil(factor) + 1).max(2);
        let rows = (u64::from(screen_height).div_ceil(factor) + 1).max(2);
        let index_count = (cols - 1).checked_mul(rows - 1).and_then(|cells| cells.checked_mul(6));
        match index_count {
            Some(count) if count <= u64::from(u32::MAX) => {}
            _ => return Err(ConfigError::GridTooLarge { cols, rows }),
        }
        Ok(Self { screen_width, screen_height, texture_width, texture_height, mesh_factor })
    }

    pub fn screen_width(&self) -> u32 { self.screen_width }
    pub fn screen_height(&self) -> u32 { self.screen_height }
    pub fn texture_width(&self) -> u32 { self.texture_width }
    pub fn texture_height(&self) -> u32 { self.texture_height }
    pub fn mesh_factor(&self) -> u32 { self.mesh_factor }

    /// Mesh factor clamped so the grid always has at least one cell per axis.
    pub fn effective_mesh_factor(&self) -> u32 {
        self.mesh_factor.min(self.screen_width.min(self.screen_height))
    }

    /// Vertex grid as (cols, rows): `ceil(side / factor) + 1` per axis, at least 2 x 2.
    /// Construction guarantees the grid's index count fits in `u32`.
    pub fn grid_size(&self) -> (u32, u32) {
        let factor = self.effective_mesh_factor();
        let cols = self.screen_width.div_ceil(factor) + 1;
        let rows = self.screen_height.div_ceil(factor) + 1;
        (cols.max(2), rows.max(2))
    }

    /// Same screen, new texture size (camera format change).
    pub fn with_texture_size(&self, texture_width: u32, texture_height: u32) -> Result<Self, ConfigError> {
        Self::new(self.screen_width, self.screen_height, self.mesh_factor, texture_width, texture_height)
    }

    /// Same texture, new screen size (rotation or resize).
    pub fn with_screen_size(&self, screen_width: u32, screen_height: u32) -> Result<Self, ConfigError> {
        Self::new(screen_width, screen_height, self.mesh_factor, self.texture_width, self.texture_height)
    }

    pub fn texture_size(&self) -> (u32, u32) {
        (self.texture_width, self.texture_height)
    }
}

/// Lensing object in screen space. `radius == 0` disables the effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LensParams {
    center_x: f32,
    center_y: f32,
    radius: f32,
    strength: f32,
}

impl LensParams {
    pub fn new(center_x: f32, center_y: f32, radius: f32, strength: f32) -> Result<Self, ConfigError> {
        if !center_x.is_finite() {
            return Err(ConfigError::NonFinite("lens center x"));
        }
        if !center_y.is_finite() {
            return Err(ConfigError::NonFinite("lens center y"));
        }
        if !radius.is_finite() {
            return Err(ConfigError::NonFinite("lens radius"));
        }
        if radius < 0.0 {
            return Err(ConfigError::NegativeRadius(radius));
        }
        if !strength.is_finite() {
            return Err(ConfigError::NonFinite("lens strength"));
        }
        Ok(Self { center_x, center_y, radius, strength })
    }

    /// No lensing object on screen.
    pub fn inactive() -> Self {
        Self { center_x: 0.0, center_y: 0.0, radius: 0.0, strength: 0.0 }
    }

    pub fn center(&self) -> [f32; 2] { [self.center_x, self.center_y] }
    pub fn center_x(&self) -> f32 { self.center_x }
    pub fn center_y(&self) -> f32 { self.center_y }
    pub fn radius(&self) -> f32 { self.radius }
    pub fn strength(&self) -> f32 { self.strength }

    pub fn is_active(&self) -> bool {
        self.radius > 0.0
    }
}

impl Default for LensParams {
    fn default() -> Self {
        Self::inactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_spec_rejects_zero_sizes() {
        assert_eq!(ScreenSpec::new(0, 600, 8, 640, 480), Err(ConfigError::ZeroDimension("screen width")));
        assert_eq!(ScreenSpec::new(800, 0, 8, 640, 480), Err(ConfigError::ZeroDimension("screen height")));
        assert_eq!(ScreenSpec::new(800, 600, 8, 0, 480), Err(ConfigError::ZeroDimension("texture width")));
        assert_eq!(ScreenSpec::new(800, 600, 8, 640, 0), Err(ConfigError::ZeroDimension("texture height")));
        assert_eq!(ScreenSpec::new(800, 600, 0, 640, 480), Err(ConfigError::ZeroMeshFactor));
    }

    #[test]
    fn mesh_factor_clamps_to_shorter_side() {
        let spec = ScreenSpec::new(40, 30, 100, 640, 480).unwrap();
        assert_eq!(spec.mesh_factor(), 100);
        assert_eq!(spec.effective_mesh_factor(), 30);
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let spec = ScreenSpec::new(800, 600, 8, 640, 480).unwrap();
        assert_eq!(spec.grid_size(), (101, 76));
        assert_eq!(
            ScreenSpec::new(100_000, 100_000, 1, 64, 64),
            Err(ConfigError::GridTooLarge { cols: 100_001, rows: 100_001 })
        );
        assert!(matches!(
            ScreenSpec::new(u32::MAX, u32::MAX, 1, 64, 64),
            Err(ConfigError::GridTooLarge { .. })
        ));
        // a long thin screen still fits
        assert!(ScreenSpec::new(1_000_000, 1, 1, 64, 64).is_ok());
    }

    #[test]
    fn lens_params_validation() {
        assert!(LensParams::new(400.0, 300.0, 100.0, 0.5).is_ok());
        assert!(LensParams::new(400.0, 300.0, 0.0, 0.5).is_ok());
        assert_eq!(LensParams::new(1.0, 1.0, -1.0, 0.5), Err(ConfigError::NegativeRadius(-1.0)));
        assert!(matches!(LensParams::new(f32::NAN, 1.0, 1.0, 0.5), Err(ConfigError::NonFinite(_))));
        assert!(matches!(LensParams::new(1.0, 1.0, f32::INFINITY, 0.5), Err(ConfigError::NonFinite(_))));
        assert!(matches!(LensParams::new(1.0, 1.0, 1.0, f32::NAN), Err(ConfigError::NonFinite(_))));
    }

    #[test]
    fn rebuild_keeps_other_dimensions() {
        let spec = ScreenSpec::new(800, 600, 8, 640, 480).unwrap();
        let tex = spec.with_texture_size(1280, 720).unwrap();
        assert_eq!((tex.screen_width(), tex.screen_height(), tex.mesh_factor()), (800, 600, 8));
        assert_eq!(tex.texture_size(), (1280, 720));
        let rotated = spec.with_screen_size(600, 800).unwrap();
        assert_eq!((rotated.screen_width(), rotated.screen_height()), (600, 800));
        assert_eq!(rotated.texture_size(), (640, 480));
    }
}
