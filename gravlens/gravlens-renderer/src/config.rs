//! GravLens configuration: mesh density, displacement clamp, texture fit, swapchain.

use std::str::FromStr;

/// How the camera texture is mapped onto a screen of a different aspect ratio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentFit {
    /// Aspect-fill: scale until the screen is covered, crop the overflow evenly.
    #[default]
    Cover,
    /// Map texture edges to screen edges on each axis independently.
    Stretch,
}

impl FromStr for ContentFit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cover" => Ok(ContentFit::Cover),
            "stretch" => Ok(ContentFit::Stretch),
            other => Err(format!("unknown content fit '{other}'")),
        }
    }
}

/// Renderer and bridge configuration.
#[derive(Clone, Debug)]
pub struct LensConfig {
    /// Mesh density divisor: cell size = screen width / mesh_factor.
    pub mesh_factor: u32,
    /// Upper bound on the extra displacement of any vertex, in screen pixels.
    pub max_displacement: f32,
    /// Vertices closer than this to the lens center are pinned to it.
    pub displacement_epsilon: f32,
    pub content_fit: ContentFit,
    /// Flip u (front-facing camera).
    pub mirror_horizontal: bool,
    /// Lens radius used when the input layer places a lens without one.
    pub default_lens_radius: f32,
    pub default_lens_strength: f32,
    /// Swapchain texture format for the mesh pipeline's color target.
    pub swapchain_format: wgpu::TextureFormat,
    pub clear_color: wgpu::Color,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            mesh_factor: 8,
            max_displacement: 256.0,
            displacement_epsilon: 1e-3,
            content_fit: ContentFit::default(),
            mirror_horizontal: false,
            default_lens_radius: 100.0,
            default_lens_strength: 0.5,
            swapchain_format: wgpu::TextureFormat::Bgra8Unorm,
            clear_color: wgpu::Color::BLACK,
        }
    }
}

impl LensConfig {
    /// Defaults overlaid with GRAVLENS_MESH_FACTOR, GRAVLENS_MAX_DISPLACEMENT,
    /// GRAVLENS_CONTENT_FIT and GRAVLENS_MIRROR.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value lookup. Unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(factor) = parse_var::<u32>(&lookup, "GRAVLENS_MESH_FACTOR") {
            if factor > 0 {
                self.mesh_factor = factor;
            } else {
                log::warn!("GRAVLENS_MESH_FACTOR must be positive, keeping {}", self.mesh_factor);
            }
        }
        if let Some(max) = parse_var::<f32>(&lookup, "GRAVLENS_MAX_DISPLACEMENT") {
            if max.is_finite() && max >= 0.0 {
                self.max_displacement = max;
            } else {
                log::warn!("GRAVLENS_MAX_DISPLACEMENT must be finite and >= 0, keeping {}", self.max_displacement);
            }
        }
        if let Some(fit) = parse_var::<ContentFit>(&lookup, "GRAVLENS_CONTENT_FIT") {
            self.content_fit = fit;
        }
        if let Some(raw) = lookup("GRAVLENS_MIRROR") {
            self.mirror_horizontal = matches!(raw.trim(), "1" | "true" | "yes");
        }
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn overrides_apply() {
        let config = LensConfig::default().with_overrides(lookup(&[
            ("GRAVLENS_MESH_FACTOR", "16"),
            ("GRAVLENS_MAX_DISPLACEMENT", "40.5"),
            ("GRAVLENS_CONTENT_FIT", "Stretch"),
            ("GRAVLENS_MIRROR", "1"),
        ]));
        assert_eq!(config.mesh_factor, 16);
        assert_eq!(config.max_displacement, 40.5);
        assert_eq!(config.content_fit, ContentFit::Stretch);
        assert!(config.mirror_horizontal);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = LensConfig::default().with_overrides(lookup(&[
            ("GRAVLENS_MESH_FACTOR", "0"),
            ("GRAVLENS_MAX_DISPLACEMENT", "lots"),
            ("GRAVLENS_CONTENT_FIT", "zoom"),
        ]));
        let defaults = LensConfig::default();
        assert_eq!(config.mesh_factor, defaults.mesh_factor);
        assert_eq!(config.max_displacement, defaults.max_displacement);
        assert_eq!(config.content_fit, ContentFit::Cover);
        assert!(!config.mirror_horizontal);
    }
}
