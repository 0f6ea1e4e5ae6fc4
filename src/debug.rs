//! Per-frame debug configuration

use crate::backend::types::{CullMode, FrontFace};

/// Range the shadow bias slider is meant to cover
pub const SHADOW_BIAS_RANGE: std::ops::RangeInclusive<f32> = 0.0..=0.05;

/// Debug toggles handed to [`Renderer::draw_scene`](crate::renderer::Renderer::draw_scene)
/// every frame. Nothing here is stored globally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugSettings {
    /// Overlay the per-tile light count heatmap
    pub show_heatmap: bool,
    /// Draw light shapes as line lists
    pub show_light_wireframes: bool,
    /// When false, shading skips every shadow map lookup
    pub shadows_enabled: bool,
    /// Depth bias subtracted before every shadow comparison
    pub shadow_bias: f32,
    /// Clear depth but skip rasterizing the pre-pass
    pub skip_depth_prepass: bool,
    pub disable_backface_culling: bool,
    pub front_face: FrontFace,
    /// Force every tile count to zero so shading falls back to all lights
    pub disable_light_culling: bool,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            show_heatmap: false,
            show_light_wireframes: true,
            shadows_enabled: true,
            shadow_bias: 0.005,
            skip_depth_prepass: false,
            disable_backface_culling: false,
            front_face: FrontFace::Ccw,
            disable_light_culling: false,
        }
    }
}

impl DebugSettings {
    pub fn cull_mode(&self) -> CullMode {
        if self.disable_backface_culling {
            CullMode::None
        } else {
            CullMode::Back
        }
    }

    /// Bias clamped to the slider range
    pub fn clamped_bias(&self) -> f32 {
        self.shadow_bias
            .clamp(*SHADOW_BIAS_RANGE.start(), *SHADOW_BIAS_RANGE.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = DebugSettings::default();
        assert!(settings.shadows_enabled);
        assert!(settings.show_light_wireframes);
        assert!(!settings.show_heatmap);
        assert_eq!(settings.shadow_bias, 0.005);
        assert_eq!(settings.front_face, FrontFace::Ccw);
        assert_eq!(settings.cull_mode(), CullMode::Back);
    }

    #[test]
    fn bias_is_clamped_to_slider_range() {
        let settings = DebugSettings {
            shadow_bias: 0.5,
            disable_backface_culling: true,
            ..Default::default()
        };
        assert_eq!(settings.clamped_bias(), 0.05);
        assert_eq!(settings.cull_mode(), CullMode::None);
    }
}
