//! Shadow map rendering and 3x3 PCF on the CPU
//!
//! Sampling follows the comparison sampler the renderer creates: nearest
//! texel, clamp to edge, `LessEqual` against the biased reference depth.

use crate::cpu::raster::DepthBuffer;
use crate::scene::{GpuLight, LightType};
use crate::shadow::{ShadowPlan, ShadowTarget, ShadowUniforms};
use crate::MAX_SPOT_SHADOWS;
use glam::{Mat4, Vec3};

/// One shadow caster: model matrix, positions and triangle indices
#[derive(Debug, Clone, Copy)]
pub struct Caster<'a> {
    pub model: Mat4,
    pub positions: &'a [Vec3],
    pub indices: &'a [u32],
}

fn compare(map: &DepthBuffer, u: f32, v: f32, reference: f32) -> f32 {
    let x = (u * map.width() as f32).floor().clamp(0.0, map.width() as f32 - 1.0) as u32;
    let y = (v * map.height() as f32).floor().clamp(0.0, map.height() as f32 - 1.0) as u32;
    if reference <= map.depth_at(x, y) {
        1.0
    } else {
        0.0
    }
}

/// Lit fraction of a world point under one shadow map
///
/// Points behind the light or projecting outside the map count as lit.
pub fn pcf(map: &DepthBuffer, view_proj: &Mat4, world: Vec3, bias: f32) -> f32 {
    let clip = *view_proj * world.extend(1.0);
    if clip.w <= 0.0 {
        return 1.0;
    }
    let ndc = clip.truncate() / clip.w;
    let u = ndc.x * 0.5 + 0.5;
    let v = -ndc.y * 0.5 + 0.5;
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) || !(0.0..=1.0).contains(&ndc.z) {
        return 1.0;
    }

    let texel_u = 1.0 / map.width() as f32;
    let texel_v = 1.0 / map.height() as f32;
    let reference = ndc.z - bias;
    let mut lit = 0.0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            lit += compare(map, u + dx as f32 * texel_u, v + dy as f32 * texel_v, reference);
        }
    }
    lit / 9.0
}

/// Rendered shadow maps for one frame plus the uniforms that index them
#[derive(Debug, Clone)]
pub struct ShadowMaps {
    pub uniforms: ShadowUniforms,
    pub directional: DepthBuffer,
    pub spots: Vec<DepthBuffer>,
}

impl ShadowMaps {
    /// Render every view of a plan, front and back faces alike
    pub fn render(plan: &ShadowPlan, casters: &[Caster], directional_size: u32, spot_size: u32) -> Self {
        let mut directional = DepthBuffer::new(directional_size, directional_size);
        let mut spots = vec![DepthBuffer::new(spot_size, spot_size); MAX_SPOT_SHADOWS];
        for view in &plan.views {
            let target = match view.target {
                ShadowTarget::Directional => &mut directional,
                ShadowTarget::Spot(slot) => match spots.get_mut(slot) {
                    Some(map) => map,
                    None => continue,
                },
            };
            for caster in casters {
                target.draw_mesh(view.view_proj, caster.model, caster.positions, caster.indices);
            }
        }
        Self {
            uniforms: plan.uniforms,
            directional,
            spots,
        }
    }

    /// Lit fraction of `world` for the light at `index`
    pub fn factor(&self, index: u32, light: &GpuLight, world: Vec3) -> f32 {
        let uniforms = &self.uniforms;
        if !uniforms.shadows_enabled() {
            return 1.0;
        }
        match light.light_type() {
            Some(LightType::Directional)
                if uniforms.has_directional() && uniforms.directional_light_index == index =>
            {
                pcf(&self.directional, &uniforms.directional_view_proj, world, uniforms.bias)
            }
            Some(LightType::Spot) => match uniforms.spot_slot(index) {
                Some(slot) => pcf(&self.spots[slot], &uniforms.spot_view_proj[slot], world, uniforms.bias),
                None => 1.0,
            },
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::DebugSettings;
    use crate::resources::Aabb;
    use crate::scene::{DirectionalLight, LightSet, SpotLight};

    // Square in the XZ plane at height y
    fn floor_quad(y: f32, half: f32) -> [Vec3; 4] {
        [
            Vec3::new(-half, y, -half),
            Vec3::new(half, y, -half),
            Vec3::new(half, y, half),
            Vec3::new(-half, y, half),
        ]
    }

    const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

    fn sun_plan(settings: &DebugSettings) -> (Vec<GpuLight>, ShadowPlan) {
        let mut set = LightSet::new();
        set.add_directional(DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 1.0));
        let lights = set.pack().lights;
        let bounds = Aabb::new(Vec3::splat(-5.0), Vec3::splat(5.0));
        let plan = ShadowPlan::build(&lights, Some(bounds), 20.0, settings);
        (lights, plan)
    }

    #[test]
    fn empty_map_is_fully_lit() {
        let map = DepthBuffer::new(16, 16);
        let view_proj = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.0, 10.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Z);
        assert_eq!(pcf(&map, &view_proj, Vec3::ZERO, 0.005), 1.0);
    }

    #[test]
    fn outside_map_counts_as_lit() {
        let mut map = DepthBuffer::new(16, 16);
        map.clear(0.0);
        let view_proj = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.0, 10.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Z);
        assert_eq!(pcf(&map, &view_proj, Vec3::new(3.0, 0.0, 0.0), 0.005), 1.0);
        assert_eq!(pcf(&map, &view_proj, Vec3::ZERO, 0.005), 0.0);
    }

    #[test]
    fn occluder_shadows_floor_under_it_only() {
        let settings = DebugSettings::default();
        let (lights, plan) = sun_plan(&settings);
        let blocker = floor_quad(2.0, 1.0);
        let floor = floor_quad(0.0, 4.0);
        let casters = [
            Caster {
                model: Mat4::IDENTITY,
                positions: &blocker,
                indices: &QUAD_INDICES,
            },
            Caster {
                model: Mat4::IDENTITY,
                positions: &floor,
                indices: &QUAD_INDICES,
            },
        ];
        let maps = ShadowMaps::render(&plan, &casters, 128, 64);

        assert_eq!(maps.factor(0, &lights[0], Vec3::new(0.0, 0.0, 0.0)), 0.0);
        assert_eq!(maps.factor(0, &lights[0], Vec3::new(3.0, 0.0, 3.0)), 1.0);
        // The blocker's own top face is not self-shadowed
        assert_eq!(maps.factor(0, &lights[0], Vec3::new(0.0, 2.0, 0.0)), 1.0);
    }

    #[test]
    fn shadow_edge_is_filtered() {
        let settings = DebugSettings::default();
        let (lights, plan) = sun_plan(&settings);
        let blocker = [
            Vec3::new(-5.0, 2.0, -5.0),
            Vec3::new(0.0, 2.0, -5.0),
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::new(-5.0, 2.0, 5.0),
        ];
        let casters = [Caster {
            model: Mat4::IDENTITY,
            positions: &blocker,
            indices: &QUAD_INDICES,
        }];
        let maps = ShadowMaps::render(&plan, &casters, 64, 64);
        let samples: Vec<f32> = (-8..=8)
            .map(|i| maps.factor(0, &lights[0], Vec3::new(i as f32 * 0.05, 0.0, 0.0)))
            .collect();
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[16], 1.0);
        assert!(samples.iter().any(|&s| s > 0.0 && s < 1.0));
        assert!(samples.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn disabled_shadows_are_lit() {
        let settings = DebugSettings {
            shadows_enabled: false,
            ..Default::default()
        };
        let (lights, plan) = sun_plan(&settings);
        let blocker = floor_quad(2.0, 5.0);
        let casters = [Caster {
            model: Mat4::IDENTITY,
            positions: &blocker,
            indices: &QUAD_INDICES,
        }];
        let maps = ShadowMaps::render(&plan, &casters, 32, 32);
        assert_eq!(maps.factor(0, &lights[0], Vec3::ZERO), 1.0);
    }

    #[test]
    fn fifth_spot_is_never_shadowed() {
        let mut set = LightSet::new();
        for i in 0..5 {
            set.add_spot(
                Vec3::new(i as f32, 4.0, 0.0),
                SpotLight::new(Vec3::NEG_Y, Vec3::ONE, 1.0, 10.0, 0.3, 0.5),
            );
        }
        let lights = set.pack().lights;
        let plan = ShadowPlan::build(&lights, None, 20.0, &DebugSettings::default());
        let blocker = floor_quad(2.0, 10.0);
        let casters = [Caster {
            model: Mat4::IDENTITY,
            positions: &blocker,
            indices: &QUAD_INDICES,
        }];
        let maps = ShadowMaps::render(&plan, &casters, 32, 32);

        assert_eq!(maps.factor(0, &lights[0], Vec3::new(0.0, 0.0, 0.0)), 0.0);
        assert_eq!(maps.factor(4, &lights[4], Vec3::new(4.0, 0.0, 0.0)), 1.0);
    }
}
