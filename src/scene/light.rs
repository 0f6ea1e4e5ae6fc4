//! Light types and the per-frame light set

use crate::MAX_LIGHTS;
use bevy_ecs::prelude::*;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Radius written for directional lights, which have no bounded extent
pub const DIRECTIONAL_RADIUS: f32 = f32::MAX;

/// Stable type tags shared with the shaders
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional = 0,
    Point = 1,
    Spot = 2,
}

impl LightType {
    pub fn from_tag(tag: f32) -> Option<Self> {
        match tag.round() as i32 {
            0 => Some(LightType::Directional),
            1 => Some(LightType::Point),
            2 => Some(LightType::Spot),
            _ => None,
        }
    }
}

/// Infinitely distant light; `direction` points from the light into the scene
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction,
            color,
            intensity,
        }
    }
}

/// Omnidirectional light placed by the entity's [`Transform`](super::Transform).
///
/// Contributes nothing beyond `radius`.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

impl PointLight {
    pub fn new(color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            color,
            intensity,
            radius,
        }
    }
}

/// Cone light. In a [`LightSet`] `direction` is world space; on an entity
/// it is local and the [`Transform`](super::Transform) rotation applies.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
    /// Half-angle in radians inside which the cone is at full strength
    pub inner_angle: f32,
    /// Half-angle in radians where the falloff reaches zero
    pub outer_angle: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            direction: -Vec3::Y,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 25f32.to_radians(),
            outer_angle: 35f32.to_radians(),
        }
    }
}

impl SpotLight {
    pub fn new(
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        radius: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            direction,
            color,
            intensity,
            radius,
            inner_angle,
            outer_angle,
        }
    }
}

/// A light as seen by the renderer for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Point { position: Vec3, light: PointLight },
    Spot { position: Vec3, light: SpotLight },
}

impl Light {
    pub fn light_type(&self) -> LightType {
        match self {
            Light::Directional(_) => LightType::Directional,
            Light::Point { .. } => LightType::Point,
            Light::Spot { .. } => LightType::Spot,
        }
    }

    /// Influence radius; directional lights are unbounded
    pub fn radius(&self) -> f32 {
        match self {
            Light::Directional(_) => DIRECTIONAL_RADIUS,
            Light::Point { light, .. } => light.radius,
            Light::Spot { light, .. } => light.radius,
        }
    }

    /// Pack into the 64-byte GPU record, renormalizing directions
    pub fn to_gpu(&self) -> GpuLight {
        match self {
            Light::Directional(d) => GpuLight {
                position_type: Vec4::new(0.0, 0.0, 0.0, LightType::Directional as u32 as f32),
                direction_radius: normalize_or_down(d.direction).extend(DIRECTIONAL_RADIUS),
                color_intensity: d.color.extend(d.intensity),
                cone: Vec4::ZERO,
            },
            Light::Point { position, light } => GpuLight {
                position_type: position.extend(LightType::Point as u32 as f32),
                direction_radius: Vec4::new(0.0, 0.0, 0.0, light.radius),
                color_intensity: light.color.extend(light.intensity),
                cone: Vec4::ZERO,
            },
            Light::Spot { position, light } => {
                let outer = light.outer_angle.max(0.0);
                let inner = light.inner_angle.clamp(0.0, outer);
                GpuLight {
                    position_type: position.extend(LightType::Spot as u32 as f32),
                    direction_radius: normalize_or_down(light.direction).extend(light.radius),
                    color_intensity: light.color.extend(light.intensity),
                    cone: Vec4::new(inner.cos(), outer.cos(), 0.0, 0.0),
                }
            }
        }
    }
}

fn normalize_or_down(direction: Vec3) -> Vec3 {
    direction.try_normalize().unwrap_or(-Vec3::Y)
}

/// GPU light record, 64 bytes
///
/// - `position_type`: xyz position (unused for directional), w type tag
/// - `direction_radius`: xyz unit direction, w radius (`f32::MAX` for directional)
/// - `color_intensity`: rgb color, a intensity
/// - `cone`: x cos(inner), y cos(outer)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position_type: Vec4,
    pub direction_radius: Vec4,
    pub color_intensity: Vec4,
    pub cone: Vec4,
}

static_assertions::const_assert_eq!(std::mem::size_of::<GpuLight>(), 64);

impl GpuLight {
    pub fn light_type(&self) -> Option<LightType> {
        LightType::from_tag(self.position_type.w)
    }

    pub fn position(&self) -> Vec3 {
        self.position_type.truncate()
    }

    pub fn direction(&self) -> Vec3 {
        self.direction_radius.truncate()
    }

    pub fn radius(&self) -> f32 {
        self.direction_radius.w
    }
}

/// Ambient term, scaled by intensity before upload
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vec3::ONE,
            intensity: 0.03,
        }
    }
}

impl AmbientLight {
    pub fn scaled(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Read-only snapshot of every light for one frame
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    pub ambient: AmbientLight,
    pub lights: Vec<Light>,
}

/// Result of packing a light set for upload
#[derive(Debug, Clone, Default)]
pub struct PackedLights {
    pub lights: Vec<GpuLight>,
    /// Lights beyond the global cap that were left out
    pub dropped: usize,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ambient(mut self, ambient: AmbientLight) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn push(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn add_directional(&mut self, light: DirectionalLight) {
        self.lights.push(Light::Directional(light));
    }

    pub fn add_point(&mut self, position: Vec3, light: PointLight) {
        self.lights.push(Light::Point { position, light });
    }

    pub fn add_spot(&mut self, position: Vec3, light: SpotLight) {
        self.lights.push(Light::Spot { position, light });
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Lights in GPU order: directionals, then points, then spots
    pub fn packed_order(&self) -> impl Iterator<Item = &Light> {
        let of = move |ty: LightType| self.lights.iter().filter(move |l| l.light_type() == ty);
        of(LightType::Directional)
            .chain(of(LightType::Point))
            .chain(of(LightType::Spot))
    }

    /// Pack for upload, keeping at most [`MAX_LIGHTS`] records
    pub fn pack(&self) -> PackedLights {
        let lights: Vec<GpuLight> = self
            .packed_order()
            .take(MAX_LIGHTS)
            .map(Light::to_gpu)
            .collect();
        let dropped = self.lights.len().saturating_sub(lights.len());
        PackedLights { lights, dropped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_in_type_order() {
        let mut set = LightSet::new();
        set.add_spot(Vec3::ZERO, SpotLight::default());
        set.add_point(Vec3::X, PointLight::default());
        set.add_directional(DirectionalLight::default());

        let packed = set.pack();
        let types: Vec<_> = packed.lights.iter().filter_map(|l| l.light_type()).collect();
        assert_eq!(
            types,
            vec![LightType::Directional, LightType::Point, LightType::Spot]
        );
        assert_eq!(packed.dropped, 0);
    }

    #[test]
    fn directions_are_renormalized() {
        let light = Light::Directional(DirectionalLight::new(Vec3::new(0.0, -3.0, 0.0), Vec3::ONE, 1.0));
        let gpu = light.to_gpu();
        assert!((gpu.direction().length() - 1.0).abs() < 1e-6);
        assert_eq!(gpu.radius(), DIRECTIONAL_RADIUS);
    }

    #[test]
    fn spot_cone_keeps_inner_inside_outer() {
        let spot = SpotLight {
            inner_angle: 0.8,
            outer_angle: 0.5,
            ..Default::default()
        };
        let gpu = Light::Spot {
            position: Vec3::ZERO,
            light: spot,
        }
        .to_gpu();
        assert!(gpu.cone.x >= gpu.cone.y);
    }

    #[test]
    fn truncates_at_global_cap() {
        let mut set = LightSet::new();
        for i in 0..(MAX_LIGHTS + 1) {
            set.add_point(Vec3::splat(i as f32), PointLight::default());
        }
        let packed = set.pack();
        assert_eq!(packed.lights.len(), MAX_LIGHTS);
        assert_eq!(packed.dropped, 1);
    }

    #[test]
    fn ambient_defaults_scale() {
        let ambient = AmbientLight::default();
        assert!((ambient.scaled() - Vec3::splat(0.03)).length() < 1e-6);
    }
}
