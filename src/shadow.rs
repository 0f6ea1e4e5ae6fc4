//! Light-space projections and shadow slot assignment
//!
//! One orthographic map serves the first directional light; the first
//! [`MAX_SPOT_SHADOWS`] spot lights in packed order get a perspective map
//! each. Every other light is shaded unshadowed.

use crate::debug::DebugSettings;
use crate::resources::Aabb;
use crate::scene::{GpuLight, LightType};
use crate::MAX_SPOT_SHADOWS;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec3};

/// Shadows are sampled at all
pub const SHADOW_FLAG_ENABLED: u32 = 1;
/// The directional map holds a valid render this frame
pub const SHADOW_FLAG_DIRECTIONAL: u32 = 2;

/// Marks an unused slot in [`ShadowUniforms::spot_light_indices`]
pub const NO_LIGHT: u32 = u32::MAX;

/// Shadow block read by the shading fragment stage
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowUniforms {
    pub directional_view_proj: Mat4,
    pub spot_view_proj: [Mat4; MAX_SPOT_SHADOWS],
    /// Light index owning each spot slot, [`NO_LIGHT`] when unused
    pub spot_light_indices: UVec4,
    pub directional_light_index: u32,
    pub spot_count: u32,
    pub bias: f32,
    pub flags: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ShadowUniforms>(), 352);

impl Default for ShadowUniforms {
    fn default() -> Self {
        Self {
            directional_view_proj: Mat4::IDENTITY,
            spot_view_proj: [Mat4::IDENTITY; MAX_SPOT_SHADOWS],
            spot_light_indices: UVec4::splat(NO_LIGHT),
            directional_light_index: NO_LIGHT,
            spot_count: 0,
            bias: 0.0,
            flags: 0,
        }
    }
}

impl ShadowUniforms {
    pub fn shadows_enabled(&self) -> bool {
        self.flags & SHADOW_FLAG_ENABLED != 0
    }

    pub fn has_directional(&self) -> bool {
        self.flags & SHADOW_FLAG_DIRECTIONAL != 0
    }

    /// Spot slot assigned to a light, by linear search
    pub fn spot_slot(&self, light_index: u32) -> Option<usize> {
        (0..self.spot_count as usize).find(|&slot| self.spot_light_indices[slot] == light_index)
    }
}

/// Which depth image a shadow view renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowTarget {
    Directional,
    Spot(usize),
}

/// One light's-eye depth render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    pub target: ShadowTarget,
    pub light_index: u32,
    pub view_proj: Mat4,
}

/// Everything the shadow pass and the shading pass need for one frame
#[derive(Debug, Clone, Default)]
pub struct ShadowPlan {
    pub uniforms: ShadowUniforms,
    pub views: Vec<ShadowView>,
}

impl ShadowPlan {
    /// Assign shadow slots over the packed light array.
    ///
    /// `scene_bounds` is the world AABB of every opaque draw; without it the
    /// directional box falls back to a sphere of `fallback_radius` at the origin.
    pub fn build(
        lights: &[GpuLight],
        scene_bounds: Option<Aabb>,
        fallback_radius: f32,
        settings: &DebugSettings,
    ) -> Self {
        let mut uniforms = ShadowUniforms {
            bias: settings.clamped_bias(),
            ..Default::default()
        };
        if !settings.shadows_enabled {
            return Self {
                uniforms,
                views: Vec::new(),
            };
        }
        uniforms.flags |= SHADOW_FLAG_ENABLED;

        let mut views = Vec::new();
        let (center, radius) = match scene_bounds {
            Some(bounds) => (bounds.center(), bounds.bounding_radius().max(1e-3)),
            None => (Vec3::ZERO, fallback_radius),
        };

        let directional = lights
            .iter()
            .position(|l| l.light_type() == Some(LightType::Directional));
        if let Some(index) = directional {
            let view_proj = directional_view_proj(lights[index].direction(), center, radius);
            uniforms.directional_view_proj = view_proj;
            uniforms.directional_light_index = index as u32;
            uniforms.flags |= SHADOW_FLAG_DIRECTIONAL;
            views.push(ShadowView {
                target: ShadowTarget::Directional,
                light_index: index as u32,
                view_proj,
            });
        }

        let spots = lights
            .iter()
            .enumerate()
            .filter(|(_, l)| l.light_type() == Some(LightType::Spot))
            .take(MAX_SPOT_SHADOWS);
        for (slot, (index, light)) in spots.enumerate() {
            let view_proj = spot_view_proj(
                light.position(),
                light.direction(),
                light.cone.y.clamp(-1.0, 1.0).acos(),
                light.radius(),
            );
            uniforms.spot_view_proj[slot] = view_proj;
            uniforms.spot_light_indices[slot] = index as u32;
            uniforms.spot_count += 1;
            views.push(ShadowView {
                target: ShadowTarget::Spot(slot),
                light_index: index as u32,
                view_proj,
            });
        }

        Self { uniforms, views }
    }
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() >= 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Orthographic light space enclosing a bounding sphere.
///
/// The box depends only on the sphere and the light direction, so it stays
/// put while the camera moves.
pub fn directional_view_proj(direction: Vec3, center: Vec3, radius: f32) -> Mat4 {
    let direction = direction.try_normalize().unwrap_or(-Vec3::Y);
    let eye = center - direction * radius;
    let view = Mat4::look_at_rh(eye, center, up_for(direction));
    let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, 2.0 * radius);
    proj * view
}

/// Perspective light space for a spot cone; the far plane is the light radius
pub fn spot_view_proj(position: Vec3, direction: Vec3, outer_angle: f32, radius: f32) -> Mat4 {
    let direction = direction.try_normalize().unwrap_or(-Vec3::Y);
    let fov = (2.0 * outer_angle).clamp(1e-3, std::f32::consts::PI - 1e-3);
    let near = (radius * 0.01).max(0.05);
    let far = radius.max(near + 1e-3);
    let view = Mat4::look_at_rh(position, position + direction, up_for(direction));
    Mat4::perspective_rh(fov, 1.0, near, far) * view
}

/// Project a world point into shadow-map space: uv in [0, 1] with v down, plus depth.
///
/// Returns `None` when the point lands outside the map or behind the light.
pub fn project_to_shadow(view_proj: &Mat4, world: Vec3) -> Option<Vec3> {
    let clip = *view_proj * world.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    let coords = Vec3::new(ndc.x * 0.5 + 0.5, -ndc.y * 0.5 + 0.5, ndc.z);
    let inside = coords.cmpge(Vec3::ZERO).all() && coords.cmple(Vec3::ONE).all();
    inside.then_some(coords)
}
