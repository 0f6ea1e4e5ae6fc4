//! Fragment shading on the CPU
//!
//! Same Cook-Torrance terms, falloff curves, tile lookup and tone mapping as
//! the shading pass fragment shader.

use crate::scene::{FrameUniforms, GpuLight, LightType};
use crate::tiling::TileLightList;
use glam::Vec3;
use std::f32::consts::PI;

const EPSILON: f32 = 0.0001;
const DIELECTRIC_F0: f32 = 0.04;

/// Material inputs at one shaded point, after texture sampling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
}

impl SurfacePoint {
    pub fn new(position: Vec3, normal: Vec3, albedo: Vec3) -> Self {
        Self {
            position,
            normal: normal.normalize_or_zero(),
            albedo,
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
        }
    }

    pub fn with_metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self.roughness = roughness.clamp(0.05, 1.0);
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }
}

pub fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * denom * denom)
}

pub fn geometry_schlick_ggx(n_dot_x: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    n_dot_x / (n_dot_x * (1.0 - k) + k)
}

pub fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness)
}

pub fn fresnel_schlick(cos_theta: f32, f0: Vec3) -> Vec3 {
    f0 + (Vec3::ONE - f0) * (1.0 - cos_theta).clamp(0.0, 1.0).powi(5)
}

/// Reflectance at normal incidence: 4% for dielectrics, the albedo for metals
pub fn base_reflectance(albedo: Vec3, metallic: f32) -> Vec3 {
    Vec3::splat(DIELECTRIC_F0).lerp(albedo, metallic)
}

/// Share of light left for the Lambert term after Fresnel reflection
pub fn diffuse_weight(fresnel: Vec3, metallic: f32) -> Vec3 {
    (Vec3::ONE - fresnel) * (1.0 - metallic)
}

/// Outgoing radiance per unit incoming radiance, cosine term included
pub fn brdf(n: Vec3, v: Vec3, l: Vec3, albedo: Vec3, metallic: f32, roughness: f32) -> Vec3 {
    let h = (v + l).normalize_or_zero();
    let n_dot_l = n.dot(l).max(0.0);
    let n_dot_v = n.dot(v).max(0.0);
    let n_dot_h = n.dot(h).max(0.0);
    let v_dot_h = v.dot(h).max(0.0);

    let f0 = base_reflectance(albedo, metallic);
    let d = distribution_ggx(n_dot_h, roughness);
    let g = geometry_smith(n_dot_v, n_dot_l, roughness);
    let f = fresnel_schlick(v_dot_h, f0);

    let specular = d * g * f / (4.0 * n_dot_v * n_dot_l + EPSILON);
    let kd = diffuse_weight(f, metallic);
    (kd * albedo / PI + specular) * n_dot_l
}

/// Windowed inverse-square falloff, zero at and past `radius`
pub fn distance_falloff(distance: f32, radius: f32) -> f32 {
    let ratio = distance / radius.max(EPSILON);
    let window = (1.0 - ratio.powi(4)).clamp(0.0, 1.0);
    window * window / (distance * distance + 1.0)
}

/// Smoothstep from the outer cone (0) to the inner cone (1)
pub fn cone_falloff(cos_angle: f32, cos_inner: f32, cos_outer: f32) -> f32 {
    let t = ((cos_angle - cos_outer) / (cos_inner - cos_outer).max(EPSILON)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Reinhard operator, applied per channel with no gamma curve afterwards
pub fn reinhard(color: Vec3) -> Vec3 {
    color / (color + Vec3::ONE)
}

/// Contribution of one light, with `shadow` in [0, 1] scaling the result
pub fn shade_light(light: &GpuLight, surface: &SurfacePoint, v: Vec3, shadow: f32) -> Vec3 {
    let kind = light.light_type();
    let (l, attenuation) = if kind == Some(LightType::Directional) {
        ((-light.direction()).normalize_or_zero(), 1.0)
    } else {
        let to_light = light.position() - surface.position;
        let distance = to_light.length();
        let l = to_light / distance.max(EPSILON);
        let mut attenuation = distance_falloff(distance, light.radius());
        if kind == Some(LightType::Spot) {
            let cos_angle = (-l).dot(light.direction().normalize_or_zero());
            attenuation *= cone_falloff(cos_angle, light.cone.x, light.cone.y);
        }
        (l, attenuation)
    };
    if attenuation <= 0.0 || surface.normal.dot(l) <= 0.0 {
        return Vec3::ZERO;
    }

    let radiance = light.color_intensity.truncate() * light.color_intensity.w * attenuation;
    brdf(surface.normal, v, l, surface.albedo, surface.metallic, surface.roughness) * radiance * shadow
}

/// Light indices a fragment is shaded with
///
/// An empty tile falls back to every uploaded light.
pub fn lights_for_tile<'a>(frame: &FrameUniforms, tile: &'a TileLightList) -> Box<dyn Iterator<Item = u32> + 'a> {
    if tile.count == 0 {
        Box::new(0..frame.light_count)
    } else {
        Box::new(tile.lights().iter().copied())
    }
}

/// Linear radiance before tone mapping
///
/// `shadow` is asked for the lit fraction of each light by index.
pub fn shade_radiance(
    frame: &FrameUniforms,
    lights: &[GpuLight],
    tile: &TileLightList,
    surface: &SurfacePoint,
    shadow: impl Fn(u32, &GpuLight) -> f32,
) -> Vec3 {
    let v = (frame.camera_position.truncate() - surface.position).normalize_or_zero();
    let lo: Vec3 = lights_for_tile(frame, tile)
        .filter_map(|index| lights.get(index as usize).map(|light| (index, light)))
        .map(|(index, light)| shade_light(light, surface, v, shadow(index, light)))
        .sum();
    frame.ambient.truncate() * surface.albedo + lo + surface.emissive
}

/// Final display value of a fragment
pub fn shade_fragment(
    frame: &FrameUniforms,
    lights: &[GpuLight],
    tile: &TileLightList,
    surface: &SurfacePoint,
    shadow: impl Fn(u32, &GpuLight) -> f32,
) -> Vec3 {
    reinhard(shade_radiance(frame, lights, tile, surface, shadow))
}

/// Heatmap ramp color for a tile light count
pub fn heatmap_color(count: u32, max_lights: u32) -> Vec3 {
    let stops = [
        Vec3::ZERO,
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
    ];
    let s = (count as f32 / max_lights.max(1) as f32).clamp(0.0, 1.0) * 4.0;
    let segment = (s.floor() as usize).min(3);
    stops[segment].lerp(stops[segment + 1], s - segment as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{AmbientLight, Camera, DirectionalLight, Light, PointLight, SpotLight};
    use crate::tiling::TileGrid;
    use rstest::rstest;

    fn frame_at(camera_position: Vec3, light_count: u32) -> FrameUniforms {
        let camera = Camera::new(camera_position, Vec3::ZERO);
        FrameUniforms::new(&camera, &AmbientLight::default(), light_count, &TileGrid::new(16, 16), 0.0)
    }

    fn unshadowed(_: u32, _: &GpuLight) -> f32 {
        1.0
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(1.0, 0.5)]
    #[case(3.0, 0.75)]
    fn reinhard_maps_channels(#[case] input: f32, #[case] expected: f32) {
        let mapped = reinhard(Vec3::new(input, 0.0, 1.0));
        assert!((mapped.x - expected).abs() < 1e-6);
        assert_eq!(mapped.z, 0.5);
    }

    #[test]
    fn falloff_is_zero_at_radius() {
        assert_eq!(distance_falloff(5.0, 5.0), 0.0);
        assert_eq!(distance_falloff(6.0, 5.0), 0.0);
        assert!((distance_falloff(0.0, 5.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cone_is_smooth_between_angles() {
        let inner = 0.9;
        let outer = 0.8;
        assert_eq!(cone_falloff(0.95, inner, outer), 1.0);
        assert_eq!(cone_falloff(0.7, inner, outer), 0.0);
        assert!((cone_falloff(0.85, inner, outer) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn fresnel_is_f0_at_normal_incidence() {
        let f0 = Vec3::splat(0.04);
        assert!((fresnel_schlick(1.0, f0) - f0).length() < 1e-6);
        assert!((fresnel_schlick(0.0, f0) - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn metals_reflect_their_albedo() {
        let albedo = Vec3::new(0.95, 0.64, 0.54);
        let f0 = base_reflectance(albedo, 1.0);
        assert_eq!(f0, albedo);

        let f = fresnel_schlick(1.0, f0);
        for channel in 0..3 {
            assert!((f[channel] - albedo[channel]).abs() < 1e-6);
        }
        assert_eq!(diffuse_weight(f, 1.0), Vec3::ZERO);

        // Head on, a metal's response is pure specular tinted by the albedo
        let response = brdf(Vec3::Z, Vec3::Z, Vec3::Z, albedo, 1.0, 0.5);
        let tint = response / albedo;
        assert!((tint.x - tint.y).abs() < 1e-5 && (tint.y - tint.z).abs() < 1e-5);
    }

    #[test]
    fn dielectrics_reflect_four_percent() {
        let albedo = Vec3::new(0.8, 0.1, 0.3);
        let f0 = base_reflectance(albedo, 0.0);
        assert_eq!(f0, Vec3::splat(0.04));

        let kd = diffuse_weight(fresnel_schlick(1.0, f0), 0.0);
        assert!((kd - Vec3::splat(0.96)).length() < 1e-6);
    }

    #[test]
    fn head_on_directional_matches_closed_form() {
        // View, normal and light all along +Z; roughness 0.5, white dielectric
        let frame = frame_at(Vec3::new(0.0, 0.0, 5.0), 1);
        let light = Light::Directional(DirectionalLight::new(Vec3::NEG_Z, Vec3::ONE, 3.0)).to_gpu();
        let surface = SurfacePoint::new(Vec3::ZERO, Vec3::Z, Vec3::ONE);
        let raw = shade_radiance(&frame, &[light], &TileLightList::default(), &surface, unshadowed);

        // G is 1 when every dot product is 1
        let d = 1.0 / (PI * 0.0625);
        let specular = d * 0.04 / (4.0 + EPSILON);
        let diffuse = 0.96 / PI;
        let expected = 0.03 + 3.0 * (diffuse + specular);
        assert!((raw.x - expected).abs() < 1e-4, "{raw} vs {expected}");
        assert!((raw.x - 1.0995).abs() < 1e-3);
    }

    #[test]
    fn light_behind_surface_contributes_nothing() {
        let frame = frame_at(Vec3::new(0.0, 0.0, 5.0), 1);
        let light = Light::Directional(DirectionalLight::new(Vec3::Z, Vec3::ONE, 10.0)).to_gpu();
        let surface = SurfacePoint::new(Vec3::ZERO, Vec3::Z, Vec3::ONE);
        let v = Vec3::Z;
        assert_eq!(shade_light(&light, &surface, v, 1.0), Vec3::ZERO);
    }

    #[test]
    fn empty_tile_uses_every_light() {
        let frame = frame_at(Vec3::new(0.0, 0.0, 5.0), 2);
        let lights = [
            Light::Point {
                position: Vec3::new(0.0, 0.0, 1.0),
                light: PointLight::new(Vec3::ONE, 1.0, 5.0),
            }
            .to_gpu(),
            Light::Point {
                position: Vec3::new(0.5, 0.0, 1.0),
                light: PointLight::new(Vec3::ONE, 1.0, 5.0),
            }
            .to_gpu(),
        ];
        let surface = SurfacePoint::new(Vec3::ZERO, Vec3::Z, Vec3::ONE);

        let empty = TileLightList::default();
        assert_eq!(lights_for_tile(&frame, &empty).collect::<Vec<_>>(), [0, 1]);

        let mut first_only = TileLightList::default();
        first_only.push(0);
        let fallback = shade_radiance(&frame, &lights, &empty, &surface, unshadowed);
        let culled = shade_radiance(&frame, &lights, &first_only, &surface, unshadowed);
        assert!(fallback.x > culled.x);
    }

    #[test]
    fn shadow_factor_scales_direct_light_only() {
        let frame = frame_at(Vec3::new(0.0, 0.0, 5.0), 1);
        let light = Light::Directional(DirectionalLight::new(Vec3::NEG_Z, Vec3::ONE, 1.0)).to_gpu();
        let surface = SurfacePoint::new(Vec3::ZERO, Vec3::Z, Vec3::ONE);
        let dark = shade_radiance(&frame, &[light], &TileLightList::default(), &surface, |_, _| 0.0);
        assert!((dark - Vec3::splat(0.03)).length() < 1e-6);
    }

    #[test]
    fn spot_outside_cone_is_dark() {
        let light = Light::Spot {
            position: Vec3::new(3.0, 0.0, 1.0),
            light: SpotLight::new(Vec3::X, Vec3::ONE, 5.0, 10.0, 0.2, 0.3),
        }
        .to_gpu();
        let surface = SurfacePoint::new(Vec3::ZERO, Vec3::Z, Vec3::ONE);
        assert_eq!(shade_light(&light, &surface, Vec3::Z, 1.0), Vec3::ZERO);
    }

    #[test]
    fn output_stays_below_one() {
        let frame = frame_at(Vec3::new(0.0, 0.0, 5.0), 1);
        let light = Light::Directional(DirectionalLight::new(Vec3::NEG_Z, Vec3::ONE, 1000.0)).to_gpu();
        let surface = SurfacePoint::new(Vec3::ZERO, Vec3::Z, Vec3::ONE);
        let color = shade_fragment(&frame, &[light], &TileLightList::default(), &surface, unshadowed);
        assert!(color.max_element() < 1.0);
        assert!(color.min_element() > 0.9);
    }

    #[rstest]
    #[case(0, Vec3::ZERO)]
    #[case(8, Vec3::new(0.0, 0.0, 1.0))]
    #[case(16, Vec3::new(0.0, 1.0, 0.0))]
    #[case(24, Vec3::new(1.0, 1.0, 0.0))]
    #[case(32, Vec3::new(1.0, 0.0, 0.0))]
    #[case(500, Vec3::new(1.0, 0.0, 0.0))]
    fn heatmap_ramp_stops(#[case] count: u32, #[case] expected: Vec3) {
        assert!((heatmap_color(count, 32) - expected).length() < 1e-6);
    }
}
