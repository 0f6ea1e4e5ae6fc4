//! Metallic-roughness materials

use crate::backend::traits::{BindGroupHandle, BufferHandle, TextureHandle};
use crate::resources::{ColorSpace, TextureData};
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Texture inputs of a material, in bind group order after the uniforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialSlot {
    BaseColor,
    /// G roughness, B metallic
    MetallicRoughness,
    /// Tangent space
    Normal,
    Emissive,
}

impl MaterialSlot {
    pub const ALL: [MaterialSlot; 4] = [
        MaterialSlot::BaseColor,
        MaterialSlot::MetallicRoughness,
        MaterialSlot::Normal,
        MaterialSlot::Emissive,
    ];

    pub fn binding(self) -> u32 {
        self as u32 + 1
    }

    pub fn color_space(self) -> ColorSpace {
        match self {
            MaterialSlot::BaseColor | MaterialSlot::Emissive => ColorSpace::Srgb,
            MaterialSlot::MetallicRoughness | MaterialSlot::Normal => ColorSpace::Linear,
        }
    }

    /// Texel bound when the slot is empty. It leaves the factors unchanged
    /// and gives a flat normal.
    pub fn fallback(self) -> TextureData {
        let (name, rgba) = match self {
            MaterialSlot::Normal => ("flat normal", [128, 128, 255, 255]),
            _ => ("white", [255; 4]),
        };
        TextureData::fill(name, rgba, self.color_space())
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Linear radiance added after lighting
    pub emissive: Vec3,
    textures: [Option<TextureData>; 4],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
            textures: Default::default(),
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    /// The texture's format is forced to the slot's color space.
    pub fn with_texture(mut self, slot: MaterialSlot, mut texture: TextureData) -> Self {
        texture.format = slot.color_space().format();
        self.textures[slot as usize] = Some(texture);
        self
    }

    pub fn texture(&self, slot: MaterialSlot) -> Option<&TextureData> {
        self.textures[slot as usize].as_ref()
    }

    pub fn uniforms(&self) -> MaterialUniforms {
        MaterialUniforms {
            base_color: self.base_color,
            emissive: self.emissive.extend(0.0),
            metallic_roughness: Vec4::new(
                self.metallic.clamp(0.0, 1.0),
                self.roughness.clamp(0.0, 1.0),
                0.0,
                0.0,
            ),
        }
    }
}

/// Group 2, binding 0 of the shading pass
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: Vec4,
    pub emissive: Vec4,
    /// x metallic, y roughness
    pub metallic_roughness: Vec4,
}

static_assertions::const_assert_eq!(std::mem::size_of::<MaterialUniforms>(), 48);

#[derive(Debug, Clone)]
pub struct GpuMaterial {
    pub bind_group: BindGroupHandle,
    pub uniform_buffer: BufferHandle,
    pub textures: Vec<TextureHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors_are_clamped() {
        let uniforms = Material::new("rough")
            .with_roughness(1.5)
            .with_metallic(-1.0)
            .with_emissive(Vec3::new(4.0, 2.0, 0.0))
            .uniforms();
        assert_eq!(uniforms.metallic_roughness.truncate().truncate(), glam::Vec2::new(0.0, 1.0));
        assert_eq!(uniforms.emissive, Vec4::new(4.0, 2.0, 0.0, 0.0));
    }

    #[test]
    fn slots_bind_after_the_uniforms() {
        let bindings: Vec<u32> = MaterialSlot::ALL.iter().map(|s| s.binding()).collect();
        assert_eq!(bindings, [1, 2, 3, 4]);
    }

    #[test]
    fn fallbacks_are_neutral() {
        assert_eq!(MaterialSlot::Normal.fallback().pixels, [128, 128, 255, 255]);
        assert!(!MaterialSlot::Normal.fallback().format.is_srgb());
        assert!(MaterialSlot::BaseColor.fallback().format.is_srgb());
    }

    #[test]
    fn texture_takes_the_slot_color_space() {
        let srgb = TextureData::fill("n", [0; 4], ColorSpace::Srgb);
        let material = Material::default().with_texture(MaterialSlot::Normal, srgb);
        let stored = material.texture(MaterialSlot::Normal).unwrap();
        assert!(!stored.format.is_srgb());
        assert!(material.texture(MaterialSlot::BaseColor).is_none());
    }
}
