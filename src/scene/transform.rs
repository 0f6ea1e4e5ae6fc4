//! Placement of light entities and per-draw object uniforms

use bevy_ecs::prelude::*;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

/// Where a point or spot light entity sits.
///
/// Light shapes have no scale: a point light's extent is its radius and a
/// spot's cone comes from its angles.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Rotation that turns the default spot axis (-Y) onto `direction`
    pub fn aimed(position: Vec3, direction: Vec3) -> Self {
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        Self {
            position,
            rotation: Quat::from_rotation_arc(Vec3::NEG_Y, direction),
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// A light-local direction in world space
    pub fn rotate(&self, local: Vec3) -> Vec3 {
        (self.rotation * local).normalize_or_zero()
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

/// Per-draw uniform block: model matrix and its normal matrix
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: Mat4,
    /// Inverse transpose of `model`
    pub normal_matrix: Mat4,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ObjectUniforms>(), 128);

impl ObjectUniforms {
    pub fn from_model(model: Mat4) -> Self {
        Self {
            model,
            normal_matrix: model.inverse().transpose(),
        }
    }
}
