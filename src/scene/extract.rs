//! Snapshot ECS-authored lights into a [`LightSet`]

use crate::scene::{AmbientLight, DirectionalLight, Light, LightSet, PointLight, SpotLight, Transform};
use bevy_ecs::prelude::*;

/// Collect every light entity in spawn order.
///
/// Point and spot lights take their position from the entity's [`Transform`];
/// spot directions are rotated by it. The [`AmbientLight`] resource is used
/// when present.
pub fn extract_lights(world: &mut World) -> LightSet {
    let mut found: Vec<(Entity, Light)> = Vec::new();

    let mut directional = world.query::<(Entity, &DirectionalLight)>();
    for (entity, light) in directional.iter(world) {
        found.push((entity, Light::Directional(*light)));
    }

    let mut point = world.query::<(Entity, &PointLight, &Transform)>();
    for (entity, light, transform) in point.iter(world) {
        found.push((
            entity,
            Light::Point {
                position: transform.position,
                light: *light,
            },
        ));
    }

    let mut spot = world.query::<(Entity, &SpotLight, &Transform)>();
    for (entity, light, transform) in spot.iter(world) {
        let mut light = *light;
        light.direction = transform.rotate(light.direction);
        found.push((
            entity,
            Light::Spot {
                position: transform.position,
                light,
            },
        ));
    }

    found.sort_by_key(|(entity, _)| *entity);

    let ambient = world
        .get_resource::<AmbientLight>()
        .copied()
        .unwrap_or_default();

    LightSet {
        ambient,
        lights: found.into_iter().map(|(_, light)| light).collect(),
    }
}
