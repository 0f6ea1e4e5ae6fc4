//! Handle-keyed storage for the wgpu objects behind backend handles

use crate::backend::traits::{BackendError, BackendResult};
use std::collections::HashMap;

pub(super) struct Registry<T> {
    kind: &'static str,
    items: HashMap<u64, T>,
}

impl<T> Registry<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: HashMap::new(),
        }
    }

    pub(super) fn insert(&mut self, id: u64, item: T) {
        self.items.insert(id, item);
    }

    pub(super) fn get(&self, id: u64) -> Option<&T> {
        self.items.get(&id)
    }

    /// Like `get`, but a stale handle is an error
    pub(super) fn require(&self, id: u64) -> BackendResult<&T> {
        self.items.get(&id).ok_or(BackendError::InvalidHandle {
            kind: self.kind,
            id,
        })
    }

    pub(super) fn remove(&mut self, id: u64) -> Option<T> {
        self.items.remove(&id)
    }
}

/// Every live object, with ids drawn from one counter so a handle never
/// aliases another kind's id (the per-frame swapchain view relies on this)
pub(super) struct Resources {
    next_id: u64,
    pub buffers: Registry<wgpu::Buffer>,
    pub textures: Registry<wgpu::Texture>,
    pub views: Registry<wgpu::TextureView>,
    pub samplers: Registry<wgpu::Sampler>,
    pub layouts: Registry<wgpu::BindGroupLayout>,
    pub bind_groups: Registry<wgpu::BindGroup>,
    pub render_pipelines: Registry<wgpu::RenderPipeline>,
    pub compute_pipelines: Registry<wgpu::ComputePipeline>,
    pub submissions: Registry<wgpu::SubmissionIndex>,
}

impl Resources {
    pub(super) fn new() -> Self {
        Self {
            next_id: 1,
            buffers: Registry::new("buffer"),
            textures: Registry::new("texture"),
            views: Registry::new("texture view"),
            samplers: Registry::new("sampler"),
            layouts: Registry::new("bind group layout"),
            bind_groups: Registry::new("bind group"),
            render_pipelines: Registry::new("render pipeline"),
            compute_pipelines: Registry::new("compute pipeline"),
            submissions: Registry::new("fence"),
        }
    }

    pub(super) fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut resources = Resources::new();
        let a = resources.allocate();
        let b = resources.allocate();
        assert_ne!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn stale_handle_names_its_kind() {
        let registry: Registry<u32> = Registry::new("sampler");
        match registry.require(7) {
            Err(BackendError::InvalidHandle { kind, id }) => assert_eq!((kind, id), ("sampler", 7)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
