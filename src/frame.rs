//! Frames in flight
//!
//! Frame `n` records into slot `n % slots`. A slot's fence is waited on
//! before the slot is recorded into again, so per-slot uniform and storage
//! buffers are never rewritten while the GPU may still read them. Each slot
//! owns one [`FrameResources`] set.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::debug_lines::max_vertices;
use crate::pipeline::{BindGroupLayouts, FrameBindings, UNIFORM_STRIDE};
use crate::scene::{FrameUniforms, GpuLight, ObjectUniforms};
use crate::shadow::ShadowUniforms;
use crate::tiling::TileGrid;
use crate::{MAX_LIGHTS, MAX_SHADOW_VIEWS};

/// Outstanding fence per slot, plus which slot records next
#[derive(Debug)]
pub struct FrameSlots {
    pending: Vec<Option<FenceHandle>>,
    slot: usize,
    started: u64,
}

impl FrameSlots {
    pub fn new(count: usize) -> BackendResult<Self> {
        if count == 0 {
            return Err(BackendError::InitializationFailed(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        Ok(Self {
            pending: vec![None; count],
            slot: 0,
            started: 0,
        })
    }

    /// Start a frame in the current slot, first waiting out the frame that
    /// last used it.
    pub fn acquire(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        if let Some(fence) = self.pending[self.slot].take() {
            backend.wait_for_fence(fence)?;
        }
        self.started += 1;
        log::trace!("frame {} records into slot {}", self.started, self.slot);
        Ok(())
    }

    /// The current slot's frame was submitted with `fence`; move to the next slot
    pub fn retire(&mut self, fence: FenceHandle) {
        self.pending[self.slot] = Some(fence);
        self.slot = (self.slot + 1) % self.pending.len();
    }

    /// Wait on every outstanding fence
    pub fn drain(&mut self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        let fences: Vec<_> = self.pending.iter_mut().filter_map(Option::take).collect();
        log::trace!("draining {} outstanding frames", fences.len());
        fences
            .into_iter()
            .try_for_each(|fence| backend.wait_for_fence(fence))
    }

    pub fn count(&self) -> usize {
        self.pending.len()
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Frames acquired so far
    pub fn started(&self) -> u64 {
        self.started
    }

    pub fn is_idle(&self) -> bool {
        self.pending.iter().all(Option::is_none)
    }
}

/// Size-independent views the culling and view bind groups also reference
#[derive(Debug, Clone, Copy)]
pub struct SharedViews {
    pub depth: TextureViewHandle,
    pub directional_shadow: TextureViewHandle,
    pub spot_shadows: [TextureViewHandle; crate::MAX_SPOT_SHADOWS],
    pub shadow_sampler: SamplerHandle,
}

/// GPU buffers and bind groups owned by one frame slot
#[derive(Debug)]
pub struct FrameResources {
    pub frame_uniforms: BufferHandle,
    pub lights: BufferHandle,
    pub tiles: BufferHandle,
    pub shadow_uniforms: BufferHandle,
    pub objects: BufferHandle,
    /// Draws the object buffer holds at `UNIFORM_STRIDE` apart
    pub object_capacity: usize,
    pub casters: BufferHandle,
    pub line_vertices: BufferHandle,
    pub line_capacity: usize,
    pub bindings: FrameBindings,
}

const FRAME_UNIFORMS_SIZE: u64 = std::mem::size_of::<FrameUniforms>() as u64;
const LIGHT_SIZE: u64 = std::mem::size_of::<GpuLight>() as u64;
const OBJECT_SIZE: u64 = std::mem::size_of::<ObjectUniforms>() as u64;
const SHADOW_UNIFORMS_SIZE: u64 = std::mem::size_of::<ShadowUniforms>() as u64;
const CASTER_SIZE: u64 = std::mem::size_of::<glam::Mat4>() as u64;

/// Object slots allocated before the first draw list arrives
pub const INITIAL_OBJECT_CAPACITY: usize = 64;

fn buffer_entry(buffer: BufferHandle, size: Option<u64>) -> BindGroupEntry {
    BindGroupEntry::Buffer {
        buffer,
        offset: 0,
        size,
    }
}

impl FrameResources {
    pub fn create(
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        slot: usize,
        grid: &TileGrid,
        shared: &SharedViews,
        line_budget_bytes: u64,
    ) -> BackendResult<Self> {
        let frame_uniforms = backend.create_buffer(&BufferDescriptor::uniform(
            &format!("Frame Uniforms {slot}"),
            FRAME_UNIFORMS_SIZE,
        ))?;
        let lights = backend.create_buffer(&BufferDescriptor::storage(
            &format!("Lights {slot}"),
            MAX_LIGHTS as u64 * LIGHT_SIZE,
        ))?;
        let tiles = backend.create_buffer(&BufferDescriptor::storage(
            &format!("Tile Lights {slot}"),
            grid.buffer_size(),
        ))?;
        let shadow_uniforms = backend.create_buffer(&BufferDescriptor::uniform(
            &format!("Shadow Uniforms {slot}"),
            SHADOW_UNIFORMS_SIZE,
        ))?;
        let objects = backend.create_buffer(&BufferDescriptor::uniform(
            &format!("Object Uniforms {slot}"),
            INITIAL_OBJECT_CAPACITY as u64 * UNIFORM_STRIDE,
        ))?;
        let casters = backend.create_buffer(&BufferDescriptor::uniform(
            &format!("Shadow Casters {slot}"),
            MAX_SHADOW_VIEWS as u64 * UNIFORM_STRIDE,
        ))?;

        let line_capacity = max_vertices(line_budget_bytes);
        let line_vertices = backend.create_buffer(&BufferDescriptor {
            label: Some(format!("Light Wireframes {slot}")),
            // wgpu rejects zero-sized vertex buffers
            size: line_budget_bytes.max(4),
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;

        let camera = backend.create_bind_group(
            layouts.camera,
            &[(0, buffer_entry(frame_uniforms, Some(FRAME_UNIFORMS_SIZE)))],
        )?;
        let objects_group = backend.create_bind_group(
            layouts.object,
            &[(0, buffer_entry(objects, Some(OBJECT_SIZE)))],
        )?;
        let casters_group = backend.create_bind_group(
            layouts.caster,
            &[(0, buffer_entry(casters, Some(CASTER_SIZE)))],
        )?;

        let mut resources = Self {
            frame_uniforms,
            lights,
            tiles,
            shadow_uniforms,
            objects,
            object_capacity: INITIAL_OBJECT_CAPACITY,
            casters,
            line_vertices,
            line_capacity,
            bindings: FrameBindings {
                camera,
                culling: camera,
                view: camera,
                objects: objects_group,
                casters: casters_group,
                line_vertices,
            },
        };
        resources.create_view_groups(backend, layouts, shared)?;
        Ok(resources)
    }

    /// Recreate the bind groups that reference the depth buffer or tiles,
    /// releasing the ones they replace.
    pub fn rebuild_views(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        shared: &SharedViews,
    ) -> BackendResult<()> {
        backend.destroy_bind_group(self.bindings.culling);
        backend.destroy_bind_group(self.bindings.view);
        self.create_view_groups(backend, layouts, shared)
    }

    fn create_view_groups(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        shared: &SharedViews,
    ) -> BackendResult<()> {
        self.bindings.culling = backend.create_bind_group(
            layouts.culling,
            &[
                (0, buffer_entry(self.frame_uniforms, Some(FRAME_UNIFORMS_SIZE))),
                (1, buffer_entry(self.lights, None)),
                (2, buffer_entry(self.tiles, None)),
                (3, BindGroupEntry::Texture(shared.depth)),
            ],
        )?;

        let mut entries = vec![
            (0, buffer_entry(self.frame_uniforms, Some(FRAME_UNIFORMS_SIZE))),
            (1, buffer_entry(self.lights, None)),
            (2, buffer_entry(self.tiles, None)),
            (3, buffer_entry(self.shadow_uniforms, Some(SHADOW_UNIFORMS_SIZE))),
            (4, BindGroupEntry::Texture(shared.directional_shadow)),
        ];
        for (slot, view) in shared.spot_shadows.iter().enumerate() {
            entries.push((5 + slot as u32, BindGroupEntry::Texture(*view)));
        }
        entries.push((9, BindGroupEntry::Sampler(shared.shadow_sampler)));
        self.bindings.view = backend.create_bind_group(layouts.view, &entries)?;
        Ok(())
    }

    /// Replace the tile buffer after the grid changed size.
    pub fn resize_tiles(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        grid: &TileGrid,
        shared: &SharedViews,
    ) -> BackendResult<()> {
        backend.destroy_buffer(self.tiles);
        self.tiles = backend.create_buffer(&BufferDescriptor::storage("Tile Lights", grid.buffer_size()))?;
        self.rebuild_views(backend, layouts, shared)
    }

    /// Grow the object buffer so `draws` uniform blocks fit.
    pub fn ensure_object_capacity(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        draws: usize,
    ) -> BackendResult<()> {
        if draws <= self.object_capacity {
            return Ok(());
        }
        let capacity = draws.next_power_of_two();
        log::debug!("Growing object uniforms from {} to {capacity} slots", self.object_capacity);

        backend.destroy_bind_group(self.bindings.objects);
        backend.destroy_buffer(self.objects);
        self.objects = backend.create_buffer(&BufferDescriptor::uniform(
            "Object Uniforms",
            capacity as u64 * UNIFORM_STRIDE,
        ))?;
        self.bindings.objects = backend.create_bind_group(
            layouts.object,
            &[(0, buffer_entry(self.objects, Some(OBJECT_SIZE)))],
        )?;
        self.object_capacity = capacity;
        Ok(())
    }

    /// Destroy every buffer and bind group of the slot
    pub fn release(&self, backend: &mut dyn GraphicsBackend) {
        let groups = &self.bindings;
        for group in [groups.camera, groups.culling, groups.view, groups.objects, groups.casters] {
            backend.destroy_bind_group(group);
        }
        for buffer in [
            self.frame_uniforms,
            self.lights,
            self.tiles,
            self.shadow_uniforms,
            self.objects,
            self.casters,
            self.line_vertices,
        ] {
            backend.destroy_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::RecordingBackend;

    #[test]
    fn zero_slots_is_an_error() {
        assert!(matches!(
            FrameSlots::new(0),
            Err(BackendError::InitializationFailed(_))
        ));
    }

    #[test]
    fn reused_slot_waits_for_its_last_frame() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut slots = FrameSlots::new(2).unwrap();
        assert!(slots.is_idle());

        let mut fences = Vec::new();
        for expected_slot in [0, 1] {
            slots.acquire(&mut backend).unwrap();
            assert_eq!(slots.slot(), expected_slot);
            let fence = backend.end_frame().unwrap().fence;
            slots.retire(fence);
            fences.push(fence);
        }
        assert!(backend.waited_fences().is_empty());

        slots.acquire(&mut backend).unwrap();
        assert_eq!(backend.waited_fences(), &fences[..1]);
        assert_eq!((slots.slot(), slots.started()), (0, 3));
    }

    #[test]
    fn drain_waits_on_every_slot() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut slots = FrameSlots::new(3).unwrap();
        for _ in 0..2 {
            slots.acquire(&mut backend).unwrap();
            let fence = backend.end_frame().unwrap().fence;
            slots.retire(fence);
        }
        assert!(!slots.is_idle());

        slots.drain(&mut backend).unwrap();
        assert!(slots.is_idle());
        assert_eq!(backend.waited_fences().len(), 2);
        assert_eq!(slots.count(), 3);
    }
}
