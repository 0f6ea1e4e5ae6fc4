//! Barrier planning from declared resource usage.
//!
//! Walks the compiled pass order and tracks, per resource, the layout it is
//! in and the stages and accesses that last touched it. A barrier is emitted
//! whenever a hazard exists (anything involving a write) or a texture has to
//! change layout.

use crate::backend::barrier::{AccessFlags, Barrier, BarrierKind, PipelineStages, TextureLayout};
use crate::render_graph::pass::PassNode;
use crate::render_graph::resource::{GraphResource, ResourceId, ResourceKind};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct ResourceState {
    layout: TextureLayout,
    stages: PipelineStages,
    access: AccessFlags,
    written: bool,
}

/// Compute the barriers to record before each pass in `ordered`.
pub fn plan_barriers(resources: &[GraphResource], ordered: &[&PassNode]) -> Vec<Vec<Barrier>> {
    let by_id: HashMap<ResourceId, &GraphResource> = resources.iter().map(|r| (r.id, r)).collect();
    let mut states: HashMap<ResourceId, ResourceState> = HashMap::new();
    let mut plan = Vec::with_capacity(ordered.len());

    for node in ordered {
        let mut step = Vec::new();

        for access in node.accesses() {
            let Some(resource) = by_id.get(&access.resource) else {
                continue;
            };
            let usage = access.usage;
            let is_texture = resource.kind == ResourceKind::Texture;
            let layout = if is_texture {
                usage.layout()
            } else {
                TextureLayout::General
            };
            let kind = if is_texture {
                BarrierKind::Texture
            } else {
                BarrierKind::Buffer
            };

            match states.get_mut(&access.resource) {
                None => {
                    // First use this frame. Textures start undefined.
                    if is_texture {
                        step.push(Barrier {
                            resource: resource.name.clone(),
                            kind,
                            old_layout: TextureLayout::Undefined,
                            new_layout: layout,
                            src_stages: PipelineStages::TOP_OF_PIPE,
                            src_access: AccessFlags::empty(),
                            dst_stages: usage.stages(),
                            dst_access: usage.access(),
                        });
                    }
                    states.insert(
                        access.resource,
                        ResourceState {
                            layout,
                            stages: usage.stages(),
                            access: usage.access(),
                            written: usage.is_write(),
                        },
                    );
                }
                Some(state) => {
                    let hazard = state.written || usage.is_write();
                    let transition = state.layout != layout;

                    if hazard || transition {
                        step.push(Barrier {
                            resource: resource.name.clone(),
                            kind,
                            old_layout: state.layout,
                            new_layout: layout,
                            src_stages: state.stages,
                            // Write-after-read only needs an execution dependency
                            src_access: if state.written {
                                state.access
                            } else {
                                AccessFlags::empty()
                            },
                            dst_stages: usage.stages(),
                            dst_access: usage.access(),
                        });
                        *state = ResourceState {
                            layout,
                            stages: usage.stages(),
                            access: usage.access(),
                            written: usage.is_write(),
                        };
                    } else {
                        // Read after read in the same layout: later writers wait on every reader
                        state.stages |= usage.stages();
                        state.access |= usage.access();
                    }
                }
            }
        }

        for barrier in &step {
            log::trace!("before '{}': {}", node.name, barrier);
        }
        plan.push(step);
    }

    plan
}
