//! Pass recording for the wgpu backend
//!
//! wgpu passes borrow their encoder and every bound object for the pass's
//! whole lifetime, which does not fit the `&mut self` call style of
//! [`GraphicsBackend`](crate::backend::GraphicsBackend). Calls are buffered
//! per pass and replayed into a real wgpu pass when the pass ends.

use super::conversion;
use super::registry::Resources;
use crate::backend::traits::*;
use std::ops::Range;

#[derive(Debug, Clone)]
pub(super) enum PassCommand {
    RenderPipeline(RenderPipelineHandle),
    ComputePipeline(ComputePipelineHandle),
    BindGroup {
        index: u32,
        bind_group: BindGroupHandle,
        offsets: Vec<u32>,
    },
    VertexBuffer {
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    IndexBuffer {
        buffer: BufferHandle,
        offset: u64,
        format: IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}

pub(super) enum PendingPass {
    Render {
        descriptor: RenderPassDescriptor,
        commands: Vec<PassCommand>,
    },
    Compute {
        label: Option<String>,
        commands: Vec<PassCommand>,
    },
}

impl PendingPass {
    pub(super) fn push(&mut self, command: PassCommand) {
        match self {
            PendingPass::Render { commands, .. } | PendingPass::Compute { commands, .. } => {
                commands.push(command)
            }
        }
    }
}

/// Replay buffered calls; stale handles are skipped with a warning
pub(super) fn replay_render<'a>(
    pass: &mut wgpu::RenderPass<'a>,
    commands: &[PassCommand],
    resources: &'a Resources,
) {
    for command in commands {
        match command {
            PassCommand::RenderPipeline(handle) => match resources.render_pipelines.get(handle.0) {
                Some(pipeline) => pass.set_pipeline(pipeline),
                None => log::warn!("Render pass uses unknown pipeline {}", handle.0),
            },
            PassCommand::BindGroup {
                index,
                bind_group,
                offsets,
            } => {
                if let Some(group) = resources.bind_groups.get(bind_group.0) {
                    pass.set_bind_group(*index, group, offsets);
                }
            }
            PassCommand::VertexBuffer {
                slot,
                buffer,
                offset,
            } => {
                if let Some(buffer) = resources.buffers.get(buffer.0) {
                    pass.set_vertex_buffer(*slot, buffer.slice(*offset..));
                }
            }
            PassCommand::IndexBuffer {
                buffer,
                offset,
                format,
            } => {
                if let Some(buffer) = resources.buffers.get(buffer.0) {
                    pass.set_index_buffer(buffer.slice(*offset..), conversion::index_format(*format));
                }
            }
            PassCommand::Draw {
                vertices,
                instances,
            } => pass.draw(vertices.clone(), instances.clone()),
            PassCommand::DrawIndexed {
                indices,
                base_vertex,
                instances,
            } => pass.draw_indexed(indices.clone(), *base_vertex, instances.clone()),
            PassCommand::ComputePipeline(_) | PassCommand::Dispatch { .. } => {
                log::warn!("Compute command recorded inside a render pass: {command:?}")
            }
        }
    }
}

pub(super) fn replay_compute<'a>(
    pass: &mut wgpu::ComputePass<'a>,
    commands: &[PassCommand],
    resources: &'a Resources,
) {
    for command in commands {
        match command {
            PassCommand::ComputePipeline(handle) => match resources.compute_pipelines.get(handle.0) {
                Some(pipeline) => pass.set_pipeline(pipeline),
                None => log::warn!("Compute pass uses unknown pipeline {}", handle.0),
            },
            PassCommand::BindGroup {
                index,
                bind_group,
                offsets,
            } => {
                if let Some(group) = resources.bind_groups.get(bind_group.0) {
                    pass.set_bind_group(*index, group, offsets);
                }
            }
            PassCommand::Dispatch { x, y, z } => pass.dispatch_workgroups(*x, *y, *z),
            _ => log::warn!("Render command recorded inside a compute pass: {command:?}"),
        }
    }
}
