//! Recording a compiled graph

use crate::backend::traits::GraphicsBackend;
use crate::pipeline::FramePacket;
use crate::render_graph::graph::{RenderGraph, Schedule};
use crate::render_graph::pass::PassContext;

/// Record each scheduled pass, preceded by its barriers.
pub fn execute(
    graph: &RenderGraph,
    schedule: &Schedule,
    backend: &mut dyn GraphicsBackend,
    frame: &FramePacket,
) {
    for step in &schedule.steps {
        let Some(pass) = graph.pass(step.pass) else {
            log::warn!("Schedule refers to missing pass {}", step.pass);
            continue;
        };
        if !step.barriers.is_empty() {
            backend.pipeline_barrier(&step.barriers);
        }
        log::trace!("Recording '{}'", pass.name());
        pass.record(&mut PassContext {
            backend: &mut *backend,
            frame,
        });
    }
}
