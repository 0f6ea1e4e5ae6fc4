//! Frame graph and its compiled schedule

use crate::backend::barrier::Barrier;
use crate::render_graph::barrier::plan_barriers;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::BTreeSet;

#[derive(Default)]
pub struct RenderGraph {
    passes: Vec<Box<dyn RenderPass>>,
    nodes: Vec<PassNode>,
    resources: Vec<GraphResource>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass and collect its declared accesses
    pub fn add(&mut self, pass: impl RenderPass + 'static) {
        let mut node = PassNode {
            name: pass.name().to_string(),
            ..Default::default()
        };
        pass.declare(&mut PassIo {
            registry: &mut self.resources,
            node: &mut node,
        });
        log::trace!(
            "'{}' reads {} and writes {} resources",
            node.name,
            node.inputs.len(),
            node.outputs.len()
        );
        self.nodes.push(node);
        self.passes.push(Box::new(pass));
    }

    pub fn with(mut self, pass: impl RenderPass + 'static) -> Self {
        self.add(pass);
        self
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn nodes(&self) -> &[PassNode] {
        &self.nodes
    }

    pub fn resources(&self) -> &[GraphResource] {
        &self.resources
    }

    /// Id registered for `name`, if any pass declared it
    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.resources.iter().find(|r| r.name == name).map(|r| r.id)
    }

    pub(crate) fn pass(&self, index: usize) -> Option<&dyn RenderPass> {
        self.passes.get(index).map(|p| p.as_ref())
    }

    /// Order passes by their data dependencies and plan the barriers in
    /// front of each one.
    ///
    /// Edges only run from an earlier-added pass to a later one and the
    /// lowest ready index always goes next, so independent passes keep
    /// insertion order and the result never varies between calls.
    pub fn compile(&self) -> Schedule {
        let count = self.nodes.len();
        let mut edges = vec![Vec::new(); count];
        let mut blockers = vec![0usize; count];
        for (i, earlier) in self.nodes.iter().enumerate() {
            for (j, later) in self.nodes.iter().enumerate().skip(i + 1) {
                if earlier.conflicts_with(later) {
                    edges[i].push(j);
                    blockers[j] += 1;
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| blockers[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &after in &edges[next] {
                blockers[after] -= 1;
                if blockers[after] == 0 {
                    ready.insert(after);
                }
            }
        }

        let ordered: Vec<&PassNode> = order.iter().map(|&i| &self.nodes[i]).collect();
        let barriers = plan_barriers(&self.resources, &ordered);
        Schedule {
            steps: order
                .into_iter()
                .zip(barriers)
                .map(|(pass, barriers)| Step { pass, barriers })
                .collect(),
        }
    }
}

/// A pass index into the graph with the barriers recorded before it
#[derive(Debug, Clone)]
pub struct Step {
    pub pass: usize,
    pub barriers: Vec<Barrier>,
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub steps: Vec<Step>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn barriers(&self) -> impl Iterator<Item = &Barrier> {
        self.steps.iter().flat_map(|s| &s.barriers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::ShaderStageFlags;

    struct Stub {
        name: &'static str,
        reads: &'static [&'static str],
        writes: &'static [&'static str],
    }

    impl RenderPass for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn declare(&self, io: &mut PassIo) {
            let stages = ShaderStageFlags::COMPUTE;
            for name in self.reads {
                io.read(name, ResourceUsage::StorageBufferRead(stages));
            }
            for name in self.writes {
                io.write(name, ResourceUsage::StorageBufferWrite(stages));
            }
        }

        fn record(&self, _ctx: &mut PassContext) {}
    }

    fn stub(name: &'static str, reads: &'static [&'static str], writes: &'static [&'static str]) -> Stub {
        Stub { name, reads, writes }
    }

    fn order(graph: &RenderGraph) -> Vec<&str> {
        graph
            .compile()
            .steps
            .iter()
            .map(|s| graph.nodes()[s.pass].name.as_str())
            .collect()
    }

    #[test]
    fn independent_passes_keep_insertion_order() {
        let graph = RenderGraph::new()
            .with(stub("a", &[], &["x"]))
            .with(stub("b", &[], &["y"]))
            .with(stub("c", &["x", "y"], &[]));
        assert_eq!(order(&graph), ["a", "b", "c"]);
    }

    #[test]
    fn names_register_once() {
        let graph = RenderGraph::new()
            .with(stub("a", &[], &["x"]))
            .with(stub("b", &["x"], &["y"]));
        assert_eq!(graph.resources().len(), 2);
        assert_eq!(graph.resource("y"), Some(ResourceId(1)));
        assert_eq!(graph.resource("z"), None);
    }

    #[test]
    fn reader_of_a_write_gets_a_barrier() {
        let graph = RenderGraph::new()
            .with(stub("produce", &[], &["tiles"]))
            .with(stub("consume", &["tiles"], &[]));
        let schedule = graph.compile();
        assert_eq!(schedule.len(), 2);
        assert!(schedule.steps[1].barriers.iter().any(|b| b.resource == "tiles"));
    }

    #[test]
    fn compile_is_repeatable() {
        let graph = RenderGraph::new()
            .with(stub("a", &["x"], &["y"]))
            .with(stub("b", &[], &["x"]))
            .with(stub("c", &["y"], &[]));
        assert_eq!(order(&graph), order(&graph));
        assert_eq!(order(&graph), ["a", "b", "c"]);
    }
}
