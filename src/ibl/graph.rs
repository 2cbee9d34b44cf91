//! A small compute pass graph with automatic barrier insertion.
//!
//! Passes declare the `(texture, mip)` pairs they read and write. Edges are
//! derived per resource:
//!
//! - a reader runs after the writer it observes (the latest writer declared
//!   before it, or the first writer if none precedes it),
//! - a writer runs after the previous writer of the same resource and after
//!   every reader of the previous writer's output.
//!
//! Scheduling is a stable topological sort (lowest declaration index first
//! among ready passes). Execution emits a barrier before any pass touching a
//! resource written since the last barrier.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{RenderError, Result};
use crate::gpu::backend::{ComputeDispatch, RenderBackend, TextureId};

/// One mip of one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    /// Texture.
    pub texture: TextureId,
    /// Mip level.
    pub mip: u32,
}

impl ResourceRef {
    /// `(texture, mip)`.
    #[must_use]
    pub const fn new(texture: TextureId, mip: u32) -> Self {
        Self { texture, mip }
    }
}

/// A compute pass and its declared data dependencies.
#[derive(Debug, Clone)]
pub struct PassNode {
    /// Debug name.
    pub name: String,
    /// Resources sampled.
    pub reads: Vec<ResourceRef>,
    /// Resources written.
    pub writes: Vec<ResourceRef>,
    /// Work to submit.
    pub dispatch: ComputeDispatch,
}

/// Declared passes plus any explicit ordering constraints.
#[derive(Debug, Default)]
pub struct PassGraph {
    nodes: Vec<PassNode>,
    explicit: Vec<(usize, usize)>,
}

impl PassGraph {
    /// Empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a pass; returns its index.
    pub fn add(&mut self, node: PassNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Force `before` to run ahead of `after`.
    pub fn depend(&mut self, before: usize, after: usize) {
        self.explicit.push((before, after));
    }

    /// Declared passes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[PassNode] {
        &self.nodes
    }

    /// Number of declared passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        let mut writers: FxHashMap<ResourceRef, Vec<usize>> = FxHashMap::default();
        for (i, node) in self.nodes.iter().enumerate() {
            for &w in &node.writes {
                let list = writers.entry(w).or_default();
                if list.last() != Some(&i) {
                    list.push(i);
                }
            }
        }

        let mut edges = self.explicit.clone();
        for (resource, writers) in &writers {
            let mut version_readers: Vec<Vec<usize>> = vec![Vec::new(); writers.len()];
            for (r, node) in self.nodes.iter().enumerate() {
                if !node.reads.contains(resource) || node.writes.contains(resource) {
                    continue;
                }
                let version = writers.iter().rposition(|&w| w < r).unwrap_or(0);
                edges.push((writers[version], r));
                version_readers[version].push(r);
            }
            for k in 1..writers.len() {
                edges.push((writers[k - 1], writers[k]));
                for &r in &version_readers[k - 1] {
                    edges.push((r, writers[k]));
                }
            }
        }
        edges
    }

    /// Execution order.
    ///
    /// # Errors
    ///
    /// [`RenderError::Configuration`] if the dependencies form a cycle or an
    /// explicit edge names an unknown pass.
    pub fn schedule(&self) -> Result<Vec<usize>> {
        let n = self.nodes.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut in_degree = vec![0_usize; n];
        let mut seen = FxHashSet::default();
        for (a, b) in self.edges() {
            if a >= n || b >= n {
                return Err(RenderError::Configuration(format!(
                    "pass dependency {a} -> {b} references an unknown pass"
                )));
            }
            if a != b && seen.insert((a, b)) {
                successors[a].push(b);
                in_degree[b] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &s in &successors[i] {
                in_degree[s] -= 1;
                if in_degree[s] == 0 {
                    let _ = ready.insert(s);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i].name.as_str())
                .collect();
            return Err(RenderError::Configuration(format!(
                "pass graph has a cycle through: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }

    /// Schedule, then dispatch every pass with barriers in between, and
    /// flush. Returns the executed pass names in order.
    ///
    /// # Errors
    ///
    /// See [`PassGraph::schedule`]. Nothing is dispatched on error.
    pub fn execute<B: RenderBackend + ?Sized>(&self, backend: &mut B) -> Result<Vec<String>> {
        let order = self.schedule()?;
        let mut dirty: FxHashSet<ResourceRef> = FxHashSet::default();
        let mut executed = Vec::with_capacity(order.len());

        for i in order {
            let node = &self.nodes[i];
            let mut hazards: Vec<TextureId> = node
                .reads
                .iter()
                .chain(&node.writes)
                .filter(|r| dirty.contains(r))
                .map(|r| r.texture)
                .collect();
            if !hazards.is_empty() {
                hazards.sort_unstable();
                hazards.dedup();
                backend.barrier(&hazards);
                dirty.clear();
            }
            log::trace!("ibl pass: {}", node.name);
            backend.dispatch(&node.dispatch);
            dirty.extend(node.writes.iter().copied());
            executed.push(node.name.clone());
        }
        backend.flush();
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::backend::{ComputeProgram, StorageTarget};
    use crate::gpu::headless::{Command, HeadlessBackend};
    use crate::gpu::layout::ComputeParams;
    use bytemuck::Zeroable;

    fn tex(i: u32) -> TextureId {
        TextureId::from_raw(i)
    }

    fn node(name: &str, reads: &[ResourceRef], writes: &[ResourceRef]) -> PassNode {
        PassNode {
            name: name.to_owned(),
            reads: reads.to_vec(),
            writes: writes.to_vec(),
            dispatch: ComputeDispatch {
                program: ComputeProgram::Irradiance,
                label: name.to_owned(),
                input: None,
                output: StorageTarget {
                    texture: writes.first().map_or(tex(0), |w| w.texture),
                    mip: 0,
                },
                params: ComputeParams::zeroed(),
                workgroups: [1, 1, 1],
            },
        }
    }

    #[test]
    fn reverse_declaration_still_runs_producer_first() {
        let env = ResourceRef::new(tex(1), 0);
        let irr = ResourceRef::new(tex(2), 0);
        let mut graph = PassGraph::new();
        let _ = graph.add(node("irradiance", &[env], &[irr]));
        let _ = graph.add(node("convert", &[], &[env]));
        assert_eq!(graph.schedule().unwrap(), vec![1, 0]);
    }

    #[test]
    fn writer_waits_for_earlier_reader() {
        let x = ResourceRef::new(tex(1), 0);
        let y = ResourceRef::new(tex(2), 0);
        let mut graph = PassGraph::new();
        let _ = graph.add(node("write x", &[], &[x]));
        let _ = graph.add(node("read x", &[x], &[y]));
        let _ = graph.add(node("overwrite x", &[], &[x]));
        assert_eq!(graph.schedule().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn independent_passes_keep_declaration_order() {
        let mut graph = PassGraph::new();
        for i in 0..4 {
            let _ = graph.add(node(&format!("p{i}"), &[], &[ResourceRef::new(tex(i + 1), 0)]));
        }
        assert_eq!(graph.schedule().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn cycle_is_configuration_error() {
        let a = ResourceRef::new(tex(1), 0);
        let b = ResourceRef::new(tex(2), 0);
        let mut graph = PassGraph::new();
        let _ = graph.add(node("a", &[b], &[a]));
        let _ = graph.add(node("b", &[a], &[b]));
        let err = graph.schedule().unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));

        let mut backend = HeadlessBackend::new();
        assert!(graph.execute(&mut backend).is_err());
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn explicit_cycle_is_detected() {
        let mut graph = PassGraph::new();
        let p = graph.add(node("p", &[], &[ResourceRef::new(tex(1), 0)]));
        let q = graph.add(node("q", &[], &[ResourceRef::new(tex(2), 0)]));
        graph.depend(p, q);
        graph.depend(q, p);
        assert!(graph.schedule().is_err());
    }

    #[test]
    fn barrier_only_for_dirty_resources() {
        let env = ResourceRef::new(tex(1), 0);
        let irr = ResourceRef::new(tex(2), 0);
        let other = ResourceRef::new(tex(3), 0);
        let mut graph = PassGraph::new();
        let _ = graph.add(node("convert", &[], &[env]));
        let _ = graph.add(node("unrelated", &[], &[other]));
        let _ = graph.add(node("irradiance", &[env], &[irr]));

        let mut backend = HeadlessBackend::new();
        let names = graph.execute(&mut backend).unwrap();
        assert_eq!(names, vec!["convert", "unrelated", "irradiance"]);

        let kinds: Vec<&str> = backend
            .commands()
            .iter()
            .map(|c| match c {
                Command::Dispatch { .. } => "dispatch",
                Command::Barrier(_) => "barrier",
                Command::Flush => "flush",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["dispatch", "dispatch", "barrier", "dispatch", "flush"]);
        assert_eq!(backend.commands()[2], Command::Barrier(vec![tex(1)]));
    }
}
