//! Scoped, reversible edge hiding.
//!
//! Package-level chain search needs a view of the graph with some edges
//! temporarily removed. [`ImportHider`] takes exclusive access to the graph,
//! removes edges on request, and puts every hidden edge back when it is
//! dropped, on every exit path including `?` and panics.
//!
//! Only edge existence changes. Detail records are keyed by endpoint pair and
//! are never touched, so their contents and order survive a hide/reveal cycle.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;

use super::{EdgeKey, ImportGraph};

/// Exclusive, self-restoring view of an [`ImportGraph`] with some edges hidden.
pub(crate) struct ImportHider<'g> {
    graph: &'g mut ImportGraph,
    hidden: HashSet<EdgeKey>,
}

impl<'g> ImportHider<'g> {
    pub(crate) fn new(graph: &'g mut ImportGraph) -> Self {
        Self {
            graph,
            hidden: HashSet::new(),
        }
    }

    /// The graph as currently visible.
    pub(crate) fn graph(&self) -> &ImportGraph {
        &*self.graph
    }

    /// Hide each edge that currently exists. Missing edges are ignored.
    pub(crate) fn hide<'e>(&mut self, edges: impl IntoIterator<Item = &'e EdgeKey>) {
        for &(from, to) in edges {
            if let Some(edge) = self.graph.graph.find_edge(from, to) {
                self.graph.graph.remove_edge(edge);
                self.hidden.insert((from, to));
            }
        }
    }

    /// Reveal each edge previously hidden by this hider.
    pub(crate) fn reveal<'e>(&mut self, edges: impl IntoIterator<Item = &'e EdgeKey>) {
        for edge in edges {
            if self.hidden.remove(edge) {
                self.graph.graph.add_edge(edge.0, edge.1, ());
            }
        }
    }

    /// Visible edges with both endpoints in `members`.
    pub(crate) fn edges_within(&self, members: &[NodeIndex]) -> Vec<EdgeKey> {
        let graph = &self.graph.graph;
        let set: HashSet<NodeIndex> = members.iter().copied().collect();
        let set = &set;
        members
            .iter()
            .flat_map(move |&from| {
                graph
                    .neighbors_directed(from, Direction::Outgoing)
                    .filter(move |to| set.contains(to))
                    .map(move |to| (from, to))
            })
            .collect()
    }

    /// Visible edges into or out of `node`.
    pub(crate) fn edges_touching(&self, node: NodeIndex) -> Vec<EdgeKey> {
        self.graph.edges_touching(node)
    }
}

impl Drop for ImportHider<'_> {
    fn drop(&mut self) {
        for (from, to) in self.hidden.drain() {
            self.graph.graph.add_edge(from, to, ());
        }
    }
}
