//! Nominating imports whose removal would make a package's children acyclic.
//!
//! The children of the package are ordered with a weighted greedy feedback
//! arc set heuristic: sinks are peeled off to the back, sources to the front,
//! and otherwise the child with the greatest outgoing minus incoming weight
//! goes next. The weight of a dependency between two children is the number of
//! distinct module-level imports between their closures. Every import pointing
//! backwards in the final order is a breaker.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use tracing::debug;

use super::ImportGraph;
use crate::error::Result;
use crate::module::Module;

impl ImportGraph {
    /// Imports that, if removed, would leave no cycles between the children
    /// of `package`.
    ///
    /// Imports between the package itself and its children are disregarded.
    /// Squashed packages and packages with fewer than two children have
    /// nothing to nominate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`](crate::Error::ModuleNotPresent) if
    /// the package is unknown.
    pub fn nominate_cycle_breakers(&self, package: &str) -> Result<BTreeSet<(Module, Module)>> {
        if self.is_module_squashed(package)? {
            return Ok(BTreeSet::new());
        }
        let children: Vec<NodeIndex> = self
            .find_children(package)?
            .iter()
            .filter_map(|child| self.node_map.get(child).copied())
            .collect();
        if children.len() < 2 {
            return Ok(BTreeSet::new());
        }

        let mut owner: HashMap<NodeIndex, usize> = HashMap::new();
        for (position, &child) in children.iter().enumerate() {
            for member in self.closure_indices(child) {
                owner.insert(member, position);
            }
        }

        let mut imports: BTreeMap<(usize, usize), Vec<(NodeIndex, NodeIndex)>> = BTreeMap::new();
        for (&from, &from_child) in &owner {
            for to in self.graph.neighbors_directed(from, Direction::Outgoing) {
                match owner.get(&to) {
                    Some(&to_child) if to_child != from_child => {
                        imports.entry((from_child, to_child)).or_default().push((from, to));
                    }
                    _ => {}
                }
            }
        }

        let weights: BTreeMap<(usize, usize), usize> =
            imports.iter().map(|(&pair, edges)| (pair, edges.len())).collect();
        let order = greedy_order(children.len(), &weights);
        let mut rank = vec![0; children.len()];
        for (position, &child) in order.iter().enumerate() {
            rank[child] = position;
        }

        let breakers: BTreeSet<(Module, Module)> = imports
            .iter()
            .filter(|((from_child, to_child), _)| rank[*from_child] > rank[*to_child])
            .flat_map(|(_, edges)| edges)
            .map(|&(from, to)| (self.module_at(from).clone(), self.module_at(to).clone()))
            .collect();
        debug!(package, breakers = breakers.len(), "Nominated cycle breakers");
        Ok(breakers)
    }
}

/// Order `count` nodes so that as little weight as possible points backwards.
fn greedy_order(count: usize, weights: &BTreeMap<(usize, usize), usize>) -> Vec<usize> {
    let mut remaining: BTreeSet<usize> = (0..count).collect();
    let mut head = Vec::with_capacity(count);
    let mut tail = Vec::new();

    let weight_between = |remaining: &BTreeSet<usize>, node: usize, direction: Direction| {
        weights
            .iter()
            .filter(|((from, to), _)| match direction {
                Direction::Outgoing => *from == node && remaining.contains(to),
                Direction::Incoming => *to == node && remaining.contains(from),
            })
            .map(|(_, weight)| *weight)
            .sum::<usize>()
    };

    while !remaining.is_empty() {
        let sink = remaining
            .iter()
            .copied()
            .find(|&node| weight_between(&remaining, node, Direction::Outgoing) == 0);
        if let Some(node) = sink {
            remaining.remove(&node);
            tail.push(node);
            continue;
        }

        let source = remaining
            .iter()
            .copied()
            .find(|&node| weight_between(&remaining, node, Direction::Incoming) == 0);
        if let Some(node) = source {
            remaining.remove(&node);
            head.push(node);
            continue;
        }

        let mut best: Option<(i64, usize)> = None;
        for &node in &remaining {
            let out = weight_between(&remaining, node, Direction::Outgoing);
            let inward = weight_between(&remaining, node, Direction::Incoming);
            let delta = i64::try_from(out).unwrap_or(i64::MAX)
                - i64::try_from(inward).unwrap_or(i64::MAX);
            match best {
                Some((top, _)) if delta <= top => {}
                _ => best = Some((delta, node)),
            }
        }
        let Some((_, node)) = best else {
            break;
        };
        remaining.remove(&node);
        head.push(node);
    }

    head.extend(tail.into_iter().rev());
    head
}
