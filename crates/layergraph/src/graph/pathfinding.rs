//! Breadth-first search primitives shared by the query algorithms.
//!
//! Neighbours are always visited in lexical order of module name. This makes
//! every search deterministic: when several shortest paths exist,
//! [`shortest_path`] returns the one whose modules sort first at each hop, and
//! [`all_shortest_paths`] returns them all.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;

use super::ImportGraph;

/// Neighbours of `node` in `direction`, sorted by module name.
fn sorted_neighbors(graph: &ImportGraph, node: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
    let mut neighbors: Vec<NodeIndex> = graph.graph.neighbors_directed(node, direction).collect();
    neighbors.sort_by(|a, b| graph.module_at(*a).cmp(graph.module_at(*b)));
    neighbors.dedup();
    neighbors
}

/// Nodes reachable from any seed by one or more edges in `direction`,
/// excluding the seeds themselves.
///
/// Paths may pass through other seeds.
pub(super) fn reachable(
    graph: &ImportGraph,
    seeds: &[NodeIndex],
    direction: Direction,
) -> HashSet<NodeIndex> {
    let mut visited: HashSet<NodeIndex> = seeds.iter().copied().collect();
    let mut queue: VecDeque<NodeIndex> = seeds.iter().copied().collect();
    let mut found = HashSet::new();

    while let Some(current) = queue.pop_front() {
        for next in graph.graph.neighbors_directed(current, direction) {
            if visited.insert(next) {
                found.insert(next);
                queue.push_back(next);
            }
        }
    }

    found
}

/// Shortest forward path of at least one edge from any source to any target.
///
/// Returns the node sequence including both endpoints. A source that is also
/// a target is only matched through a cycle.
pub(super) fn shortest_path(
    graph: &ImportGraph,
    sources: &[NodeIndex],
    targets: &HashSet<NodeIndex>,
) -> Option<Vec<NodeIndex>> {
    let mut ordered_sources = sources.to_vec();
    ordered_sources.sort_by(|a, b| graph.module_at(*a).cmp(graph.module_at(*b)));

    let mut visited: HashSet<NodeIndex> = ordered_sources.iter().copied().collect();
    let mut predecessors: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue: VecDeque<NodeIndex> = ordered_sources.into_iter().collect();

    while let Some(current) = queue.pop_front() {
        for next in sorted_neighbors(graph, current, Direction::Outgoing) {
            if targets.contains(&next) {
                let mut path = vec![next, current];
                let mut cursor = current;
                while let Some(&previous) = predecessors.get(&cursor) {
                    path.push(previous);
                    cursor = previous;
                }
                path.reverse();
                return Some(path);
            }
            if visited.insert(next) {
                predecessors.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    None
}

/// Every distinct shortest forward path from `source` to `target`.
///
/// The search runs level by level and records, for each node, every
/// neighbour one level closer to `source`. Expansion stops at the level that
/// reaches `target`. Empty if `target` is unreachable or equals `source`.
pub(super) fn all_shortest_paths(
    graph: &ImportGraph,
    source: NodeIndex,
    target: NodeIndex,
) -> Vec<Vec<NodeIndex>> {
    let mut depth: HashMap<NodeIndex, usize> = HashMap::from([(source, 0)]);
    let mut predecessors: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    let mut frontier = vec![source];
    let mut level = 0;

    while !frontier.is_empty() && !depth.contains_key(&target) {
        level += 1;
        let mut next_frontier = Vec::new();
        for &current in &frontier {
            for next in sorted_neighbors(graph, current, Direction::Outgoing) {
                match depth.get(&next) {
                    None => {
                        depth.insert(next, level);
                        predecessors.insert(next, vec![current]);
                        next_frontier.push(next);
                    }
                    Some(&d) if d == level => {
                        predecessors.entry(next).or_default().push(current);
                    }
                    Some(_) => {}
                }
            }
        }
        frontier = next_frontier;
    }

    let mut paths = Vec::new();
    if predecessors.contains_key(&target) {
        unwind(&predecessors, source, &mut vec![target], &mut paths);
    }
    paths
}

/// Extend `suffix` (target first) back to `source` along every predecessor.
fn unwind(
    predecessors: &HashMap<NodeIndex, Vec<NodeIndex>>,
    source: NodeIndex,
    suffix: &mut Vec<NodeIndex>,
    paths: &mut Vec<Vec<NodeIndex>>,
) {
    let Some(&head) = suffix.last() else {
        return;
    };
    if head == source {
        paths.push(suffix.iter().rev().copied().collect());
        return;
    }
    for &previous in predecessors.get(&head).into_iter().flatten() {
        suffix.push(previous);
        unwind(predecessors, source, suffix, paths);
        suffix.pop();
    }
}
