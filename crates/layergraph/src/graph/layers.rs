//! Checking a graph against a layered architecture.
//!
//! Layers are listed from highest to lowest. A higher layer may import a lower
//! one, never the reverse. For every (lower, higher) pair of layer modules the
//! check collects the import routes leading upwards:
//!
//! 1. every direct import from the lower closure into the higher closure is a
//!    route on its own
//! 2. with those imports and every other layer hidden, the shortest remaining
//!    chain is found, recorded and popped repeatedly until none is left
//!
//! Popping treats each closure as one node: the chain's first hop is hidden
//! from every lower-layer module, and its last hop into every higher-layer
//! module. A route is then the chain's middle together with every lower module
//! importing its first module (the heads) and every higher module imported by
//! its last (the tails).
//!
//! Sibling modules of an independent layer may not import each other, and
//! a higher layer may not reach past a closed layer to anything beneath it.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use tracing::{debug, info};

use super::ImportGraph;
use super::hidden::ImportHider;
use super::pathfinding::shortest_path;
use crate::error::{Error, Result};
use crate::module::Module;

/// One level of a layered architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Module names in this layer, relative to the container if there is one.
    pub module_tails: BTreeSet<String>,
    /// Whether sibling modules in this layer are forbidden from importing each other.
    pub independent: bool,
    /// Whether higher layers must go through this layer to reach lower ones.
    pub closed: bool,
}

impl Layer {
    /// A layer of one module.
    #[must_use]
    pub fn new(module_tail: impl Into<String>) -> Self {
        Self::siblings([module_tail])
    }

    /// A layer of independent sibling modules.
    #[must_use]
    pub fn siblings<I, S>(module_tails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            module_tails: module_tails.into_iter().map(Into::into).collect(),
            independent: true,
            closed: false,
        }
    }

    /// Set whether siblings may not import each other.
    #[must_use]
    pub fn independent(mut self, independent: bool) -> Self {
        self.independent = independent;
        self
    }

    /// Set whether the layer may not be bypassed.
    #[must_use]
    pub fn closed(mut self, closed: bool) -> Self {
        self.closed = closed;
        self
    }
}

impl From<&str> for Layer {
    fn from(module_tail: &str) -> Self {
        Self::new(module_tail)
    }
}

/// A set of chains sharing the same middle.
///
/// The route fans in at the heads and out at the tails. A direct import is a
/// route with an empty middle and one head and tail.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    /// Modules at the start of the chains, in the importing layer.
    pub heads: BTreeSet<Module>,
    /// Modules linking heads to tails, in order.
    pub middle: Vec<Module>,
    /// Modules at the end of the chains, in the imported layer.
    pub tails: BTreeSet<Module>,
}

/// Illegal routes from one layer module to another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageDependency {
    /// Layer module the routes start in.
    pub importer: Module,
    /// Layer module the routes end in.
    pub imported: Module,
    /// Every route found.
    pub routes: BTreeSet<Route>,
}

/// Resolved modules of one layer within one container.
struct Level {
    modules: Vec<Module>,
    independent: bool,
    closed: bool,
}

impl ImportGraph {
    /// Find dependencies that break a layered architecture.
    ///
    /// `layers` run from highest to lowest. With `containers`, layer names are
    /// relative to each container and each container is checked separately;
    /// without, they are absolute. Layers missing from the graph are skipped.
    ///
    /// Edges are hidden while routes are searched and restored before
    /// returning, which is why this takes `&mut self`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoSuchContainer`] if a container is not in the graph
    /// - [`Error::InvalidModuleName`] if a layer does not form a valid name
    pub fn find_illegal_dependencies_for_layers(
        &mut self,
        layers: &[Layer],
        containers: &[&str],
    ) -> Result<BTreeSet<PackageDependency>> {
        let mut resolved = BTreeSet::new();
        for name in containers {
            if !self.contains_module(name) {
                return Err(Error::NoSuchContainer((*name).to_string()));
            }
            resolved.insert(Module::new(*name)?);
        }
        let containers: Vec<Option<&Module>> = if resolved.is_empty() {
            vec![None]
        } else {
            resolved.iter().map(Some).collect()
        };

        let start = Instant::now();
        let mut dependencies = BTreeSet::new();
        for container in containers {
            let levels = resolve_levels(layers, container)?;
            for (importer, imported) in layer_permutations(&levels) {
                let present = |m: &Module| self.contains_module(m.as_str());
                if !present(importer) || !present(imported) {
                    continue;
                }
                let excluded: Vec<&Module> = levels
                    .iter()
                    .flat_map(|level| &level.modules)
                    .filter(|m| !m.overlaps(importer) && !m.overlaps(imported))
                    .collect();
                if let Some(dependency) =
                    self.search_for_package_dependency(importer, imported, &excluded)?
                {
                    dependencies.insert(dependency);
                }
            }
        }

        info!(
            dependencies = dependencies.len(),
            duration_ms = start.elapsed().as_millis(),
            "Checked layers"
        );
        Ok(dependencies)
    }

    fn search_for_package_dependency(
        &mut self,
        importer: &Module,
        imported: &Module,
        excluded: &[&Module],
    ) -> Result<Option<PackageDependency>> {
        let start = Instant::now();
        debug!(%importer, %imported, "Searching for import chains");

        let from = self.index_of(importer.as_str())?;
        let to = self.index_of(imported.as_str())?;
        let heads = self.closure_indices(from);
        let tails = self.closure_indices(to);
        let tail_set: HashSet<NodeIndex> = tails.iter().copied().collect();

        let mut direct = Vec::new();
        for &head in &heads {
            for next in self.graph.neighbors_directed(head, Direction::Outgoing) {
                if tail_set.contains(&next) {
                    direct.push((head, next));
                }
            }
        }
        let mut routes: BTreeSet<Route> = direct
            .iter()
            .map(|&(head, tail)| Route {
                heads: BTreeSet::from([self.module_at(head).clone()]),
                middle: Vec::new(),
                tails: BTreeSet::from([self.module_at(tail).clone()]),
            })
            .collect();

        let excluded_members: Vec<NodeIndex> = excluded
            .iter()
            .filter_map(|m| self.node_map.get(*m))
            .flat_map(|&ix| self.closure_indices(ix))
            .collect();
        let middles = {
            let mut hider = ImportHider::new(self);
            let mut hidden = direct;
            for &member in &excluded_members {
                hidden.extend(hider.edges_touching(member));
            }
            hider.hide(&hidden);

            let mut middles = Vec::new();
            while let Some(chain) = shortest_path(hider.graph(), &heads, &tail_set) {
                if chain.len() < 3 {
                    break;
                }
                let middle = chain[1..chain.len() - 1].to_vec();
                let (first, last) = (middle[0], middle[middle.len() - 1]);
                let popped: Vec<(NodeIndex, NodeIndex)> = heads
                    .iter()
                    .map(|&head| (head, first))
                    .chain(middle.windows(2).map(|hop| (hop[0], hop[1])))
                    .chain(tails.iter().map(|&tail| (last, tail)))
                    .collect();
                hider.hide(&popped);
                middles.push(middle);
            }
            middles
        };

        for middle in middles {
            let (Some(&first), Some(&last)) = (middle.first(), middle.last()) else {
                continue;
            };
            let route_heads = self
                .graph
                .neighbors_directed(first, Direction::Incoming)
                .filter(|n| heads.contains(n))
                .map(|n| self.module_at(n).clone())
                .collect();
            let route_tails = self
                .graph
                .neighbors_directed(last, Direction::Outgoing)
                .filter(|n| tail_set.contains(n))
                .map(|n| self.module_at(n).clone())
                .collect();
            routes.insert(Route {
                heads: route_heads,
                middle: self.chain_modules(&middle),
                tails: route_tails,
            });
        }

        debug!(
            %importer,
            %imported,
            routes = routes.len(),
            duration_ms = start.elapsed().as_millis(),
            "Found illegal routes"
        );
        if routes.is_empty() {
            return Ok(None);
        }
        Ok(Some(PackageDependency {
            importer: importer.clone(),
            imported: imported.clone(),
            routes,
        }))
    }
}

fn resolve_levels(layers: &[Layer], container: Option<&Module>) -> Result<Vec<Level>> {
    layers
        .iter()
        .map(|layer| {
            let modules = layer
                .module_tails
                .iter()
                .map(|tail| match container {
                    Some(container) => Module::new(format!("{container}.{tail}")),
                    None => Module::new(tail.as_str()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Level {
                modules,
                independent: layer.independent,
                closed: layer.closed,
            })
        })
        .collect()
}

/// Every (importer, imported) pair of layer modules whose imports are illegal.
fn layer_permutations(levels: &[Level]) -> Vec<(&Module, &Module)> {
    let mut pairs = Vec::new();
    for (index, higher) in levels.iter().enumerate() {
        for higher_module in &higher.modules {
            if higher.independent {
                for sibling in higher.modules.iter().filter(|s| *s != higher_module) {
                    pairs.push((sibling, higher_module));
                }
            }
            for (offset, lower) in levels[index + 1..].iter().enumerate() {
                let bypasses_closed = levels[index + 1..index + 1 + offset]
                    .iter()
                    .any(|between| between.closed);
                for lower_module in &lower.modules {
                    pairs.push((lower_module, higher_module));
                    if bypasses_closed {
                        pairs.push((higher_module, lower_module));
                    }
                }
            }
        }
    }
    pairs
}
