//! The import graph: modules, directed import edges, and per-edge detail records.
//!
//! ## Representation
//!
//! Nodes live in a petgraph `StableDiGraph` with edges directed from
//! **importer to imported**. Node indices survive removals, so a side map from
//! [`Module`] to `NodeIndex` gives O(1) lookup by name, and every edge carries
//! an ordered list of [`DirectImport`] records keyed by its endpoint pair.
//!
//! Hierarchy is not stored. Children, descendants and package closures are
//! computed from the dotted names of the known nodes.
//!
//! ## Operations
//!
//! | Operation | Notes |
//! |-----------|-------|
//! | [`ImportGraph::add_module`] | Idempotent; squash flag conflicts are errors |
//! | [`ImportGraph::add_import`] | Creates endpoints, appends a detail record |
//! | [`ImportGraph::remove_module`] | Drops the node, its edges and their details |
//! | [`ImportGraph::squash_module`] | Contracts descendants into the module |
//! | [`ImportGraph::find_downstream_modules`] | Reverse BFS |
//! | [`ImportGraph::find_upstream_modules`] | Forward BFS |
//! | [`ImportGraph::find_shortest_chain`] | BFS, lexical tie-breaking |
//! | [`ImportGraph::find_shortest_chains`] | Per-pair layered BFS over a hidden view |
//! | [`ImportGraph::chain_exists`] | Multi-source BFS |
//! | [`ImportGraph::find_illegal_dependencies_for_layers`] | Repeated BFS, popping each chain |
//! | [`ImportGraph::nominate_cycle_breakers`] | Greedy weighted feedback arc set |
//! | [`ImportGraph::find_matching_modules`] | Wildcard name expressions |
//!
//! ## Concurrency
//!
//! Read-only queries take `&self`. [`ImportGraph::find_shortest_chains`] and
//! [`ImportGraph::find_illegal_dependencies_for_layers`] temporarily hide
//! edges and therefore take `&mut self`; the borrow checker rules out
//! concurrent queries on the same instance for their duration.

mod cycles;
mod expressions;
mod hidden;
mod layers;
mod pathfinding;
mod queries;

pub use expressions::ModuleExpression;
pub use layers::{Layer, PackageDependency, Route};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::error::{Error, Result};
use crate::module::{DirectImport, Module, is_descendant_name};

/// Number of module names shown by the `Display` impl before truncating.
const DISPLAY_LIMIT: usize = 5;

/// Directed edge between two nodes, importer first.
pub(crate) type EdgeKey = (NodeIndex, NodeIndex);

/// Node payload: the module and whether it stands in for a collapsed subtree.
#[derive(Debug, Clone)]
pub(crate) struct ModuleNode {
    pub(crate) module: Module,
    pub(crate) is_squashed: bool,
}

/// A directed graph of module-level imports.
#[derive(Debug, Clone, Default)]
pub struct ImportGraph {
    /// Edge direction: importer -> imported.
    graph: StableDiGraph<ModuleNode, ()>,

    /// Every node in `graph` has exactly one entry here.
    node_map: HashMap<Module, NodeIndex>,

    /// Detail records per edge, in insertion order. Entries survive while an
    /// edge is temporarily hidden.
    details: HashMap<EdgeKey, Vec<DirectImport>>,
}

impl ImportGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- Mutation --

    /// Add a module to the graph.
    ///
    /// Re-adding an existing module with the same flag is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidModuleName`] if `name` is not a valid dotted name
    /// - [`Error::DescendantOfSquashedModule`] if an ancestor is squashed
    /// - [`Error::SquashConflict`] if the module exists with the other flag
    /// - [`Error::SquashedModuleWithDescendants`] when squashing a module whose
    ///   descendants are already known
    pub fn add_module(&mut self, name: &str, is_squashed: bool) -> Result<()> {
        let module = Module::new(name)?;
        self.insert_module(module, is_squashed).map(|_| ())
    }

    /// Record an import between two modules without source location.
    ///
    /// # Errors
    ///
    /// See [`ImportGraph::add_direct_import`].
    pub fn add_import(&mut self, importer: &str, imported: &str) -> Result<()> {
        self.add_direct_import(DirectImport {
            importer: Module::new(importer)?,
            imported: Module::new(imported)?,
            line_number: None,
            line_contents: None,
        })
    }

    /// Record an import between two modules at a given source line.
    ///
    /// # Errors
    ///
    /// See [`ImportGraph::add_direct_import`].
    pub fn add_import_at(
        &mut self,
        importer: &str,
        imported: &str,
        line_number: u32,
        line_contents: &str,
    ) -> Result<()> {
        self.add_direct_import(DirectImport::new(
            Module::new(importer)?,
            Module::new(imported)?,
            line_number,
            line_contents,
        ))
    }

    /// Record one import occurrence.
    ///
    /// Missing endpoints are created as unsquashed modules. The edge is created
    /// if needed and the record is appended to its detail list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DescendantOfSquashedModule`] if a missing endpoint would
    /// sit beneath a squashed module.
    pub fn add_direct_import(&mut self, import: DirectImport) -> Result<()> {
        let from = self.ensure_module(&import.importer)?;
        let to = self.ensure_module(&import.imported)?;
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
        self.details.entry((from, to)).or_default().push(import);
        Ok(())
    }

    fn ensure_module(&mut self, module: &Module) -> Result<NodeIndex> {
        match self.node_map.get(module) {
            Some(&ix) => Ok(ix),
            None => self.insert_module(module.clone(), false),
        }
    }

    fn insert_module(&mut self, module: Module, is_squashed: bool) -> Result<NodeIndex> {
        if let Some(squashed) = self.squashed_ancestor(&module) {
            return Err(Error::DescendantOfSquashedModule {
                module: module.to_string(),
                squashed: squashed.to_string(),
            });
        }

        if let Some(&ix) = self.node_map.get(&module) {
            if self.graph[ix].is_squashed != is_squashed {
                return Err(Error::SquashConflict(module.to_string()));
            }
            return Ok(ix);
        }

        if is_squashed && self.descendant_indices(module.as_str()).next().is_some() {
            return Err(Error::SquashedModuleWithDescendants(module.to_string()));
        }

        let ix = self.graph.add_node(ModuleNode {
            module: module.clone(),
            is_squashed,
        });
        self.node_map.insert(module, ix);
        Ok(ix)
    }

    fn squashed_ancestor(&self, module: &Module) -> Option<&Module> {
        let mut current = module.parent();
        while let Some(ancestor) = current {
            if let Some(&ix) = self.node_map.get(&ancestor) {
                if self.graph[ix].is_squashed {
                    return Some(&self.graph[ix].module);
                }
            }
            current = ancestor.parent();
        }
        None
    }

    /// Remove a module along with every import into or out of it.
    ///
    /// Unknown modules are ignored. Descendants stay in the graph.
    pub fn remove_module(&mut self, name: &str) {
        if let Some(&ix) = self.node_map.get(name) {
            self.remove_node_at(ix);
        }
    }

    /// Remove the import `importer -> imported` and all of its detail
    /// records. Both modules stay in the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if either module is unknown.
    pub fn remove_import(&mut self, importer: &str, imported: &str) -> Result<()> {
        let from = self.index_of(importer)?;
        let to = self.index_of(imported)?;
        if let Some(edge) = self.graph.find_edge(from, to) {
            self.graph.remove_edge(edge);
        }
        self.details.remove(&(from, to));
        Ok(())
    }

    /// Collapse a module's descendants into the module itself.
    ///
    /// Imports into or out of a descendant become imports of the module;
    /// imports within the subtree disappear. Detail records of the module's
    /// own imports are kept, those of contracted imports are dropped. Squashing
    /// a squashed module does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if the module is unknown.
    pub fn squash_module(&mut self, name: &str) -> Result<()> {
        let ix = self.index_of(name)?;
        if self.graph[ix].is_squashed {
            return Ok(());
        }

        let descendants: Vec<NodeIndex> = self.descendant_indices(name).collect();
        let members: HashSet<NodeIndex> = descendants.iter().copied().chain([ix]).collect();
        let contract = |node: NodeIndex| if members.contains(&node) { ix } else { node };

        let mut contracted = Vec::new();
        for &descendant in &descendants {
            for (from, to) in self.edges_touching(descendant) {
                let (from, to) = (contract(from), contract(to));
                if from != to {
                    contracted.push((from, to));
                }
            }
        }
        for (from, to) in contracted {
            if self.graph.find_edge(from, to).is_none() {
                self.graph.add_edge(from, to, ());
            }
        }

        for descendant in descendants {
            self.remove_node_at(descendant);
        }
        self.graph[ix].is_squashed = true;
        Ok(())
    }

    fn remove_node_at(&mut self, ix: NodeIndex) {
        for key in self.edges_touching(ix) {
            self.details.remove(&key);
        }
        if let Some(node) = self.graph.remove_node(ix) {
            self.node_map.remove(&node.module);
        }
    }

    // -- Nodes and hierarchy --

    /// All known modules, sorted.
    #[must_use]
    pub fn modules(&self) -> BTreeSet<Module> {
        self.node_map.keys().cloned().collect()
    }

    /// Number of known modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.node_map.len()
    }

    /// True if `name` is a node in the graph.
    #[must_use]
    pub fn contains_module(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    /// Whether a module stands in for a collapsed subtree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if the module is unknown.
    pub fn is_module_squashed(&self, name: &str) -> Result<bool> {
        let ix = self.index_of(name)?;
        Ok(self.graph[ix].is_squashed)
    }

    /// Known modules exactly one level beneath `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotPresent`] if the module is unknown
    /// - [`Error::SquashedModuleHasNoChildren`] if the module is squashed
    pub fn find_children(&self, name: &str) -> Result<BTreeSet<Module>> {
        let ix = self.index_of(name)?;
        if self.graph[ix].is_squashed {
            return Err(Error::SquashedModuleHasNoChildren(name.to_string()));
        }
        let depth = self.graph[ix].module.depth() + 1;
        Ok(self
            .descendant_indices(name)
            .map(|d| &self.graph[d].module)
            .filter(|m| m.depth() == depth)
            .cloned()
            .collect())
    }

    /// Known modules anywhere beneath `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotPresent`] if the module is unknown
    /// - [`Error::SquashedModuleHasNoDescendants`] if the module is squashed
    pub fn find_descendants(&self, name: &str) -> Result<BTreeSet<Module>> {
        let ix = self.index_of(name)?;
        if self.graph[ix].is_squashed {
            return Err(Error::SquashedModuleHasNoDescendants(name.to_string()));
        }
        Ok(self.modules_at(self.descendant_indices(name)))
    }

    /// The module plus every known descendant. A squashed module is its own
    /// closure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if the module is unknown.
    pub fn package_closure(&self, name: &str) -> Result<BTreeSet<Module>> {
        let ix = self.index_of(name)?;
        Ok(self.modules_at(self.closure_indices(ix)))
    }

    // -- Direct imports --

    /// Modules that `name` imports directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if the module is unknown.
    pub fn find_modules_directly_imported_by(&self, name: &str) -> Result<BTreeSet<Module>> {
        let ix = self.index_of(name)?;
        Ok(self.modules_at(self.graph.neighbors_directed(ix, Direction::Outgoing)))
    }

    /// Modules that import `name` directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if the module is unknown.
    pub fn find_modules_that_directly_import(&self, name: &str) -> Result<BTreeSet<Module>> {
        let ix = self.index_of(name)?;
        Ok(self.modules_at(self.graph.neighbors_directed(ix, Direction::Incoming)))
    }

    /// All detail records for the exact edge `importer -> imported`, in the
    /// order they were added. Empty if there is no such edge.
    #[must_use]
    pub fn get_import_details(&self, importer: &str, imported: &str) -> Vec<DirectImport> {
        let (Some(&from), Some(&to)) = (self.node_map.get(importer), self.node_map.get(imported))
        else {
            return Vec::new();
        };
        if self.graph.find_edge(from, to).is_none() {
            return Vec::new();
        }
        self.details.get(&(from, to)).cloned().unwrap_or_default()
    }

    /// Whether `importer` imports `imported` directly.
    ///
    /// With `as_packages`, any import from the importer's closure into the
    /// imported's closure counts.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotPresent`] if either module is unknown
    /// - [`Error::SharedDescendants`] if `as_packages` and one module contains the other
    pub fn direct_import_exists(
        &self,
        importer: &str,
        imported: &str,
        as_packages: bool,
    ) -> Result<bool> {
        let from = self.index_of(importer)?;
        let to = self.index_of(imported)?;
        if !as_packages {
            return Ok(self.graph.find_edge(from, to).is_some());
        }
        self.ensure_disjoint(from, to)?;

        let targets = self.closure_indices(to);
        Ok(self.closure_indices(from).into_iter().any(|source| {
            self.graph
                .neighbors_directed(source, Direction::Outgoing)
                .any(|n| targets.contains(&n))
        }))
    }

    /// Number of distinct `(importer, imported)` pairs with at least one record.
    #[must_use]
    pub fn count_imports(&self) -> usize {
        self.graph.edge_count()
    }

    // -- Internal helpers --

    pub(crate) fn index_of(&self, name: &str) -> Result<NodeIndex> {
        self.node_map
            .get(name)
            .copied()
            .ok_or_else(|| Error::module_not_present(name))
    }

    pub(crate) fn module_at(&self, ix: NodeIndex) -> &Module {
        &self.graph[ix].module
    }

    fn modules_at(&self, indices: impl IntoIterator<Item = NodeIndex>) -> BTreeSet<Module> {
        indices
            .into_iter()
            .map(|ix| self.graph[ix].module.clone())
            .collect()
    }

    fn descendant_indices<'a>(&'a self, name: &'a str) -> impl Iterator<Item = NodeIndex> + 'a {
        self.node_map
            .iter()
            .filter(move |(module, _)| is_descendant_name(module.as_str(), name))
            .map(|(_, &ix)| ix)
    }

    /// Indices of the module and its descendants, sorted by module name.
    pub(crate) fn closure_indices(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let node = &self.graph[ix];
        let mut indices = vec![ix];
        if !node.is_squashed {
            indices.extend(self.descendant_indices(node.module.as_str()));
        }
        indices.sort_by(|a, b| self.graph[*a].module.cmp(&self.graph[*b].module));
        indices
    }

    /// Edges into or out of `node`, as currently visible.
    pub(crate) fn edges_touching(&self, node: NodeIndex) -> Vec<EdgeKey> {
        self.graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|from| (from, node))
            .chain(
                self.graph
                    .neighbors_directed(node, Direction::Outgoing)
                    .map(|to| (node, to)),
            )
            .collect()
    }

    /// Error unless the two modules are unrelated by containment.
    pub(crate) fn ensure_disjoint(&self, importer: NodeIndex, imported: NodeIndex) -> Result<()> {
        let a = &self.graph[importer].module;
        let b = &self.graph[imported].module;
        if a.overlaps(b) {
            return Err(Error::shared_descendants(a.as_str(), b.as_str()));
        }
        Ok(())
    }
}

impl fmt::Display for ImportGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node_map.is_empty() {
            return f.write_str("<ImportGraph: empty>");
        }
        let mut names: Vec<&str> = self.node_map.keys().map(Module::as_str).collect();
        names.sort_unstable();
        let shown: Vec<String> = names
            .iter()
            .take(DISPLAY_LIMIT)
            .map(|name| format!("'{name}'"))
            .collect();
        write!(f, "<ImportGraph: {}", shown.join(", "))?;
        if names.len() > DISPLAY_LIMIT {
            f.write_str(", ...")?;
        }
        f.write_str(">")
    }
}
