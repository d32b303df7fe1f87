//! Reachability and chain queries over an [`ImportGraph`].
//!
//! Every query leaves `count_imports()` and every `get_import_details()`
//! result exactly as it found them.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;

use super::hidden::ImportHider;
use super::pathfinding::{all_shortest_paths, reachable, shortest_path};
use super::{EdgeKey, ImportGraph};
use crate::error::{Error, Result};
use crate::module::Module;

impl ImportGraph {
    /// Modules that transitively import `module`.
    ///
    /// With `as_package`, the module's whole closure is the target and its
    /// members are excluded from the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if the module is unknown.
    pub fn find_downstream_modules(
        &self,
        module: &str,
        as_package: bool,
    ) -> Result<BTreeSet<Module>> {
        self.reachable_modules(module, as_package, Direction::Incoming)
    }

    /// Modules that `module` transitively imports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotPresent`] if the module is unknown.
    pub fn find_upstream_modules(
        &self,
        module: &str,
        as_package: bool,
    ) -> Result<BTreeSet<Module>> {
        self.reachable_modules(module, as_package, Direction::Outgoing)
    }

    fn reachable_modules(
        &self,
        module: &str,
        as_package: bool,
        direction: Direction,
    ) -> Result<BTreeSet<Module>> {
        let ix = self.index_of(module)?;
        let seeds = self.seeds(ix, as_package);
        Ok(reachable(self, &seeds, direction)
            .into_iter()
            .map(|n| self.module_at(n).clone())
            .collect())
    }

    fn seeds(&self, ix: NodeIndex, as_package: bool) -> Vec<NodeIndex> {
        if as_package {
            self.closure_indices(ix)
        } else {
            vec![ix]
        }
    }

    /// Whether `imported` is reachable from `importer` by one or more imports.
    ///
    /// With `as_packages`, any module in the importer's closure may start the
    /// chain and any module in the imported's closure may end it.
    ///
    /// Without `as_packages`, containment is not special: a package that
    /// really imports its own submodule, directly or through other modules,
    /// has a chain to it, so the answer is `true` rather than always `false`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotPresent`] if either module is unknown
    /// - [`Error::SharedDescendants`] if `as_packages` and one module contains the other
    pub fn chain_exists(&self, importer: &str, imported: &str, as_packages: bool) -> Result<bool> {
        Ok(self
            .find_shortest_chain(importer, imported, as_packages)?
            .is_some())
    }

    fn any_chain(&self, sources: &[NodeIndex], targets: &[NodeIndex]) -> bool {
        let targets: HashSet<NodeIndex> = targets.iter().copied().collect();
        shortest_path(self, sources, &targets).is_some()
    }

    /// One shortest chain from `importer` to `imported`, endpoints included.
    ///
    /// With `as_packages`, the chain may start anywhere in the importer's
    /// closure and end anywhere in the imported's closure, and never passes
    /// back through a module of the importer's closure.
    ///
    /// When several chains share the minimal length, the one whose modules sort
    /// first at each hop wins. Returns `None` if no chain exists. A module only
    /// reaches itself through a cycle.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotPresent`] naming whichever endpoint is unknown
    /// - [`Error::SharedDescendants`] if `as_packages` and one module contains the other
    pub fn find_shortest_chain(
        &self,
        importer: &str,
        imported: &str,
        as_packages: bool,
    ) -> Result<Option<Vec<Module>>> {
        let from = self.index_of(importer)?;
        let to = self.index_of(imported)?;
        if as_packages {
            self.ensure_disjoint(from, to)?;
        }
        let targets: HashSet<NodeIndex> = self.seeds(to, as_packages).into_iter().collect();
        Ok(shortest_path(self, &self.seeds(from, as_packages), &targets)
            .map(|path| self.chain_modules(&path)))
    }

    pub(crate) fn chain_modules(&self, path: &[NodeIndex]) -> Vec<Module> {
        path.iter().map(|n| self.module_at(*n).clone()).collect()
    }

    /// Every shortest chain for each pair of (importer member, imported member).
    ///
    /// Members are taken from each argument's package closure when
    /// `as_packages` is set. Each chain runs from a module in the importer's
    /// closure to a module in the imported's closure and passes through no
    /// other member of either closure, so a short route that re-enters a
    /// package never hides a longer legitimate one. When several distinct
    /// chains link the same pair at that pair's minimal length, all of them
    /// are returned.
    ///
    /// Edges are hidden for the duration of the search and restored before
    /// returning, which is why this takes `&mut self`.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotPresent`] if either module is unknown
    /// - [`Error::SharedDescendants`] if the arguments are the same module, or
    ///   with `as_packages` if one contains the other
    pub fn find_shortest_chains(
        &mut self,
        importer: &str,
        imported: &str,
        as_packages: bool,
    ) -> Result<BTreeSet<Vec<Module>>> {
        let from = self.index_of(importer)?;
        let to = self.index_of(imported)?;
        if as_packages {
            self.ensure_disjoint(from, to)?;
        } else if from == to {
            return Err(Error::shared_descendants(importer, imported));
        }

        let downstream = self.seeds(from, as_packages);
        let upstream = self.seeds(to, as_packages);
        let mut chains = BTreeSet::new();
        if !self.any_chain(&downstream, &upstream) {
            return Ok(chains);
        }

        let mut hider = ImportHider::new(self);
        let internal: Vec<EdgeKey> = hider
            .edges_within(&downstream)
            .into_iter()
            .chain(hider.edges_within(&upstream))
            .collect();
        hider.hide(&internal);

        let touching: HashMap<NodeIndex, Vec<EdgeKey>> = downstream
            .iter()
            .chain(&upstream)
            .map(|&member| (member, hider.edges_touching(member)))
            .collect();
        for edges in touching.values() {
            hider.hide(edges);
        }

        for target in &upstream {
            hider.reveal(&touching[target]);
            for source in &downstream {
                hider.reveal(&touching[source]);
                for path in all_shortest_paths(hider.graph(), *source, *target) {
                    chains.insert(hider.graph().chain_modules(&path));
                }
                hider.hide(&touching[source]);
            }
            hider.hide(&touching[target]);
        }

        Ok(chains)
    }

    /// Enumerating every simple chain is no longer supported.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Unsupported`].
    pub fn find_all_simple_chains(
        &self,
        _importer: &str,
        _imported: &str,
    ) -> Result<BTreeSet<Vec<Module>>> {
        Err(Error::Unsupported {
            operation: "find_all_simple_chains",
            replacement: "find_shortest_chains",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn build(edges: &[(&str, &str)]) -> ImportGraph {
        let mut graph = ImportGraph::new();
        for (importer, imported) in edges {
            graph.add_import(importer, imported).expect("add import");
        }
        graph
    }

    fn names(modules: &BTreeSet<Module>) -> Vec<&str> {
        modules.iter().map(Module::as_str).collect()
    }

    fn chain(names: &[&str]) -> Vec<Module> {
        names
            .iter()
            .map(|n| Module::new(*n).expect("valid name"))
            .collect()
    }

    // -- Downstream / upstream --

    /// ```text
    /// b -> a, c -> a, d -> c, e -> d, b -> f, g -> f, d -> bar (squashed)
    /// ```
    fn downstream_fixture() -> ImportGraph {
        let mut graph = build(&[
            ("b", "a"),
            ("c", "a"),
            ("d", "c"),
            ("e", "d"),
            ("b", "f"),
            ("g", "f"),
        ]);
        graph.add_module("bar", true).expect("squashed");
        graph.add_import("d", "bar").expect("add import");
        graph
    }

    #[test]
    fn downstream_of_module() {
        let graph = downstream_fixture();
        let result = graph.find_downstream_modules("a", false).expect("present");
        assert_eq!(names(&result), vec!["b", "c", "d", "e"]);
    }

    #[test]
    fn downstream_of_squashed_module() {
        let graph = downstream_fixture();
        let result = graph.find_downstream_modules("bar", true).expect("present");
        assert_eq!(names(&result), vec!["d", "e"]);
    }

    #[test]
    fn downstream_of_package_excludes_members() {
        // a.d and a.f belong to a; b.e and b.g sit elsewhere.
        let mut graph = build(&[
            ("b", "a"),
            ("c", "a.d"),
            ("a.f", "a"),
            ("b.e", "a.f"),
            ("b.g", "b.e"),
            ("a.d", "b.x"),
        ]);
        graph.add_module("a", false).expect("add");
        let result = graph.find_downstream_modules("a", true).expect("present");
        assert_eq!(names(&result), vec!["b", "b.e", "b.g", "c"]);
        assert!(!result.iter().any(|m| m.as_str() == "a" || m.as_str().starts_with("a.")));
    }

    #[test]
    fn upstream_of_module() {
        let graph = downstream_fixture();
        let result = graph.find_upstream_modules("d", false).expect("present");
        assert_eq!(names(&result), vec!["a", "bar", "c"]);
    }

    #[test]
    fn upstream_through_package_members() {
        let mut graph = build(&[("x", "p.one"), ("p.two", "y"), ("y", "z")]);
        graph.add_module("p", false).expect("add");
        assert_eq!(
            names(&graph.find_upstream_modules("p", true).expect("present")),
            vec!["y", "z"]
        );
        assert!(graph.find_upstream_modules("p", false).expect("present").is_empty());
    }

    #[test]
    fn reachability_unknown_module() {
        let graph = downstream_fixture();
        assert!(matches!(
            graph.find_downstream_modules("nope", false),
            Err(Error::ModuleNotPresent(name)) if name == "nope"
        ));
        assert!(graph.find_upstream_modules("nope", true).is_err());
    }

    // -- Shortest chain --

    #[test]
    fn shortest_chain_with_cycles() {
        let graph = build(&[
            ("a", "b"),
            ("b", "a"),
            ("b", "c"),
            ("c", "d"),
            ("d", "b"),
            ("d", "e"),
            ("e", "d"),
        ]);
        let result = graph.find_shortest_chain("a", "e", false).expect("present");
        assert_eq!(result, Some(chain(&["a", "b", "c", "d", "e"])));
    }

    #[test]
    fn shortest_chain_prefers_fewer_hops() {
        let graph = build(&[
            ("blue", "green"),
            ("green", "yellow"),
            ("yellow", "purple"),
            ("blue", "orange"),
            ("orange", "purple"),
            ("purple", "red"),
        ]);
        let result = graph.find_shortest_chain("blue", "red", false).expect("present");
        assert_eq!(result, Some(chain(&["blue", "orange", "purple", "red"])));
    }

    #[test]
    fn shortest_chain_none_when_unreachable() {
        let graph = build(&[("a", "b"), ("c", "d")]);
        assert_eq!(graph.find_shortest_chain("a", "d", false).expect("present"), None);
        assert_eq!(graph.find_shortest_chain("b", "a", false).expect("present"), None);
    }

    #[rstest]
    #[case("nope", "b", "nope")]
    #[case("a", "nope", "nope")]
    fn shortest_chain_names_missing_endpoint(
        #[case] importer: &str,
        #[case] imported: &str,
        #[case] missing: &str,
    ) {
        let graph = build(&[("a", "b")]);
        let err = graph.find_shortest_chain(importer, imported, false).unwrap_err();
        assert!(matches!(err, Error::ModuleNotPresent(ref name) if name == missing));
    }

    #[test]
    fn shortest_chain_between_packages() {
        let mut graph = build(&[
            ("green.a", "green.b"),
            ("green.b", "mid"),
            ("mid", "blue.c"),
            ("green.a", "far"),
            ("far", "farther"),
            ("farther", "blue.d"),
        ]);
        graph.add_module("green", false).expect("add");
        graph.add_module("blue", false).expect("add");

        assert_eq!(
            graph.find_shortest_chain("green", "blue", true).expect("valid"),
            Some(chain(&["green.b", "mid", "blue.c"]))
        );
        assert_eq!(graph.find_shortest_chain("green", "blue", false).expect("valid"), None);
        assert_eq!(graph.find_shortest_chain("blue", "green", true).expect("valid"), None);
        assert!(matches!(
            graph.find_shortest_chain("green", "green.a", true),
            Err(Error::SharedDescendants { .. })
        ));
    }

    // -- Chain existence --

    fn chain_fixture() -> ImportGraph {
        let mut graph = build(&[
            ("mypackage.green.high", "mypackage.blue.low"),
            ("mypackage.blue.low", "mypackage.yellow"),
            ("mypackage.yellow", "mypackage.red.alpha"),
            ("mypackage.blue", "mypackage.blue.low"),
        ]);
        for package in ["mypackage", "mypackage.green", "mypackage.red"] {
            graph.add_module(package, false).expect("add");
        }
        graph
    }

    #[rstest]
    #[case("mypackage.green.high", "mypackage.red.alpha", false, true)]
    #[case("mypackage.red.alpha", "mypackage.green.high", false, false)]
    #[case("mypackage.green", "mypackage.red", false, false)]
    #[case("mypackage.green", "mypackage.red", true, true)]
    #[case("mypackage.red", "mypackage.green", true, false)]
    #[case("mypackage.green", "mypackage.yellow", true, true)]
    #[case("mypackage.blue", "mypackage.blue.low", false, true)]
    #[case("mypackage.green", "mypackage.green.high", false, false)]
    fn chain_exists_table(
        #[case] importer: &str,
        #[case] imported: &str,
        #[case] as_packages: bool,
        #[case] expected: bool,
    ) {
        let graph = chain_fixture();
        assert_eq!(
            graph
                .chain_exists(importer, imported, as_packages)
                .expect("valid query"),
            expected
        );
    }

    #[rstest]
    #[case("mypackage.green", "mypackage.green.high")]
    #[case("mypackage.green.high", "mypackage.green")]
    #[case("mypackage.green", "mypackage.green")]
    fn chain_exists_containment_fails_as_packages(#[case] importer: &str, #[case] imported: &str) {
        let graph = chain_fixture();
        assert!(matches!(
            graph.chain_exists(importer, imported, true),
            Err(Error::SharedDescendants { .. })
        ));
    }

    // -- Shortest chains --

    #[test]
    fn shortest_chains_keeps_longer_independent_chain() {
        let mut graph = build(&[
            ("green.foo", "blue.foo"),
            ("green.baz", "yellow.three"),
            ("yellow.three", "yellow.two"),
            ("yellow.two", "yellow.one"),
            ("yellow.one", "blue.bar"),
        ]);
        graph.add_module("green", false).expect("add");
        graph.add_module("blue", false).expect("add");

        let result = graph
            .find_shortest_chains("green", "blue", true)
            .expect("valid query");
        let expected: BTreeSet<_> = [
            chain(&["green.foo", "blue.foo"]),
            chain(&[
                "green.baz",
                "yellow.three",
                "yellow.two",
                "yellow.one",
                "blue.bar",
            ]),
        ]
        .into_iter()
        .collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn shortest_chains_keeps_every_route_of_minimal_length() {
        let mut graph = build(&[
            ("green.a", "x"),
            ("x", "blue.a"),
            ("green.a", "y"),
            ("y", "blue.a"),
            ("green.a", "z"),
            ("z", "w"),
            ("w", "blue.a"),
        ]);
        graph.add_module("green", false).expect("add");
        graph.add_module("blue", false).expect("add");

        let result = graph
            .find_shortest_chains("green", "blue", true)
            .expect("valid query");
        let expected: BTreeSet<_> = [
            chain(&["green.a", "x", "blue.a"]),
            chain(&["green.a", "y", "blue.a"]),
        ]
        .into_iter()
        .collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn shortest_chains_keeps_routes_sharing_an_import() {
        let mut graph = build(&[
            ("a", "x"),
            ("a", "y"),
            ("x", "m"),
            ("y", "m"),
            ("m", "b"),
        ]);
        let before = graph.count_imports();

        let result = graph.find_shortest_chains("a", "b", false).expect("valid");
        let expected: BTreeSet<_> = [chain(&["a", "x", "m", "b"]), chain(&["a", "y", "m", "b"])]
            .into_iter()
            .collect();
        assert_eq!(result, expected);
        assert_eq!(graph.count_imports(), before);
    }

    #[test]
    fn shortest_chains_ignores_routes_reentering_importer() {
        // green.a -> x -> green.b -> blue would be a shortcut through the
        // importer's own package.
        let mut graph = build(&[
            ("green.a", "x"),
            ("x", "green.b"),
            ("green.b", "blue"),
        ]);
        graph.add_module("green", false).expect("add");

        let result = graph
            .find_shortest_chains("green", "blue", true)
            .expect("valid query");
        let expected: BTreeSet<_> = [chain(&["green.b", "blue"])].into_iter().collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn shortest_chains_ignores_routes_reentering_imported() {
        let mut graph = build(&[
            ("green", "blue.a"),
            ("blue.a", "x"),
            ("x", "blue.b"),
        ]);
        graph.add_module("blue", false).expect("add");

        let result = graph
            .find_shortest_chains("green", "blue", true)
            .expect("valid query");
        let expected: BTreeSet<_> = [chain(&["green", "blue.a"])].into_iter().collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn shortest_chains_empty_without_chain() {
        let mut graph = build(&[("blue", "green")]);
        assert!(
            graph
                .find_shortest_chains("green", "blue", true)
                .expect("valid query")
                .is_empty()
        );
    }

    #[test]
    fn shortest_chains_restores_graph() {
        let mut graph = build(&[
            ("green.a", "green.b"),
            ("green.b", "blue.a"),
            ("green.a", "mid"),
            ("mid", "blue.b"),
            ("blue.a", "blue.b"),
        ]);
        graph
            .add_import_at("green.b", "blue.a", 4, "from blue import a")
            .expect("add");
        graph.add_module("green", false).expect("add");
        graph.add_module("blue", false).expect("add");
        let count = graph.count_imports();
        let details = graph.get_import_details("green.b", "blue.a");

        graph
            .find_shortest_chains("green", "blue", true)
            .expect("valid query");

        assert_eq!(graph.count_imports(), count);
        assert_eq!(graph.get_import_details("green.b", "blue.a"), details);
        assert!(graph.chain_exists("green.a", "green.b", false).expect("valid"));
    }

    #[test]
    fn shortest_chains_shared_descendants() {
        let mut graph = build(&[("a.b", "c")]);
        graph.add_module("a", false).expect("add");
        assert!(matches!(
            graph.find_shortest_chains("a", "a.b", true),
            Err(Error::SharedDescendants { .. })
        ));
    }

    #[test]
    fn shortest_chains_exact_modules() {
        let mut graph = build(&[("a", "b"), ("b", "c"), ("a.x", "c")]);
        let result = graph.find_shortest_chains("a", "c", false).expect("valid");
        let expected: BTreeSet<_> = [chain(&["a", "b", "c"])].into_iter().collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn all_simple_chains_is_unsupported() {
        let graph = build(&[("a", "b")]);
        let err = graph.find_all_simple_chains("a", "b").unwrap_err();
        assert!(err.to_string().contains("find_shortest_chains"));
    }
}
