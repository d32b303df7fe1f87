//! # Layergraph: Import Graphs for Layered Python Codebases
//!
//! Layergraph scans one or more Python packages with tree-sitter, builds a
//! directed graph of which module imports which, and answers the questions
//! architecture checks ask of it: what depends on this module, is there an
//! import chain between these two packages, what are the shortest such chains,
//! and which imports break a layered architecture.
//!
//! ## Design Philosophy
//!
//! - **Graph first** - the [`ImportGraph`] is usable on its own, built by hand
//!   or by the scan pipeline
//! - **Packages as units** - most queries can treat a module and all of its
//!   descendants as one node
//! - **Incremental** - per-file scan results are cached by modification time
//! - **Deterministic** - equal inputs build equal graphs and yield equal answers
//!
//! ## Quick Start
//!
//! ```no_run
//! use layergraph::{BuildOptions, build_graph};
//!
//! let options = BuildOptions::new()
//!     .search_path("src")
//!     .include_external_packages(true);
//! let mut graph = build_graph(&["mypackage"], &options)?;
//!
//! // Does the domain layer reach into the web layer?
//! if graph.chain_exists("mypackage.domain", "mypackage.web", true)? {
//!     let chains = graph.find_shortest_chains("mypackage.domain", "mypackage.web", true)?;
//!     for chain in chains {
//!         println!("{}", chain.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(" -> "));
//!     }
//! }
//! # Ok::<(), layergraph::Error>(())
//! ```
//!
//! ## Concurrency
//!
//! Queries take `&self` except [`ImportGraph::find_shortest_chains`] and
//! [`ImportGraph::find_illegal_dependencies_for_layers`], which temporarily
//! hide edges and so need `&mut self`. Share a graph across threads behind a
//! lock, or clone it.

mod cache;
pub mod config;
mod error;
mod finder;
mod graph;
mod module;
mod pipeline;
mod scanner;

pub use cache::{Cache, DEFAULT_CACHE_DIR};
pub use config::{BuildOptions, CacheSetting};
pub use error::{Error, Result};
pub use finder::{FoundPackage, FsModuleFinder, ModuleFile, ModuleFinder};
pub use graph::{ImportGraph, Layer, ModuleExpression, PackageDependency, Route};
pub use module::{DirectImport, Module};
pub use pipeline::{build_graph, build_graph_with};
pub use scanner::{ImportScanner, PythonImportScanner, ScanContext, read_source};
