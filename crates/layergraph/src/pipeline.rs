//! Building an [`ImportGraph`] from packages on disk.
//!
//! A build runs through fixed phases:
//!
//! ```text
//! DISCOVER ─▶ CACHE LOOKUP ─▶ SCAN (serial | parallel) ─▶ MERGE ─▶ PERSIST
//! ```
//!
//! Only SCAN fans out. Files needing a scan are split into chunks; with fewer
//! files than the parallel threshold there is a single chunk, scanned on the
//! calling thread. Otherwise chunks go to the rayon pool and every chunk must
//! finish before MERGE starts. The first scan failure aborts the build.
//!
//! MERGE populates the graph on the calling thread in package and file order,
//! so identical inputs always produce identical graphs.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::config::BuildOptions;
use crate::error::{Error, Result};
use crate::finder::{FoundPackage, FsModuleFinder, ModuleFile, ModuleFinder};
use crate::graph::ImportGraph;
use crate::module::{DirectImport, Module};
use crate::scanner::{ImportScanner, PythonImportScanner, ScanContext, read_source};

type ImportsByModule = HashMap<Module, Vec<DirectImport>>;

/// Counters collected over one build, logged when it completes.
#[derive(Debug, Default)]
struct BuildStats {
    packages: usize,
    modules_found: usize,
    cache_hits: usize,
    modules_scanned: usize,
    chunks: usize,
    imports: usize,
    duration: Duration,
}

/// Build the import graph of one or more top-level Python packages.
///
/// Packages are located with [`FsModuleFinder`] over `options.search_paths`
/// and scanned with [`PythonImportScanner`].
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `package_names` is empty, or names the same
///   package twice
/// - [`Error::InvalidModuleName`] if a name is not a dotted module name
/// - any discovery error: [`Error::PackageNotFound`],
///   [`Error::NamespacePackageEncountered`], [`Error::NotATopLevelModule`]
/// - any scan error, e.g. [`Error::SourceSyntax`]
///
/// # Examples
///
/// ```no_run
/// use layergraph::{BuildOptions, build_graph};
///
/// let options = BuildOptions::new().search_path("src");
/// let graph = build_graph(&["mypackage"], &options)?;
/// println!("{} modules", graph.module_count());
/// # Ok::<(), layergraph::Error>(())
/// ```
pub fn build_graph<S: AsRef<str>>(
    package_names: &[S],
    options: &BuildOptions,
) -> Result<ImportGraph> {
    let finder = FsModuleFinder::new(options.search_paths.clone());
    build_graph_with(package_names, options, &finder, &PythonImportScanner)
}

/// [`build_graph`] with an explicit module finder and import scanner.
///
/// # Errors
///
/// As [`build_graph`], plus whatever `finder` or `scanner` return.
pub fn build_graph_with<S: AsRef<str>>(
    package_names: &[S],
    options: &BuildOptions,
    finder: &dyn ModuleFinder,
    scanner: &dyn ImportScanner,
) -> Result<ImportGraph> {
    let start = Instant::now();
    let package_names = validate_package_names(package_names)?;

    // DISCOVER
    let found_packages = package_names
        .iter()
        .map(|name| finder.find_package(name))
        .collect::<Result<Vec<_>>>()?;
    let mut stats = BuildStats {
        packages: found_packages.len(),
        modules_found: found_packages.iter().map(|p| p.module_files.len()).sum(),
        ..BuildStats::default()
    };
    debug!(
        packages = stats.packages,
        modules = stats.modules_found,
        "Discovered module files"
    );

    // CACHE LOOKUP
    let cache = match options.cache.directory() {
        Some(dir) => Some(Cache::setup(
            &dir,
            &found_packages,
            options.include_external_packages,
            options.exclude_type_checking_imports,
        )?),
        None => None,
    };
    let mut imports_by_module = ImportsByModule::new();
    let mut to_scan = Vec::new();
    for module_file in found_packages.iter().flat_map(|p| &p.module_files) {
        match cache.as_ref().and_then(|c| c.read_imports(module_file)) {
            Some(imports) => {
                imports_by_module.insert(module_file.module.clone(), imports);
            }
            None => to_scan.push(module_file),
        }
    }
    stats.cache_hits = imports_by_module.len();
    stats.modules_scanned = to_scan.len();

    // SCAN
    let context = ScanContext::new(
        &found_packages,
        options.include_external_packages,
        options.exclude_type_checking_imports,
    );
    stats.chunks =
        decide_number_of_chunks(to_scan.len(), options.resolved_min_parallel_modules());
    let scanned = scan_files(&to_scan, stats.chunks, scanner, &context)?;
    imports_by_module.extend(scanned);

    // MERGE
    let graph = assemble_graph(&found_packages, &imports_by_module, &context)?;
    stats.imports = graph.count_imports();

    // PERSIST
    if let Some(cache) = &cache {
        if stats.modules_scanned > 0 {
            cache.write(&found_packages, &imports_by_module)?;
        }
    }

    stats.duration = start.elapsed();
    info!(
        packages = stats.packages,
        modules = stats.modules_found,
        cache_hits = stats.cache_hits,
        scanned = stats.modules_scanned,
        chunks = stats.chunks,
        imports = stats.imports,
        duration_ms = stats.duration.as_millis(),
        "Built import graph"
    );
    Ok(graph)
}

fn validate_package_names<S: AsRef<str>>(package_names: &[S]) -> Result<Vec<Module>> {
    if package_names.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one package name is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut modules = Vec::with_capacity(package_names.len());
    for name in package_names {
        let module = Module::new(name.as_ref())?;
        if !seen.insert(module.clone()) {
            return Err(Error::InvalidArgument(format!(
                "package \"{module}\" given more than once"
            )));
        }
        modules.push(module);
    }
    Ok(modules)
}

/// One chunk below the threshold, otherwise one per worker thread.
fn decide_number_of_chunks(files: usize, min_parallel_modules: usize) -> usize {
    if files < min_parallel_modules {
        return 1;
    }
    rayon::current_num_threads().clamp(1, files.max(1))
}

fn scan_files(
    files: &[&ModuleFile],
    chunks: usize,
    scanner: &dyn ImportScanner,
    context: &ScanContext,
) -> Result<ImportsByModule> {
    if files.is_empty() {
        return Ok(ImportsByModule::new());
    }
    if chunks <= 1 {
        return scan_chunk(files, scanner, context);
    }

    let chunk_size = files.len().div_ceil(chunks);
    debug!(files = files.len(), chunks, chunk_size, "Scanning in parallel");
    let results = files
        .par_chunks(chunk_size)
        .map(|chunk| scan_chunk(chunk, scanner, context))
        .collect::<Result<Vec<_>>>()?;
    Ok(results.into_iter().flatten().collect())
}

fn scan_chunk(
    files: &[&ModuleFile],
    scanner: &dyn ImportScanner,
    context: &ScanContext,
) -> Result<ImportsByModule> {
    files
        .iter()
        .map(|module_file| -> Result<(Module, Vec<DirectImport>)> {
            let source = read_source(&module_file.path)?;
            let imports = scanner.scan_for_imports(module_file, &source, context)?;
            Ok((module_file.module.clone(), imports))
        })
        .collect()
}

fn assemble_graph(
    found_packages: &[FoundPackage],
    imports_by_module: &ImportsByModule,
    context: &ScanContext,
) -> Result<ImportGraph> {
    let mut graph = ImportGraph::new();
    for module in found_packages.iter().flat_map(FoundPackage::modules) {
        graph.add_module(module.as_str(), false)?;
    }

    for module in found_packages.iter().flat_map(FoundPackage::modules) {
        let Some(imports) = imports_by_module.get(module) else {
            continue;
        };
        for import in imports {
            if !context.modules.contains(&import.imported) {
                graph.add_module(import.imported.as_str(), true)?;
            }
            graph.add_direct_import(import.clone())?;
        }
    }
    Ok(graph)
}
