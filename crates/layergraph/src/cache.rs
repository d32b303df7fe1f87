//! On-disk cache of per-module scan results.
//!
//! Each build reads and writes one `{hash}.data.json` file in the cache
//! directory. The hash covers the sorted package names and the scan options,
//! so builds with different options never share results. The file maps each
//! module name to the modification time its results were recorded against and
//! the direct imports found, each stored as `[imported, line_number,
//! line_contents]`:
//!
//! ```json
//! {"pkg.one": {"mtime_ns": 1712, "imports": [["pkg.two", 1, "from pkg import two"]]}}
//! ```
//!
//! A module's cached imports are used only when its recorded mtime equals the
//! file's current mtime exactly. Missing or corrupt files are treated as empty.
//!
//! Writes use the temp-file-then-rename pattern, so an interrupted build never
//! leaves a truncated cache file behind.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::Result;
use crate::finder::{FoundPackage, ModuleFile};
use crate::module::{DirectImport, Module};

/// Cache directory used when none is configured.
pub const DEFAULT_CACHE_DIR: &str = ".layergraph_cache";

const GITIGNORE_FILE: &str = ".gitignore";
const GITIGNORE_CONTENTS: &str = "# Automatically created by layergraph.\n*\n";
const CACHEDIR_TAG_FILE: &str = "CACHEDIR.TAG";
const CACHEDIR_TAG_CONTENTS: &str = "Signature: 8a477f597d28d172789f06886806bc55\n\
# This file is a cache directory tag automatically created by layergraph.\n\
# For information about cache directory tags see https://bford.info/cachedir/\n";

/// One stored import: `[imported, line_number, line_contents]`.
type StoredImport = (Module, Option<u32>, Option<String>);

/// Scan results for one module, valid while the file keeps this mtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedModule {
    mtime_ns: i64,
    imports: Vec<StoredImport>,
}

/// Scan results loaded from a cache directory for one build.
#[derive(Debug)]
pub struct Cache {
    dir: PathBuf,
    data_file_name: String,
    entries: HashMap<Module, CachedModule>,
}

impl Cache {
    /// Load whatever the cache directory holds for these packages and options.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] for read failures other than a missing
    /// file. Unparsable files are logged and ignored.
    pub fn setup(
        dir: &Path,
        found_packages: &[FoundPackage],
        include_external_packages: bool,
        exclude_type_checking_imports: bool,
    ) -> Result<Self> {
        let names: Vec<&str> = found_packages.iter().map(|p| p.name.as_str()).collect();
        let data_file_name = data_file_name(
            &names,
            include_external_packages,
            exclude_type_checking_imports,
        );

        let path = dir.join(&data_file_name);
        let entries = match read_optional(&path)? {
            Some(content) => parse_data(&content).unwrap_or_else(|| {
                warn!(path = %path.display(), "Could not use corrupt cache file");
                HashMap::new()
            }),
            None => HashMap::new(),
        };

        debug!(
            dir = %dir.display(),
            cached_results = entries.len(),
            "Cache loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            data_file_name,
            entries,
        })
    }

    /// Cached imports for a module file, if the file is unchanged since the
    /// results were stored.
    #[must_use]
    pub fn read_imports(&self, module_file: &ModuleFile) -> Option<Vec<DirectImport>> {
        let entry = self.entries.get(&module_file.module)?;
        if entry.mtime_ns != module_file.mtime_ns {
            return None;
        }
        let importer = &module_file.module;
        Some(
            entry
                .imports
                .iter()
                .map(|(imported, line_number, line_contents)| DirectImport {
                    importer: importer.clone(),
                    imported: imported.clone(),
                    line_number: *line_number,
                    line_contents: line_contents.clone(),
                })
                .collect(),
        )
    }

    /// Persist scan results for every module of the given packages, each
    /// recorded against its file's current mtime.
    ///
    /// `imports_by_module` should hold results for every module of
    /// `found_packages`, cached and freshly scanned alike. Modules without
    /// results are left out.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the directory or the file cannot be
    /// written.
    pub fn write(
        &self,
        found_packages: &[FoundPackage],
        imports_by_module: &HashMap<Module, Vec<DirectImport>>,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        self.write_marker_files()?;

        let data: BTreeMap<&Module, CachedModule> = found_packages
            .iter()
            .flat_map(|p| &p.module_files)
            .filter_map(|module_file| {
                let imports = imports_by_module.get(&module_file.module)?;
                let entry = CachedModule {
                    mtime_ns: module_file.mtime_ns,
                    imports: imports
                        .iter()
                        .map(|i| (i.imported.clone(), i.line_number, i.line_contents.clone()))
                        .collect(),
                };
                Some((&module_file.module, entry))
            })
            .collect();
        let path = self.dir.join(&self.data_file_name);
        write_atomic(&path, &serde_json::to_vec(&data)?)?;
        info!(path = %path.display(), modules = data.len(), "Wrote cache file");

        Ok(())
    }

    fn write_marker_files(&self) -> Result<()> {
        for (name, contents) in [
            (GITIGNORE_FILE, GITIGNORE_CONTENTS),
            (CACHEDIR_TAG_FILE, CACHEDIR_TAG_CONTENTS),
        ] {
            let path = self.dir.join(name);
            if !path.exists() {
                fs::write(&path, contents)?;
            }
        }
        Ok(())
    }
}

fn data_file_name(
    package_names: &[&str],
    include_external_packages: bool,
    exclude_type_checking_imports: bool,
) -> String {
    let mut names = package_names.to_vec();
    names.sort_unstable();
    let mut key = names.join(",");
    if include_external_packages {
        key.push_str(":external");
    }
    if exclude_type_checking_imports {
        key.push_str(":no_type_checking");
    }
    format!("{:016x}.data.json", xxh3_64(key.as_bytes()))
}

/// Read a file, treating absence as `None`.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "No cache file found");
            Ok(None)
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            warn!(path = %path.display(), "Cache file is not valid UTF-8, ignoring");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Any shape mismatch, including an invalid module name, rejects the file.
fn parse_data(content: &str) -> Option<HashMap<Module, CachedModule>> {
    serde_json::from_str(content).ok()
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = make_temp_path(path);
    fs::write(&temp_path, contents)?;
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn m(name: &str) -> Module {
        Module::new(name).expect("valid module name")
    }

    fn package(name: &str, files: &[(&str, i64)]) -> FoundPackage {
        FoundPackage {
            name: m(name),
            directory: PathBuf::from(name),
            module_files: files
                .iter()
                .map(|(module, mtime_ns)| ModuleFile {
                    module: m(module),
                    path: PathBuf::from(format!("{}.py", module.replace('.', "/"))),
                    mtime_ns: *mtime_ns,
                })
                .collect(),
        }
    }

    fn results() -> HashMap<Module, Vec<DirectImport>> {
        HashMap::from([
            (
                m("pkg.one"),
                vec![DirectImport::new(m("pkg.one"), m("pkg.two"), 3, "from pkg import two")],
            ),
            (m("pkg.two"), vec![]),
        ])
    }

    #[test]
    fn data_file_name_depends_on_options_not_order() {
        let a = data_file_name(&["blue", "green"], false, false);
        let b = data_file_name(&["green", "blue"], false, false);
        assert_eq!(a, b);
        assert!(a.ends_with(".data.json"));
        assert_ne!(a, data_file_name(&["blue", "green"], true, false));
        assert_ne!(a, data_file_name(&["blue", "green"], false, true));
        assert_ne!(a, data_file_name(&["blue"], false, false));
    }

    #[test]
    fn empty_directory_gives_no_hits() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let packages = [package("pkg", &[("pkg.one", 10)])];
        let cache = Cache::setup(dir.path(), &packages, false, false).expect("setup");
        assert_eq!(cache.read_imports(&packages[0].module_files[0]), None);
    }

    #[test]
    fn written_results_are_read_back_when_mtime_matches() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let packages = [package("pkg", &[("pkg.one", 10), ("pkg.two", 20)])];
        let cache = Cache::setup(dir.path(), &packages, false, false).expect("setup");
        cache.write(&packages, &results()).expect("write");

        let reloaded = Cache::setup(dir.path(), &packages, false, false).expect("setup");
        let one = reloaded
            .read_imports(&packages[0].module_files[0])
            .expect("cache hit");
        assert_eq!(one, results()[&m("pkg.one")]);
        assert_eq!(reloaded.read_imports(&packages[0].module_files[1]), Some(vec![]));
    }

    #[test]
    fn changed_mtime_is_a_miss() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let packages = [package("pkg", &[("pkg.one", 10), ("pkg.two", 20)])];
        Cache::setup(dir.path(), &packages, false, false)
            .expect("setup")
            .write(&packages, &results())
            .expect("write");

        let touched = package("pkg", &[("pkg.one", 11), ("pkg.two", 20)]);
        let reloaded = Cache::setup(dir.path(), &[touched.clone()], false, false).expect("setup");
        assert_eq!(reloaded.read_imports(&touched.module_files[0]), None);
        assert!(reloaded.read_imports(&touched.module_files[1]).is_some());
    }

    #[test]
    fn different_options_do_not_share_results() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let packages = [package("pkg", &[("pkg.one", 10), ("pkg.two", 20)])];
        Cache::setup(dir.path(), &packages, false, false)
            .expect("setup")
            .write(&packages, &results())
            .expect("write");

        let other = Cache::setup(dir.path(), &packages, true, false).expect("setup");
        assert_eq!(other.read_imports(&packages[0].module_files[0]), None);
    }

    #[test]
    fn options_sharing_a_directory_never_serve_stale_results() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let before = [package("pkg", &[("pkg.one", 10), ("pkg.two", 20)])];
        Cache::setup(dir.path(), &before, false, false)
            .expect("setup")
            .write(&before, &results())
            .expect("write");

        // pkg.one is edited, then rebuilt under the other option set only.
        let after = [package("pkg", &[("pkg.one", 11), ("pkg.two", 20)])];
        let rescanned = HashMap::from([(m("pkg.one"), vec![]), (m("pkg.two"), vec![])]);
        Cache::setup(dir.path(), &after, true, false)
            .expect("setup")
            .write(&after, &rescanned)
            .expect("write");

        let original = Cache::setup(dir.path(), &after, false, false).expect("setup");
        assert_eq!(original.read_imports(&after[0].module_files[0]), None);
        assert_eq!(original.read_imports(&after[0].module_files[1]), Some(vec![]));
    }

    #[test]
    fn corrupt_files_are_ignored() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let packages = [package("pkg", &[("pkg.one", 10)])];
        let name = data_file_name(&["pkg"], false, false);
        fs::write(
            dir.path().join(name),
            r#"{"pkg.one": {"mtime_ns": 10, "imports": [["pkg.two"]]}}"#,
        )
        .expect("write");

        let cache = Cache::setup(dir.path(), &packages, false, false).expect("setup");
        assert_eq!(cache.read_imports(&packages[0].module_files[0]), None);
    }

    #[rstest]
    #[case::not_json("{not json")]
    #[case::not_an_object("[1, 2]")]
    #[case::missing_mtime(r#"{"a": {"imports": []}}"#)]
    #[case::bad_module_name(r#"{"a..b": {"mtime_ns": 1, "imports": []}}"#)]
    #[case::bad_imported_name(r#"{"a": {"mtime_ns": 1, "imports": [["", null, null]]}}"#)]
    #[case::negative_line(r#"{"a": {"mtime_ns": 1, "imports": [["b", -1, null]]}}"#)]
    fn malformed_data_is_rejected(#[case] content: &str) {
        assert!(parse_data(content).is_none());
    }

    #[test]
    fn stored_import_allows_missing_location() {
        let parsed = parse_data(
            r#"{"a": {"mtime_ns": 5, "imports": [["b", null, null], ["c", 4, "import c"]]}}"#,
        )
        .expect("valid data");
        let entry = &parsed[&m("a")];
        assert_eq!(entry.mtime_ns, 5);
        assert_eq!(entry.imports[0], (m("b"), None, None));
        assert_eq!(entry.imports[1], (m("c"), Some(4), Some("import c".to_string())));
    }

    #[test]
    fn marker_files_created_once() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let cache_dir = dir.path().join("cache");
        let packages = [package("pkg", &[("pkg.one", 10), ("pkg.two", 20)])];
        let cache = Cache::setup(&cache_dir, &packages, false, false).expect("setup");
        cache.write(&packages, &results()).expect("write");

        let gitignore = cache_dir.join(".gitignore");
        assert_eq!(
            fs::read_to_string(&gitignore).expect("read"),
            GITIGNORE_CONTENTS
        );
        let tag = fs::read_to_string(cache_dir.join("CACHEDIR.TAG")).expect("read");
        assert!(tag.starts_with("Signature: 8a477f597d28d172789f06886806bc55"));

        fs::write(&gitignore, "custom\n").expect("write");
        cache.write(&packages, &results()).expect("write");
        assert_eq!(fs::read_to_string(&gitignore).expect("read"), "custom\n");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let packages = [package("pkg", &[("pkg.one", 10), ("pkg.two", 20)])];
        Cache::setup(dir.path(), &packages, false, false)
            .expect("setup")
            .write(&packages, &results())
            .expect("write");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn make_temp_path_appends_tmp() {
        assert_eq!(
            make_temp_path(Path::new("/c/0123.data.json")),
            Path::new("/c/0123.data.json.tmp")
        );
        assert_eq!(make_temp_path(Path::new("/c/file")), Path::new("/c/file.tmp"));
    }
}
