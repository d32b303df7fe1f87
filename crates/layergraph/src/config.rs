//! Build configuration.
//!
//! Options can be set programmatically through the builder methods on
//! [`BuildOptions`], read from the environment with [`BuildOptions::from_env`],
//! or loaded from a YAML file with [`BuildOptions::load`].
//!
//! # Example YAML
//!
//! ```yaml
//! search_paths:
//!   - src
//! include_external_packages: true
//! exclude_type_checking_imports: false
//! cache:
//!   directory: /tmp/layergraph
//! min_parallel_modules: 100
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::DEFAULT_CACHE_DIR;
use crate::error::{Error, Result};

/// Number of files to scan below which scanning stays on the calling thread.
pub const DEFAULT_MIN_PARALLEL_MODULES: usize = 50;

/// Environment variable overriding the parallel scanning threshold.
pub const MIN_PARALLEL_MODULES_ENV: &str = "LAYERGRAPH_MIN_PARALLEL_MODULES";

/// Environment variable enabling external packages in [`BuildOptions::from_env`].
pub const INCLUDE_EXTERNAL_PACKAGES_ENV: &str = "LAYERGRAPH_INCLUDE_EXTERNAL_PACKAGES";

/// Where cached scan results live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSetting {
    /// `.layergraph_cache` in the current directory
    #[default]
    Default,
    /// An explicit cache directory
    Directory(PathBuf),
    /// No cache reads or writes
    Disabled,
}

impl CacheSetting {
    /// The cache directory, or `None` if caching is disabled.
    #[must_use]
    pub fn directory(&self) -> Option<PathBuf> {
        match self {
            Self::Default => Some(PathBuf::from(DEFAULT_CACHE_DIR)),
            Self::Directory(dir) => Some(dir.clone()),
            Self::Disabled => None,
        }
    }
}

/// Options controlling a graph build.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Directories searched for top-level packages; empty means the current
    /// directory
    pub search_paths: Vec<PathBuf>,
    /// Add imported external packages to the graph as squashed modules
    pub include_external_packages: bool,
    /// Drop imports guarded by `if TYPE_CHECKING:`
    pub exclude_type_checking_imports: bool,
    /// Cache location
    pub cache: CacheSetting,
    /// Parallel scanning threshold; `None` falls back to the environment,
    /// then to [`DEFAULT_MIN_PARALLEL_MODULES`]
    pub min_parallel_modules: Option<usize>,
}

impl BuildOptions {
    /// Create options with every setting at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options seeded from `LAYERGRAPH_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            include_external_packages: env::var(INCLUDE_EXTERNAL_PACKAGES_ENV)
                .is_ok_and(|v| parse_flag(&v)),
            min_parallel_modules: Some(min_parallel_modules_from(
                env::var(MIN_PARALLEL_MODULES_ENV).ok(),
            )),
            ..Self::default()
        }
    }

    /// Load options from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or [`Error::Config`]
    /// if it is not valid options YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse options from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid options YAML.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Add a directory to search for top-level packages.
    #[must_use]
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Set whether external packages are added to the graph.
    #[must_use]
    pub fn include_external_packages(mut self, include: bool) -> Self {
        self.include_external_packages = include;
        self
    }

    /// Set whether `TYPE_CHECKING`-guarded imports are dropped.
    #[must_use]
    pub fn exclude_type_checking_imports(mut self, exclude: bool) -> Self {
        self.exclude_type_checking_imports = exclude;
        self
    }

    /// Set the cache location.
    #[must_use]
    pub fn cache(mut self, cache: CacheSetting) -> Self {
        self.cache = cache;
        self
    }

    /// Set the parallel scanning threshold.
    #[must_use]
    pub fn min_parallel_modules(mut self, threshold: usize) -> Self {
        self.min_parallel_modules = Some(threshold);
        self
    }

    /// The effective parallel threshold.
    pub(crate) fn resolved_min_parallel_modules(&self) -> usize {
        self.min_parallel_modules.unwrap_or_else(|| {
            min_parallel_modules_from(env::var(MIN_PARALLEL_MODULES_ENV).ok())
        })
    }
}

/// Forgiving boolean parsing: `true`, `1` and `yes` (any case) are true,
/// anything else is false.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

fn min_parallel_modules_from(value: Option<String>) -> usize {
    match value {
        Some(s) if !s.is_empty() => match s.trim().parse() {
            Ok(threshold) => threshold,
            Err(_) => {
                warn!(
                    env_var = MIN_PARALLEL_MODULES_ENV,
                    value = %s,
                    default = DEFAULT_MIN_PARALLEL_MODULES,
                    "Invalid value, using default"
                );
                DEFAULT_MIN_PARALLEL_MODULES
            }
        },
        _ => DEFAULT_MIN_PARALLEL_MODULES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("true", true)]
    #[case("TRUE", true)]
    #[case("1", true)]
    #[case("Yes", true)]
    #[case(" true ", true)]
    #[case("false", false)]
    #[case("0", false)]
    #[case("", false)]
    #[case("on", false)]
    #[case("truthy", false)]
    fn flag_parsing(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(parse_flag(value), expected);
    }

    #[rstest]
    #[case(None, DEFAULT_MIN_PARALLEL_MODULES)]
    #[case(Some(""), DEFAULT_MIN_PARALLEL_MODULES)]
    #[case(Some("10"), 10)]
    #[case(Some("0"), 0)]
    #[case(Some("lots"), DEFAULT_MIN_PARALLEL_MODULES)]
    #[case(Some("-5"), DEFAULT_MIN_PARALLEL_MODULES)]
    fn threshold_parsing(#[case] value: Option<&str>, #[case] expected: usize) {
        assert_eq!(min_parallel_modules_from(value.map(String::from)), expected);
    }

    #[test]
    fn explicit_threshold_wins() {
        let options = BuildOptions::new().min_parallel_modules(3);
        assert_eq!(options.resolved_min_parallel_modules(), 3);
    }

    #[test]
    fn cache_directories() {
        assert_eq!(
            CacheSetting::Default.directory(),
            Some(PathBuf::from(".layergraph_cache"))
        );
        assert_eq!(
            CacheSetting::Directory(PathBuf::from("/tmp/c")).directory(),
            Some(PathBuf::from("/tmp/c"))
        );
        assert_eq!(CacheSetting::Disabled.directory(), None);
    }

    #[test]
    fn builder_sets_fields() {
        let options = BuildOptions::new()
            .search_path("src")
            .include_external_packages(true)
            .exclude_type_checking_imports(true)
            .cache(CacheSetting::Disabled);
        assert_eq!(options.search_paths, vec![PathBuf::from("src")]);
        assert!(options.include_external_packages);
        assert!(options.exclude_type_checking_imports);
        assert_eq!(options.cache, CacheSetting::Disabled);
        assert_eq!(options.min_parallel_modules, None);
    }

    #[test]
    fn yaml_with_defaults() {
        let options = BuildOptions::from_yaml_str("include_external_packages: true\n")
            .expect("valid yaml");
        assert!(options.include_external_packages);
        assert!(!options.exclude_type_checking_imports);
        assert_eq!(options.cache, CacheSetting::Default);
        assert!(options.search_paths.is_empty());
    }

    #[test]
    fn yaml_full() {
        let yaml = "\
search_paths:
  - src
  - lib
cache: disabled
min_parallel_modules: 7
";
        let options = BuildOptions::from_yaml_str(yaml).expect("valid yaml");
        assert_eq!(options.search_paths.len(), 2);
        assert_eq!(options.cache, CacheSetting::Disabled);
        assert_eq!(options.min_parallel_modules, Some(7));
    }

    #[test]
    fn yaml_type_mismatch_is_config_error() {
        let result = BuildOptions::from_yaml_str("min_parallel_modules: many\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("layergraph.yaml");
        std::fs::write(&path, "exclude_type_checking_imports: true\n")
            .expect("failed to write config");

        let options = BuildOptions::load(&path).expect("should load");
        assert!(options.exclude_type_checking_imports);

        std::fs::write(&path, "search_paths: 12\n").expect("failed to write config");
        assert!(matches!(BuildOptions::load(&path), Err(Error::Config(_))));
    }
}
