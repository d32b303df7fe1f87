//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use std::fs;

use layergraph::{BuildOptions, CacheSetting};
use tempfile::TempDir;

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Create a temp directory holding the given files, creating parent dirs.
pub fn workspace_with_files(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    for (path, content) in files {
        let full_path = dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("failed to write file");
    }

    dir
}

/// Options searching `dir` with the cache disabled.
pub fn uncached_options(dir: &TempDir) -> BuildOptions {
    BuildOptions::new()
        .search_path(dir.path())
        .cache(CacheSetting::Disabled)
}
