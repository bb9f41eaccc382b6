#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use dataset_ingest::schema::sidecar_path;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory whose datasets and sidecars are removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).expect("read workspace file")
    }

    /// Sidecar contents for `dataset`, if one was written.
    pub fn sidecar(&self, dataset: &Path) -> Option<String> {
        fs::read_to_string(sidecar_path(dataset)).ok()
    }
}

/// The CLI binary with logging turned down so stderr stays quiet.
pub fn ingest_cmd() -> Command {
    let mut cmd = Command::cargo_bin("dataset-ingest").expect("binary exists");
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// One-column CSV text with a row per value.
pub fn single_column_csv(header: &str, values: &[&str]) -> String {
    let mut out = String::from(header);
    out.push('\n');
    for value in values {
        out.push_str(value);
        out.push('\n');
    }
    out
}
