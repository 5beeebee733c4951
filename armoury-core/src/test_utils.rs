//! Shared helpers for unit tests

use std::fs;

use tempfile::TempDir;

use crate::command::{MockToolRunner, ToolOutput};
use crate::sysfs::Sysfs;

/// Temporary directory standing in for `/`
pub struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        Self { dir: TempDir::new().unwrap() }
    }

    pub fn sysfs(&self) -> Sysfs {
        Sysfs::with_root(self.dir.path())
    }

    /// Create a file at a logical absolute path, with parents
    pub fn file(&self, logical: &str, content: &str) {
        let path = self.sysfs().resolve(logical);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn dir(&self, logical: &str) {
        fs::create_dir_all(self.sysfs().resolve(logical)).unwrap();
    }

    pub fn read(&self, logical: &str) -> String {
        fs::read_to_string(self.sysfs().resolve(logical)).unwrap()
    }
}

/// Runner where nothing is installed and every invocation fails
pub fn no_tools() -> MockToolRunner {
    let mut runner = MockToolRunner::new();
    runner.expect_is_installed().return_const(false);
    runner
        .expect_run()
        .returning(|cmd| ToolOutput::not_found(&cmd.program));
    runner
}
