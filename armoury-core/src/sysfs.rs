//! Sysfs accessor
//!
//! Best-effort access to single-line pseudo-files under `/sys`, `/proc` and
//! `/dev`. Every logical path is absolute and is resolved against a root
//! prefix, which is `/` on a real system and a temporary directory in tests.

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::{ArmouryError, Result};

/// Handle to the sysfs/procfs tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::system()
    }
}

impl Sysfs {
    /// The live system tree rooted at `/`
    pub fn system() -> Self {
        Self { root: PathBuf::from("/") }
    }

    /// A tree rooted somewhere else (fake sysfs in tests, chroots)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical absolute path onto the real filesystem
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match path.strip_prefix("/") {
            Ok(relative) => self.root.join(relative),
            Err(_) => self.root.join(path),
        }
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).exists()
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).is_dir()
    }

    /// Read a pseudo-file, stripping surrounding whitespace
    pub fn try_read(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        fs::read_to_string(self.resolve(path))
            .map(|content| content.trim().to_string())
            .map_err(|e| ArmouryError::SysfsRead {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Read a pseudo-file; permission and I/O errors yield `None`
    pub fn read(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.try_read(path) {
            Ok(value) => Some(value),
            Err(e) => {
                trace!("{}", e);
                None
            }
        }
    }

    /// Read and parse a numeric attribute
    pub fn read_parsed<T: FromStr>(&self, path: impl AsRef<Path>) -> Option<T> {
        self.read(path)?.parse().ok()
    }

    /// Write a value to a pseudo-file
    pub fn try_write(&self, path: impl AsRef<Path>, value: impl Display) -> Result<()> {
        let path = path.as_ref();
        let value = value.to_string();
        // Attributes are never created, only rewritten
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.resolve(path))
            .and_then(|mut file| file.write_all(value.as_bytes()))
            .map_err(|e| {
                ArmouryError::sysfs_write(path, format!("Failed to write '{}': {}", value, e))
            })
    }

    /// Write a value; failures are logged and reported as `false`
    pub fn write(&self, path: impl AsRef<Path>, value: impl Display) -> bool {
        match self.try_write(path, value) {
            Ok(()) => true,
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    /// List a directory as logical paths, sorted by name
    pub fn list_dir(&self, path: impl AsRef<Path>) -> Vec<PathBuf> {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(self.resolve(path)) else {
            return Vec::new();
        };

        let mut names: Vec<_> = entries
            .flatten()
            .map(|entry| entry.file_name())
            .collect();
        names.sort();
        names.into_iter().map(|name| path.join(name)).collect()
    }

    /// Indexed attribute files in `dir` named `{prefix}{N}{suffix}`, ordered by `N`
    pub fn indexed_files(&self, dir: impl AsRef<Path>, prefix: &str, suffix: &str) -> Vec<(u32, PathBuf)> {
        let mut found: Vec<(u32, PathBuf)> = self
            .list_dir(dir)
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let index = name.strip_prefix(prefix)?.strip_suffix(suffix)?.parse().ok()?;
                Some((index, path))
            })
            .collect();
        found.sort_by_key(|(index, _)| *index);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeSysfs;

    #[test]
    fn test_resolve_strips_leading_slash() {
        let sysfs = Sysfs::with_root("/tmp/root");
        assert_eq!(
            sysfs.resolve("/sys/class/hwmon"),
            PathBuf::from("/tmp/root/sys/class/hwmon")
        );
        assert_eq!(Sysfs::system().resolve("/proc/stat"), PathBuf::from("/proc/stat"));
    }

    #[test]
    fn test_read_trims_and_missing_is_none() {
        let fake = FakeSysfs::new();
        fake.file("/sys/class/dmi/id/sys_vendor", "ASUSTeK COMPUTER INC.\n");

        let sysfs = fake.sysfs();
        assert_eq!(
            sysfs.read("/sys/class/dmi/id/sys_vendor").as_deref(),
            Some("ASUSTeK COMPUTER INC.")
        );
        assert_eq!(sysfs.read("/sys/class/dmi/id/missing"), None);
        assert!(sysfs.try_read("/sys/class/dmi/id/missing").is_err());
    }

    #[test]
    fn test_read_parsed() {
        let fake = FakeSysfs::new();
        fake.file("/sys/a/value", "42\n");
        fake.file("/sys/a/garbage", "n/a");

        let sysfs = fake.sysfs();
        assert_eq!(sysfs.read_parsed::<i64>("/sys/a/value"), Some(42));
        assert_eq!(sysfs.read_parsed::<i64>("/sys/a/garbage"), None);
    }

    #[test]
    fn test_write_round_trip_and_failure() {
        let fake = FakeSysfs::new();
        fake.file("/sys/a/policy", "0");

        let sysfs = fake.sysfs();
        assert!(sysfs.write("/sys/a/policy", 2));
        assert_eq!(sysfs.read("/sys/a/policy").as_deref(), Some("2"));

        // Parent directory missing
        assert!(!sysfs.write("/sys/nowhere/policy", 1));
        let err = sysfs.try_write("/sys/nowhere/policy", 1).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
    }

    #[test]
    fn test_write_does_not_create_attributes() {
        let fake = FakeSysfs::new();
        fake.file("/sys/hw/pwm1_enable", "2");

        let sysfs = fake.sysfs();
        assert!(!sysfs.write("/sys/hw/pwm9_enable", 1));
        assert!(!sysfs.exists("/sys/hw/pwm9_enable"));

        assert!(sysfs.write("/sys/hw/pwm1_enable", 1));
        assert_eq!(sysfs.read("/sys/hw/pwm1_enable").as_deref(), Some("1"));

        // Longer old content is truncated
        fake.file("/sys/hw/label", "balanced");
        assert!(sysfs.write("/sys/hw/label", "off"));
        assert_eq!(sysfs.read("/sys/hw/label").as_deref(), Some("off"));
    }

    #[test]
    fn test_indexed_files_sorted_numerically() {
        let fake = FakeSysfs::new();
        for i in [10, 2, 1] {
            fake.file(&format!("/sys/hw/temp{}_input", i), "1000");
        }
        fake.file("/sys/hw/temp1_label", "Package");

        let found = fake.sysfs().indexed_files("/sys/hw", "temp", "_input");
        let indices: Vec<u32> = found.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 10]);
        assert_eq!(found[0].1, PathBuf::from("/sys/hw/temp1_input"));
    }
}
