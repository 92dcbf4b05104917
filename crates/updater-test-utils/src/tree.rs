//! [`TestTree`] builder for local and remote tree fixtures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::TempDir;

/// A temporary directory holding a file tree, with setup and assertion
/// helpers. Paths are always given relative to the root with `/`.
///
/// # Example
///
/// ```rust,no_run
/// use updater_test_utils::tree::TestTree;
///
/// let tree = TestTree::new().with_file("config.json", "{}");
/// tree.assert_file_contains("config.json", "{}");
/// ```
pub struct TestTree {
    temp_dir: TempDir,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Content and modification time of every file, keyed by relative path.
pub type TreeState = BTreeMap<String, (Vec<u8>, SystemTime)>;

impl TestTree {
    /// Create an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a tree populated with `files`.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let tree = Self::new();
        for (path, content) in files {
            tree.write(path, content);
        }
        tree
    }

    /// Builder form of [`Self::write`].
    pub fn with_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.write(path, content);
        self
    }

    /// Return the root path of the temporary directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of `path` inside the tree.
    pub fn path(&self, path: &str) -> PathBuf {
        self.root().join(path)
    }

    /// Write `content` to `path`, creating parent directories.
    pub fn write(&self, path: &str, content: impl AsRef<[u8]>) {
        let full = self.path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content)
            .unwrap_or_else(|e| panic!("Could not write {}: {e}", full.display()));
    }

    pub fn read(&self, path: &str) -> Vec<u8> {
        let full = self.path(path);
        fs::read(&full).unwrap_or_else(|e| panic!("Could not read {}: {e}", full.display()))
    }

    pub fn read_string(&self, path: &str) -> String {
        String::from_utf8(self.read(path)).unwrap()
    }

    /// Every regular file with its content and modification time.
    ///
    /// Comparing two states taken around an operation shows whether it
    /// wrote anything.
    pub fn state(&self) -> TreeState {
        let mut state = BTreeMap::new();
        collect(self.root(), self.root(), &mut state);
        state
    }

    /// Relative paths of every regular file, sorted.
    pub fn files(&self) -> Vec<String> {
        self.state().into_keys().collect()
    }

    /// Assert that `path` (relative to the root) exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, path: &str) {
        let full_path = self.path(path);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }

    /// Assert that `path` (relative to the root) does **not** exist.
    pub fn assert_file_not_exists(&self, path: &str) {
        let full_path = self.path(path);
        assert!(
            !full_path.exists(),
            "Expected file NOT to exist: {}",
            full_path.display()
        );
    }

    /// Assert that the file at `path` has exactly `content`.
    pub fn assert_file_contains(&self, path: &str, content: &str) {
        let actual = self.read_string(path);
        assert_eq!(
            actual, content,
            "Unexpected content in {}",
            self.path(path).display()
        );
    }
}

fn collect(root: &Path, dir: &Path, state: &mut TreeState) {
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let file_type = entry.file_type().unwrap();
        let path = entry.path();
        if file_type.is_dir() {
            collect(root, &path, state);
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            let modified = entry.metadata().unwrap().modified().unwrap();
            state.insert(relative, (fs::read(&path).unwrap(), modified));
        }
    }
}
