//! Tree-relative paths that can never leave their root
//!
//! Remote archives and listings are untrusted input. Every path taken from
//! them is parsed into a [`RelativePath`] before it is joined onto a local
//! directory, and parsing fails closed: absolute paths, drive prefixes and
//! `..` segments are rejected outright instead of being resolved.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// A path relative to a tree root, normalized to forward slashes.
///
/// Invariants: non-empty, no leading `/`, no drive prefix, no `.` or `..`
/// segments, no empty segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativePath {
    inner: String,
}

impl RelativePath {
    /// Parse a path string from an untrusted source.
    ///
    /// Backslashes are treated as separators. `.` segments and repeated
    /// separators are dropped, a trailing separator is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let unified = raw.replace('\\', "/");

        if unified.starts_with('/') {
            return Err(traversal(raw, "absolute path"));
        }
        if has_drive_prefix(&unified) {
            return Err(traversal(raw, "drive prefix"));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(traversal(raw, "parent directory segment")),
                s if s.contains('\0') => return Err(traversal(raw, "NUL byte")),
                s if has_drive_prefix(s) => return Err(traversal(raw, "drive prefix")),
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(traversal(raw, "empty path"));
        }

        Ok(Self {
            inner: segments.join("/"),
        })
    }

    /// Build from a filesystem path, typically one produced by stripping a
    /// walk root from a walked entry.
    pub fn from_path(path: &Path) -> Result<Self> {
        let display = path.to_string_lossy();
        let mut segments = Vec::new();

        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| traversal(&display, "non UTF-8 segment"))?;
                    segments.push(part);
                }
                Component::CurDir => continue,
                Component::ParentDir => {
                    return Err(traversal(&display, "parent directory segment"));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(traversal(&display, "absolute path"));
                }
            }
        }

        Self::parse(&segments.join("/"))
    }

    /// Get the normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.split('/')
    }

    /// Get the final segment.
    pub fn file_name(&self) -> &str {
        self.inner.rsplit('/').next().unwrap_or(&self.inner)
    }

    /// Get the parent path, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<Self> {
        self.inner.rfind('/').map(|idx| Self {
            inner: self.inner[..idx].to_string(),
        })
    }

    /// Join a further untrusted segment, validating the result.
    pub fn join(&self, segment: &str) -> Result<Self> {
        Self::parse(&format!("{}/{}", self.inner, segment))
    }

    /// Whether `prefix` names this path or one of its ancestor directories.
    ///
    /// Matching is per segment, so `data` is a prefix of `data/file.bin`
    /// but not of `database.bin`.
    pub fn starts_with(&self, prefix: &RelativePath) -> bool {
        let mut own = self.segments();
        prefix.segments().all(|p| own.next() == Some(p))
    }

    /// Resolve under `root` as a platform-native path.
    pub fn resolve_under(&self, root: &Path) -> PathBuf {
        let mut resolved = root.to_path_buf();
        for segment in self.segments() {
            resolved.push(segment);
        }
        resolved
    }

    /// Resolve under `root`, refusing when an existing symlink along the way
    /// leads outside of `root`.
    ///
    /// Segments that do not exist yet are fine; they will be created as
    /// plain directories below `root`.
    pub fn resolve_contained(&self, root: &Path) -> Result<PathBuf> {
        let target = self.resolve_under(root);
        let Ok(canonical_root) = dunce::canonicalize(root) else {
            // Nothing below a missing root can be a link yet.
            return Ok(target);
        };

        let mut current = root.to_path_buf();
        for segment in self.segments() {
            current.push(segment);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    let resolved = dunce::canonicalize(&current)
                        .map_err(|_| traversal(&self.inner, "unresolvable symlink"))?;
                    if !resolved.starts_with(&canonical_root) {
                        return Err(traversal(&self.inner, "symlink leads outside the tree root"));
                    }
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }

        Ok(target)
    }
}

fn traversal(raw: &str, reason: &'static str) -> Error {
    Error::PathTraversal {
        path: raw.to_string(),
        reason,
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl FromStr for RelativePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for RelativePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("config.json", "config.json")]
    #[case("assets/img/logo.png", "assets/img/logo.png")]
    #[case("./assets//logo.png", "assets/logo.png")]
    #[case("assets\\sounds\\click.ogg", "assets/sounds/click.ogg")]
    #[case("mods/", "mods")]
    fn parse_normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(RelativePath::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("../../etc/passwd")]
    #[case("assets/../../outside.txt")]
    #[case("a/..")]
    #[case("/etc/passwd")]
    #[case("\\\\server\\share\\file")]
    #[case("C:\\Windows\\system32")]
    #[case("c:relative")]
    #[case("assets/D:evil")]
    #[case("")]
    #[case("./")]
    fn parse_rejects(#[case] raw: &str) {
        let err = RelativePath::parse(raw).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "got {err:?}");
    }

    #[test]
    fn from_path_rejects_parent_components() {
        let result = RelativePath::from_path(Path::new("mods/../../secrets"));
        assert!(result.is_err());
    }

    #[test]
    fn from_path_accepts_walked_entries() {
        let path = Path::new("versions").join("1.20").join("client.jar");
        let rel = RelativePath::from_path(&path).unwrap();
        assert_eq!(rel.as_str(), "versions/1.20/client.jar");
        assert_eq!(rel.file_name(), "client.jar");
        assert_eq!(rel.parent().unwrap().as_str(), "versions/1.20");
    }

    #[test]
    fn starts_with_matches_whole_segments() {
        let path = RelativePath::parse("data/file.bin").unwrap();
        assert!(path.starts_with(&RelativePath::parse("data").unwrap()));
        assert!(path.starts_with(&RelativePath::parse("data/file.bin").unwrap()));
        assert!(!path.starts_with(&RelativePath::parse("dat").unwrap()));
        assert!(!path.starts_with(&RelativePath::parse("data/file.bin/x").unwrap()));
    }

    #[test]
    fn join_validates_segment() {
        let base = RelativePath::parse("mods").unwrap();
        assert_eq!(base.join("a.jar").unwrap().as_str(), "mods/a.jar");
        assert!(base.join("../../a.jar").is_err());
    }

    #[test]
    fn resolve_contained_allows_missing_segments() {
        let dir = tempfile::tempdir().unwrap();
        let rel = RelativePath::parse("new/dir/file.txt").unwrap();
        let resolved = rel.resolve_contained(dir.path()).unwrap();
        assert_eq!(resolved, dir.path().join("new").join("dir").join("file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_contained_rejects_escaping_symlink() {
        let outside = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("mods")).unwrap();

        let rel = RelativePath::parse("mods/evil.jar").unwrap();
        let err = rel.resolve_contained(root.path()).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_contained_allows_internal_symlink() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("real")).unwrap();
        std::os::unix::fs::symlink(root.path().join("real"), root.path().join("alias")).unwrap();

        let rel = RelativePath::parse("alias/file.txt").unwrap();
        assert!(rel.resolve_contained(root.path()).is_ok());
    }

    #[test]
    fn resolve_under_stays_below_root() {
        let root = Path::new("/opt/launcher");
        let rel = RelativePath::parse("data/config.json").unwrap();
        let resolved = rel.resolve_under(root);
        assert!(resolved.starts_with(root));
        assert!(resolved.ends_with("data/config.json"));
    }
}
