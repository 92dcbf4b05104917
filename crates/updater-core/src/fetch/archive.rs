//! Zip archive unpacking
//!
//! Entry names come from the network and are parsed as [`RelativePath`]
//! before anything is written, so an archive cannot place files outside the
//! destination directory.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use updater_fs::RelativePath;
use zip::ZipArchive;

use crate::{Error, Result};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// How the top level of an archive maps onto the tree root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    /// Hosted branch archives wrap the tree in one `<repo>-<branch>/`
    /// directory, which is stripped.
    Wrapped,
    /// The archive root is the tree root.
    Flat,
}

/// Kinds of paths seen so far, so no entry can turn another entry's file
/// into a directory or the reverse.
#[derive(Default)]
struct TreeShape {
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
}

impl TreeShape {
    /// Record `path` and its ancestors as directories. Returns the
    /// conflicting path on a collision.
    fn add_dir(&mut self, path: &RelativePath) -> std::result::Result<(), String> {
        let mut current = String::new();
        for segment in path.segments() {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            if self.files.contains(&current) {
                return Err(current);
            }
            self.dirs.insert(current.clone());
        }
        Ok(())
    }

    fn add_file(&mut self, path: &RelativePath) -> std::result::Result<(), String> {
        if let Some(parent) = path.parent() {
            self.add_dir(&parent)?;
        }
        if self.dirs.contains(path.as_str()) {
            return Err(path.to_string());
        }
        self.files.insert(path.to_string());
        Ok(())
    }
}

/// Unpack `payload` into `dest` and return the tree root.
///
/// With [`Layout::Wrapped`], when every entry lives under a single top-level
/// directory, that directory is the root; otherwise `dest` itself is.
pub(crate) fn unpack(
    payload: &[u8],
    dest: &Path,
    url: &str,
    layout: Layout,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let corrupt = |message: String| Error::CorruptArchive {
        url: url.to_string(),
        message,
    };

    let mut archive =
        ZipArchive::new(Cursor::new(payload)).map_err(|e| corrupt(e.to_string()))?;

    let mut shape = TreeShape::default();
    let mut top_level = BTreeSet::new();
    let mut top_level_file = false;
    let mut files = 0usize;

    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| corrupt(format!("entry {index}: {e}")))?;
        let path = RelativePath::parse(entry.name())?;

        if entry
            .unix_mode()
            .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
        {
            tracing::warn!(%path, "Skipping symlink in archive");
            continue;
        }

        let is_dir = entry.is_dir();
        let shaped = if is_dir {
            shape.add_dir(&path)
        } else {
            shape.add_file(&path)
        };
        shaped.map_err(|conflict| corrupt(format!("{path}: conflicts with entry {conflict}")))?;

        if let Some(first) = path.segments().next() {
            top_level.insert(first.to_string());
        }
        if !is_dir && path.parent().is_none() {
            top_level_file = true;
        }

        let target = path.resolve_under(dest);
        if is_dir {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| Error::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                corrupt(format!("{path}: {e}"))
            }
            _ => Error::io(&target, e),
        })?;

        if let Some(mode) = entry.unix_mode() {
            set_mode(&target, mode)?;
        }

        files += 1;
    }

    if files == 0 {
        return Err(corrupt("archive contains no files".into()));
    }

    let root = match (layout, top_level.len(), top_level_file) {
        (Layout::Wrapped, 1, false) => top_level
            .into_iter()
            .next()
            .map_or_else(|| dest.to_path_buf(), |dir| dest.join(dir)),
        _ => dest.to_path_buf(),
    };

    tracing::debug!(files, root = %root.display(), ?layout, "Archive unpacked");
    Ok(root)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // Keep the owner able to read and replace the file.
    let permissions = fs::Permissions::from_mode((mode & 0o777) | 0o600);
    fs::set_permissions(path, permissions).map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use updater_test_utils::ZipBuilder;

    const URL: &str = "https://example.com/tree.zip";

    fn unpack_into(payload: &[u8]) -> (TempDir, Result<PathBuf>) {
        unpack_with(payload, Layout::Flat)
    }

    fn unpack_with(payload: &[u8], layout: Layout) -> (TempDir, Result<PathBuf>) {
        let dest = TempDir::new().unwrap();
        let result = unpack(payload, dest.path(), URL, layout, &CancellationToken::new());
        (dest, result)
    }

    fn assert_corrupt(result: Result<PathBuf>) {
        match result {
            Err(Error::CorruptArchive { message, .. }) => {
                assert!(message.contains("conflicts"), "got: {message}")
            }
            other => panic!("expected corrupt archive, got {other:?}"),
        }
    }

    #[test]
    fn strips_single_top_level_directory() {
        let payload = ZipBuilder::wrapped(
            "launcher-main",
            &[("config.json", "{}"), ("mods/a.jar", "jar")],
        )
        .build();

        let (dest, result) = unpack_with(&payload, Layout::Wrapped);
        let root = result.unwrap();

        assert_eq!(root, dest.path().join("launcher-main"));
        assert_eq!(fs::read_to_string(root.join("mods/a.jar")).unwrap(), "jar");
    }

    #[test]
    fn flat_archive_uses_destination_as_root() {
        let payload = ZipBuilder::new()
            .file("config.json", "{}")
            .file("mods/a.jar", "jar")
            .build();

        let (dest, result) = unpack_into(&payload);

        assert_eq!(result.unwrap(), dest.path());
    }

    #[test]
    fn single_top_level_file_is_not_stripped() {
        let payload = ZipBuilder::new().file("only.txt", "x").build();

        let (dest, result) = unpack_with(&payload, Layout::Wrapped);

        assert_eq!(result.unwrap(), dest.path());
    }

    #[test]
    fn flat_layout_keeps_single_top_level_directory() {
        let payload = ZipBuilder::new()
            .file("mods/a.jar", "a")
            .file("mods/b.jar", "b")
            .build();

        let (dest, result) = unpack_into(&payload);
        let root = result.unwrap();

        assert_eq!(root, dest.path());
        assert_eq!(fs::read_to_string(root.join("mods/a.jar")).unwrap(), "a");
    }

    #[test]
    fn file_then_nested_file_is_corrupt() {
        let payload = ZipBuilder::new().file("a", "file").file("a/b", "nested").build();

        let (_dest, result) = unpack_into(&payload);

        assert_corrupt(result);
    }

    #[test]
    fn directory_then_file_of_same_name_is_corrupt() {
        let payload = ZipBuilder::new().dir("data/").file("data", "x").build();

        let (_dest, result) = unpack_into(&payload);

        assert_corrupt(result);
    }

    #[test]
    fn nested_file_then_parent_file_is_corrupt() {
        let payload = ZipBuilder::new().file("a/b", "nested").file("a", "file").build();

        let (_dest, result) = unpack_into(&payload);

        assert_corrupt(result);
    }

    #[test]
    fn file_then_directory_of_same_name_is_corrupt() {
        let payload = ZipBuilder::new().file("cache", "x").dir("cache/").build();

        let (_dest, result) = unpack_into(&payload);

        assert_corrupt(result);
    }

    #[test]
    fn parent_segments_are_rejected() {
        let payload = ZipBuilder::new()
            .file("safe.txt", "ok")
            .file("../../etc/passwd", "pwned")
            .build();

        let (dest, result) = unpack_into(&payload);

        assert!(matches!(result, Err(Error::PathSecurity { .. })), "{result:?}");
        assert!(!dest.path().parent().unwrap().join("etc").exists());
    }

    #[test]
    fn absolute_names_are_rejected() {
        let payload = ZipBuilder::new().file("/etc/passwd", "pwned").build();

        let (_dest, result) = unpack_into(&payload);

        assert!(matches!(result, Err(Error::PathSecurity { .. })), "{result:?}");
    }

    #[test]
    fn garbage_is_corrupt() {
        let (_dest, result) = unpack_into(b"this is not a zip archive");
        assert!(matches!(result, Err(Error::CorruptArchive { .. })), "{result:?}");
    }

    #[test]
    fn empty_archive_is_corrupt() {
        let payload = ZipBuilder::new().dir("launcher-main/").build();

        let (_dest, result) = unpack_into(&payload);

        match result {
            Err(Error::CorruptArchive { message, .. }) => {
                assert!(message.contains("no files"), "got: {message}")
            }
            other => panic!("expected corrupt archive, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_before_first_entry() {
        let payload = ZipBuilder::new().file("a.txt", "a").build();
        let dest = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = unpack(&payload, dest.path(), URL, Layout::Flat, &cancel);

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!dest.path().join("a.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_is_kept() {
        use std::os::unix::fs::PermissionsExt;

        let payload = ZipBuilder::new()
            .file_with_mode("bin/start.sh", "#!/bin/sh\n", 0o755)
            .build();

        let (_dest, result) = unpack_into(&payload);
        let root = result.unwrap();

        let mode = fs::metadata(root.join("bin/start.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
