//! In-memory zip archives shaped like hosted repository downloads.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

enum Entry {
    Dir(String),
    File {
        name: String,
        content: Vec<u8>,
        mode: u32,
    },
}

/// Builds a zip archive entry by entry.
///
/// Names are written verbatim, so hostile archives (absolute names, `..`
/// segments) can be produced for security tests.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<Entry>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive of `files` at the archive root.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        files
            .iter()
            .fold(Self::new(), |builder, (path, content)| builder.file(path, content))
    }

    /// Archive of `files`, all wrapped in one top-level `prefix/` directory
    /// the way hosted branch archives are.
    pub fn wrapped(prefix: &str, files: &[(&str, &str)]) -> Self {
        let mut builder = Self::new().dir(&format!("{prefix}/"));
        for (path, content) in files {
            builder = builder.file(&format!("{prefix}/{path}"), content);
        }
        builder
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(Entry::Dir(name.to_string()));
        self
    }

    pub fn file(self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.file_with_mode(name, content, 0o644)
    }

    pub fn file_with_mode(mut self, name: &str, content: impl AsRef<[u8]>, mode: u32) -> Self {
        self.entries.push(Entry::File {
            name: name.to_string(),
            content: content.as_ref().to_vec(),
            mode,
        });
        self
    }

    /// Serialize the archive.
    pub fn build(self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for entry in self.entries {
            match entry {
                Entry::Dir(name) => writer.add_directory(name, base).unwrap(),
                Entry::File {
                    name,
                    content,
                    mode,
                } => {
                    writer
                        .start_file(name, base.unix_permissions(mode))
                        .unwrap();
                    writer.write_all(&content).unwrap();
                }
            }
        }

        writer.finish().unwrap().into_inner()
    }
}
