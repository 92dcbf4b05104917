//! Filesystem layer for the launcher updater
//!
//! Provides validated tree-relative paths, content fingerprints, atomic
//! per-file replacement, the per-tree sync lock and the settings store.

pub mod checksum;
pub mod error;
pub mod io;
pub mod lock;
pub mod path;
pub mod settings;

pub use checksum::Fingerprint;
pub use error::{Error, Result};
pub use io::WriteOptions;
pub use lock::TreeLock;
pub use path::RelativePath;
pub use settings::{FileSettingsStore, MemorySettingsStore, SettingsFormat, SettingsStore};
