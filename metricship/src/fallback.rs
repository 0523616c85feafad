//! Local disk fallback for batches the sink could not accept.
//!
//! Each failed batch becomes one self-contained JSON file holding an array of
//! the exact documents that would have been shipped, so an external tool can
//! replay it into the sink later.
//!
//! # File Layout
//!
//! ```text
//! fallback_dir/
//! ├── failed_flush_<prefix>_<YYYYmmddTHHMMSS.mmm>_<pid>_<seq>.json
//! └── ...
//! ```
//!
//! Files are written to a hidden temporary name first and then linked into
//! place, so a visible file is always complete and an existing file is never
//! overwritten.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;

use crate::document::Document;
use crate::error::{FallbackError, Result};

/// File name prefix shared by all fallback files.
pub const FILE_PREFIX: &str = "failed_flush_";

/// File name extension of fallback files.
pub const FILE_EXTENSION: &str = "json";

/// Upper bound on candidate names tried for a single batch.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Process-wide sequence distinguishing files written within the same millisecond.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Writes and reads fallback files in a single directory.
#[derive(Debug, Clone)]
pub struct FallbackStore {
    dir: PathBuf,
}

impl FallbackStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The fallback directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `documents` to a new, uniquely named file and returns its path.
    ///
    /// `prefix` is the destination prefix the batch was meant for; it becomes
    /// part of the file name.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackError`] if the directory cannot be created, the batch
    /// cannot be serialized, the file cannot be written, or no free name is
    /// found.
    pub fn write_batch(&self, prefix: &str, documents: &[Document]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| FallbackError::DirectoryAccess {
            path: self.dir.clone(),
            source: e,
        })?;

        let data =
            serde_json::to_vec(documents).map_err(|e| FallbackError::Serialize { source: e })?;
        let prefix = sanitize(prefix);
        let pid = std::process::id();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let stamp = Local::now().format("%Y%m%dT%H%M%S%.3f");
            let name = format!("{FILE_PREFIX}{prefix}_{stamp}_{pid}_{seq:06}.{FILE_EXTENSION}");
            let path = self.dir.join(&name);
            if path.exists() {
                continue;
            }

            let tmp_path = self.dir.join(format!(".{name}.tmp"));
            if !write_new(&tmp_path, &data)? {
                continue;
            }

            let published = publish(&tmp_path, &path);
            let _ = fs::remove_file(&tmp_path);
            match published {
                Ok(true) => return Ok(path),
                Ok(false) => continue,
                Err(e) => {
                    return Err(FallbackError::Write { path, source: e }.into());
                }
            }
        }

        Err(FallbackError::NameExhausted {
            dir: self.dir.clone(),
            attempts: MAX_NAME_ATTEMPTS,
        }
        .into())
    }

    /// Lists existing fallback files, sorted by name.
    ///
    /// A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackError::DirectoryAccess`] if the directory exists but
    /// cannot be read.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(FallbackError::DirectoryAccess {
                    path: self.dir.clone(),
                    source: e,
                }
                .into());
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_fallback_file(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Reads the documents stored in a fallback file.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackError`] if the file cannot be read or does not hold a
    /// JSON array of objects.
    pub fn read_batch<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| FallbackError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let documents = serde_json::from_slice(&data).map_err(|e| FallbackError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(documents)
    }
}

/// Returns `true` if `path` looks like a fallback file.
pub fn is_fallback_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(FILE_PREFIX) && path.extension().is_some_and(|ext| ext == FILE_EXTENSION)
}

/// Creates `path` exclusively and writes `data` to it.
///
/// Returns `Ok(false)` if the file already exists.
fn write_new(path: &Path, data: &[u8]) -> Result<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(FallbackError::Write {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
    };

    if let Err(e) = file.write_all(data).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(FallbackError::Write {
            path: path.to_path_buf(),
            source: e,
        }
        .into());
    }
    Ok(true)
}

/// Makes the fully written `tmp` visible at `path` without replacing an existing file.
///
/// Returns `Ok(false)` if `path` appeared in the meantime.
fn publish(tmp: &Path, path: &Path) -> std::io::Result<bool> {
    match fs::hard_link(tmp, path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        // Filesystems without hard links: the pid and sequence in the name
        // already make a collision practically impossible.
        Err(_) if !path.exists() => fs::rename(tmp, path).map(|()| true),
        Err(e) => Err(e),
    }
}

/// Replaces characters that cannot appear in a file name.
fn sanitize(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
