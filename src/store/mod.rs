//! Generation-tagged disk storage
//!
//! Both store kinds share one discipline: a directory per generation under a
//! common root, one JSON file per key, and wholesale temp-file-plus-rename
//! writes so a concurrent reader never observes a torn entry.

mod durable;
mod ephemeral;

pub use durable::{DurableStore, StoreError};
pub use ephemeral::{CacheError, EphemeralCache, LAST_FETCH_KEY};

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// File name for a key: SHA-256 hex digest, since keys are URLs
pub(crate) fn entry_file_name(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{}.json", hex::encode(digest))
}

/// Counter distinguishing temp files of concurrent same-key writers
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes `contents` to `path` atomically
///
/// The temp file name is unique per write, so two concurrent writers of the
/// same key each rename a fully written file; the entry is always one
/// writer's complete output.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp.{}.{}", std::process::id(), seq));
    fs::write(&tmp, contents)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

/// Lists generation names present under `root` for directories named
/// `<prefix><generation>`
pub(crate) fn list_generations(root: &Path, prefix: &str) -> Vec<String> {
    let mut generations = Vec::new();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return generations,
    };
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(generation) = name.to_string_lossy().strip_prefix(prefix) {
            generations.push(generation.to_string());
        }
    }
    generations.sort();
    generations
}

/// Removes one generation directory entirely
pub(crate) fn remove_generation(root: &Path, prefix: &str, generation: &str) -> io::Result<()> {
    let dir = generation_dir(root, prefix, generation);
    match fs::remove_dir_all(&dir) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Path of one generation's directory
pub(crate) fn generation_dir(root: &Path, prefix: &str, generation: &str) -> PathBuf {
    root.join(format!("{}{}", prefix, generation))
}
