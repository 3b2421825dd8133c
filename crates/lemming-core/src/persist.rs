//! Crash-safe file writes shared by the file-backed collaborators.
//!
//! Every write goes to a sibling temp file that is flushed and renamed onto
//! the target, so readers see either the old or the new content.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

/// Write `body` to `tmp`, flush it, then rename it onto `target`.
///
/// `tmp` must live in the same directory as `target`.
pub fn write_atomic(tmp: &Path, target: &Path, body: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(body)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, target)
}

/// Pretty-serialize `value` and replace `path` with it, creating parents.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    write_atomic(&path.with_extension("json.tmp"), path, &body)
}
