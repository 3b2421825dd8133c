//! The per-directory listing cache.
//!
//! Maps an outbox directory to its entry names, sorted newest first, keyed by
//! the directory's modification time. A changed mtime forces a rescan. The
//! store also invalidates a directory explicitly after its own writes, since
//! mtime granularity can be coarser than the gap between two appends.

use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tracing::debug;

use lemming_contracts::outbox::tick_from_file_name;

/// Default number of directories tracked before `ClearAtCapacity` empties the cache.
pub const DEFAULT_MAX_CACHED_DIRS: usize = 1000;

/// One entry file, known only by name.
///
/// Ordering is `(tick, file_name)`, which matches the lexicographic order of
/// the names on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryName {
    pub tick: u64,
    pub file_name: String,
}

/// A cached directory listing.
#[derive(Debug, Clone)]
pub struct CachedListing {
    pub modified: SystemTime,
    /// Entry names sorted by `(tick, file_name)` descending.
    pub names: Arc<Vec<EntryName>>,
}

/// Decides what to drop before a new directory is added to the cache.
pub trait EvictionPolicy: Send + Sync {
    fn evict(&self, listings: &mut HashMap<PathBuf, CachedListing>);
}

/// Drops every cached listing once `max_dirs` directories are tracked.
#[derive(Debug, Clone, Copy)]
pub struct ClearAtCapacity {
    pub max_dirs: usize,
}

impl Default for ClearAtCapacity {
    fn default() -> Self {
        Self { max_dirs: DEFAULT_MAX_CACHED_DIRS }
    }
}

impl EvictionPolicy for ClearAtCapacity {
    fn evict(&self, listings: &mut HashMap<PathBuf, CachedListing>) {
        if listings.len() >= self.max_dirs {
            debug!(tracked = listings.len(), "listing cache full, clearing");
            listings.clear();
        }
    }
}

/// Mtime-keyed cache of sorted outbox listings. Owned by one store.
pub struct ListingCache {
    listings: Mutex<HashMap<PathBuf, CachedListing>>,
    policy: Box<dyn EvictionPolicy>,
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::new(Box::new(ClearAtCapacity::default()))
    }
}

impl ListingCache {
    pub fn new(policy: Box<dyn EvictionPolicy>) -> Self {
        Self { listings: Mutex::new(HashMap::new()), policy }
    }

    /// Entry names in `dir`, newest first. A missing directory lists as empty.
    pub fn listing(&self, dir: &Path) -> io::Result<Arc<Vec<EntryName>>> {
        let modified = match fs::metadata(dir) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.invalidate(dir);
                return Ok(Arc::new(Vec::new()));
            }
            Err(e) => return Err(e),
        };

        if let Some(cached) = self.lock().get(dir) {
            if cached.modified == modified {
                return Ok(Arc::clone(&cached.names));
            }
        }

        let names = Arc::new(scan(dir)?);

        let mut listings = self.lock();
        if !listings.contains_key(dir) {
            self.policy.evict(&mut listings);
        }
        listings.insert(
            dir.to_path_buf(),
            CachedListing { modified, names: Arc::clone(&names) },
        );
        Ok(names)
    }

    /// Forget `dir` so the next listing rescans it.
    pub fn invalidate(&self, dir: &Path) {
        self.lock().remove(dir);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of directories currently cached.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, CachedListing>> {
        self.listings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// List entry files in `dir`, skipping anything that is not an entry name.
fn scan(dir: &Path) -> io::Result<Vec<EntryName>> {
    let mut names = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = item?;
        let Some(file_name) = item.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if let Some(tick) = tick_from_file_name(&file_name) {
            names.push(EntryName { tick, file_name });
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    debug!(dir = %dir.display(), entries = names.len(), "outbox directory scanned");
    Ok(names)
}
