//! `FsOutboxStore`: the filesystem implementation of `OutboxStore`.
//!
//! Layout: `<root>/<agent>/outbox/<tick:08>_<id>.json`, one entry per file.
//! Entry names sort by `(tick, id)`, so every read decides recency from the
//! directory listing alone and opens only the files it returns.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use lemming_contracts::{
    agent::AgentId,
    error::{LemmingError, LemmingResult},
    outbox::{tick_from_file_name, OutboxEntry},
};
use lemming_core::{persist::write_atomic, traits::OutboxStore};

use crate::cache::{EntryName, ListingCache};
use crate::merge::{merge_newest, newest_slice};

/// Name of the per-agent outbox directory.
pub const OUTBOX_DIR: &str = "outbox";

/// Prefix of in-flight temp files. Never matches an entry name.
const TEMP_PREFIX: &str = ".tmp-";

/// File-backed outbox store rooted at the agents directory.
pub struct FsOutboxStore {
    root: PathBuf,
    cache: ListingCache,
}

impl FsOutboxStore {
    /// A store over `<root>/<agent>/outbox` with the default listing cache.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_cache(root, ListingCache::default())
    }

    pub fn with_cache(root: impl Into<PathBuf>, cache: ListingCache) -> Self {
        Self { root: root.into(), cache }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    pub fn outbox_dir(&self, agent: &AgentId) -> PathBuf {
        self.root.join(agent.as_str()).join(OUTBOX_DIR)
    }

    fn listing(&self, agent: &AgentId) -> LemmingResult<(PathBuf, Arc<Vec<EntryName>>)> {
        agent.validate()?;
        let dir = self.outbox_dir(agent);
        let names = self.cache.listing(&dir).map_err(|e| LemmingError::OutboxRead {
            reason: format!("listing {}: {}", dir.display(), e),
        })?;
        Ok((dir, names))
    }

    /// Read one entry file. Unreadable or malformed files are skipped.
    fn load(&self, dir: &Path, name: &EntryName) -> Option<OutboxEntry> {
        let path = dir.join(&name.file_name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "entry vanished before read");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable outbox entry");
                return None;
            }
        };

        match serde_json::from_slice::<OutboxEntry>(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed outbox entry");
                None
            }
        }
    }

    /// Load `names` from `dir` in order, stopping once `limit` entries are held
    /// and the listing has moved past their oldest tick.
    fn load_newest(&self, dir: &Path, names: &[EntryName], limit: usize, since: Option<u64>) -> Vec<OutboxEntry> {
        let mut entries = Vec::with_capacity(limit.min(names.len()));
        let mut boundary: Option<u64> = None;

        for name in names {
            if since.is_some_and(|s| name.tick < s) {
                break;
            }
            if boundary.is_some_and(|b| name.tick < b) {
                break;
            }
            if let Some(entry) = self.load(dir, name) {
                entries.push(entry);
                if boundary.is_none() && entries.len() >= limit {
                    boundary = Some(name.tick);
                }
            }
        }
        entries
    }
}

fn sort_newest_first(entries: &mut [OutboxEntry]) {
    entries.sort_by(|a, b| b.recency_cmp(a));
}

impl OutboxStore for FsOutboxStore {
    fn append(&self, agent: &AgentId, entry: &OutboxEntry) -> LemmingResult<()> {
        agent.validate()?;
        let write_err = |reason: String| LemmingError::OutboxWrite { agent: agent.to_string(), reason };

        let dir = self.outbox_dir(agent);
        let file_name = entry.file_name();
        let target = dir.join(&file_name);
        let tmp = dir.join(format!("{}{}", TEMP_PREFIX, file_name));
        let body = serde_json::to_vec_pretty(entry).map_err(|e| write_err(e.to_string()))?;

        match write_atomic(&tmp, &target, &body) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&dir).map_err(|e| write_err(format!("creating {}: {}", dir.display(), e)))?;
                write_atomic(&tmp, &target, &body).map_err(|e| write_err(e.to_string()))?;
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(write_err(e.to_string()));
            }
        }

        self.cache.invalidate(&dir);
        debug!(agent = %agent, tick = entry.tick, file = %file_name, "outbox entry appended");
        Ok(())
    }

    fn read_recent(&self, agent: &AgentId, limit: usize, since_tick: Option<u64>) -> LemmingResult<Vec<OutboxEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let (dir, names) = self.listing(agent)?;
        let mut entries = self.load_newest(&dir, &names, limit, since_tick);
        sort_newest_first(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    fn read_recent_merged(
        &self,
        agents: &[AgentId],
        limit: usize,
        since_tick: Option<u64>,
    ) -> LemmingResult<Vec<OutboxEntry>> {
        if limit == 0 || agents.is_empty() {
            return Ok(Vec::new());
        }

        let mut dirs: Vec<PathBuf> = Vec::with_capacity(agents.len());
        let mut listings: Vec<Arc<Vec<EntryName>>> = Vec::with_capacity(agents.len());
        for agent in agents {
            let (dir, names) = self.listing(agent)?;
            if dirs.contains(&dir) {
                continue;
            }
            dirs.push(dir);
            listings.push(names);
        }

        // Names at or above `since`, per agent.
        let fresh: Vec<&[EntryName]> = listings
            .iter()
            .map(|names| match since_tick {
                Some(since) => {
                    let keep = names.iter().take_while(|n| n.tick >= since).count();
                    &names[..keep]
                }
                None => &names[..],
            })
            .collect();

        // Unloadable candidates widen the budget until `limit` entries load or
        // every listing is drained.
        let mut budget = limit;
        loop {
            let streams: Vec<&[EntryName]> = fresh.iter().map(|names| newest_slice(names, budget)).collect();
            let candidates = merge_newest(&streams, budget);
            let drained = candidates.len() < budget;

            let mut entries = Vec::with_capacity(candidates.len());
            let mut failed = 0usize;
            for (stream, name) in &candidates {
                match self.load(&dirs[*stream], name) {
                    Some(entry) => entries.push(entry),
                    None => failed += 1,
                }
            }
            debug!(
                agents = agents.len(),
                candidates = candidates.len(),
                failed,
                limit,
                "merged outbox read"
            );

            if failed == 0 || entries.len() >= limit || drained {
                sort_newest_first(&mut entries);
                entries.truncate(limit);
                return Ok(entries);
            }
            budget += failed;
        }
    }

    fn count(&self, agent: &AgentId) -> LemmingResult<usize> {
        let (_, names) = self.listing(agent)?;
        Ok(names.len())
    }

    fn prune(&self, current_tick: u64, max_age_ticks: u64) -> LemmingResult<usize> {
        let mut removed = 0usize;
        let mut failed = 0usize;

        for agent in self.known_agents()? {
            let dir = self.outbox_dir(&agent);
            let items = match fs::read_dir(&dir) {
                Ok(items) => items,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "cannot list outbox for cleanup");
                    failed += 1;
                    continue;
                }
            };

            for item in items {
                let item = match item {
                    Ok(item) => item,
                    Err(e) => {
                        error!(dir = %dir.display(), error = %e, "cannot read outbox directory entry");
                        failed += 1;
                        continue;
                    }
                };
                let file_name = item.file_name();
                let Some(tick) = file_name.to_str().and_then(tick_from_file_name) else {
                    continue;
                };
                if current_tick.saturating_sub(tick) <= max_age_ticks {
                    continue;
                }

                match fs::remove_file(item.path()) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        error!(path = %item.path().display(), error = %e, "failed to remove expired entry");
                        failed += 1;
                    }
                }
            }

            self.cache.invalidate(&dir);
        }

        info!(current_tick, max_age_ticks, removed, failed, "outbox retention sweep");
        Ok(removed)
    }

    fn known_agents(&self) -> LemmingResult<Vec<AgentId>> {
        let items = match fs::read_dir(&self.root) {
            Ok(items) => items,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LemmingError::OutboxRead {
                    reason: format!("listing {}: {}", self.root.display(), e),
                })
            }
        };

        let mut agents = Vec::new();
        for item in items {
            let item = item.map_err(|e| LemmingError::OutboxRead { reason: e.to_string() })?;
            if !item.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match AgentId::parse(name) {
                Ok(id) if !id.is_template() && !id.as_str().starts_with('.') => agents.push(id),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "ignoring directory that is not an agent id"),
            }
        }
        agents.sort();
        Ok(agents)
    }
}
