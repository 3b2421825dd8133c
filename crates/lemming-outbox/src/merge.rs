//! K-way merge of per-agent listings.
//!
//! Each input stream is already sorted newest first, so the merged order is
//! produced by repeatedly popping the newest head from a max-heap. Only names
//! are compared; no entry file is opened here.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::cache::EntryName;

struct Head<'a> {
    name: &'a EntryName,
    stream: usize,
    pos: usize,
}

impl Ord for Head<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower stream index wins a full tie so the merge is deterministic.
        self.name.cmp(other.name).then_with(|| other.stream.cmp(&self.stream))
    }
}

impl PartialOrd for Head<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head<'_> {}

/// The newest `limit` names across `streams`, as `(stream index, name)`.
///
/// Every further name sharing the tick of the last one taken is included as
/// well, since names alone cannot order entries within a tick.
pub fn merge_newest<'a>(streams: &[&'a [EntryName]], limit: usize) -> Vec<(usize, &'a EntryName)> {
    let mut heap = BinaryHeap::with_capacity(streams.len());
    for (stream, names) in streams.iter().enumerate() {
        if let Some(name) = names.first() {
            heap.push(Head { name, stream, pos: 0 });
        }
    }

    let mut merged: Vec<(usize, &'a EntryName)> = Vec::with_capacity(limit);
    while let Some(Head { name, stream, pos }) = heap.pop() {
        if merged.len() >= limit {
            match merged.last() {
                Some((_, last)) if last.tick == name.tick => {}
                _ => break,
            }
        }

        merged.push((stream, name));
        if let Some(next) = streams[stream].get(pos + 1) {
            heap.push(Head { name: next, stream, pos: pos + 1 });
        }
    }
    merged
}

/// The newest `limit` names of one stream, extended through the boundary tick.
pub fn newest_slice(names: &[EntryName], limit: usize) -> &[EntryName] {
    if limit == 0 {
        return &[];
    }
    if names.len() <= limit {
        return names;
    }

    let boundary = names[limit - 1].tick;
    let extra = names[limit..].iter().take_while(|n| n.tick == boundary).count();
    &names[..limit + extra]
}
