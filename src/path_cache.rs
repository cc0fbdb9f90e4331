//! In-memory mapping from (inode, device) to (parent, basename), used to reconstruct absolute
//! paths for events that only carry a parent FileKey and a basename.

use std::collections::HashMap;

use log::warn;

use crate::filekey::FileKey;

/// Cycle/corruption guard: path-cache entries are installed opportunistically as CREATE events
/// arrive rather than from a single filesystem walk, so a parent chain may be incomplete or,
/// in a corrupted/adversarial scenario, cyclic. This bound guarantees `reconstruct` terminates.
const MAX_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct PathCacheEntry {
    pub parent: FileKey,
    pub basename: String,
}

/// Maps a [`FileKey`] to its parent and basename.
///
/// Always contains the synthetic root entry `FileKey::ROOT -> (ROOT, "")`, which terminates
/// parent-chain walks in [`PathCache::reconstruct`].
#[derive(Debug, Default)]
pub struct PathCache {
    entries: HashMap<FileKey, PathCacheEntry>,
}

impl PathCache {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            FileKey::ROOT,
            PathCacheEntry {
                parent: FileKey::ROOT,
                basename: String::new(),
            },
        );
        Self { entries }
    }

    /// Inserts `key -> (parent, basename)` unless `key` is already present (idempotent).
    pub fn put(&mut self, key: FileKey, parent: FileKey, basename: impl Into<String>) {
        self.entries.entry(key).or_insert_with(|| PathCacheEntry {
            parent,
            basename: basename.into(),
        });
    }

    pub fn get(&self, key: &FileKey) -> Option<&PathCacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &FileKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes `key`. No-op if absent.
    ///
    /// Per the current contract (§9 open question), DELETE events do not call this: the entry
    /// is kept around for one more event so a DELETE can still reconstruct its path. Callers
    /// that do want eviction (e.g. a future two-phase delete) use this directly.
    pub fn delete(&mut self, key: &FileKey) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reconstructs the absolute path of an object identified by `(parent, basename)`.
    ///
    /// Walks the parent chain starting at `parent`, bounded by [`MAX_DEPTH`] steps, then joins
    /// the collected basenames root-to-leaf with `/`. Falls back to `basename` alone (logging a
    /// warning) if `parent` is not yet known to the cache.
    pub fn reconstruct(&self, parent: FileKey, basename: &str) -> String {
        let Some(mut current) = self.entries.get(&parent) else {
            warn!("path cache miss for parent key {:?}", parent);
            return basename.to_owned();
        };
        let mut current_key = parent;

        let mut segments = Vec::new();
        for _ in 0..MAX_DEPTH {
            if current_key == FileKey::ROOT {
                break;
            }
            segments.push(current.basename.clone());
            let next_key = current.parent;
            match self.entries.get(&next_key) {
                Some(next) => {
                    current = next;
                    current_key = next_key;
                }
                None => break,
            }
        }
        segments.reverse();
        segments.push(basename.to_owned());
        join_absolute(&segments)
    }
}

/// Joins `segments` into a single absolute path, collapsing duplicate separators.
///
/// A top-level `D`/`IF` directive's basename is the argument as given (§4.2 step 4), which is
/// itself an absolute path (e.g. `"/tmp/w"`), not a bare name. Naively prepending `/` before
/// joining would double that leading slash; stripping each segment's own leading/trailing `/`
/// before joining keeps the result as a single clean absolute path, the way `filepath.Join`
/// does for the original implementation.
fn join_absolute(segments: &[String]) -> String {
    let cleaned: Vec<&str> = segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", cleaned.join("/"))
}
