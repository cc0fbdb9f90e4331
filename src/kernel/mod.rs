//! The kernel-resident side of `watchd`: a loaded eBPF object, its tracked-file hash and ring
//! buffer, and the LSM/tracing links attached to it (§4.4). This module treats the eBPF program
//! bodies themselves as a black box; it only owns their user-space lifecycle.

mod loader;
mod ring_source;

pub use loader::{AttachError, Loader, LoadError};
pub use ring_source::KernelRingSource;

use crate::config::TrackedFileValue;
use crate::filekey::FileKey;

#[derive(Debug, thiserror::Error)]
pub enum KernelMapError {
    #[error("kernel map operation failed: {0}")]
    Backend(String),
}

/// Abstraction over the kernel tracked-file hash, so [`crate::core::EventCore`] can be exercised
/// in tests without a loaded eBPF object.
pub trait TrackedFileMap {
    fn put(&mut self, key: FileKey, value: TrackedFileValue) -> Result<(), KernelMapError>;
    fn delete(&mut self, key: FileKey) -> Result<(), KernelMapError>;
}

/// In-memory stand-in used by tests and by `watchd validate`, which compiles a policy without
/// attaching to the kernel at all.
#[derive(Debug, Default)]
pub struct FakeTrackedFileMap {
    entries: std::collections::HashMap<FileKey, TrackedFileValue>,
}

impl FakeTrackedFileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &FileKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl TrackedFileMap for FakeTrackedFileMap {
    fn put(&mut self, key: FileKey, value: TrackedFileValue) -> Result<(), KernelMapError> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: FileKey) -> Result<(), KernelMapError> {
        self.entries.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_map_put_and_delete() {
        let mut map = FakeTrackedFileMap::new();
        let key = FileKey::new(1, 1);
        map.put(key, 1).unwrap();
        assert!(map.contains(&key));
        map.delete(key).unwrap();
        assert!(!map.contains(&key));
    }
}
