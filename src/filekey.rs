//! Identity of a filesystem object as seen by the kernel tracked-file hash.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Uniquely identifies a file on a host by inode number and device id.
///
/// The zero key `FileKey { inode: 0, device: 0 }` is reserved as the synthetic root of the
/// path cache (see [`crate::path_cache`]) and must never be produced by a real `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileKey {
    pub inode: u64,
    pub device: u64,
}

impl FileKey {
    pub const ROOT: FileKey = FileKey {
        inode: 0,
        device: 0,
    };

    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }

    /// Resolves `path` via `stat` and encodes its device the way the kernel eBPF side expects.
    pub fn stat(path: &Path) -> std::io::Result<FileKey> {
        let metadata = fs::symlink_metadata(path)?;
        Ok(FileKey {
            inode: metadata.ino(),
            device: encode_dev(metadata.dev()),
        })
    }
}

/// Encodes a raw `st_dev` the way the Linux kernel's `new_encode_dev` does.
///
/// This is load-bearing: the kernel eBPF program keys its tracked-file hash on this exact
/// encoding, not on the raw `st_dev` value. A simpler two-field split (major, minor stored
/// separately) was tried in an earlier revision and is incompatible with the kernel side; do
/// not reintroduce it.
pub fn encode_dev(raw_dev: u64) -> u64 {
    let major = (raw_dev >> 8) & 0xfff;
    let minor = (raw_dev & 0xff) | ((raw_dev >> 12) & 0xfff00);
    (major << 20) | minor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_key_is_zero() {
        assert_eq!(FileKey::ROOT, FileKey::new(0, 0));
    }

    #[test]
    fn encode_dev_matches_kernel_convention() {
        // major=8 (sd), minor=1 (sda1) packs as (8 << 20) | 1
        let raw = (8u64 << 8) | 1;
        assert_eq!(encode_dev(raw), (8u64 << 20) | 1);
    }

    #[test]
    fn encode_dev_handles_wide_minor() {
        // minor values above 8 bits spill into the high bits of raw_dev per glibc's
        // makedev/major/minor macros; verify the composite minor round-trips.
        let major: u64 = 259; // nvme-style major
        let minor: u64 = 0x1234;
        let raw = ((major & 0xfff) << 8) | (minor & 0xff) | ((minor & 0xfff00) << 12);
        let encoded = encode_dev(raw);
        assert_eq!(encoded, (major << 20) | minor);
    }

    #[test]
    fn stat_resolves_real_path() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let key = FileKey::stat(tmp.path()).unwrap();
        assert_ne!(key, FileKey::ROOT);
    }

    #[test]
    fn stat_missing_path_is_error() {
        assert!(FileKey::stat(Path::new("/nonexistent/path/for/watchd-test")).is_err());
    }
}
