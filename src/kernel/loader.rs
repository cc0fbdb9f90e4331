//! Loads the compiled eBPF object, attaches its five hooks, and exposes its tracked-file hash
//! and ring buffer map to the rest of the process.
//!
//! The object itself (`watchd.bpf.o`, read from disk by the caller and handed in as bytes) is
//! out of scope here: this module only manages its user-space lifecycle — load, attach, and
//! release, each with one owner and one release site, reversed on the way down (§9).

use aya::maps::{HashMap as AyaHashMap, MapData, RingBuf};
use aya::programs::{Lsm, TracePoint};
use aya::{Btf, Ebpf};
use thiserror::Error;

// Both handles below come from `Ebpf::take_map`, which removes the map from the loaded object
// and hands back owned `MapData` rather than a borrow. Without this, the tracked-file map and
// the ring buffer reader couldn't be held open at once: both would otherwise borrow `Loader`
// mutably through `Ebpf::map_mut`, and the consumer needs both simultaneously (one to admit
// CREATEs, one to read records).

use super::{KernelMapError, TrackedFileMap};
use crate::config::TrackedFileValue;
use crate::filekey::FileKey;

const POLICY_MAP_NAME: &str = "POLICY_TABLE";
const RING_BUF_NAME: &str = "EVENTS";

const LSM_HOOKS: &[&str] = &["inode_create", "path_rmdir", "path_unlink"];
const TRACE_HOOKS: &[&str] = &["vfs_write_entry", "vfs_write"];

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to load eBPF object: {0}")]
    Ebpf(#[from] aya::EbpfError),
    #[error("map '{0}' not found in eBPF object")]
    MissingMap(&'static str),
    #[error("map '{0}' has the wrong type")]
    WrongMapType(&'static str, #[source] aya::maps::MapError),
}

#[derive(Error, Debug)]
#[error("attaching eBPF programs: {0} of {1} hooks failed:\n{2}")]
pub struct AttachError(pub usize, pub usize, pub String);

/// Owns the loaded eBPF object and its attached links; the maps are taken out of it (see
/// [`Loader::ring_buf`] and [`Loader::tracked_file_map`]) so the caller can hold both open at
/// once without aliasing this struct.
///
/// Released in reverse order of acquisition: the taken-out maps close when the caller drops
/// them, then dropping `Loader` drops every entry in `links` (detaching each hook) followed by
/// the loaded object itself.
pub struct Loader {
    ebpf: Ebpf,
    links: Vec<Box<dyn LinkHandle>>,
}

/// Type-erases the differing `Lsm`/`TracePoint` link handles so `Loader` can hold them
/// uniformly and keep them alive together. Each concrete link type detaches its hook on drop,
/// so a `Box<dyn LinkHandle>` in this vec must live until `Loader` itself is dropped.
trait LinkHandle {}
impl<T> LinkHandle for T {}

impl Loader {
    /// Loads the eBPF object from `object_bytes`, which the caller has already read from disk.
    /// The object itself is compiled separately; this function only deals with what the `aya`
    /// loader does with the bytes at runtime.
    pub fn load(object_bytes: &[u8]) -> Result<Self, LoadError> {
        let ebpf = Ebpf::load(object_bytes)?;
        Ok(Self {
            ebpf,
            links: Vec::new(),
        })
    }

    /// Attaches all five LSM/tracing hooks. Per the original semantics, at least one successful
    /// attachment is enough to proceed; only a total failure is fatal. Every individual failure
    /// is still collected and surfaced through [`AttachError`] for logging even on partial
    /// success, so the caller can `warn!` about degraded coverage.
    pub fn attach(&mut self) -> Result<Option<AttachError>, AttachError> {
        let total = LSM_HOOKS.len() + TRACE_HOOKS.len();
        let btf = match Btf::from_sys_fs() {
            Ok(btf) => btf,
            Err(err) => return Err(AttachError(total, total, err.to_string())),
        };
        let mut failures = Vec::new();

        for hook in LSM_HOOKS {
            match self.attach_lsm(hook, &btf) {
                Ok(()) => {}
                Err(err) => failures.push(format!("{hook}: {err}")),
            }
        }
        for hook in TRACE_HOOKS {
            match self.attach_trace(hook, &btf) {
                Ok(()) => {}
                Err(err) => failures.push(format!("{hook}: {err}")),
            }
        }

        if self.links.is_empty() {
            return Err(AttachError(failures.len(), total, failures.join("\n")));
        }
        if failures.is_empty() {
            Ok(None)
        } else {
            Ok(Some(AttachError(failures.len(), total, failures.join("\n"))))
        }
    }

    /// Takes the owned link out of `program` and stores it in `self.links` so it outlives this
    /// call. `aya` detaches a hook the instant its link is dropped, so discarding the link here
    /// (as an earlier revision did with `let _ = ...`) would detach every hook immediately after
    /// attaching it; keeping it in `Loader` ties its lifetime to the process, released only when
    /// `Loader` itself is dropped (§5, §9).
    fn attach_lsm(&mut self, name: &str, btf: &Btf) -> anyhow::Result<()> {
        let program: &mut Lsm = self.ebpf.program_mut(name).ok_or_else(|| {
            anyhow::anyhow!("program '{name}' missing from eBPF object")
        })?.try_into()?;
        program.load(name, btf)?;
        let link_id = program.attach()?;
        let link = program.take_link(link_id)?;
        self.links.push(Box::new(link));
        Ok(())
    }

    fn attach_trace(&mut self, name: &str, _btf: &Btf) -> anyhow::Result<()> {
        let program: &mut TracePoint = self.ebpf.program_mut(name).ok_or_else(|| {
            anyhow::anyhow!("program '{name}' missing from eBPF object")
        })?.try_into()?;
        program.load()?;
        let link_id = program.attach("syscalls", name)?;
        let link = program.take_link(link_id)?;
        self.links.push(Box::new(link));
        Ok(())
    }

    /// Takes ownership of the ring buffer map, consuming it out of the loaded object. Must be
    /// called after [`Loader::attach`], and at most once (the map is gone from `Loader` after).
    pub fn ring_buf(&mut self) -> Result<RingBuf<MapData>, LoadError> {
        let map = self
            .ebpf
            .take_map(RING_BUF_NAME)
            .ok_or(LoadError::MissingMap(RING_BUF_NAME))?;
        RingBuf::try_from(map).map_err(|e| LoadError::WrongMapType(RING_BUF_NAME, e))
    }

    /// Takes ownership of the kernel tracked-file hash, consuming it out of the loaded object.
    /// At most one call succeeds; a second returns `MissingMap`.
    pub fn tracked_file_map(&mut self) -> Result<AyaTrackedFileMap, LoadError> {
        let map = self
            .ebpf
            .take_map(POLICY_MAP_NAME)
            .ok_or(LoadError::MissingMap(POLICY_MAP_NAME))?;
        let inner: AyaHashMap<MapData, RawFileKey, TrackedFileValue> =
            AyaHashMap::try_from(map).map_err(|e| LoadError::WrongMapType(POLICY_MAP_NAME, e))?;
        Ok(AyaTrackedFileMap { inner })
    }
}

/// Mirrors the kernel-side `struct tracked_file_key { u64 inode; u64 dev; }` exactly, so it can
/// be used directly as the `aya` hash map key without any repacking.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawFileKey {
    inode: u64,
    device: u64,
}

// SAFETY: plain data, no padding (two u64 fields), matches the kernel-side layout byte for byte.
unsafe impl aya::Pod for RawFileKey {}

impl From<FileKey> for RawFileKey {
    fn from(key: FileKey) -> Self {
        RawFileKey {
            inode: key.inode,
            device: key.device,
        }
    }
}

pub struct AyaTrackedFileMap {
    inner: AyaHashMap<MapData, RawFileKey, TrackedFileValue>,
}

impl TrackedFileMap for AyaTrackedFileMap {
    fn put(&mut self, key: FileKey, value: TrackedFileValue) -> Result<(), KernelMapError> {
        self.inner
            .insert(RawFileKey::from(key), value, 0)
            .map_err(|e| KernelMapError::Backend(e.to_string()))
    }

    fn delete(&mut self, key: FileKey) -> Result<(), KernelMapError> {
        self.inner
            .remove(&RawFileKey::from(key))
            .map_err(|e| KernelMapError::Backend(e.to_string()))
    }
}
