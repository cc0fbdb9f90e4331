//! Decodes the fixed-layout little-endian record the kernel writes into the ring buffer (§4.5).

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::filekey::FileKey;

/// Byte-for-byte mirror of the kernel-side event struct. Field order and width are
/// load-bearing; this must never be reordered or resized without a matching kernel change.
///
/// The fields above sum to 319 bytes; `_pad` makes the struct exactly 320 bytes with no
/// implicit trailing padding, matching the kernel's 320-byte record (§6). zerocopy's
/// `IntoBytes` derive rejects any type with compiler-inserted padding, so this byte must be
/// explicit rather than left for the `#[repr(C)]` layout to insert on its own.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RawEvent {
    parent_inode: u64,
    parent_dev: u64,
    inode: u64,
    dev: u64,
    uid: u32,
    change_type: u32,
    tty_index: u32,
    tty_major: i32,
    before_size: i64,
    after_size: i64,
    filename: [u8; 255],
    _pad: [u8; 1],
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("short read: got {got} bytes, need exactly {want}")]
    ShortRead { got: usize, want: usize },
    #[error("trailing bytes after record: got {got} bytes, need exactly {want}")]
    TrailingBytes { got: usize, want: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Create,
    Modify { bytes: u32 },
    Delete,
    Unknown,
}

impl ChangeType {
    /// Decodes the kernel's packed tag: low nibble is the code, the rest is a byte-count hint
    /// that's only meaningful for MODIFY.
    fn from_tag(tag: u32) -> Self {
        match tag & 0xF {
            1 => ChangeType::Create,
            2 => ChangeType::Modify { bytes: tag >> 4 },
            3 => ChangeType::Delete,
            _ => ChangeType::Unknown,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Create => write!(f, "CREATE"),
            ChangeType::Modify { bytes } => write!(f, "MODIFY [{bytes} bytes]"),
            ChangeType::Delete => write!(f, "DELETE"),
            ChangeType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A decoded, typed event ready for [`crate::core::EventCore::process`].
#[derive(Debug, Clone)]
pub struct Event {
    pub parent: FileKey,
    pub target: FileKey,
    pub uid: u32,
    pub change_type: ChangeType,
    pub tty_major: i32,
    pub tty_index: u32,
    pub before_size: i64,
    pub after_size: i64,
    pub filename: String,
}

/// Decodes `bytes` into an [`Event`]. The record must be exactly `size_of::<RawEvent>()` bytes;
/// a short or overlong buffer is a [`DecodeError`] rather than a silent truncation, since a
/// malformed record likely means the wire layout drifted from the kernel side.
pub fn decode(bytes: &[u8]) -> Result<Event, DecodeError> {
    let want = std::mem::size_of::<RawEvent>();
    if bytes.len() < want {
        return Err(DecodeError::ShortRead {
            got: bytes.len(),
            want,
        });
    }
    if bytes.len() > want {
        return Err(DecodeError::TrailingBytes {
            got: bytes.len(),
            want,
        });
    }
    let raw = RawEvent::read_from_bytes(bytes).expect("length checked above");

    let nul = raw.filename.iter().position(|&b| b == 0).unwrap_or(255);
    let filename = String::from_utf8_lossy(&raw.filename[..nul]).into_owned();

    Ok(Event {
        parent: FileKey::new(raw.parent_inode, raw.parent_dev),
        target: FileKey::new(raw.inode, raw.dev),
        uid: raw.uid,
        change_type: ChangeType::from_tag(raw.change_type),
        tty_major: raw.tty_major,
        tty_index: raw.tty_index,
        before_size: raw.before_size,
        after_size: raw.after_size,
        filename,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes(change_type: u32, filename: &str) -> Vec<u8> {
        let mut name = [0u8; 255];
        name[..filename.len()].copy_from_slice(filename.as_bytes());
        let raw = RawEvent {
            parent_inode: 10,
            parent_dev: 1,
            inode: 20,
            dev: 1,
            uid: 1000,
            change_type,
            tty_index: 0,
            tty_major: -1,
            before_size: 0,
            after_size: 42,
            filename: name,
            _pad: [0],
        };
        zerocopy::IntoBytes::as_bytes(&raw).to_vec()
    }

    #[test]
    fn decodes_create_event() {
        let bytes = sample_bytes(1, "a.txt");
        let event = decode(&bytes).unwrap();
        assert_eq!(event.change_type, ChangeType::Create);
        assert_eq!(event.filename, "a.txt");
        assert_eq!(event.target, FileKey::new(20, 1));
        assert_eq!(event.parent, FileKey::new(10, 1));
    }

    #[test]
    fn decodes_modify_with_byte_hint() {
        // low nibble = 2 (MODIFY), upper bits = 128 (bytes written)
        let bytes = sample_bytes(2 | (128 << 4), "a.txt");
        let event = decode(&bytes).unwrap();
        assert_eq!(event.change_type, ChangeType::Modify { bytes: 128 });
        assert_eq!(event.change_type.to_string(), "MODIFY [128 bytes]");
    }

    #[test]
    fn decodes_unknown_code_without_crashing() {
        let bytes = sample_bytes(9, "a.txt");
        let event = decode(&bytes).unwrap();
        assert_eq!(event.change_type, ChangeType::Unknown);
    }

    #[test]
    fn short_read_is_an_error() {
        let bytes = sample_bytes(1, "a.txt");
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, DecodeError::ShortRead { .. }));
    }

    #[test]
    fn trailing_bytes_is_an_error() {
        let mut bytes = sample_bytes(1, "a.txt");
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::TrailingBytes { .. }));
    }

    #[test]
    fn filename_is_nul_trimmed() {
        let bytes = sample_bytes(1, "short");
        let event = decode(&bytes).unwrap();
        assert_eq!(event.filename.len(), 5);
    }
}
