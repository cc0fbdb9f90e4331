//! Event Core: classifies, filters, enriches, and reconstructs the path for a decoded event,
//! mutating the kernel map and path cache on CREATE (§4.6).

use std::fs;
use std::net::UdpSocket;

use chrono::Local;
use log::warn;

use crate::event::{ChangeType, Event};
use crate::filter::FilterList;
use crate::kernel::TrackedFileMap;
use crate::path_cache::PathCache;
use crate::payload::Payload;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";
const DUMMY_DIAL_TARGET: &str = "8.8.8.8:80";
const TTY_DRIVERS_PATH: &str = "/proc/tty/drivers";

pub struct EventCore<'a> {
    pub filters: &'a FilterList,
    pub path_cache: &'a mut PathCache,
    pub tracked: &'a mut dyn TrackedFileMap,
}

impl<'a> EventCore<'a> {
    pub fn new(
        filters: &'a FilterList,
        path_cache: &'a mut PathCache,
        tracked: &'a mut dyn TrackedFileMap,
    ) -> Self {
        Self {
            filters,
            path_cache,
            tracked,
        }
    }

    /// Returns `(payload, accepted)`. `payload` is only meaningful when `accepted` is true.
    pub fn process(&mut self, event: &Event) -> (Payload, bool) {
        if self.filters.is_filtered(&event.filename) {
            return (empty_payload(), false);
        }

        if matches!(event.change_type, ChangeType::Create) {
            if let Err(err) = self.tracked.put(event.target, 1) {
                warn!("kernel map put failed for {:?}: {}", event.target, err);
            }
            self.path_cache
                .put(event.target, event.parent, event.filename.clone());
        }

        let file_path = self
            .path_cache
            .reconstruct(event.parent, &event.filename);

        let payload = Payload {
            from_ip: host_ip(),
            tty: resolve_tty(event.tty_major, event.tty_index),
            file_path,
            change_type: event.change_type.to_string(),
            username: resolve_username(event.uid),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            checksum: "dummy".to_string(),
            file_size: event.after_size,
            before_size: event.before_size,
            after_size: event.after_size,
        };

        (payload, true)
    }
}

fn empty_payload() -> Payload {
    Payload {
        from_ip: String::new(),
        tty: String::new(),
        file_path: String::new(),
        change_type: String::new(),
        username: String::new(),
        timestamp: String::new(),
        checksum: String::new(),
        file_size: 0,
        before_size: 0,
        after_size: 0,
    }
}

fn resolve_username(uid: u32) -> String {
    users::get_user_by_uid(uid)
        .map(|user| user.name().to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Resolves a tty major/index pair to `<driver>/<index>` by scanning `/proc/tty/drivers` for the
/// row whose major column matches. `tty_major == -1` means the event has no controlling tty.
fn resolve_tty(tty_major: i32, tty_index: u32) -> String {
    if tty_major < 0 {
        return "None".to_string();
    }
    let contents = match fs::read_to_string(TTY_DRIVERS_PATH) {
        Ok(contents) => contents,
        Err(err) => {
            warn!("cannot read {}: {}", TTY_DRIVERS_PATH, err);
            return "Unknown".to_string();
        }
    };
    for line in contents.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        // name  /dev/name  major  minor-range  type
        if columns.len() < 3 {
            continue;
        }
        if columns[2].parse::<i32>() == Ok(tty_major) {
            return format!("{}/{}", columns[0], tty_index);
        }
    }
    "Unknown".to_string()
}

/// Source address the kernel would pick for a UDP packet to a well-known external host, without
/// sending any traffic (`connect` on UDP just binds a route, no packet is emitted).
fn host_ip() -> String {
    let attempt = || -> std::io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(DUMMY_DIAL_TARGET)?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    attempt().unwrap_or_default()
}
