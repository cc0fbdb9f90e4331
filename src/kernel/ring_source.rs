//! Adapts the non-blocking `aya` ring buffer into the blocking [`RecordSource`] the consumer
//! loop expects: keep polling until a record shows up or shutdown is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aya::maps::{MapData, RingBuf};

use crate::ring_loop::{ReadResult, RecordSource};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct KernelRingSource {
    ring_buf: RingBuf<MapData>,
    shutdown: Arc<AtomicBool>,
}

impl KernelRingSource {
    pub fn new(ring_buf: RingBuf<MapData>, shutdown: Arc<AtomicBool>) -> Self {
        Self { ring_buf, shutdown }
    }
}

impl RecordSource for KernelRingSource {
    fn read(&mut self) -> ReadResult {
        loop {
            if let Some(item) = self.ring_buf.next() {
                return ReadResult::Record(item.to_vec());
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return ReadResult::Closed;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
