//! Single-consumer loop: read a raw record, decode, process, forward (§4.7).

use log::{error, warn};

use crate::core::EventCore;
use crate::event::decode;
use crate::sink::Sink;

/// Abstracts over the kernel ring buffer reader so the loop body can be exercised against a
/// canned sequence of records in tests.
pub trait RecordSource {
    fn read(&mut self) -> ReadResult;
}

pub enum ReadResult {
    Record(Vec<u8>),
    Closed,
    Error(String),
}

/// Runs the consumer loop until the source reports `Closed`. `sink` is `None` when `--api` was
/// not supplied: events are still processed (and logged) but never forwarded over the network.
pub fn run(
    source: &mut dyn RecordSource,
    core: &mut EventCore<'_>,
    sink: Option<&dyn Sink>,
) {
    loop {
        match source.read() {
            ReadResult::Closed => {
                log::info!("ring buffer closed, stopping event reader");
                return;
            }
            ReadResult::Error(err) => {
                warn!("reading from ring buffer: {err}");
                continue;
            }
            ReadResult::Record(bytes) => {
                let event = match decode(&bytes) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!("decoding event: {err}");
                        continue;
                    }
                };
                let (payload, accepted) = core.process(&event);
                if !accepted {
                    continue;
                }
                if let Some(sink) = sink {
                    if let Err(err) = sink.send(&payload) {
                        error!("sending payload: {err}");
                    }
                }
            }
        }
    }
}
