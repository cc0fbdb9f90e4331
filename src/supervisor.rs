//! Wires config compilation, kernel loading, the consumer thread, and shutdown discipline
//! together (§5). On any startup failure, already-acquired resources are released in the
//! reverse order they were acquired.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use thiserror::Error;

use crate::config::{self, ConfigError, PolicyError};
use crate::core::EventCore;
use crate::kernel::{AttachError, KernelRingSource, LoadError, Loader};
use crate::path_cache::PathCache;
use crate::ring_loop;
use crate::sink::{ApiAuth, AuthError, HttpSink, Sink};

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("attach error: {0}")]
    Attach(#[from] AttachError),
    #[error("API auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("installing signal handler: {0}")]
    SignalHandler(#[source] std::io::Error),
}

/// Starts the daemon: compiles the policy, loads and attaches the eBPF object, runs the
/// consumer loop, and returns once a termination signal closes the ring reader.
pub fn run(
    config_path: &Path,
    object_bytes: &[u8],
    sink: Option<Box<dyn Sink>>,
) -> Result<(), SupervisorError> {
    let raw_tokens = config::read_config(config_path)?;
    let tokens = config::validate_syntax(&raw_tokens)?;
    let compiled = config::compile(&tokens)?;
    info!(
        "compiled policy: {} tracked files, {} path-cache entries",
        compiled.tracked.len(),
        compiled.path_cache.len()
    );

    let mut loader = Loader::load(object_bytes)?;
    match loader.attach() {
        Ok(None) => info!("attached all eBPF hooks"),
        Ok(Some(partial)) => warn!("attached with degraded coverage: {partial}"),
        Err(err) => return Err(SupervisorError::Attach(err)),
    }

    // A single tracked-file map handle is taken here and reused for both the startup seed and
    // every later CREATE admission: `Loader::tracked_file_map` takes the map out of the loaded
    // object, so a second call would fail.
    let mut tracked_map = loader.tracked_file_map()?;
    for (key, value) in &compiled.tracked {
        if let Err(err) = tracked_map.put(*key, *value) {
            warn!("seeding kernel map entry {:?}: {}", key, err);
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(&shutdown)?;

    let mut path_cache: PathCache = compiled.path_cache;
    let filters = compiled.filters;
    let mut core = EventCore::new(&filters, &mut path_cache, &mut tracked_map);

    info!("Successfully loaded eBPF program. Monitoring VFS operations...");
    let ring_buf = loader.ring_buf()?;
    let mut source = KernelRingSource::new(ring_buf, Arc::clone(&shutdown));
    ring_loop::run(&mut source, &mut core, sink.as_deref());

    info!("consumer loop exited, releasing kernel resources");
    drop(loader);
    Ok(())
}

/// Registers `shutdown` to flip true on SIGINT/SIGTERM via `signal_hook`'s self-pipe, so the
/// consumer's polling read (see [`KernelRingSource`]) notices termination without a dedicated
/// signal-handling thread of our own.
fn install_signal_handlers(shutdown: &Arc<AtomicBool>) -> Result<(), SupervisorError> {
    signal_hook::flag::register(SIGINT, Arc::clone(shutdown))
        .map_err(SupervisorError::SignalHandler)?;
    signal_hook::flag::register(SIGTERM, Arc::clone(shutdown))
        .map_err(SupervisorError::SignalHandler)?;
    Ok(())
}

/// Builds the outbound sink from `--api`'s credentials file. An absent file just disables the
/// sink (local logging continues); a present-but-invalid file (malformed JSON, missing
/// `agent_uuid`/`api_key`) is a fatal misconfiguration per §6.
pub fn build_sink(api_path: &Path) -> Result<Option<Box<dyn Sink>>, SupervisorError> {
    match ApiAuth::load(api_path) {
        Ok(auth) => Ok(Some(Box::new(HttpSink::new(auth)) as Box<dyn Sink>)),
        Err(err) if err.file_absent() => {
            warn!("API file not found at '{}'; disabling network logging", api_path.display());
            Ok(None)
        }
        Err(err) => Err(SupervisorError::Auth(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn build_sink_disables_on_absent_file() {
        let sink = build_sink(Path::new("/nonexistent/watchd-api.json")).unwrap();
        assert!(sink.is_none());
    }

    #[test]
    fn build_sink_is_fatal_on_invalid_credentials() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"agent_uuid": "", "api_key": "x", "api_url": "https://x"}"#)
            .unwrap();
        let err = build_sink(f.path()).unwrap_err();
        assert!(matches!(err, SupervisorError::Auth(_)));
    }

    #[test]
    fn build_sink_succeeds_on_valid_credentials() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(br#"{"agent_uuid": "a", "api_key": "k", "api_url": "https://x"}"#)
            .unwrap();
        let sink = build_sink(f.path()).unwrap();
        assert!(sink.is_some());
    }
}
