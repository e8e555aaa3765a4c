//! Apply command implementation.

use super::{open_engine, print_run, with_serial, CommandResult, OfflineTransport};
use std::path::Path;
use tidesync_engine::{SyncOptions, SyncRun};
use tidesync_protocol::payload::{decode_bundle, PayloadFormat};
use tracing::info;

/// Applies a bundle file and returns the run.
pub fn execute(
    store_path: &Path,
    registry_path: &Path,
    payload_path: &Path,
    encoding: &str,
    serial: bool,
) -> CommandResult<SyncRun> {
    let format: PayloadFormat = encoding.parse()?;
    let bytes = std::fs::read(payload_path)
        .map_err(|e| format!("Cannot read {}: {}", payload_path.display(), e))?;
    let payload = decode_bundle(&bytes, format)?;
    info!(
        "Applying {} records for {} entities from {:?}",
        payload.record_count(),
        payload.len(),
        payload_path
    );

    let engine = open_engine(store_path, registry_path, OfflineTransport)?;
    Ok(engine.run(with_serial(SyncOptions::explicit(payload), serial))?)
}

/// Runs the apply command.
pub fn run(
    store_path: &Path,
    registry_path: &Path,
    payload_path: &Path,
    encoding: &str,
    serial: bool,
    format: &str,
) -> CommandResult<()> {
    let run = execute(store_path, registry_path, payload_path, encoding, serial)?;
    print_run(&run, format)?;
    if !run.is_completed() {
        return Err(format!("{} entities failed", run.failed().count()).into());
    }
    Ok(())
}
