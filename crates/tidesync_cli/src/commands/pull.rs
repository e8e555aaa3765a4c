//! Pull command implementation.
//!
//! The source directory stands in for a server: `<source>/<entity>.json`
//! (or `.cbor`) holds the full record array of one entity, and the
//! transport serves the records above the watermark from it.

use super::{open_engine, print_run, with_serial, CommandResult};
use std::path::{Path, PathBuf};
use tidesync_engine::{RemoteTransport, SyncError, SyncOptions, SyncResult, SyncRun};
use tidesync_protocol::payload::{decode_records, PayloadFormat};
use tidesync_protocol::{RemoteRecord, Timestamp};
use tracing::{debug, info};

/// Serves records from one file per entity.
pub struct DirectoryTransport {
    dir: PathBuf,
    format: PayloadFormat,
}

impl DirectoryTransport {
    /// Creates a transport reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>, format: PayloadFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// File holding the records of an entity.
    pub fn entity_file(&self, entity_name: &str) -> PathBuf {
        let extension = match self.format {
            PayloadFormat::Json => "json",
            PayloadFormat::Cbor => "cbor",
        };
        self.dir.join(format!("{}.{}", entity_name, extension))
    }
}

impl RemoteTransport for DirectoryTransport {
    fn fetch(&self, entity_name: &str, since: Option<Timestamp>) -> SyncResult<Vec<RemoteRecord>> {
        let file = self.entity_file(entity_name);
        if !file.exists() {
            debug!(entity = entity_name, file = %file.display(), "no source file");
            return Ok(Vec::new());
        }

        let bytes = std::fs::read(&file).map_err(|e| {
            SyncError::transport_retryable(format!("cannot read {}: {}", file.display(), e))
        })?;
        let records = decode_records(entity_name, &bytes, self.format)?;
        Ok(records
            .into_iter()
            .filter(|r| since.map_or(true, |mark| r.updated_at > mark))
            .collect())
    }
}

/// Pulls every registered entity from `source` and returns the run.
pub fn execute(
    store_path: &Path,
    registry_path: &Path,
    source: &Path,
    encoding: &str,
    serial: bool,
) -> CommandResult<SyncRun> {
    if !source.is_dir() {
        return Err(format!("Source directory {:?} not found", source).into());
    }
    let format: PayloadFormat = encoding.parse()?;
    info!("Pulling from {:?} into {:?}", source, store_path);

    let engine = open_engine(store_path, registry_path, DirectoryTransport::new(source, format))?;
    Ok(engine.run(with_serial(SyncOptions::registry_driven(), serial))?)
}

/// Runs the pull command.
pub fn run(
    store_path: &Path,
    registry_path: &Path,
    source: &Path,
    encoding: &str,
    serial: bool,
    format: &str,
) -> CommandResult<()> {
    let run = execute(store_path, registry_path, source, encoding, serial)?;
    print_run(&run, format)?;
    if !run.is_completed() {
        return Err(format!("{} entities failed", run.failed().count()).into());
    }
    Ok(())
}
