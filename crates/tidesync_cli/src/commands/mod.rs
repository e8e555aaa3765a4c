//! CLI command implementations.

pub mod apply;
pub mod inspect;
pub mod pull;

use std::path::Path;
use std::sync::Arc;
use tidesync_engine::{
    EntityRegistry, RegistryManifest, RemoteTransport, SyncEngine, SyncOptions, SyncResult,
    SyncRun, TracingObserver,
};
use tidesync_protocol::{RemoteRecord, Timestamp};
use tidesync_store::FileStore;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Loads a registry manifest.
pub fn load_registry(path: &Path) -> CommandResult<EntityRegistry> {
    Ok(RegistryManifest::from_file(path)?.into_registry()?)
}

/// Opens the file store at `store_path` and builds an engine over it.
pub fn open_engine<T: RemoteTransport>(
    store_path: &Path,
    registry_path: &Path,
    transport: T,
) -> CommandResult<SyncEngine<FileStore, T>> {
    let registry = load_registry(registry_path)?;
    let store = FileStore::open(store_path, true)?;
    let engine = SyncEngine::with_registry(Default::default(), store, transport, registry);
    engine.add_observer(Arc::new(TracingObserver));
    Ok(engine)
}

/// Applies the parallelism flag to run options.
pub fn with_serial(options: SyncOptions, serial: bool) -> SyncOptions {
    if serial {
        options.serial()
    } else {
        options
    }
}

/// Prints a run report.
pub fn print_run(run: &SyncRun, format: &str) -> CommandResult<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(run)?);
        }
        _ => {
            println!("Run {} ({:?}, {:.2?})", run.run_id, run.outcome, run.duration);
            for entity in &run.entities {
                let counts = &entity.counts;
                print!(
                    "  {:<24} +{} ~{} -{} ={}",
                    entity.entity_name, counts.created, counts.updated, counts.deleted, counts.skipped
                );
                if !entity.rejected.is_empty() {
                    print!("  {} rejected", entity.rejected.len());
                }
                if !entity.reverted.is_empty() {
                    print!("  {} reverted", entity.reverted.len());
                }
                match &entity.failure {
                    Some(failure) => println!("  FAILED: {}", failure.message),
                    None => println!(),
                }
            }
        }
    }
    Ok(())
}

/// A transport for runs that must not reach a server.
pub struct OfflineTransport;

impl RemoteTransport for OfflineTransport {
    fn fetch(&self, entity_name: &str, _since: Option<Timestamp>) -> SyncResult<Vec<RemoteRecord>> {
        Err(tidesync_engine::SyncError::transport_fatal(format!(
            "no transport configured for '{}'",
            entity_name
        )))
    }
}
