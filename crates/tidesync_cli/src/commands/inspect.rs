//! Inspect command implementation.

use super::{load_registry, CommandResult};
use serde::Serialize;
use std::path::Path;
use tidesync_engine::{SyncMode, WatermarkTracker};
use tidesync_store::{FileStore, LocalStore};
use tracing::info;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Total records across all entities.
    pub total_records: usize,
    /// Per-entity statistics, in registration order.
    pub entities: Vec<EntityStats>,
}

/// Statistics for a single entity.
#[derive(Debug, Serialize)]
pub struct EntityStats {
    /// Entity name.
    pub name: String,
    /// Storage path.
    pub storage_path: String,
    /// Scheduling mode.
    pub mode: SyncMode,
    /// Records stored locally.
    pub record_count: usize,
    /// Highest local `updated_at`.
    pub watermark: Option<i64>,
}

/// Collects statistics for every registered entity.
pub fn collect(store_path: &Path, registry_path: &Path) -> CommandResult<InspectResult> {
    if !store_path.is_dir() {
        return Err(format!("No store found at {:?}", store_path).into());
    }
    info!("Inspecting store at {:?}", store_path);

    let registry = load_registry(registry_path)?;
    let store = FileStore::open(store_path, false)?;
    let tracker = WatermarkTracker::new(&store);

    let mut entities = Vec::with_capacity(registry.len());
    for descriptor in registry.iter() {
        let mark = tracker.max_updated(descriptor)?;
        entities.push(EntityStats {
            name: descriptor.name().to_string(),
            storage_path: descriptor.storage_path().to_string(),
            mode: descriptor.mode(),
            record_count: store.count(descriptor.storage_path())?,
            watermark: mark.max_updated.map(|ts| ts.value()),
        });
    }

    Ok(InspectResult {
        path: store_path.display().to_string(),
        total_records: entities.iter().map(|e| e.record_count).sum(),
        entities,
    })
}

/// Runs the inspect command.
pub fn run(store_path: &Path, registry_path: &Path, format: &str) -> CommandResult<()> {
    let result = collect(store_path, registry_path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!("Total records: {}", result.total_records);
    println!();
    println!(
        "{:<20} {:<24} {:<11} {:>8} {:>14}",
        "ENTITY", "STORAGE PATH", "MODE", "RECORDS", "WATERMARK"
    );
    for entity in &result.entities {
        let mode = match entity.mode {
            SyncMode::Sequential => "sequential",
            SyncMode::Concurrent => "concurrent",
        };
        let watermark = entity
            .watermark
            .map_or_else(|| "-".to_string(), |ts| ts.to_string());
        println!(
            "{:<20} {:<24} {:<11} {:>8} {:>14}",
            entity.name, entity.storage_path, mode, entity.record_count, watermark
        );
    }
}
