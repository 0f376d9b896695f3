//! Storage export files
//!
//! A storage export is the JSON object `chrome.storage.local.get(null)`
//! returns: `{"sites": {...}, "blocked": [...], "sitesPerPage": ...}`.

use std::fs;
use std::path::Path;

use tg_core::store::MemoryStore;

/// Load an export; a missing file is an empty store.
pub fn load(path: &Path) -> Result<MemoryStore, String> {
    if !path.exists() {
        log::info!("{} does not exist, starting empty", path.display());
        return Ok(MemoryStore::new());
    }
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("Invalid JSON in '{}': {}", path.display(), e))?;
    if !value.is_object() {
        return Err(format!("'{}' is not a storage export object", path.display()));
    }
    Ok(MemoryStore::from_snapshot(value))
}

pub fn save(path: &Path, store: &MemoryStore) -> Result<(), String> {
    let text = serde_json::to_string_pretty(&store.snapshot())
        .map_err(|e| format!("Failed to serialize storage: {}", e))?;
    fs::write(path, text + "\n").map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    log::debug!("Saved {}", path.display());
    Ok(())
}
