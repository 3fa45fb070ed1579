//! Cycle report store — the last completed cycle, for `roster status`.
//!
//! Persists a [`CycleReport`] JSON document at
//! `<home>/.roster/state/last_cycle.json`.
//! Writes use the same atomic `.tmp` + rename pattern as the config file.

use std::path::{Path, PathBuf};

use roster_core::config::roster_root;

use crate::error::{io_err, SyncError};
use crate::pipeline::CycleReport;

/// `~/.roster/state/last_cycle.json`
pub fn store_path_at(home: &Path) -> PathBuf {
    roster_root(home).join("state").join("last_cycle.json")
}

/// Load the last persisted report; `None` before the first cycle.
pub fn load_at(home: &Path) -> Result<Option<CycleReport>, SyncError> {
    let path = store_path_at(home);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save `report` atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(home: &Path, report: &CycleReport) -> Result<(), SyncError> {
    let path = store_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid report store path"),
        ));
    };

    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(report)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}
