//! Durable per-provider monitor state.
//!
//! The state file is a single JSON object keyed by target provider. Writes go
//! to a sibling temp file that is renamed over the state file, so readers never
//! see a partial document. A sibling `.lock` file serializes whole cycles
//! across processes.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use slotwatch_core::StateMap;

use crate::error::StoreError;

/// A lock file older than this was left behind by a killed run.
pub const STALE_LOCK_AFTER: Duration = Duration::from_secs(10 * 60);

/// File-backed [`StateMap`] store.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file. A missing file is an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, or
    /// [`StoreError::Corrupt`] if it is not a valid state document.
    pub fn try_load(&self) -> Result<StateMap, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateMap::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Reads the state file, falling back to an empty map on any error.
    #[must_use]
    pub fn load(&self) -> StateMap {
        self.try_load().unwrap_or_else(|e| {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "failed to read state file, starting empty"
            );
            StateMap::new()
        })
    }

    /// Replaces the state file with `state`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialize`] or [`StoreError::Io`]. The previous
    /// file is left untouched on failure.
    pub fn try_save(&self, state: &StateMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(state).map_err(StoreError::Serialize)?;

        let tmp = sibling(&self.path, ".tmp");
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp);
            return Err(StoreError::io(&tmp, e));
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))
    }

    /// Replaces the state file, logging and dropping any error.
    pub fn save(&self, state: &StateMap) {
        match self.try_save(state) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), providers = state.len(), "saved state");
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to save state");
            }
        }
    }

    /// Takes the single-writer lock. The lock is released when the returned
    /// guard is dropped. A lock older than [`STALE_LOCK_AFTER`] is reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockHeld`] if a fresh lock exists, or
    /// [`StoreError::Io`] if the lock file cannot be created.
    pub fn lock(&self) -> Result<StateLock, StoreError> {
        let path = sibling(&self.path, ".lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        match create_lock_file(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let Some(seen) = stale_modified(&path) else {
                    return Err(StoreError::LockHeld { path });
                };
                tracing::warn!(path = %path.display(), "reclaiming stale state lock");
                reclaim_stale(&path, seen)?;
                create_lock_file(&path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => StoreError::LockHeld {
                        path: path.clone(),
                    },
                    _ => StoreError::io(&path, e),
                })
            }
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

/// Held single-writer lock; removes the lock file on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release state lock");
        }
    }
}

fn create_lock_file(path: &Path) -> std::io::Result<StateLock> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(StateLock {
        path: path.to_path_buf(),
    })
}

/// Modification time of the lock at `path` if it is old enough to reclaim.
fn stale_modified(path: &Path) -> Option<SystemTime> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let age = SystemTime::now().duration_since(modified).ok()?;
    (age > STALE_LOCK_AFTER).then_some(modified)
}

/// Removes the stale lock last seen with mtime `seen`.
///
/// The lock is first renamed aside, which only one run can do for a given
/// file. If the file moved is not the one inspected, another run already
/// reclaimed the lock and took a fresh one; it is put back and the lock is
/// reported as held.
fn reclaim_stale(path: &Path, seen: SystemTime) -> Result<(), StoreError> {
    let aside = sibling(path, &format!(".stale.{}", std::process::id()));
    match std::fs::rename(path, &aside) {
        Ok(()) => {}
        // Another run moved it first; `create_new` decides who wins.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path, e)),
    }

    let moved = std::fs::metadata(&aside).and_then(|m| m.modified()).ok();
    if moved != Some(seen) {
        std::fs::rename(&aside, path).map_err(|e| StoreError::io(path, e))?;
        return Err(StoreError::LockHeld {
            path: path.to_path_buf(),
        });
    }
    std::fs::remove_file(&aside).map_err(|e| StoreError::io(&aside, e))
}

/// `state.json` + `.lock` → `state.json.lock`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
