//! Per-request output directories.
//!
//! Every conversion gets its own `<output_dir>/<request id>/` so concurrent
//! requests never write to the same path.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const OUTPUT_FILE_NAME: &str = "output.pdf";

/// Longest pause between two retention sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OutputStorage {
    root: PathBuf,
}

impl OutputStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn request_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn output_path(&self, id: Uuid) -> PathBuf {
        self.request_dir(id).join(OUTPUT_FILE_NAME)
    }

    /// Write `bytes` as the request's output. The file appears under its
    /// final name only once fully written.
    pub fn persist(&self, id: Uuid, bytes: &[u8]) -> io::Result<PathBuf> {
        let dir = self.request_dir(id);
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;

        let path = dir.join(OUTPUT_FILE_NAME);
        temp.persist(&path).map_err(|e| e.error)?;
        debug!(request_id = %id, path = %path.display(), bytes = bytes.len(), "persisted output");
        Ok(path)
    }

    pub fn read(&self, id: Uuid) -> io::Result<Vec<u8>> {
        fs::read(self.output_path(id))
    }

    /// Read the request's output and delete its directory. The directory
    /// is removed even when the read fails.
    pub fn take(&self, id: Uuid) -> io::Result<Vec<u8>> {
        let bytes = self.read(id);
        if let Err(e) = self.remove(id) {
            warn!(request_id = %id, "failed to remove output directory: {e}");
        }
        bytes
    }

    /// Delete the request's directory and everything in it.
    pub fn remove(&self, id: Uuid) -> io::Result<()> {
        fs::remove_dir_all(self.request_dir(id))
    }

    /// Delete request directories last modified before `cutoff`. Entries
    /// not named by a request id are left alone. Returns how many were
    /// removed.
    pub fn prune_modified_before(&self, cutoff: SystemTime) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_request_dir = entry
                .file_name()
                .to_str()
                .is_some_and(|name| Uuid::parse_str(name).is_ok());
            if !is_request_dir {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_dir() {
                continue;
            }
            let Ok(modified) = meta.modified() else { continue };
            if modified >= cutoff {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), "failed to prune output: {e}"),
            }
        }
        Ok(removed)
    }

    /// Delete request directories older than `max_age`.
    pub fn prune_older_than(&self, max_age: Duration) -> io::Result<usize> {
        match SystemTime::now().checked_sub(max_age) {
            Some(cutoff) => self.prune_modified_before(cutoff),
            None => Ok(0),
        }
    }
}

/// Periodically delete outputs older than `retention` until the runtime
/// shuts down.
pub fn spawn_retention_sweep(storage: OutputStorage, retention: Duration) -> JoinHandle<()> {
    let period = retention.min(MAX_SWEEP_INTERVAL).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let storage = storage.clone();
            let result =
                tokio::task::spawn_blocking(move || storage.prune_older_than(retention)).await;
            match result {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => info!(removed, "pruned expired outputs"),
                Ok(Err(e)) => warn!("output sweep failed: {e}"),
                Err(e) => warn!("output sweep did not complete: {e}"),
            }
        }
    })
}

/// Public URL of a persisted output, relative to the server root.
pub fn download_url(id: Uuid) -> String {
    format!("/outputs/{id}/{OUTPUT_FILE_NAME}")
}
