use std::{
    fs::{self, File},
    io::{ErrorKind, Write as _},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use anyhow::{Context as _, Result, anyhow};

use crate::sen5x::Measurement;

/// Everything not yet confirmed delivered, as it stood at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementBatch {
    pub measurements: Vec<Measurement>,

    /// Snapshot file text, read under the same lock as `measurements`.
    pub contents: String,
}

impl MeasurementBatch {
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

/// In-memory measurements mirrored to a JSON snapshot file.
///
/// Every operation takes the one lock, mutates memory, and rewrites the file
/// before releasing it, so the file and the in-memory sequence never disagree
/// from the point of view of another caller. Callers must not hold the lock
/// across transport I/O; no method here does.
#[derive(Debug)]
pub struct SharedBuffer {
    path: PathBuf,
    measurements: Mutex<Vec<Measurement>>,
}

impl SharedBuffer {
    /// Opens the snapshot at `path`, picking up measurements left behind by a
    /// previous run. A missing file starts an empty buffer.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let measurements = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("failed to parse snapshot file: {path:?}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read snapshot file: {path:?}"));
            }
        };

        write_snapshot(&path, &measurements)?;

        Ok(Self {
            path,
            measurements: Mutex::new(measurements),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Adds `measurement` and rewrites the snapshot before returning. On a
    /// write failure the measurement is rolled back out of memory.
    pub fn append(&self, measurement: Measurement) -> Result<()> {
        let mut measurements = self.lock()?;

        measurements.push(measurement);
        if let Err(e) = write_snapshot(&self.path, &measurements) {
            measurements.pop();
            return Err(e);
        }

        Ok(())
    }

    /// Returns the current batch; with `clear` it also empties memory and the
    /// snapshot in the same critical section.
    pub fn snapshot_and_optionally_clear(&self, clear: bool) -> Result<MeasurementBatch> {
        let mut measurements = self.lock()?;

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read snapshot file: {:?}", self.path))?;
        let batch = MeasurementBatch {
            measurements: measurements.clone(),
            contents,
        };

        if clear {
            write_snapshot(&self.path, &[])?;
            measurements.clear();
        }

        Ok(batch)
    }

    /// Removes a delivered batch from the front of the buffer. Measurements
    /// appended after the batch was taken stay. Returns how many were removed;
    /// zero when the buffer no longer starts with `batch`.
    pub fn acknowledge(&self, batch: &MeasurementBatch) -> Result<usize> {
        let mut measurements = self.lock()?;

        if batch.is_empty() || !measurements.starts_with(&batch.measurements) {
            return Ok(0);
        }

        let remaining = &measurements[batch.len()..];
        write_snapshot(&self.path, remaining)?;
        measurements.drain(..batch.len());

        Ok(batch.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Measurement>>> {
        self.measurements
            .lock()
            .map_err(|_| anyhow!("measurement buffer lock poisoned"))
    }
}

/// Replaces the snapshot file in one step: write a sibling temp file, sync it,
/// rename it over the target.
fn write_snapshot(path: &Path, measurements: &[Measurement]) -> Result<()> {
    let json = serde_json::to_string_pretty(measurements).context("failed to encode snapshot")?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path)
        .with_context(|| format!("failed to create snapshot file: {tmp_path:?}"))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("failed to write snapshot file: {tmp_path:?}"))?;
    file.sync_all()
        .with_context(|| format!("failed to sync snapshot file: {tmp_path:?}"))?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to replace snapshot file: {path:?}"))?;

    Ok(())
}
