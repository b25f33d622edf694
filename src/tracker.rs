//! Filesystem-backed progress tracking
//!
//! Completion of a work item is recorded as a zero-byte file named by the
//! item's decimal z index. Existence is the sole evidence of completion, so
//! a marker is only ever created after the sink write for that index has
//! returned success. An upload can be reset with `rm -r <progress dir>`, or
//! individual indices skipped by touching their markers by hand.

use crate::error::Result;
use log::warn;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Tracks completed work items in a marker directory
#[derive(Debug)]
pub struct ProgressTracker {
    dir: PathBuf,
}

impl ProgressTracker {
    /// Open a tracker, creating the marker directory if absent
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the marker directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, index: i64) -> PathBuf {
        self.dir.join(index.to_string())
    }

    /// True iff a marker for `index` exists
    pub fn is_done(&self, index: i64) -> bool {
        self.marker_path(index).exists()
    }

    /// Idempotently create the marker for `index`
    pub fn mark_done(&self, index: i64) -> Result<()> {
        fs::File::create(self.marker_path(index))?;
        Ok(())
    }

    /// Enumerate all markers present, parsed as integers
    ///
    /// Entries that do not parse as integers are skipped with a warning.
    pub fn completed_set(&self) -> Result<HashSet<i64>> {
        let mut done = HashSet::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            match name.to_str().and_then(|s| s.parse::<i64>().ok()) {
                Some(index) => {
                    done.insert(index);
                }
                None => {
                    warn!("ignoring non-numeric progress entry {:?}", name);
                }
            }
        }
        Ok(done)
    }
}
