//! Project history using compressed snapshots
//!
//! Each committed transaction pushes a zstd-compressed JSON copy of the
//! saved project, tagged with the transaction title. Undo and redo move a
//! cursor over the stack and hand back the snapshot under it.

use std::collections::VecDeque;

use crate::config::HistorySettings;
use crate::error::{Result, ScadGraphError};
use crate::persistence::SavedProject;

struct Snapshot {
    title: String,
    compressed: Vec<u8>,
}

/// Undo/redo stack of compressed project snapshots
pub struct HistoryStack {
    snapshots: VecDeque<Snapshot>,
    /// Index of the snapshot matching the live project
    current: usize,
    max_snapshots: usize,
    compression_level: i32,
    max_snapshot_bytes: usize,
}

impl HistoryStack {
    pub fn new(settings: &HistorySettings) -> Self {
        Self {
            snapshots: VecDeque::new(),
            current: 0,
            max_snapshots: settings.max_snapshots.max(1),
            compression_level: settings.compression_level,
            max_snapshot_bytes: settings.max_snapshot_bytes,
        }
    }

    /// Push a snapshot, dropping any redo history. The stack is unchanged
    /// when this fails.
    pub fn push(&mut self, title: impl Into<String>, project: &SavedProject) -> Result<()> {
        let json = serde_json::to_vec(project)?;
        let compressed = zstd::encode_all(&json[..], self.compression_level)
            .map_err(|e| ScadGraphError::Compression(e.to_string()))?;
        if compressed.len() > self.max_snapshot_bytes {
            return Err(ScadGraphError::Compression(format!(
                "snapshot of {} bytes exceeds the {} byte limit",
                compressed.len(),
                self.max_snapshot_bytes
            )));
        }

        while self.snapshots.len() > self.current + 1 {
            self.snapshots.pop_back();
        }

        self.snapshots.push_back(Snapshot {
            title: title.into(),
            compressed,
        });
        self.current = self.snapshots.len() - 1;

        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
            if self.current > 0 {
                self.current -= 1;
            }
        }

        Ok(())
    }

    /// Step back one snapshot. Returns the state to restore, or `None` at the start.
    pub fn undo(&mut self) -> Option<Result<SavedProject>> {
        if self.current > 0 {
            self.current -= 1;
            Some(self.decompress(self.current))
        } else {
            None
        }
    }

    /// Step forward one snapshot. Returns the state to restore, or `None` at the end.
    pub fn redo(&mut self) -> Option<Result<SavedProject>> {
        if self.current + 1 < self.snapshots.len() {
            self.current += 1;
            Some(self.decompress(self.current))
        } else {
            None
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.snapshots.len()
    }

    /// Title of the transaction the next undo would revert
    pub fn undo_title(&self) -> Option<&str> {
        self.can_undo()
            .then(|| self.snapshots[self.current].title.as_str())
    }

    /// Title of the transaction the next redo would re-apply
    pub fn redo_title(&self) -> Option<&str> {
        self.snapshots
            .get(self.current + 1)
            .map(|s| s.title.as_str())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.current = 0;
    }

    /// Total compressed size of all snapshots in bytes
    pub fn compressed_size(&self) -> usize {
        self.snapshots.iter().map(|s| s.compressed.len()).sum()
    }

    fn decompress(&self, index: usize) -> Result<SavedProject> {
        let snapshot = self
            .snapshots
            .get(index)
            .ok_or_else(|| ScadGraphError::invariant(format!("no snapshot at {}", index)))?;
        let json = zstd::decode_all(&snapshot.compressed[..])
            .map_err(|e| ScadGraphError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(&HistorySettings::default())
    }
}

impl std::fmt::Debug for HistoryStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStack")
            .field("len", &self.snapshots.len())
            .field("current", &self.current)
            .field("compressed_size", &self.compressed_size())
            .finish()
    }
}
