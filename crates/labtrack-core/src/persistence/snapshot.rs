//! On-disk document layout and storage backends
//!
//! The file-backed store keeps one JSON document:
//! ```json
//! { "tasks": [...], "metalTracking": [...], "workClosures": [...], "documentTracking": [...] }
//! ```
//! It is read once when the store opens and rewritten in full after every
//! mutation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::store::Record;
use crate::error::PersistenceError;
use crate::kind::RecordKind;

/// All four collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Record>,
    #[serde(default)]
    pub metal_tracking: Vec<Record>,
    #[serde(default)]
    pub work_closures: Vec<Record>,
    #[serde(default)]
    pub document_tracking: Vec<Record>,
}

impl Snapshot {
    pub fn collection(&self, kind: RecordKind) -> &[Record] {
        match kind {
            RecordKind::Tasks => &self.tasks,
            RecordKind::MetalTracking => &self.metal_tracking,
            RecordKind::WorkClosures => &self.work_closures,
            RecordKind::DocumentTracking => &self.document_tracking,
        }
    }

    pub fn collection_mut(&mut self, kind: RecordKind) -> &mut Vec<Record> {
        match kind {
            RecordKind::Tasks => &mut self.tasks,
            RecordKind::MetalTracking => &mut self.metal_tracking,
            RecordKind::WorkClosures => &mut self.work_closures,
            RecordKind::DocumentTracking => &mut self.document_tracking,
        }
    }
}

/// Borrowed snapshot with one collection swapped out, used to write a
/// pending mutation before it is committed to memory
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingSnapshot<'a> {
    tasks: &'a [Record],
    metal_tracking: &'a [Record],
    work_closures: &'a [Record],
    document_tracking: &'a [Record],
}

impl<'a> PendingSnapshot<'a> {
    fn new(base: &'a Snapshot, kind: RecordKind, replacement: &'a [Record]) -> Self {
        let pick = |k: RecordKind| {
            if k == kind {
                replacement
            } else {
                base.collection(k)
            }
        };
        Self {
            tasks: pick(RecordKind::Tasks),
            metal_tracking: pick(RecordKind::MetalTracking),
            work_closures: pick(RecordKind::WorkClosures),
            document_tracking: pick(RecordKind::DocumentTracking),
        }
    }
}

/// Where the store keeps its collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Process memory only; lost on restart
    Memory,
    /// A JSON document on local disk
    File(PathBuf),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::File(_) => "file",
        }
    }

    /// Load the stored document; a missing file is an empty store
    pub fn load(&self) -> Result<Snapshot, PersistenceError> {
        match self {
            Backend::Memory => Ok(Snapshot::default()),
            Backend::File(path) => {
                if !path.exists() {
                    return Ok(Snapshot::default());
                }
                let raw = fs::read_to_string(path)?;
                if raw.trim().is_empty() {
                    return Ok(Snapshot::default());
                }
                Ok(serde_json::from_str(&raw)?)
            }
        }
    }

    /// Write `base` with the `kind` collection replaced by `replacement`
    pub(crate) fn save_pending(
        &self,
        base: &Snapshot,
        kind: RecordKind,
        replacement: &[Record],
    ) -> Result<(), PersistenceError> {
        match self {
            Backend::Memory => Ok(()),
            Backend::File(path) => {
                let pending = PendingSnapshot::new(base, kind, replacement);
                let json = serde_json::to_vec_pretty(&pending)?;
                write_atomically(path, &json)?;
                tracing::debug!("Saved {} to {:?}", kind, path);
                Ok(())
            }
        }
    }
}

/// Replace `path` via a sibling temp file and rename
fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
