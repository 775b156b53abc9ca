// Operation slots - admission control for Engine work
//
// Each running operation holds a slot naming its kind and the drives it
// touches. A new operation is admitted only when it conflicts with nothing
// already held; the slot is released when its guard drops.

use crate::{OperationKind, PipelineError, PipelineResult};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveOperation {
    id: u64,
    kind: OperationKind,
    /// Empty means the operation may touch any drive
    drives: Vec<String>,
}

#[derive(Debug, Default)]
struct SlotTable {
    next_id: u64,
    active: Vec<ActiveOperation>,
}

#[derive(Debug, Clone)]
pub struct OperationSlots {
    table: Arc<Mutex<SlotTable>>,
    allow_concurrent_scans: bool,
}

fn same_drive(a: &str, b: &str) -> bool {
    let norm = |s: &str| {
        s.replace('\\', "/")
            .trim_end_matches('/')
            .to_ascii_lowercase()
    };
    norm(a) == norm(b)
}

fn drives_overlap(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter().any(|x| b.iter().any(|y| same_drive(x, y)))
}

impl OperationSlots {
    pub fn new(allow_concurrent_scans: bool) -> Self {
        Self {
            table: Arc::new(Mutex::new(SlotTable::default())),
            allow_concurrent_scans,
        }
    }

    fn table(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn conflicts(&self, kind: OperationKind, drives: &[String], other: &ActiveOperation) -> bool {
        if !self.allow_concurrent_scans {
            return true;
        }
        if !kind.conflicts_with(other.kind) {
            return false;
        }
        // Destructive work is single-flight: each one owns the report slot.
        // A delete's drives are not known up front either.
        if kind.is_destructive() && other.kind.is_destructive() {
            return true;
        }
        if kind == OperationKind::Delete || other.kind == OperationKind::Delete {
            return true;
        }
        drives_overlap(drives, &other.drives)
    }

    /// Claim a slot or fail with `Busy` naming the operation in the way.
    pub fn try_acquire(&self, kind: OperationKind, drives: &[String]) -> PipelineResult<SlotGuard> {
        let mut table = self.table();
        if let Some(blocking) = table
            .active
            .iter()
            .find(|other| self.conflicts(kind, drives, other))
        {
            return Err(PipelineError::Busy(if blocking.drives.is_empty() {
                format!("a {} is already running", blocking.kind)
            } else {
                format!(
                    "a {} is already running on {}",
                    blocking.kind,
                    blocking.drives.join(", ")
                )
            }));
        }

        table.next_id += 1;
        let id = table.next_id;
        table.active.push(ActiveOperation {
            id,
            kind,
            drives: drives.to_vec(),
        });
        debug!(slot = id, kind = %kind, drives = ?drives, "Operation slot acquired");

        Ok(SlotGuard {
            table: Arc::clone(&self.table),
            id,
            kind,
        })
    }

    pub fn running(&self) -> Vec<OperationKind> {
        self.table().active.iter().map(|op| op.kind).collect()
    }

    pub fn is_idle(&self) -> bool {
        self.table().active.is_empty()
    }
}

/// Held for the lifetime of one operation.
#[derive(Debug)]
pub struct SlotGuard {
    table: Arc<Mutex<SlotTable>>,
    id: u64,
    kind: OperationKind,
}

impl SlotGuard {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        table.active.retain(|op| op.id != self.id);
        debug!(slot = self.id, kind = %self.kind, "Operation slot released");
    }
}
