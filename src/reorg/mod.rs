//! Reorganization job (C8): split (insert a partition level) and merge
//! (remove a partition level) via map-reduce over every partition file.
//!
//! The teacher has no single reshape pass to generalize — it has no
//! schema-evolution job at all, since its partition scheme is fixed at
//! table-creation time. This module composes the same primitives the
//! teacher's own table layer already uses for the pieces a reshape
//! needs: `Table::partitions`'s directory walk (here, `manifest::walk`)
//! to enumerate the old layout, `PartitionWriter::append`-style
//! whole-partition writes (here, `resolver::write_partition`) for the
//! new one, and `TableConfig`'s "one settings struct describes the whole
//! job" shape for [`split::SplitConfig`].

mod merge;
mod split;

pub use merge::run_merge;
pub use split::{run_split, SplitConfig};

use std::time::Instant;

/// One partial failure encountered during a reorg pass. `recoverable`
/// failures (a bad derivation result, a regex mismatch) are collected but
/// do not fail the job; anything else does.
#[derive(Debug, Clone)]
pub struct ReorgIssue {
    pub partition: String,
    pub message: String,
    pub recoverable: bool,
}

/// Which reorganization ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorgOperation {
    Split,
    Merge,
}

/// Outcome of a split or merge pass.
#[derive(Debug, Clone)]
pub struct ReorgReport {
    pub success: bool,
    pub operation: ReorgOperation,
    pub partitions_processed: u64,
    pub items_processed: u64,
    pub partitions_created: u64,
    pub partitions_deleted: u64,
    pub elapsed_ms: u64,
    pub errors: Vec<ReorgIssue>,
}

impl ReorgReport {
    /// Surface an unsuccessful report (at least one irrecoverable error)
    /// as [`crate::Error::ReorgPartial`], per spec.md §7. Callers that only
    /// want the counters can ignore this and inspect `errors`/`success`
    /// directly — `run_split`/`run_merge` never raise on their own.
    pub fn into_result(self) -> crate::error::Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(crate::error::Error::ReorgPartial(self.errors))
        }
    }
}

struct Timer(Instant);

impl Timer {
    fn start() -> Self {
        Self(Instant::now())
    }

    fn elapsed_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}
