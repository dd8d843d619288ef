// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Completion-time trace filtering.
//!
//! The filter runs after correlation but before decode, so excluded disks
//! and operations cost nothing beyond the table lookup. The default filter
//! passes everything.

use blk_defs::DiskName;
use blk_defs::ReqOp;

/// A set of normalized operations.
///
/// Operations below 64 are tracked individually; the rest of the u8 space
/// (vendor/driver-private values) is covered by a single membership bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpSet {
    mask: u64,
    other: bool,
}

impl OpSet {
    pub const EMPTY: Self = Self {
        mask: 0,
        other: false,
    };

    /// Adds one operation to the set.
    pub const fn with(mut self, op: ReqOp) -> Self {
        if op.0 < 64 {
            self.mask |= 1 << op.0;
        } else {
            self.other = true;
        }
        self
    }

    pub fn contains(&self, op: ReqOp) -> bool {
        if op.0 < 64 {
            self.mask & (1 << op.0) != 0
        } else {
            self.other
        }
    }
}

/// Selects which completions become trace records.
///
/// `None` for either dimension means "no constraint". Disk matching is by
/// name prefix, so `"nvme"` selects every NVMe namespace and `"sda"` selects
/// `sda` and its partitions.
#[derive(Clone, Debug, Default)]
pub struct TraceFilter {
    disks: Option<Vec<String>>,
    ops: Option<OpSet>,
}

impl TraceFilter {
    /// A filter that passes every completion.
    pub fn pass_all() -> Self {
        Self::default()
    }

    /// Restricts tracing to disks whose name starts with one of `prefixes`.
    pub fn with_disk_prefixes(mut self, prefixes: impl IntoIterator<Item = String>) -> Self {
        self.disks = Some(prefixes.into_iter().collect());
        self
    }

    /// Restricts tracing to the operations in `ops`.
    pub fn with_ops(mut self, ops: OpSet) -> Self {
        self.ops = Some(ops);
        self
    }

    pub fn accepts(&self, disk: &DiskName, op: ReqOp) -> bool {
        if let Some(ops) = &self.ops {
            if !ops.contains(op) {
                return false;
            }
        }
        if let Some(disks) = &self.disks {
            let name = disk.as_str();
            if !disks.iter().any(|prefix| name.starts_with(prefix.as_str())) {
                return false;
            }
        }
        true
    }
}
