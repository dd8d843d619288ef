// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Block I/O request tracing.
//!
//! The engine correlates request issue with completion, computes latency,
//! decodes the storage command carried by the request, and publishes one
//! [`CommandRecord`] per correlated request to a bounded, lossy trace ring.
//! The hook layer that observes the block stack and the consumer that
//! formats or aggregates records are both external; they meet the engine at
//! [`BlockSnoop::on_issue`], [`BlockSnoop::on_completion`], and
//! [`TraceReader`].
//!
//! Everything in the issue/completion path runs in bounded time and never
//! blocks; every lossy outcome is counted in [`SnoopStats`].

#![forbid(unsafe_code)]

mod completion;
mod filter;
mod ring;
mod stats;

pub use completion::CompletionRepr;
pub use completion::CompletionView;
pub use completion::SnapshotView;
pub use filter::OpSet;
pub use filter::TraceFilter;
pub use ring::TraceReader;
pub use ring::TraceRing;
pub use stats::SnoopStats;
pub use stats::StatsSnapshot;

use blk_defs::DeviceClass;
use blk_defs::DeviceId;
use blk_defs::DiskName;
use blk_defs::ReqHandle;
use blk_defs::ReqOp;
use blk_defs::TaskName;
use cmd_decode::decode;
use cmd_decode::DecoderCaps;
use reqtrack::InflightTable;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use thiserror::Error;

/// The in-flight entry stored at issue time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IoStart {
    pub start_time_ns: u64,
    pub task: TaskName,
}

/// One traced request. Immutable once emitted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandRecord {
    pub start_time_ns: u64,
    pub task: TaskName,
    pub disk: DiskName,
    pub device: DeviceId,
    /// The normalized operation.
    pub op: ReqOp,
    /// The protocol command code: CDB byte 0 or the NVMe opcode.
    pub sub_opcode: u8,
    pub lba: u64,
    pub sectors: u32,
    /// Signed so that a clock or correlation bug shows up as a negative
    /// value instead of an absurd unsigned one.
    pub latency_ns: i64,
    /// The embedded ATA command, for ATA pass-through requests.
    pub ata_cmd: Option<u8>,
    /// The file write hint the request carried, if any.
    pub write_hint: Option<u8>,
}

/// Configuration for [`BlockSnoop`].
#[derive(Clone, Debug)]
pub struct SnoopBuilder {
    table_capacity: usize,
    table_shards: usize,
    ring_depth: usize,
    caps: DecoderCaps,
    filter: TraceFilter,
}

impl Default for SnoopBuilder {
    fn default() -> Self {
        Self {
            table_capacity: reqtrack::DEFAULT_CAPACITY,
            table_shards: reqtrack::DEFAULT_SHARDS,
            ring_depth: 64 * 1024,
            caps: DecoderCaps::modern(),
            filter: TraceFilter::pass_all(),
        }
    }
}

/// An invalid [`SnoopBuilder`] configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("table shard count {0} is not a nonzero power of two")]
    InvalidShardCount(usize),
    #[error("table capacity {capacity} is below the shard count {shards}")]
    CapacityBelowShards { capacity: usize, shards: usize },
    #[error("trace ring depth is zero")]
    ZeroRingDepth,
}

impl SnoopBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total in-flight table capacity, in entries.
    pub fn table_capacity(mut self, capacity: usize) -> Self {
        self.table_capacity = capacity;
        self
    }

    /// In-flight table shard count. Must be a power of two.
    pub fn table_shards(mut self, shards: usize) -> Self {
        self.table_shards = shards;
        self
    }

    /// Trace ring depth, in records.
    pub fn ring_depth(mut self, depth: usize) -> Self {
        self.ring_depth = depth;
        self
    }

    /// The block-layer capability descriptor the decoder should assume.
    pub fn decoder_caps(mut self, caps: DecoderCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn filter(mut self, filter: TraceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn build(self) -> Result<(BlockSnoop, TraceReader), BuildError> {
        if self.table_shards == 0 || !self.table_shards.is_power_of_two() {
            return Err(BuildError::InvalidShardCount(self.table_shards));
        }
        if self.table_capacity < self.table_shards {
            return Err(BuildError::CapacityBelowShards {
                capacity: self.table_capacity,
                shards: self.table_shards,
            });
        }
        if self.ring_depth == 0 {
            return Err(BuildError::ZeroRingDepth);
        }
        let (ring, reader) = ring::trace_ring(self.ring_depth);
        let snoop = BlockSnoop {
            table: InflightTable::new(self.table_capacity, self.table_shards),
            ring,
            caps: self.caps,
            filter: self.filter,
            stats: SnoopStats::default(),
            warned_negative: AtomicBool::new(false),
        };
        Ok((snoop, reader))
    }
}

/// The trace engine.
///
/// Shared by reference across all hook invocation contexts; every method
/// takes `&self` and is safe to call concurrently.
pub struct BlockSnoop {
    table: InflightTable<IoStart>,
    ring: TraceRing,
    caps: DecoderCaps,
    filter: TraceFilter,
    stats: SnoopStats,
    warned_negative: AtomicBool,
}

impl BlockSnoop {
    /// Records a request issue.
    ///
    /// A re-issue of a live handle overwrites the previous entry. If the
    /// table is full the issue goes untracked (counted, not an error).
    pub fn on_issue(&self, handle: ReqHandle, now_ns: u64, task: TaskName) {
        let entry = IoStart {
            start_time_ns: now_ns,
            task,
        };
        if !self.table.begin(handle, entry) {
            self.stats.incr_table_rejected();
        }
    }

    /// Records a request completion, emitting a trace record if the issue
    /// was tracked and the filter accepts it.
    pub fn on_completion(&self, handle: ReqHandle, now_ns: u64, view: &impl CompletionView) {
        let Some(start) = self.table.end(handle) else {
            self.stats.incr_untracked();
            return;
        };

        let disk = view.disk_name();
        let op = view.op();
        if !self.filter.accepts(&disk, op) {
            self.stats.incr_filtered();
            return;
        }

        let latency_ns = now_ns.wrapping_sub(start.start_time_ns) as i64;
        if latency_ns < 0 {
            self.stats.incr_negative_latency();
            if !self.warned_negative.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    latency_ns,
                    handle = handle.0,
                    "negative latency; completion clock ran behind issue clock"
                );
            }
        }

        let device = view.device();
        let data_sectors = view.data_sectors();
        let (mut lba, mut sectors) = if data_sectors > 0 {
            (view.start_sector(), data_sectors)
        } else {
            (0, 0)
        };

        let class = DeviceClass::from_major(device.major);
        let decoded = decode(class, op, view.command(), &self.caps);
        if let Some(fields) = decoded.fields {
            lba = fields.lba;
            sectors = fields.sectors;
        }

        let record = CommandRecord {
            start_time_ns: start.start_time_ns,
            task: start.task,
            disk,
            device,
            op,
            sub_opcode: decoded.sub_opcode,
            lba,
            sectors,
            latency_ns,
            ata_cmd: decoded.ata_cmd,
            write_hint: view.write_hint(),
        };
        if self.ring.emit(record) {
            self.stats.incr_emitted();
        } else {
            self.stats.incr_ring_dropped();
        }
    }

    /// Drops every tracked in-flight entry.
    ///
    /// Completions for entries dropped here count as untracked.
    pub fn reset(&self) {
        self.table.clear();
    }

    /// The number of requests currently tracked as in flight.
    pub fn inflight(&self) -> usize {
        self.table.len()
    }

    pub fn stats(&self) -> &SnoopStats {
        &self.stats
    }
}
