// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Degradation counters.
//!
//! Every lossy outcome in the trace path is observable here. The counters
//! are monotonic; there is no reset.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Counters for the trace engine's lossy outcomes.
#[derive(Debug, Default)]
pub struct SnoopStats {
    emitted: AtomicU64,
    ring_dropped: AtomicU64,
    untracked: AtomicU64,
    table_rejected: AtomicU64,
    filtered: AtomicU64,
    negative_latency: AtomicU64,
}

macro_rules! counter {
    ($(#[$doc:meta])* $name:ident, $incr:ident) => {
        $(#[$doc])*
        pub fn $name(&self) -> u64 {
            self.$name.load(Ordering::Relaxed)
        }

        pub(crate) fn $incr(&self) {
            self.$name.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl SnoopStats {
    counter! {
        /// Records pushed into the trace ring.
        emitted, incr_emitted
    }
    counter! {
        /// Records dropped because the ring was full.
        ring_dropped, incr_ring_dropped
    }
    counter! {
        /// Completions with no tracked issue (missed, rejected, or duplicate).
        untracked, incr_untracked
    }
    counter! {
        /// Issues rejected because the in-flight table was full.
        table_rejected, incr_table_rejected
    }
    counter! {
        /// Completions rejected by the trace filter.
        filtered, incr_filtered
    }
    counter! {
        /// Completions whose computed latency was negative.
        negative_latency, incr_negative_latency
    }

    /// A point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            emitted: self.emitted(),
            ring_dropped: self.ring_dropped(),
            untracked: self.untracked(),
            table_rejected: self.table_rejected(),
            filtered: self.filtered(),
            negative_latency: self.negative_latency(),
        }
    }
}

/// See [`SnoopStats`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub emitted: u64,
    pub ring_dropped: u64,
    pub untracked: u64,
    pub table_rejected: u64,
    pub filtered: u64,
    pub negative_latency: u64,
}
