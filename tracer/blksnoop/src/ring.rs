// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The bounded, lossy trace record ring.
//!
//! The producer side never blocks or retries: when the ring is full the
//! record is dropped and the caller counts the loss. Only the consumer side
//! may park, waiting for a wake notification the producer posts after each
//! successful push.

use crate::CommandRecord;
use crossbeam_queue::ArrayQueue;
use event_listener::Event;
use event_listener::Listener;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

struct Shared {
    queue: ArrayQueue<CommandRecord>,
    ready: Event,
}

/// The producer half. Cheap to clone; every clone pushes into the same ring.
#[derive(Clone)]
pub struct TraceRing {
    shared: Arc<Shared>,
}

/// The consumer half.
pub struct TraceReader {
    shared: Arc<Shared>,
}

/// Creates a ring holding at most `depth` records.
pub(crate) fn trace_ring(depth: usize) -> (TraceRing, TraceReader) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(depth),
        ready: Event::new(),
    });
    (
        TraceRing {
            shared: shared.clone(),
        },
        TraceReader { shared },
    )
}

impl TraceRing {
    /// Pushes a record, returning `false` if the ring was full and the
    /// record was dropped. Never blocks.
    pub fn emit(&self, record: CommandRecord) -> bool {
        if self.shared.queue.push(record).is_err() {
            return false;
        }
        self.shared.ready.notify(1);
        true
    }

    /// The configured depth.
    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }
}

impl TraceReader {
    /// Takes the oldest record, if any.
    pub fn try_recv(&self) -> Option<CommandRecord> {
        self.shared.queue.pop()
    }

    /// Takes the oldest record, parking the calling thread until one is
    /// available.
    pub fn recv_blocking(&self) -> CommandRecord {
        loop {
            if let Some(record) = self.shared.queue.pop() {
                return record;
            }
            let listener = self.shared.ready.listen();
            // Re-check after registering; the producer may have pushed and
            // notified between the pop and the listen.
            if let Some(record) = self.shared.queue.pop() {
                return record;
            }
            listener.wait();
        }
    }

    /// Takes the oldest record, waiting at most `timeout` for one to arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CommandRecord> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(record) = self.shared.queue.pop() {
                return Some(record);
            }
            let listener = self.shared.ready.listen();
            if let Some(record) = self.shared.queue.pop() {
                return Some(record);
            }
            if listener.wait_deadline(deadline).is_none() {
                return self.shared.queue.pop();
            }
        }
    }

    /// The number of records currently queued.
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }
}
