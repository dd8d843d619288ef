// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end engine tests: issue/completion correlation through record
//! emission.

use blk_defs::ReqHandle;
use blk_defs::ReqOp;
use blk_defs::TaskName;
use blksnoop::CommandRecord;
use blksnoop::CompletionRepr;
use blksnoop::OpSet;
use blksnoop::SnapshotView;
use blksnoop::SnoopBuilder;
use blksnoop::TraceFilter;
use probe_read::FaultAfter;
use probe_read::MemSource;
use std::sync::Arc;
use std::thread;
use zerocopy::IntoBytes;

fn scsi_write_view(cdb: &[u8]) -> SnapshotView {
    let mut repr = CompletionRepr {
        start_sector: 0x800,
        data_sectors: 16,
        major: 8,
        minor: 0,
        op: ReqOp::SCSI_OUT.0,
        cdb_len: cdb.len() as u8,
        ..Default::default()
    };
    repr.disk_name[..3].copy_from_slice(b"sda");
    repr.cdb[..cdb.len()].copy_from_slice(cdb);
    SnapshotView::from_repr(repr)
}

fn plain_view(disk: &str, op: ReqOp, start_sector: u64, data_sectors: u32) -> SnapshotView {
    let mut repr = CompletionRepr {
        start_sector,
        data_sectors,
        major: 8,
        minor: 0,
        op: op.0,
        ..Default::default()
    };
    repr.disk_name[..disk.len()].copy_from_slice(disk.as_bytes());
    SnapshotView::from_repr(repr)
}

#[test]
fn correlated_completion_emits_one_record() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    let handle = ReqHandle(0x1000);
    snoop.on_issue(handle, 1_000, TaskName::new("fio"));
    assert_eq!(snoop.inflight(), 1);
    snoop.on_completion(handle, 51_000, &plain_view("sda", ReqOp::WRITE, 0x800, 16));

    let record = reader.try_recv().expect("one record");
    assert_eq!(record.start_time_ns, 1_000);
    assert_eq!(record.latency_ns, 50_000);
    assert_eq!(record.task.as_str(), "fio");
    assert_eq!(record.disk.as_str(), "sda");
    assert_eq!(record.op, ReqOp::WRITE);
    assert_eq!(record.sub_opcode, 0); // no CDB decode for a plain write
    assert_eq!(record.lba, 0x800);
    assert_eq!(record.sectors, 16);
    assert!(reader.try_recv().is_none());
    assert_eq!(snoop.inflight(), 0);
    assert_eq!(snoop.stats().emitted(), 1);
}

#[test]
fn untracked_completion_emits_nothing() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    snoop.on_completion(ReqHandle(9), 100, &plain_view("sda", ReqOp::READ, 0, 8));
    assert!(reader.try_recv().is_none());
    assert_eq!(snoop.stats().untracked(), 1);

    // A duplicate completion is untracked the second time.
    let handle = ReqHandle(10);
    snoop.on_issue(handle, 0, TaskName::new("dup"));
    snoop.on_completion(handle, 10, &plain_view("sda", ReqOp::READ, 0, 8));
    snoop.on_completion(handle, 20, &plain_view("sda", ReqOp::READ, 0, 8));
    assert_eq!(snoop.stats().emitted(), 1);
    assert_eq!(snoop.stats().untracked(), 2);
}

#[test]
fn cdb_fields_override_request_fields() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    let handle = ReqHandle(1);
    // WRITE(10) at LBA 0x01020304, 0x20 blocks, via the passthrough path.
    let cdb = [0x2A, 0x00, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x20, 0x00];
    snoop.on_issue(handle, 0, TaskName::new("sg"));
    snoop.on_completion(handle, 10, &scsi_write_view(&cdb));

    let record = reader.try_recv().unwrap();
    assert_eq!(record.sub_opcode, 0x2A);
    assert_eq!(record.lba, 0x01020304);
    assert_eq!(record.sectors, 0x20);
}

#[test]
fn ata_passthrough_record_carries_ata_command() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    let mut cdb = [0u8; 16];
    cdb[0] = 0x85;
    cdb[6] = 0x10;
    cdb[8] = 0x01;
    cdb[10] = 0x02;
    cdb[12] = 0x03;
    cdb[14] = 0xEC;
    let handle = ReqHandle(2);
    snoop.on_issue(handle, 0, TaskName::new("smartctl"));
    snoop.on_completion(handle, 10, &scsi_write_view(&cdb));

    let record = reader.try_recv().unwrap();
    assert_eq!(record.lba, 0x030201);
    assert_eq!(record.sectors, 0x10);
    assert_eq!(record.ata_cmd, Some(0xEC));
}

#[test]
fn nvme_completion_uses_request_fields_and_mapped_opcode() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    let mut repr = CompletionRepr {
        start_sector: 0x4000,
        data_sectors: 32,
        major: 259,
        minor: 1,
        op: ReqOp::READ.0,
        write_hint: 2,
        ..Default::default()
    };
    repr.disk_name[..7].copy_from_slice(b"nvme0n1");
    let handle = ReqHandle(3);
    snoop.on_issue(handle, 0, TaskName::new("qemu"));
    snoop.on_completion(handle, 10, &SnapshotView::from_repr(repr));

    let record = reader.try_recv().unwrap();
    assert_eq!(record.disk.as_str(), "nvme0n1");
    assert_eq!(record.sub_opcode, 0x02); // NVM read
    assert_eq!(record.lba, 0x4000);
    assert_eq!(record.sectors, 32);
    assert_eq!(record.write_hint, Some(1));
}

#[test]
fn filter_drops_before_decode_and_counts() {
    let filter = TraceFilter::pass_all()
        .with_disk_prefixes(["nvme".to_string()])
        .with_ops(OpSet::EMPTY.with(ReqOp::READ).with(ReqOp::WRITE));
    let (snoop, reader) = SnoopBuilder::new().filter(filter).build().unwrap();

    snoop.on_issue(ReqHandle(1), 0, TaskName::new("a"));
    snoop.on_completion(ReqHandle(1), 10, &plain_view("sda", ReqOp::READ, 0, 8));
    snoop.on_issue(ReqHandle(2), 0, TaskName::new("b"));
    snoop.on_completion(ReqHandle(2), 10, &plain_view("nvme0n1", ReqOp::FLUSH, 0, 0));
    snoop.on_issue(ReqHandle(3), 0, TaskName::new("c"));
    snoop.on_completion(ReqHandle(3), 10, &plain_view("nvme0n1", ReqOp::READ, 0, 8));

    assert_eq!(snoop.stats().filtered(), 2);
    assert_eq!(snoop.stats().emitted(), 1);
    let record = reader.try_recv().unwrap();
    assert_eq!(record.disk.as_str(), "nvme0n1");
    assert_eq!(record.op, ReqOp::READ);
    assert!(reader.try_recv().is_none());
}

#[test]
fn ring_overflow_drops_and_counts() {
    let (snoop, reader) = SnoopBuilder::new().ring_depth(4).build().unwrap();
    for i in 0..10u64 {
        snoop.on_issue(ReqHandle(i), 0, TaskName::new("t"));
        snoop.on_completion(ReqHandle(i), 10, &plain_view("sda", ReqOp::READ, i, 1));
    }
    assert_eq!(snoop.stats().emitted(), 4);
    assert_eq!(snoop.stats().ring_dropped(), 6);
    assert_eq!(
        snoop.stats().emitted() + snoop.stats().ring_dropped(),
        10,
        "every attempt is accounted for"
    );

    let mut drained = 0;
    while reader.try_recv().is_some() {
        drained += 1;
    }
    assert_eq!(drained, 4);
}

#[test]
fn table_overflow_rejects_and_counts() {
    let (snoop, reader) = SnoopBuilder::new()
        .table_capacity(8)
        .table_shards(1)
        .build()
        .unwrap();
    for i in 0..12u64 {
        snoop.on_issue(ReqHandle(i), 0, TaskName::new("t"));
    }
    assert_eq!(snoop.inflight(), 8);
    assert_eq!(snoop.stats().table_rejected(), 4);

    // Rejected issues complete as untracked.
    snoop.on_completion(ReqHandle(11), 10, &plain_view("sda", ReqOp::READ, 0, 1));
    assert_eq!(snoop.stats().untracked(), 1);
    assert!(reader.try_recv().is_none());
}

#[test]
fn negative_latency_is_diagnosed_not_clamped() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    let handle = ReqHandle(1);
    snoop.on_issue(handle, 1_000, TaskName::new("t"));
    snoop.on_completion(handle, 400, &plain_view("sda", ReqOp::READ, 0, 1));
    let record = reader.try_recv().unwrap();
    assert_eq!(record.latency_ns, -600);
    assert_eq!(snoop.stats().negative_latency(), 1);
}

#[test]
fn faulted_snapshot_degrades_to_zeroed_record() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    let repr = CompletionRepr {
        start_sector: 0x123,
        data_sectors: 7,
        major: 8,
        op: ReqOp::READ.0,
        ..Default::default()
    };
    // Nothing past the first byte is readable.
    let src = FaultAfter {
        inner: MemSource(repr.as_bytes()),
        limit: 1,
    };
    let view = SnapshotView::read(&src);
    let handle = ReqHandle(1);
    snoop.on_issue(handle, 0, TaskName::new("t"));
    snoop.on_completion(handle, 10, &view);

    let record = reader.try_recv().expect("still emits");
    assert!(record.disk.is_empty());
    assert_eq!(record.op, ReqOp::READ); // ReqOp(0)
    assert_eq!(record.lba, 0);
    assert_eq!(record.sectors, 0);
    assert_eq!(record.sub_opcode, 0);
    assert_eq!(record.latency_ns, 10);
}

#[test]
fn reset_drops_inflight_entries() {
    let (snoop, reader) = SnoopBuilder::new().build().unwrap();
    snoop.on_issue(ReqHandle(1), 0, TaskName::new("t"));
    snoop.on_issue(ReqHandle(2), 0, TaskName::new("t"));
    snoop.reset();
    assert_eq!(snoop.inflight(), 0);
    snoop.on_completion(ReqHandle(1), 10, &plain_view("sda", ReqOp::READ, 0, 1));
    assert_eq!(snoop.stats().untracked(), 1);
    assert!(reader.try_recv().is_none());
}

#[test]
fn invalid_configurations_are_rejected() {
    assert!(SnoopBuilder::new().table_shards(3).build().is_err());
    assert!(SnoopBuilder::new().table_shards(0).build().is_err());
    assert!(SnoopBuilder::new()
        .table_capacity(4)
        .table_shards(8)
        .build()
        .is_err());
    assert!(SnoopBuilder::new().ring_depth(0).build().is_err());
}

#[test]
fn concurrent_issue_completion_no_cross_assignment() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 2_000;

    let (snoop, reader) = SnoopBuilder::new()
        .table_capacity((THREADS * PER_THREAD) as usize)
        .ring_depth((THREADS * PER_THREAD) as usize)
        .build()
        .unwrap();
    let snoop = Arc::new(snoop);

    let mut joins = Vec::new();
    for t in 0..THREADS {
        let snoop = snoop.clone();
        joins.push(thread::spawn(move || {
            let task = TaskName::new(&format!("worker-{t}"));
            for i in 0..PER_THREAD {
                let handle = ReqHandle(t * PER_THREAD + i);
                // Issue timestamps encode the owning thread and sequence so
                // any cross-thread mixup is detectable in the record.
                let issued = t * 1_000_000_000 + i;
                snoop.on_issue(handle, issued, task);
                snoop.on_completion(
                    handle,
                    issued + 100,
                    &plain_view("sda", ReqOp::READ, i, 1),
                );
            }
        }));
    }
    for j in joins {
        j.join().unwrap();
    }

    let mut seen = 0;
    while let Some(record) = reader.try_recv() {
        seen += 1;
        let t = record.start_time_ns / 1_000_000_000;
        assert_eq!(
            record.task,
            TaskName::new(&format!("worker-{t}")),
            "record must pair its own thread's start entry"
        );
        assert_eq!(record.latency_ns, 100);
    }
    assert_eq!(seen, THREADS * PER_THREAD);
    assert_eq!(snoop.stats().emitted(), THREADS * PER_THREAD);
    assert_eq!(snoop.stats().untracked(), 0);
    assert_eq!(snoop.stats().table_rejected(), 0);
}
