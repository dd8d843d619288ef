// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The completion-side accessor interface.
//!
//! The hook layer hands the engine a [`CompletionView`] rather than raw
//! pointers into the block layer. Implementations must satisfy the
//! zero-fill-on-fault contract: a field that cannot be read is reported as
//! its zero value, never as a crash or an error. [`SnapshotView`] is the
//! shipped implementation, reading a packed [`CompletionRepr`] byte image
//! field by field through a [`ProbeSource`] so that a truncated or torn-down
//! snapshot degrades to zeroed fields.

use blk_defs::DeviceClass;
use blk_defs::DeviceId;
use blk_defs::DiskName;
use blk_defs::ReqOp;
use blk_defs::DISK_NAME_LEN;
use cmd_decode::RawCommand;
use core::mem::offset_of;
use nvme_defs::Command;
use probe_read::read_or_zero;
use probe_read::read_str_or_empty;
use probe_read::ProbeSource;
use scsi_defs::MAX_CDB_LEN;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Completion metadata for one request, as supplied by the hook layer.
///
/// Every accessor is infallible by contract: reads that fault yield zero
/// values (an empty name, a zero-filled command).
pub trait CompletionView {
    fn device(&self) -> DeviceId;
    fn disk_name(&self) -> DiskName;
    fn op(&self) -> ReqOp;
    /// The request's data length in sectors.
    fn data_sectors(&self) -> u32;
    /// The request's starting sector.
    fn start_sector(&self) -> u64;
    /// The raw command attached to the request.
    fn command(&self) -> RawCommand<'_>;
    /// The file write hint the request carried, if any.
    fn write_hint(&self) -> Option<u8>;
}

/// The packed byte image a [`SnapshotView`] is read from.
///
/// The submission entry leads so its 8-byte fields stay aligned; the layout
/// is padding-free.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CompletionRepr {
    pub sqe: Command,
    pub start_sector: u64,
    pub data_sectors: u32,
    pub major: u16,
    pub minor: u16,
    pub op: u8,
    /// Raw write hint; zero means "not set" and hint `n` is stored as `n+1`,
    /// mirroring the block layer's write-hint encoding.
    pub write_hint: u8,
    pub cdb_len: u8,
    pub reserved: u8,
    pub disk_name: [u8; DISK_NAME_LEN],
    pub cdb: [u8; MAX_CDB_LEN],
    pub reserved2: u32,
}

/// A [`CompletionView`] over a snapshot read through a [`ProbeSource`].
///
/// Each field is probed independently, so a source that faults partway
/// through yields zeroes for the unreadable fields and real data for the
/// rest.
pub struct SnapshotView {
    repr: CompletionRepr,
}

impl SnapshotView {
    pub fn read<S: ProbeSource + ?Sized>(src: &S) -> Self {
        let mut repr = CompletionRepr {
            sqe: read_or_zero(src, offset_of!(CompletionRepr, sqe) as u64),
            start_sector: read_or_zero(src, offset_of!(CompletionRepr, start_sector) as u64),
            data_sectors: read_or_zero(src, offset_of!(CompletionRepr, data_sectors) as u64),
            major: read_or_zero(src, offset_of!(CompletionRepr, major) as u64),
            minor: read_or_zero(src, offset_of!(CompletionRepr, minor) as u64),
            op: read_or_zero(src, offset_of!(CompletionRepr, op) as u64),
            write_hint: read_or_zero(src, offset_of!(CompletionRepr, write_hint) as u64),
            cdb_len: read_or_zero(src, offset_of!(CompletionRepr, cdb_len) as u64),
            reserved: 0,
            disk_name: [0; DISK_NAME_LEN],
            cdb: read_or_zero(src, offset_of!(CompletionRepr, cdb) as u64),
            reserved2: 0,
        };
        read_str_or_empty(
            src,
            offset_of!(CompletionRepr, disk_name) as u64,
            &mut repr.disk_name,
        );
        Self { repr }
    }

    pub fn from_repr(repr: CompletionRepr) -> Self {
        Self { repr }
    }
}

impl CompletionView for SnapshotView {
    fn device(&self) -> DeviceId {
        DeviceId {
            major: self.repr.major,
            minor: self.repr.minor,
        }
    }

    fn disk_name(&self) -> DiskName {
        DiskName(self.repr.disk_name)
    }

    fn op(&self) -> ReqOp {
        ReqOp(self.repr.op)
    }

    fn data_sectors(&self) -> u32 {
        self.repr.data_sectors
    }

    fn start_sector(&self) -> u64 {
        self.repr.start_sector
    }

    fn command(&self) -> RawCommand<'_> {
        match DeviceClass::from_major(self.repr.major) {
            DeviceClass::Nvme => RawCommand::Nvme(&self.repr.sqe),
            DeviceClass::Scsi | DeviceClass::Ata => {
                let len = (self.repr.cdb_len as usize).min(MAX_CDB_LEN);
                RawCommand::Cdb(&self.repr.cdb[..len])
            }
        }
    }

    fn write_hint(&self) -> Option<u8> {
        self.repr.write_hint.checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_read::FaultAfter;
    use probe_read::MemSource;

    fn sample_repr() -> CompletionRepr {
        let mut repr = CompletionRepr {
            start_sector: 0x1000,
            data_sectors: 8,
            major: 8,
            minor: 2,
            op: ReqOp::SCSI_OUT.0,
            write_hint: 3,
            cdb_len: 10,
            ..Default::default()
        };
        repr.disk_name[..3].copy_from_slice(b"sda");
        repr.cdb[0] = 0x2A;
        repr
    }

    #[test]
    fn snapshot_round_trip() {
        let repr = sample_repr();
        let view = SnapshotView::read(&MemSource(repr.as_bytes()));
        assert_eq!(view.device(), DeviceId { major: 8, minor: 2 });
        assert_eq!(view.disk_name().as_str(), "sda");
        assert_eq!(view.op(), ReqOp::SCSI_OUT);
        assert_eq!(view.data_sectors(), 8);
        assert_eq!(view.start_sector(), 0x1000);
        assert_eq!(view.write_hint(), Some(2));
        match view.command() {
            RawCommand::Cdb(cdb) => {
                assert_eq!(cdb.len(), 10);
                assert_eq!(cdb[0], 0x2A);
            }
            RawCommand::Nvme(_) => panic!("expected a CDB"),
        }
    }

    #[test]
    fn nvme_major_selects_sqe() {
        let mut repr = sample_repr();
        repr.major = 259;
        repr.sqe.cdw0 = repr.sqe.cdw0.with_opcode(0x09);
        let view = SnapshotView::read(&MemSource(repr.as_bytes()));
        match view.command() {
            RawCommand::Nvme(sqe) => assert_eq!(sqe.cdw0.opcode(), 0x09),
            RawCommand::Cdb(_) => panic!("expected an SQE"),
        }
    }

    #[test]
    fn faulted_fields_read_as_zero() {
        let repr = sample_repr();
        // Fault everything past the fixed header: the disk name and CDB are
        // unreadable, the rest is intact.
        let limit = offset_of!(CompletionRepr, disk_name) as u64;
        let src = FaultAfter {
            inner: MemSource(repr.as_bytes()),
            limit,
        };
        let view = SnapshotView::read(&src);
        assert_eq!(view.start_sector(), 0x1000);
        assert!(view.disk_name().is_empty());
        match view.command() {
            RawCommand::Cdb(cdb) => assert!(cdb.iter().all(|&b| b == 0)),
            RawCommand::Nvme(_) => panic!("expected a CDB"),
        }
    }

    #[test]
    fn write_hint_zero_means_unset() {
        let mut repr = sample_repr();
        repr.write_hint = 0;
        let view = SnapshotView::from_repr(repr);
        assert_eq!(view.write_hint(), None);
    }

    #[test]
    fn oversized_cdb_len_is_clamped() {
        let mut repr = sample_repr();
        repr.cdb_len = 0xFF;
        let view = SnapshotView::from_repr(repr);
        match view.command() {
            RawCommand::Cdb(cdb) => assert_eq!(cdb.len(), MAX_CDB_LEN),
            RawCommand::Nvme(_) => panic!("expected a CDB"),
        }
    }
}
