// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! CDB field extraction, dispatched on the operation code in byte 0.

use crate::DecoderCaps;
use crate::LbaRange;
use scsi_defs::Cdb10;
use scsi_defs::Cdb12;
use scsi_defs::Cdb16;
use scsi_defs::Cdb32;
use scsi_defs::Cdb6ReadWrite;
use scsi_defs::CdbAtaPassthrough12;
use scsi_defs::CdbAtaPassthrough16;
use scsi_defs::CdbAtaPassthrough32;
use scsi_defs::CdbMaintenance;
use scsi_defs::CdbServiceActionIn16;
use scsi_defs::CdbUnmap;
use scsi_defs::CdbZbc16;
use scsi_defs::ScsiOp;
use scsi_defs::VarlenServiceAction;
use scsi_defs::WriteSameFlags;
use zerocopy::FromBytes;

/// Extracts the LBA range, and for ATA pass-through commands the embedded
/// ATA command byte, from a CDB.
///
/// A CDB whose opcode is unrecognized, or that is shorter than its form's
/// layout, yields [`LbaRange::ZERO`]. This also covers a zero-filled buffer
/// from a faulted read, whose opcode 0x00 (TEST UNIT READY) is not a command
/// the tracer decodes.
pub(crate) fn parse_cdb(cdb: &[u8], caps: &DecoderCaps) -> (LbaRange, Option<u8>) {
    let Some(&opcode) = cdb.first() else {
        return (LbaRange::ZERO, None);
    };
    let fields = match ScsiOp(opcode) {
        ScsiOp::READ6 | ScsiOp::WRITE6 => rw6(cdb),
        ScsiOp::READ10 | ScsiOp::VERIFY10 | ScsiOp::WRITE10 => rw10(cdb),
        ScsiOp::WRITE_SAME10 => write_same(cdb),
        ScsiOp::READ12 | ScsiOp::VERIFY12 | ScsiOp::WRITE12 => rw12(cdb),
        ScsiOp::READ16 | ScsiOp::VERIFY16 | ScsiOp::WRITE16 => rw16(cdb),
        ScsiOp::WRITE_SAME16 => write_same(cdb),
        ScsiOp::UNMAP => unmap(cdb),
        ScsiOp::SERVICE_ACTION_IN16 => service_action_in16(cdb),
        ScsiOp::MAINTENANCE_IN | ScsiOp::MAINTENANCE_OUT => maintenance(cdb),
        ScsiOp::ZBC_IN if caps.zbc => zbc(cdb, true),
        ScsiOp::ZBC_OUT if caps.zbc => zbc(cdb, false),
        ScsiOp::VARIABLE_LENGTH_CMD => return varlen(cdb, caps),
        ScsiOp::ATA_PASSTHROUGH12 if caps.ata_passthrough => return ata12(cdb),
        ScsiOp::ATA_PASSTHROUGH16 if caps.ata_passthrough => return ata16(cdb),
        _ => None,
    };
    (fields.unwrap_or(LbaRange::ZERO), None)
}

fn rw6(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = Cdb6ReadWrite::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.lba(),
        sectors: cdb.transfer_blocks.into(),
    })
}

fn rw10(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = Cdb10::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.logical_block.get().into(),
        sectors: cdb.transfer_blocks.get().into(),
    })
}

fn rw12(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = Cdb12::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.logical_block.get().into(),
        sectors: cdb.transfer_blocks.get(),
    })
}

fn rw16(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = Cdb16::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.logical_block.get(),
        sectors: cdb.transfer_blocks.get(),
    })
}

/// WRITE SAME reports only whether it was an unmap-style request: the LBA
/// field carries the unmap flag bit and the length is forced to zero.
fn write_same(cdb: &[u8]) -> Option<LbaRange> {
    let flags = WriteSameFlags::from_bits(*cdb.get(1)?);
    Some(LbaRange {
        lba: flags.unmap() as u64,
        sectors: 0,
    })
}

/// UNMAP has no LBA in the CDB; the parameter list length is reported as-is
/// in the LBA field.
fn unmap(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = CdbUnmap::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.parameter_list_length.get().into(),
        sectors: 0,
    })
}

fn service_action_in16(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = CdbServiceActionIn16::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.logical_block.get(),
        sectors: cdb.allocation_length.get(),
    })
}

fn maintenance(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = CdbMaintenance::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: 0,
        sectors: cdb.allocation_length.get(),
    })
}

fn zbc(cdb: &[u8], has_length: bool) -> Option<LbaRange> {
    let (cdb, _) = CdbZbc16::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.logical_block.get(),
        sectors: if has_length {
            cdb.allocation_length.get()
        } else {
            0
        },
    })
}

fn varlen(cdb: &[u8], caps: &DecoderCaps) -> (LbaRange, Option<u8>) {
    // Service action at bytes 8-9.
    let sa = match (cdb.get(8), cdb.get(9)) {
        (Some(&hi), Some(&lo)) => VarlenServiceAction(u16::from_be_bytes([hi, lo])),
        _ => return (LbaRange::ZERO, None),
    };
    let fields = match sa {
        VarlenServiceAction::READ32 | VarlenServiceAction::VERIFY32
        | VarlenServiceAction::WRITE32 => rw32(cdb),
        VarlenServiceAction::WRITE_SAME32 => write_same32(cdb),
        VarlenServiceAction::ATA_PASSTHROUGH32 if caps.ata_passthrough => return ata32(cdb),
        _ => None,
    };
    (fields.unwrap_or(LbaRange::ZERO), None)
}

fn rw32(cdb: &[u8]) -> Option<LbaRange> {
    let (cdb, _) = Cdb32::read_from_prefix(cdb).ok()?;
    Some(LbaRange {
        lba: cdb.logical_block.get(),
        sectors: cdb.transfer_blocks.get(),
    })
}

fn write_same32(cdb: &[u8]) -> Option<LbaRange> {
    let flags = WriteSameFlags::from_bits(*cdb.get(10)?);
    Some(LbaRange {
        lba: flags.unmap() as u64,
        sectors: 0,
    })
}

fn ata12(cdb: &[u8]) -> (LbaRange, Option<u8>) {
    match CdbAtaPassthrough12::read_from_prefix(cdb) {
        Ok((cdb, _)) => (
            LbaRange {
                lba: cdb.lba(),
                sectors: cdb.sector_count.into(),
            },
            Some(cdb.command),
        ),
        Err(_) => (LbaRange::ZERO, None),
    }
}

fn ata16(cdb: &[u8]) -> (LbaRange, Option<u8>) {
    match CdbAtaPassthrough16::read_from_prefix(cdb) {
        Ok((cdb, _)) => (
            LbaRange {
                lba: cdb.lba(),
                sectors: cdb.sector_count.into(),
            },
            Some(cdb.command),
        ),
        Err(_) => (LbaRange::ZERO, None),
    }
}

fn ata32(cdb: &[u8]) -> (LbaRange, Option<u8>) {
    match CdbAtaPassthrough32::read_from_prefix(cdb) {
        Ok((cdb, _)) => (
            LbaRange {
                lba: cdb.lba(),
                sectors: cdb.sector_count.into(),
            },
            Some(cdb.command),
        ),
        Err(_) => (LbaRange::ZERO, None),
    }
}
