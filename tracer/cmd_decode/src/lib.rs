// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The multi-format storage command decoder.
//!
//! [`decode`] is a pure function from the device class, the normalized
//! request operation, and the raw command (a SCSI CDB or an NVMe submission
//! entry) to the protocol sub-opcode and, for CDB-carrying requests, the
//! starting LBA and transfer length. It holds no state and performs no
//! fallible reads: a zero-filled or truncated command decodes to the
//! "unrecognized" zero sentinel rather than an error, matching the
//! zero-on-fault contract of the hook layer.
//!
//! Version differences between kernel block layers (ATA pass-through
//! support, ZBC decode, the write-zeroes/DSM aliasing, and which operations
//! carry a decodable CDB) are captured in [`DecoderCaps`] rather than in
//! duplicated decoder variants.

#![no_std]
#![forbid(unsafe_code)]

mod nvme;
mod scsi;


use blk_defs::DeviceClass;
use blk_defs::ReqOp;

/// The raw command attached to a completed request.
#[derive(Copy, Clone, Debug)]
pub enum RawCommand<'a> {
    /// A SCSI command descriptor block, at most 32 bytes. A truncated or
    /// zero-filled buffer is decodable and yields the zero sentinel.
    Cdb(&'a [u8]),
    /// An NVMe submission queue entry.
    Nvme(&'a nvme_defs::Command),
}

/// An LBA range extracted from a CDB.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LbaRange {
    pub lba: u64,
    pub sectors: u32,
}

impl LbaRange {
    /// The "unrecognized command" sentinel.
    pub const ZERO: Self = Self { lba: 0, sectors: 0 };
}

/// The decoder output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedCmd {
    /// The protocol sub-opcode: CDB byte 0 for SCSI/ATA devices, the NVMe
    /// opcode for NVMe devices.
    pub sub_opcode: u8,
    /// The embedded ATA command byte, for ATA pass-through CDBs only.
    pub ata_cmd: Option<u8>,
    /// The LBA range decoded from the CDB. `None` when no CDB-level decode
    /// ran (NVMe devices, or an operation outside the configured trigger
    /// set); the caller keeps its request-derived fields in that case.
    pub fields: Option<LbaRange>,
}

/// Which normalized operations carry a CDB worth decoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CdbTrigger {
    /// The full passthrough range: SCSI_IN, SCSI_OUT, DRV_IN, DRV_OUT.
    Passthrough,
    /// Driver-private operations only, as classified by older block layers.
    DriverPrivate,
}

impl CdbTrigger {
    fn matches(&self, op: ReqOp) -> bool {
        match self {
            CdbTrigger::Passthrough => matches!(
                op,
                ReqOp::SCSI_IN | ReqOp::SCSI_OUT | ReqOp::DRV_IN | ReqOp::DRV_OUT
            ),
            CdbTrigger::DriverPrivate => matches!(op, ReqOp::DRV_IN | ReqOp::DRV_OUT),
        }
    }
}

/// The capability descriptor selecting among block-layer decode behaviors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecoderCaps {
    /// Decode the SAT ATA pass-through CDB forms.
    pub ata_passthrough: bool,
    /// Decode the zoned-block (ZBC IN/OUT) CDBs.
    pub zbc: bool,
    /// Map WRITE_ZEROES to the NVMe dataset-management opcode, as drivers
    /// that alias write-zeroes to deallocate do.
    pub write_zeroes_dsm: bool,
    /// Resolve unrecognized operations on NVMe devices from the submission
    /// entry's opcode field instead of classifying them by direction bit.
    pub unknown_reads_sqe: bool,
    /// Which operations trigger CDB field decode on SCSI/ATA devices.
    pub cdb_trigger: CdbTrigger,
}

impl DecoderCaps {
    /// Behavior of current block layers. This is the default.
    pub fn modern() -> Self {
        Self {
            ata_passthrough: true,
            zbc: true,
            write_zeroes_dsm: true,
            unknown_reads_sqe: true,
            cdb_trigger: CdbTrigger::Passthrough,
        }
    }

    /// Behavior of block layers that predate the unified operation space:
    /// no ATA pass-through or ZBC decode, write-zeroes classified by its
    /// direction bit, and CDB decode only for driver-private requests.
    pub fn legacy() -> Self {
        Self {
            ata_passthrough: false,
            zbc: false,
            write_zeroes_dsm: false,
            unknown_reads_sqe: false,
            cdb_trigger: CdbTrigger::DriverPrivate,
        }
    }
}

impl Default for DecoderCaps {
    fn default() -> Self {
        Self::modern()
    }
}

/// Decodes one completed request's command.
///
/// Pure and total: identical inputs always produce identical output, and
/// every input decodes to something (unknown commands yield the zero
/// sentinel, never an error).
pub fn decode(
    class: DeviceClass,
    op: ReqOp,
    raw: RawCommand<'_>,
    caps: &DecoderCaps,
) -> DecodedCmd {
    match class {
        DeviceClass::Nvme => DecodedCmd {
            sub_opcode: nvme::sub_opcode(op, &raw, caps),
            ata_cmd: None,
            fields: None,
        },
        DeviceClass::Scsi | DeviceClass::Ata => {
            let cdb = match raw {
                RawCommand::Cdb(cdb) => cdb,
                // Class/command mismatch; treat as an empty (faulted) CDB.
                RawCommand::Nvme(_) => &[],
            };
            let sub_opcode = cdb.first().copied().unwrap_or(0);
            let (fields, ata_cmd) = if caps.cdb_trigger.matches(op) {
                let (range, ata_cmd) = scsi::parse_cdb(cdb, caps);
                (Some(range), ata_cmd)
            } else {
                (None, None)
            };
            DecodedCmd {
                sub_opcode,
                ata_cmd,
                fields,
            }
        }
    }
}
