// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! SCSI CDB definitions for the commands the tracer decodes: the 6/10/12/16
//! byte read/write forms, UNMAP, SERVICE ACTION IN(16), the maintenance and
//! zoned-block commands, the 32-byte variable-length forms, and the SAT ATA
//! pass-through forms.
//!
//! Layouts follow SBC-4/SPC-5 and SAT-4.

#![no_std]
#![forbid(unsafe_code)]

use bitfield_struct::bitfield;
use core::fmt;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

type U16BE = zerocopy::byteorder::U16<zerocopy::byteorder::BigEndian>;
type U32BE = zerocopy::byteorder::U32<zerocopy::byteorder::BigEndian>;
type U64BE = zerocopy::byteorder::U64<zerocopy::byteorder::BigEndian>;

/// The longest CDB form the tracer inspects.
pub const MAX_CDB_LEN: usize = 32;

/// A SCSI operation code (CDB byte 0).
///
/// Open set: unknown values are preserved, not rejected.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(transparent)]
pub struct ScsiOp(pub u8);

impl ScsiOp {
    pub const READ6: Self = Self(0x08);
    pub const WRITE6: Self = Self(0x0A);
    pub const READ10: Self = Self(0x28);
    pub const WRITE10: Self = Self(0x2A);
    pub const VERIFY10: Self = Self(0x2F);
    pub const WRITE_SAME10: Self = Self(0x41);
    pub const UNMAP: Self = Self(0x42);
    pub const VARIABLE_LENGTH_CMD: Self = Self(0x7F);
    pub const ATA_PASSTHROUGH16: Self = Self(0x85);
    pub const READ16: Self = Self(0x88);
    pub const WRITE16: Self = Self(0x8A);
    pub const VERIFY16: Self = Self(0x8F);
    pub const WRITE_SAME16: Self = Self(0x93);
    pub const ZBC_OUT: Self = Self(0x94);
    pub const ZBC_IN: Self = Self(0x95);
    pub const SERVICE_ACTION_IN16: Self = Self(0x9E);
    pub const ATA_PASSTHROUGH12: Self = Self(0xA1);
    pub const MAINTENANCE_IN: Self = Self(0xA3);
    pub const MAINTENANCE_OUT: Self = Self(0xA4);
    pub const READ12: Self = Self(0xA8);
    pub const WRITE12: Self = Self(0xAA);
    pub const VERIFY12: Self = Self(0xAF);
}

impl fmt::Debug for ScsiOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::READ6 => "READ6",
            Self::WRITE6 => "WRITE6",
            Self::READ10 => "READ10",
            Self::WRITE10 => "WRITE10",
            Self::VERIFY10 => "VERIFY10",
            Self::WRITE_SAME10 => "WRITE_SAME10",
            Self::UNMAP => "UNMAP",
            Self::VARIABLE_LENGTH_CMD => "VARIABLE_LENGTH_CMD",
            Self::ATA_PASSTHROUGH16 => "ATA_PASSTHROUGH16",
            Self::READ16 => "READ16",
            Self::WRITE16 => "WRITE16",
            Self::VERIFY16 => "VERIFY16",
            Self::WRITE_SAME16 => "WRITE_SAME16",
            Self::ZBC_OUT => "ZBC_OUT",
            Self::ZBC_IN => "ZBC_IN",
            Self::SERVICE_ACTION_IN16 => "SERVICE_ACTION_IN16",
            Self::ATA_PASSTHROUGH12 => "ATA_PASSTHROUGH12",
            Self::MAINTENANCE_IN => "MAINTENANCE_IN",
            Self::MAINTENANCE_OUT => "MAINTENANCE_OUT",
            Self::READ12 => "READ12",
            Self::WRITE12 => "WRITE12",
            Self::VERIFY12 => "VERIFY12",
            _ => return fmt::Debug::fmt(&self.0, f),
        };
        f.pad(name)
    }
}

/// Service actions of the 32-byte variable-length CDB (bytes 8-9).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(transparent)]
pub struct VarlenServiceAction(pub u16);

impl VarlenServiceAction {
    pub const READ32: Self = Self(0x0009);
    pub const VERIFY32: Self = Self(0x000A);
    pub const WRITE32: Self = Self(0x000B);
    pub const WRITE_SAME32: Self = Self(0x000D);
    pub const ATA_PASSTHROUGH32: Self = Self(0x1FF0);
}

impl fmt::Debug for VarlenServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::READ32 => "READ32",
            Self::VERIFY32 => "VERIFY32",
            Self::WRITE32 => "WRITE32",
            Self::WRITE_SAME32 => "WRITE_SAME32",
            Self::ATA_PASSTHROUGH32 => "ATA_PASSTHROUGH32",
            _ => return fmt::Debug::fmt(&self.0, f),
        };
        f.pad(name)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb6ReadWrite {
    pub operation_code: ScsiOp,
    /// Top 3 bits are the LUN in archaic devices; the low 5 bits of byte 1
    /// are the high bits of the 21-bit LBA.
    pub logical_block: [u8; 3],
    pub transfer_blocks: u8,
    pub control: u8,
}

impl Cdb6ReadWrite {
    /// The 21-bit starting LBA.
    pub fn lba(&self) -> u64 {
        ((self.logical_block[0] & 0x1F) as u64) << 16
            | (self.logical_block[1] as u64) << 8
            | self.logical_block[2] as u64
    }
}

#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbFlags {
    pub relative_address: bool,
    #[bits(2)]
    pub reserved1: u8,
    pub fua: bool,
    pub disable_page_out: bool,
    #[bits(3)]
    pub protection: u8,
}

/// Byte 1 of the WRITE SAME forms. Bit 3 requests unmap rather than a
/// pattern write.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct WriteSameFlags {
    pub obsolete: bool,
    pub lbdata: bool,
    pub pbdata: bool,
    pub unmap: bool,
    pub anchor: bool,
    #[bits(3)]
    pub protection: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb10 {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U32BE,
    pub group: u8,
    pub transfer_blocks: U16BE,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb12 {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U32BE,
    pub transfer_blocks: U32BE,
    pub group: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb16 {
    pub operation_code: ScsiOp,
    pub flags: CdbFlags,
    pub logical_block: U64BE,
    pub transfer_blocks: U32BE,
    pub group: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbUnmap {
    pub operation_code: ScsiOp,
    pub anchor: u8,
    pub reserved: [u8; 4],
    pub group: u8,
    pub parameter_list_length: U16BE,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbServiceActionIn16 {
    pub operation_code: ScsiOp,
    pub service_action: u8,
    pub logical_block: U64BE,
    pub allocation_length: U32BE,
    pub flags: u8,
    pub control: u8,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbMaintenance {
    pub operation_code: ScsiOp,
    pub service_action: u8,
    pub reserved: [u8; 4],
    pub allocation_length: U32BE,
    pub reserved2: u8,
    pub control: u8,
}

/// ZBC IN/OUT (REPORT ZONES, zone management). ZBC OUT carries no allocation
/// length; the field is reserved there.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbZbc16 {
    pub operation_code: ScsiOp,
    pub service_action: u8,
    pub logical_block: U64BE,
    pub allocation_length: U32BE,
    pub flags: u8,
    pub control: u8,
}

/// The 32-byte variable-length read/write/verify/write-same form.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Cdb32 {
    pub operation_code: ScsiOp,
    pub control: u8,
    pub misc: [u8; 5],
    pub additional_cdb_length: u8,
    pub service_action: U16BE,
    pub flags: WriteSameFlags,
    pub reserved: u8,
    pub logical_block: U64BE,
    pub initial_reference_tag: U32BE,
    pub application_tag: U16BE,
    pub application_tag_mask: U16BE,
    pub transfer_blocks: U32BE,
}

/// ATA PASS-THROUGH(12). LBA bytes 5-7 assemble high to low.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbAtaPassthrough12 {
    pub operation_code: ScsiOp,
    pub protocol: u8,
    pub flags: u8,
    pub features: u8,
    pub sector_count: u8,
    pub lba: [u8; 3],
    pub device: u8,
    pub command: u8,
    pub reserved: u8,
    pub control: u8,
}

impl CdbAtaPassthrough12 {
    /// The 24-bit LBA, bytes 5-7 high to low.
    pub fn lba(&self) -> u64 {
        (self.lba[0] as u64) << 16 | (self.lba[1] as u64) << 8 | self.lba[2] as u64
    }
}

/// ATA PASS-THROUGH(16). The 48-bit taskfile interleaves the extended
/// registers, so the low 24 bits of the LBA sit at bytes 8, 10, and 12.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbAtaPassthrough16 {
    pub operation_code: ScsiOp,
    pub protocol: u8,
    pub flags: u8,
    pub features_ext: u8,
    pub features: u8,
    pub sector_count_ext: u8,
    pub sector_count: u8,
    pub lba_low_ext: u8,
    pub lba_low: u8,
    pub lba_mid_ext: u8,
    pub lba_mid: u8,
    pub lba_high_ext: u8,
    pub lba_high: u8,
    pub device: u8,
    pub command: u8,
    pub control: u8,
}

impl CdbAtaPassthrough16 {
    /// The low 24 bits of the LBA, assembled from the non-contiguous
    /// low/mid/high register bytes.
    pub fn lba(&self) -> u64 {
        (self.lba_high as u64) << 16 | (self.lba_mid as u64) << 8 | self.lba_low as u64
    }
}

/// ATA PASS-THROUGH(32), carried in the variable-length CDB under service
/// action 0x1ff0.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct CdbAtaPassthrough32 {
    pub operation_code: ScsiOp,
    pub control: u8,
    pub misc: [u8; 5],
    pub additional_cdb_length: u8,
    pub service_action: U16BE,
    pub protocol: u8,
    pub flags: u8,
    pub reserved: [u8; 5],
    pub lba: [u8; 3],
    pub reserved2: [u8; 3],
    pub sector_count: u8,
    pub device: u8,
    pub command: u8,
    pub reserved3: [u8; 6],
}

impl CdbAtaPassthrough32 {
    /// The 24-bit LBA, bytes 17-19 high to low.
    pub fn lba(&self) -> u64 {
        (self.lba[0] as u64) << 16 | (self.lba[1] as u64) << 8 | self.lba[2] as u64
    }
}
