// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Block-layer request definitions shared by the request tracker, the command
//! decoder, and the trace engine: the opaque request handle, the normalized
//! request operation code, device identity, and the fixed-length name types
//! used in trace records.

#![no_std]
#![forbid(unsafe_code)]

use core::fmt;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Maximum length of a task (process) name, including any NUL padding.
pub const TASK_COMM_LEN: usize = 16;

/// Maximum length of a disk name, including any NUL padding.
pub const DISK_NAME_LEN: usize = 32;

/// Block extended major, used by the NVMe driver for its block devices.
pub const BLOCK_EXT_MAJOR: u16 = 259;

/// Majors of the legacy IDE/ATA controllers.
pub const IDE0_MAJOR: u16 = 3;
pub const IDE1_MAJOR: u16 = 22;

/// An opaque, stable identity for an in-flight request.
///
/// Valid from issue until completion. Used only as a correlation key; it is
/// never dereferenced.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ReqHandle(pub u64);

impl From<u64> for ReqHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for ReqHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReqHandle({:#x})", self.0)
    }
}

/// The device a completed request was issued to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(C)]
pub struct DeviceId {
    pub major: u16,
    pub minor: u16,
}

/// The normalized request operation code, independent of the storage protocol
/// carrying the request.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(transparent)]
pub struct ReqOp(pub u8);

impl ReqOp {
    pub const READ: Self = Self(0);
    pub const WRITE: Self = Self(1);
    pub const FLUSH: Self = Self(2);
    pub const DISCARD: Self = Self(3);
    pub const ZONE_REPORT: Self = Self(4);
    pub const SECURE_ERASE: Self = Self(5);
    pub const ZONE_RESET: Self = Self(6);
    pub const WRITE_SAME: Self = Self(7);
    pub const WRITE_ZEROES: Self = Self(9);
    pub const SCSI_IN: Self = Self(32);
    pub const SCSI_OUT: Self = Self(33);
    pub const DRV_IN: Self = Self(34);
    pub const DRV_OUT: Self = Self(35);

    /// Returns true for operations that move data toward the device.
    ///
    /// The low bit of the operation code encodes the data direction.
    pub fn is_write(&self) -> bool {
        self.0 & 1 != 0
    }

    /// Returns true for the passthrough operation range (SCSI_IN and above).
    pub fn is_passthrough(&self) -> bool {
        self.0 >= Self::SCSI_IN.0
    }

    /// The display name of the operation, if it is a known operation.
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::READ => "read",
            Self::WRITE => "write",
            Self::FLUSH => "flush",
            Self::DISCARD => "discard",
            Self::ZONE_REPORT => "zone_report",
            Self::SECURE_ERASE => "secure_erase",
            Self::ZONE_RESET => "zone_reset",
            Self::WRITE_SAME => "write_same",
            Self::WRITE_ZEROES => "write_zeroes",
            Self::SCSI_IN => "scsi_in",
            Self::SCSI_OUT => "scsi_out",
            Self::DRV_IN => "drv_in",
            Self::DRV_OUT => "drv_out",
            _ => return None,
        })
    }
}

impl fmt::Debug for ReqOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.pad(name),
            None => fmt::Debug::fmt(&self.0, f),
        }
    }
}

/// The storage protocol class of a device, selected once per completion from
/// the device major.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    Scsi,
    Ata,
    Nvme,
}

impl DeviceClass {
    /// Classifies a device by its major number.
    ///
    /// NVMe block devices register under [`BLOCK_EXT_MAJOR`]; the legacy IDE
    /// majors identify ATA devices. Everything else takes the SCSI path, which
    /// also carries SAT-translated ATA commands.
    pub fn from_major(major: u16) -> Self {
        match major {
            BLOCK_EXT_MAJOR => Self::Nvme,
            IDE0_MAJOR | IDE1_MAJOR => Self::Ata,
            _ => Self::Scsi,
        }
    }
}

/// A fixed-length, NUL-padded task name, as captured at request issue.
#[derive(Copy, Clone, PartialEq, Eq, Hash, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(transparent)]
pub struct TaskName(pub [u8; TASK_COMM_LEN]);

/// A fixed-length, NUL-padded disk name, as captured at request completion.
#[derive(Copy, Clone, PartialEq, Eq, Hash, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(transparent)]
pub struct DiskName(pub [u8; DISK_NAME_LEN]);

macro_rules! fixed_name {
    ($name:ident, $len:expr) => {
        impl $name {
            /// Creates a name from a string, truncating to the fixed length.
            pub fn new(name: &str) -> Self {
                let mut buf = [0; $len];
                let n = name.len().min($len);
                buf[..n].copy_from_slice(&name.as_bytes()[..n]);
                Self(buf)
            }

            /// The name bytes up to the first NUL.
            pub fn as_bytes_trimmed(&self) -> &[u8] {
                let len = self.0.iter().position(|&b| b == 0).unwrap_or($len);
                &self.0[..len]
            }

            /// The name as a string, stopping at the first NUL or the first
            /// invalid UTF-8 byte.
            pub fn as_str(&self) -> &str {
                let bytes = self.as_bytes_trimmed();
                match core::str::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(err) => {
                        core::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default()
                    }
                }
            }

            pub fn is_empty(&self) -> bool {
                self.0[0] == 0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0; $len])
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(buf: [u8; $len]) -> Self {
                Self(buf)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.as_str())
            }
        }
    };
}

fixed_name!(TaskName, TASK_COMM_LEN);
fixed_name!(DiskName, DISK_NAME_LEN);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_op_direction() {
        assert!(!ReqOp::READ.is_write());
        assert!(ReqOp::WRITE.is_write());
        assert!(!ReqOp::SCSI_IN.is_write());
        assert!(ReqOp::SCSI_OUT.is_write());
        assert!(ReqOp::DRV_OUT.is_passthrough());
        assert!(!ReqOp::WRITE_ZEROES.is_passthrough());
    }

    #[test]
    fn req_op_names() {
        assert_eq!(ReqOp::DISCARD.name(), Some("discard"));
        assert_eq!(ReqOp(200).name(), None);
    }

    #[test]
    fn device_class_from_major() {
        assert_eq!(DeviceClass::from_major(259), DeviceClass::Nvme);
        assert_eq!(DeviceClass::from_major(3), DeviceClass::Ata);
        assert_eq!(DeviceClass::from_major(22), DeviceClass::Ata);
        assert_eq!(DeviceClass::from_major(8), DeviceClass::Scsi);
        assert_eq!(DeviceClass::from_major(65), DeviceClass::Scsi);
    }

    #[test]
    fn task_name_truncates() {
        let name = TaskName::new("a-task-name-that-is-too-long");
        assert_eq!(name.as_str(), "a-task-name-that");
        assert_eq!(name.as_bytes_trimmed().len(), TASK_COMM_LEN);
    }

    #[test]
    fn disk_name_stops_at_nul() {
        let mut buf = [0; DISK_NAME_LEN];
        buf[..7].copy_from_slice(b"nvme0n1");
        let name = DiskName::from(buf);
        assert_eq!(name.as_str(), "nvme0n1");
        assert!(!name.is_empty());
        assert!(DiskName::default().is_empty());
    }

    #[test]
    fn name_display_survives_invalid_utf8() {
        let mut buf = [0; TASK_COMM_LEN];
        buf[0] = b'x';
        buf[1] = 0xff;
        let name = TaskName::from(buf);
        assert_eq!(name.as_str(), "x");
    }
}
