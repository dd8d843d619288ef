// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! NVM command set opcodes.

use core::fmt;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// An NVM command set opcode.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, IntoBytes, Immutable, KnownLayout, FromBytes)]
#[repr(transparent)]
pub struct NvmOpcode(pub u8);

impl NvmOpcode {
    pub const FLUSH: Self = Self(0x00);
    pub const WRITE: Self = Self(0x01);
    pub const READ: Self = Self(0x02);
    pub const WRITE_UNCORRECTABLE: Self = Self(0x04);
    pub const COMPARE: Self = Self(0x05);
    pub const WRITE_ZEROES: Self = Self(0x08);
    /// Dataset management. Deallocate requests (discards) land here.
    pub const DSM: Self = Self(0x09);
}

impl fmt::Debug for NvmOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::FLUSH => "FLUSH",
            Self::WRITE => "WRITE",
            Self::READ => "READ",
            Self::WRITE_UNCORRECTABLE => "WRITE_UNCORRECTABLE",
            Self::COMPARE => "COMPARE",
            Self::WRITE_ZEROES => "WRITE_ZEROES",
            Self::DSM => "DSM",
            _ => return fmt::Debug::fmt(&self.0, f),
        };
        f.pad(name)
    }
}
