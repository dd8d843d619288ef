// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! NVMe sub-opcode resolution.
//!
//! Most NVMe requests never materialize a decodable command structure at the
//! block layer; their opcode is derived from the normalized operation.
//! Driver-passthrough requests carry a real submission entry, which is the
//! only place the actual opcode lives.

use crate::DecoderCaps;
use crate::RawCommand;
use blk_defs::ReqOp;
use nvme_defs::nvm::NvmOpcode;

pub(crate) fn sub_opcode(op: ReqOp, raw: &RawCommand<'_>, caps: &DecoderCaps) -> u8 {
    match op {
        ReqOp::DRV_IN | ReqOp::DRV_OUT => sqe_opcode(raw),
        ReqOp::FLUSH => NvmOpcode::FLUSH.0,
        ReqOp::DISCARD => NvmOpcode::DSM.0,
        ReqOp::WRITE_ZEROES if caps.write_zeroes_dsm => NvmOpcode::DSM.0,
        ReqOp::READ | ReqOp::WRITE | ReqOp::WRITE_ZEROES => direction_opcode(op),
        _ if caps.unknown_reads_sqe => sqe_opcode(raw),
        _ => direction_opcode(op),
    }
}

/// The direction bit of the operation selects between the NVM read and write
/// opcodes.
fn direction_opcode(op: ReqOp) -> u8 {
    if op.is_write() {
        NvmOpcode::WRITE.0
    } else {
        NvmOpcode::READ.0
    }
}

fn sqe_opcode(raw: &RawCommand<'_>) -> u8 {
    match raw {
        RawCommand::Nvme(sqe) => sqe.cdw0.opcode(),
        // Class/command mismatch; same degradation as a faulted read.
        RawCommand::Cdb(_) => 0,
    }
}
