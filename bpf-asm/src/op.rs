//! Shorthand constructors for every opcode.
//!
//! These keep hand-assembled programs readable:
//!
//! ```
//! use bpf_asm::op;
//!
//! let accept_ipv4 = [
//!     op::ldh(12),
//!     op::jeq_k(0x0800, 0, 1),
//!     op::ret_k(0x0004_0000),
//!     op::ret_k(0),
//! ];
//! # assert_eq!(accept_ipv4.len(), 4);
//! ```

use crate::{Instruction, Opcode};

macro_rules! imm_op {
    ($doc:literal, $name:ident, $opcode:ident) => {
        #[doc = $doc]
        pub const fn $name(k: u32) -> Instruction {
            Instruction::new(Opcode::$opcode, 0, 0, k)
        }
    };
}

macro_rules! reg_op {
    ($doc:literal, $name:ident, $opcode:ident) => {
        #[doc = $doc]
        pub const fn $name() -> Instruction {
            Instruction::new(Opcode::$opcode, 0, 0, 0)
        }
    };
}

macro_rules! cond_jump_op {
    ($doc:literal, $name:ident, $opcode:ident) => {
        #[doc = $doc]
        pub const fn $name(k: u32, jt: u8, jf: u8) -> Instruction {
            Instruction::new(Opcode::$opcode, jt, jf, k)
        }
    };
}

macro_rules! cond_jump_x_op {
    ($doc:literal, $name:ident, $opcode:ident) => {
        #[doc = $doc]
        pub const fn $name(jt: u8, jf: u8) -> Instruction {
            Instruction::new(Opcode::$opcode, jt, jf, 0)
        }
    };
}

imm_op!("`A = k`.", ld_imm, LdImm);
imm_op!("`A = u32` at absolute offset `k`.", ld, LdAbsW);
imm_op!("`A = u16` at absolute offset `k`.", ldh, LdAbsH);
imm_op!("`A = u8` at absolute offset `k`.", ldb, LdAbsB);
imm_op!("`A = u32` at offset `X + k`.", ld_ind, LdIndW);
imm_op!("`A = u16` at offset `X + k`.", ldh_ind, LdIndH);
imm_op!("`A = u8` at offset `X + k`.", ldb_ind, LdIndB);
imm_op!("`A = M[k]`.", ld_mem, LdMem);
reg_op!("`A = packet length`.", ld_len, LdLen);
imm_op!("`A = (packet[k] & 0x0f) << 2`.", ld_msh, LdMsh);
imm_op!("`X = k`.", ldx_imm, LdxImm);
imm_op!("`X = M[k]`.", ldx_mem, LdxMem);
reg_op!("`X = packet length`.", ldx_len, LdxLen);
imm_op!("`X = (packet[k] & 0x0f) << 2`.", ldx_msh, LdxMsh);

imm_op!("`M[k] = A`.", st, St);
imm_op!("`M[k] = X`.", stx, Stx);

imm_op!("`A = A + k`.", add_k, AddK);
imm_op!("`A = A - k`.", sub_k, SubK);
imm_op!("`A = A * k`.", mul_k, MulK);
imm_op!("`A = A / k`.", div_k, DivK);
imm_op!("`A = A | k`.", or_k, OrK);
imm_op!("`A = A & k`.", and_k, AndK);
imm_op!("`A = A << k`.", lsh_k, LshK);
imm_op!("`A = A >> k`.", rsh_k, RshK);
imm_op!("`A = A % k`.", mod_k, ModK);
imm_op!("`A = A ^ k`.", xor_k, XorK);
reg_op!("`A = -A`.", neg, Neg);
reg_op!("`A = A + X`.", add_x, AddX);
reg_op!("`A = A - X`.", sub_x, SubX);
reg_op!("`A = A * X`.", mul_x, MulX);
reg_op!("`A = A / X`.", div_x, DivX);
reg_op!("`A = A | X`.", or_x, OrX);
reg_op!("`A = A & X`.", and_x, AndX);
reg_op!("`A = A << X`.", lsh_x, LshX);
reg_op!("`A = A >> X`.", rsh_x, RshX);
reg_op!("`A = A % X`.", mod_x, ModX);
reg_op!("`A = A ^ X`.", xor_x, XorX);

/// Unconditional jump over `offset` instructions.
pub const fn ja(offset: i32) -> Instruction {
    Instruction::new(Opcode::Ja, 0, 0, offset as u32)
}

cond_jump_op!("Branch if `A == k`.", jeq_k, JeqK);
cond_jump_op!("Branch if `A > k`.", jgt_k, JgtK);
cond_jump_op!("Branch if `A >= k`.", jge_k, JgeK);
cond_jump_op!("Branch if `A & k != 0`.", jset_k, JsetK);
cond_jump_x_op!("Branch if `A == X`.", jeq_x, JeqX);
cond_jump_x_op!("Branch if `A > X`.", jgt_x, JgtX);
cond_jump_x_op!("Branch if `A >= X`.", jge_x, JgeX);
cond_jump_x_op!("Branch if `A & X != 0`.", jset_x, JsetX);

imm_op!("Terminate with verdict `k`.", ret_k, RetK);
reg_op!("Terminate with verdict `A`.", ret_a, RetA);

reg_op!("`X = A`.", tax, Tax);
reg_op!("`A = X`.", txa, Txa);

/// Verify the CRC-32 of `len` bytes starting at `offset` against the
/// 32-bit checksum that follows the region.
pub const fn chk_crc(offset: u32, len: u16) -> Instruction {
    Instruction::new(Opcode::ChkCrc, (len >> 8) as u8, len as u8, offset)
}

reg_op!("Verify the IPv4 header checksum.", chk_l3_csum, ChkL3Csum);
reg_op!("Verify the TCP/UDP checksum.", chk_l4_csum, ChkL4Csum);
reg_op!("Flag truncated captures.", chk_trunc, ChkTrunc);
imm_op!("Assert the frame is at least `k` bytes long.", chk_frame_len, ChkFrameLen);

/// Assert that protocol layer `layer` was decoded at byte `offset`.
pub const fn chk_proto_loc(layer: u8, offset: u32) -> Instruction {
    Instruction::new(Opcode::ChkProtoLoc, layer, 0, offset)
}
