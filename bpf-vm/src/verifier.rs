//! Static program verification.
//!
//! A program that passes these checks cannot loop (every jump moves
//! forward), cannot divide by a constant zero, and cannot name a scratch
//! slot or an absolute packet offset that could never be satisfied.
//! Per-packet bounds are left to the interpreter's runtime checks.

use crate::consts::{MAX_PACKET_SIZE, MAX_PROGRAM_LENGTH, SCRATCH_SLOT_COUNT};
use crate::error::ValidationError;

use bpf_asm::{Category, Instruction, Opcode, OperandFormat};

/// Lowest opcode byte an extension handler may claim.
pub const EXTENSION_OPCODE_BASE: u8 = 0x80;

/// Checks a whole instruction sequence.
pub fn check(instructions: &[Instruction]) -> Result<(), ValidationError> {
    if instructions.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = instructions.len();
    if len > MAX_PROGRAM_LENGTH {
        return Err(ValidationError::TooLong { len });
    }

    let last = instructions[len - 1];
    if !matches!(last.opcode(), Ok(Opcode::RetK | Opcode::RetA)) {
        return Err(ValidationError::MissingReturn { opcode: last.op() });
    }

    for (index, insn) in instructions.iter().enumerate() {
        check_instruction(index, insn, len)?;
    }

    Ok(())
}

fn check_instruction(
    index: usize,
    insn: &Instruction,
    len: usize,
) -> Result<(), ValidationError> {
    let opcode = match insn.opcode() {
        Ok(opcode) => opcode,
        // Bytes in the extension range are resolved by the handler table
        // at run time; anything below it must be in the table.
        Err(_) if insn.op() >= EXTENSION_OPCODE_BASE => return Ok(()),
        Err(_) => {
            return Err(ValidationError::UnknownOpcode {
                index,
                opcode: insn.op(),
            })
        }
    };

    match opcode.format() {
        OperandFormat::JumpCond => {
            check_branch(index, insn.jt(), len)?;
            check_branch(index, insn.jf(), len)?;
        }
        OperandFormat::JumpUncond => {
            let target = index as i64 + 1 + insn.offset() as i64;
            if insn.offset() < 0 {
                return Err(ValidationError::BackwardJump { index, target });
            }
            if target >= len as i64 {
                return Err(ValidationError::JumpOutOfRange { index, target, len });
            }
        }
        OperandFormat::MemoryAbs => {
            if insn.imm() as usize >= MAX_PACKET_SIZE {
                return Err(ValidationError::OffsetOutOfRange {
                    index,
                    offset: insn.imm(),
                });
            }
        }
        OperandFormat::MemoryReg => {
            if insn.imm() as usize >= SCRATCH_SLOT_COUNT {
                return Err(ValidationError::ScratchOutOfRange {
                    index,
                    slot: insn.imm(),
                });
            }
        }
        _ => {}
    }

    if opcode.category() == Category::Alu
        && matches!(opcode, Opcode::DivK | Opcode::ModK)
        && insn.imm() == 0
    {
        return Err(ValidationError::DivisionByZeroImmediate { index });
    }

    Ok(())
}

fn check_branch(index: usize, offset: u8, len: usize) -> Result<(), ValidationError> {
    let target = index as i64 + 1 + offset as i64;
    if target >= len as i64 {
        return Err(ValidationError::JumpOutOfRange { index, target, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpf_asm::op;

    fn ok(instructions: &[Instruction]) -> bool {
        check(instructions).is_ok()
    }

    #[test]
    fn minimal_accept_all_passes() {
        assert!(ok(&[op::ret_k(0x0004_0000)]));
    }

    #[test]
    fn empty_programs_are_rejected() {
        assert_eq!(check(&[]), Err(ValidationError::Empty));
    }

    #[test]
    fn oversized_programs_are_rejected() {
        let too_long = vec![op::ret_k(0); MAX_PROGRAM_LENGTH + 1];
        assert_eq!(
            check(&too_long),
            Err(ValidationError::TooLong {
                len: MAX_PROGRAM_LENGTH + 1
            })
        );
    }

    #[test]
    fn programs_must_end_in_a_return() {
        assert_eq!(
            check(&[op::ldh(12)]),
            Err(ValidationError::MissingReturn { opcode: 0x28 })
        );
    }

    #[test]
    fn forward_jumps_past_the_end_are_rejected() {
        // jeq #0, jt=5, jf=0 in a two-instruction program.
        let program = [op::jeq_k(0, 5, 0), op::ret_k(0)];
        assert_eq!(
            check(&program),
            Err(ValidationError::JumpOutOfRange {
                index: 0,
                target: 6,
                len: 2
            })
        );
    }

    #[test]
    fn backward_unconditional_jumps_are_rejected() {
        let program = [op::ldh(12), op::ja(-2), op::ret_k(0)];
        assert_eq!(
            check(&program),
            Err(ValidationError::BackwardJump {
                index: 1,
                target: 0
            })
        );
    }

    #[test]
    fn constant_division_by_zero_is_rejected() {
        assert_eq!(
            check(&[op::div_k(0), op::ret_a()]),
            Err(ValidationError::DivisionByZeroImmediate { index: 0 })
        );
        assert_eq!(
            check(&[op::mod_k(0), op::ret_a()]),
            Err(ValidationError::DivisionByZeroImmediate { index: 0 })
        );
        // Runtime division by X is the interpreter's problem.
        assert!(ok(&[op::div_x(), op::ret_a()]));
    }

    #[test]
    fn impossible_absolute_offsets_are_rejected() {
        assert_eq!(
            check(&[op::ldb(MAX_PACKET_SIZE as u32), op::ret_a()]),
            Err(ValidationError::OffsetOutOfRange {
                index: 0,
                offset: MAX_PACKET_SIZE as u32
            })
        );
    }

    #[test]
    fn scratch_slots_are_range_checked() {
        assert_eq!(
            check(&[op::st(16), op::ret_a()]),
            Err(ValidationError::ScratchOutOfRange { index: 0, slot: 16 })
        );
        assert!(ok(&[op::st(15), op::ld_mem(15), op::ret_a()]));
    }

    #[test]
    fn unknown_low_opcodes_are_rejected_extension_range_is_not() {
        let bogus = Instruction::from_parts(0x08, 0, 0, 0);
        assert_eq!(
            check(&[bogus, op::ret_k(0)]),
            Err(ValidationError::UnknownOpcode {
                index: 0,
                opcode: 0x08
            })
        );

        let handler_owned = Instruction::from_parts(0x90, 0, 0, 0);
        assert!(ok(&[handler_owned, op::ret_k(0)]));
    }
}
