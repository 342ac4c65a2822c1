//! Verifier behavior through the public loading surface.

mod test_helpers;

use bpf_vm::consts::MAX_PROGRAM_LENGTH;
use bpf_vm::prelude::*;

#[test]
fn validation_runs_once_and_sticks() {
    let mut program = Program::from_instructions([op::ret_k(0)]);
    assert!(!program.is_validated());
    program.validate().unwrap();
    assert!(program.is_validated());
    assert_eq!(program.validation_error(), None);
}

#[test]
fn rejected_programs_keep_their_reason_string() {
    let mut program = Program::from_instructions([op::div_k(0), op::ret_a()]);
    let err = program.validate().unwrap_err();
    assert_eq!(err, ValidationError::DivisionByZeroImmediate { index: 0 });
    assert_eq!(program.validation_error(), Some(err.to_string().as_str()));
}

#[test]
fn load_program_refuses_whatever_the_verifier_refuses() {
    let mut vm = Interpreter::new();

    for (program, expected) in [
        (
            Program::from_instructions([op::jeq_k(0, 5, 0), op::ret_k(0)]),
            ValidationError::JumpOutOfRange {
                index: 0,
                target: 6,
                len: 2,
            },
        ),
        (
            Program::from_instructions([op::ja(-1), op::ret_k(0)]),
            ValidationError::BackwardJump {
                index: 0,
                target: 0,
            },
        ),
        (
            Program::from_instructions([op::ldh(12)]),
            ValidationError::MissingReturn { opcode: 0x28 },
        ),
        (
            Program::from_instructions(std::iter::empty()),
            ValidationError::Empty,
        ),
    ] {
        assert_eq!(vm.load_program(program), Err(expected));
        assert!(vm.program().is_none());
    }
}

#[test]
fn a_program_at_the_length_limit_is_accepted() {
    let mut instructions = vec![op::ld_imm(0); MAX_PROGRAM_LENGTH - 1];
    instructions.push(op::ret_a());
    let mut program = Program::from_instructions(instructions);
    program.validate().unwrap();

    let mut over = vec![op::ld_imm(0); MAX_PROGRAM_LENGTH];
    over.push(op::ret_a());
    let mut program = Program::from_instructions(over);
    assert_eq!(
        program.validate(),
        Err(ValidationError::TooLong {
            len: MAX_PROGRAM_LENGTH + 1
        })
    );
}

#[test]
fn every_accepted_program_terminates() {
    // Worst case for the forward-only rule: a long ladder of conditional
    // jumps that always fall through, then return.
    let mut instructions = Vec::new();
    for _ in 0..512 {
        instructions.push(op::jeq_k(0xFFFF_FFFF, 0, 0));
    }
    instructions.push(op::ret_k(7));
    let program = Program::from_instructions(instructions);

    let (verdict, _) = test_helpers::run(program, &[0u8; 14]);
    assert_eq!(verdict, 7);
}

#[test]
fn classic_imports_validate_like_native_programs() {
    // { 0x15, 0, 1, 0x00000800 } followed by two returns.
    let image: Vec<u8> = [
        [0x00u8, 0x28, 0, 0, 0x00, 0x00, 0x00, 0x0c],
        [0x00, 0x15, 0, 1, 0x00, 0x00, 0x08, 0x00],
        [0x00, 0x06, 0, 0, 0x00, 0x04, 0x00, 0x00],
        [0x00, 0x06, 0, 0, 0x00, 0x00, 0x00, 0x00],
    ]
    .concat();

    let mut program = Program::from_classic_bytes(&image).unwrap();
    program.validate().unwrap();
    assert_eq!(program.len(), 4);
}
