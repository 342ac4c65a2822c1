use bpf_asm::{
    dump_program, dump_program_hex, op, parse_hex, parse_program, parse_text, Instruction,
    Opcode,
};

use strum::IntoEnumIterator;

/// One instruction of every opcode, with operands exercising every field.
fn exhaustive_program() -> Vec<Instruction> {
    let mut program: Vec<Instruction> = Opcode::iter()
        .map(|opcode| match opcode.format() {
            bpf_asm::OperandFormat::JumpCond => Instruction::new(opcode, 3, 7, 0x1234),
            bpf_asm::OperandFormat::JumpUncond => Instruction::new(opcode, 0, 0, 2),
            bpf_asm::OperandFormat::Extended => match opcode {
                Opcode::ChkCrc => op::chk_crc(14, 60),
                Opcode::ChkFrameLen => op::chk_frame_len(64),
                Opcode::ChkProtoLoc => op::chk_proto_loc(2, 34),
                _ => Instruction::new(opcode, 0, 0, 0),
            },
            bpf_asm::OperandFormat::RegOnly => Instruction::new(opcode, 0, 0, 0),
            _ => Instruction::new(opcode, 0, 0, 9),
        })
        .collect();
    // A handler-registered opcode outside the table.
    program.push(Instruction::from_parts(0x90, 1, 2, 5));
    program.push(op::ret_k(0));
    program
}

#[test]
fn text_form_round_trips() {
    let program = exhaustive_program();
    let text = dump_program(&program);
    assert_eq!(parse_text(&text).expect(&text), program);
}

#[test]
fn hex_form_round_trips() {
    let program = exhaustive_program();
    let text = dump_program_hex(&program);
    assert_eq!(parse_hex(&text).expect(&text), program);
}

#[test]
fn detection_picks_the_right_parser() {
    let program = exhaustive_program();
    assert_eq!(parse_program(&dump_program(&program)).unwrap(), program);
    assert_eq!(parse_program(&dump_program_hex(&program)).unwrap(), program);
}

#[test]
fn binary_and_text_forms_agree() {
    let program = exhaustive_program();
    let bytes: Vec<u8> = program.iter().copied().collect();
    let reparsed = Instruction::from_bytes_iter(bytes);
    assert_eq!(reparsed, program);

    let via_text = parse_text(&dump_program(&reparsed)).unwrap();
    let via_hex = parse_hex(&dump_program_hex(&reparsed)).unwrap();
    assert_eq!(via_text, via_hex);
}
