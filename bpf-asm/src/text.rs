//! Disassembly into the `tcpdump -d` and `tcpdump -dd` textual forms.

use crate::{Instruction, Opcode, OperandFormat};

use core::fmt::Write;

/// Formats one instruction in the `-d` form: `(NNN) mnemonic operands`.
///
/// Conditional jump targets are printed as absolute instruction indices,
/// the way `tcpdump -d` shows them; the stored offsets are relative to the
/// following instruction.
pub fn dump_instruction(index: usize, insn: &Instruction) -> String {
    let (mnemonic, operands) = match insn.opcode() {
        Ok(op) => (op.mnemonic(), operands(index, op, insn)),
        // Handler-registered opcode with no table entry.
        Err(_) => (
            "ext",
            format!(
                "0x{:02x} dst={} src={} #{}",
                insn.op(),
                insn.dst(),
                insn.src(),
                insn.imm()
            ),
        ),
    };

    let mut line = format!("({index:03}) {mnemonic:<15}{operands}");
    line.truncate(line.trim_end().len());
    line
}

/// Formats one instruction in the `-dd` form: `{ 0xOP, JT, JF, 0xKKKKKKKK },`.
pub fn dump_hex_instruction(insn: &Instruction) -> String {
    format!(
        "{{ 0x{:02x}, {}, {}, 0x{:08x} }},",
        insn.op(),
        insn.jt(),
        insn.jf(),
        insn.imm()
    )
}

/// Disassembles a whole program in the `-d` form, one line per instruction.
pub fn dump_program(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for (index, insn) in instructions.iter().enumerate() {
        writeln!(out, "{}", dump_instruction(index, insn)).expect("infallible write");
    }
    out
}

/// Disassembles a whole program in the `-dd` form.
pub fn dump_program_hex(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for insn in instructions {
        writeln!(out, "{}", dump_hex_instruction(insn)).expect("infallible write");
    }
    out
}

fn operands(index: usize, op: Opcode, insn: &Instruction) -> String {
    let k = insn.imm();
    match op.format() {
        OperandFormat::Immediate => format!("#{k}"),
        OperandFormat::MemoryAbs => match op {
            // The classic IHL shorthand keeps tcpdump's spelling.
            Opcode::LdMsh | Opcode::LdxMsh => format!("4*([{k}]&0xf)"),
            _ => format!("[{k}]"),
        },
        OperandFormat::MemoryInd => format!("[x + {k}]"),
        OperandFormat::MemoryReg => format!("M[{k}]"),
        OperandFormat::RegOnly => match op {
            Opcode::LdLen | Opcode::LdxLen => "len".into(),
            Opcode::RetA => "a".into(),
            op if op.category() == crate::Category::Alu => "x".into(),
            _ => String::new(),
        },
        OperandFormat::JumpUncond => format!("{:+}", insn.offset()),
        OperandFormat::JumpCond => {
            let jt = index + 1 + insn.jt() as usize;
            let jf = index + 1 + insn.jf() as usize;
            if op.compares_index_register() {
                format!("x jt {jt} jf {jf}")
            } else {
                format!("#0x{k:x} jt {jt} jf {jf}")
            }
        }
        OperandFormat::Extended => match op {
            Opcode::ChkCrc => {
                let len = (insn.dst() as u16) << 8 | insn.src() as u16;
                format!("offset={k} len={len}")
            }
            Opcode::ChkFrameLen => format!(">={k}"),
            Opcode::ChkProtoLoc => format!("layer={} offset={k}", insn.dst()),
            _ => String::new(),
        },
    }
}
