//! Instruction set primitives of the classic BPF packet-filter VM.
//!
//! The crate owns everything about instructions that does not require an
//! execution context: the opcode table, the 64-bit instruction word codec,
//! shorthand constructors, and the `tcpdump -d` / `-dd` textual forms.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod instruction;
mod opcode;

pub mod op;
pub mod parse;
pub mod text;

pub use instruction::{BytesTooShort, Instruction, RawInstruction};
pub use opcode::{Category, InvalidOpcode, Opcode, OperandFormat};
pub use parse::{parse_hex, parse_program, parse_text, ParseError};
pub use text::{dump_hex_instruction, dump_instruction, dump_program, dump_program_hex};
