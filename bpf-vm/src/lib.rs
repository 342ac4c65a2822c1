//! Verifier and interpreter for the classic BPF packet-filter VM.
//!
//! A program, loaded from raw 64-bit words, classic 32-bit-toolchain
//! records, or the `tcpdump -d` / `-dd` textual forms, is validated once
//! by the static verifier and then evaluated against packet buffers held
//! by per-thread [`context::ExecutionContext`]s. Evaluation returns a
//! 32-bit verdict; check extensions report through a sticky error
//! register instead of aborting.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod analyzer;
pub mod consts;
pub mod context;
pub mod error;
pub mod extension;
pub mod interpreter;
pub mod memory;
pub mod program;
pub mod protocol;
pub mod registers;
pub mod tracer;
pub mod verifier;

#[doc(no_inline)]
pub use bpf_asm;

pub mod prelude {
    //! Everything a typical embedder needs.

    #[doc(no_inline)]
    pub use bpf_asm::{op, Instruction, Opcode, ParseError, RawInstruction};

    pub use crate::{
        analyzer::{analyze, Analysis, RedundantJump},
        context::ExecutionContext,
        error::{ExecutionError, ExtensionError, MemoryAccessError, ValidationError},
        extension::{
            BuiltinChecks, Extension, ExtensionConfig, ExtensionCtx, ExtensionRegistry,
            RegistrationCtx,
        },
        interpreter::Interpreter,
        memory::{ByteOrder, PacketMemory},
        program::Program,
        protocol::ProtocolInfo,
        registers::{ErrorFlags, RegisterFile, Word},
        tracer::{TraceRecord, Tracer},
    };
}
