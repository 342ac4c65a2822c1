//! Runtime and validation error taxonomy.

use crate::consts::{MAX_PACKET_SIZE, MAX_PROGRAM_LENGTH, SCRATCH_SLOT_COUNT};

/// Program rejected before execution.
///
/// Fatal to this program; the caller may load another.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationError {
    /// The program contains no instructions.
    #[error("program is empty")]
    Empty,
    /// The program exceeds the instruction limit.
    #[error("program has {len} instructions, limit is {MAX_PROGRAM_LENGTH}")]
    TooLong {
        /// Instruction count.
        len: usize,
    },
    /// An opcode byte is neither in the table nor in the extension range.
    #[error("unknown opcode 0x{opcode:02x} at instruction {index}")]
    UnknownOpcode {
        /// Instruction index.
        index: usize,
        /// Offending opcode byte.
        opcode: u8,
    },
    /// The final instruction does not terminate the program.
    #[error("last instruction (0x{opcode:02x}) is not a return")]
    MissingReturn {
        /// Opcode byte of the last instruction.
        opcode: u8,
    },
    /// A jump target lands outside the program.
    #[error("instruction {index} jumps to {target}, program length is {len}")]
    JumpOutOfRange {
        /// Instruction index.
        index: usize,
        /// Computed absolute target.
        target: i64,
        /// Program length.
        len: usize,
    },
    /// A jump moves backwards, which could loop forever.
    #[error("instruction {index} jumps backwards to {target}")]
    BackwardJump {
        /// Instruction index.
        index: usize,
        /// Computed absolute target.
        target: i64,
    },
    /// Division or modulo by a zero immediate.
    #[error("instruction {index} divides by a zero immediate")]
    DivisionByZeroImmediate {
        /// Instruction index.
        index: usize,
    },
    /// An absolute packet offset can never be satisfied.
    #[error(
        "instruction {index} reads packet offset {offset}, maximum is {MAX_PACKET_SIZE}"
    )]
    OffsetOutOfRange {
        /// Instruction index.
        index: usize,
        /// Offset immediate.
        offset: u32,
    },
    /// A scratch slot index is out of range.
    #[error("instruction {index} uses scratch slot {slot}, limit is {SCRATCH_SLOT_COUNT}")]
    ScratchOutOfRange {
        /// Instruction index.
        index: usize,
        /// Slot immediate.
        slot: u32,
    },
    /// A binary program image has a malformed length.
    #[error("program image of {len} bytes is not a whole number of instructions")]
    MalformedImage {
        /// Image size in bytes.
        len: usize,
    },
}

/// Execution aborted; the context must be reset before reuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// `execute` was called with no validated program.
    #[error("no validated program loaded")]
    NoProgramLoaded,
    /// The program counter ran past the last instruction.
    #[error("program ran past instruction {pc} without returning")]
    NoTerminatingReturn {
        /// Program counter at the fault.
        pc: usize,
    },
    /// No handler claimed an extension opcode.
    #[error("unknown opcode 0x{opcode:02x} at instruction {pc}")]
    UnknownOpcode {
        /// Offending opcode byte.
        opcode: u8,
        /// Program counter at the fault.
        pc: usize,
    },
    /// The step budget was exhausted.
    #[error("execution exceeded {steps} instructions")]
    Timeout {
        /// Instructions dispatched before the abort.
        steps: u64,
    },
    /// A condition the verifier guarantees was violated at runtime.
    #[error("interpreter invariant broken at instruction {pc}: {message}")]
    InterpreterInvariant {
        /// Program counter at the fault.
        pc: usize,
        /// Which invariant broke.
        message: &'static str,
    },
    /// An extension handler failed.
    #[error("extension failed at instruction {pc}: {source}")]
    Extension {
        /// Program counter at the fault.
        pc: usize,
        /// Underlying failure.
        source: ExtensionError,
    },
}

/// Packet buffer access fault.
///
/// Internal to the memory layer: the interpreter converts these into an
/// error-register bit and a zero load, and never propagates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemoryAccessError {
    /// Read beyond the visible packet.
    #[error("read of {size} bytes at offset {offset} exceeds packet length {len}")]
    OutOfBounds {
        /// Byte offset of the read.
        offset: u64,
        /// Read size in bytes.
        size: usize,
        /// Visible packet length.
        len: usize,
    },
    /// No packet has been loaded.
    #[error("packet memory is uninitialized")]
    Uninitialized,
    /// The packet does not fit the buffer limit.
    #[error("packet of {len} bytes exceeds the {MAX_PACKET_SIZE} byte limit")]
    PacketTooLarge {
        /// Packet length.
        len: usize,
    },
}

/// Extension registration or execution failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    /// Opcodes below the extension range cannot be claimed.
    #[error("opcode 0x{opcode:02x} is reserved for the core instruction set")]
    ReservedOpcode {
        /// Requested opcode byte.
        opcode: u8,
    },
    /// Two handlers claimed the same opcode.
    #[error("opcode 0x{opcode:02x} is already registered")]
    DuplicateOpcode {
        /// Contested opcode byte.
        opcode: u8,
    },
    /// The extension refused to initialize.
    #[error("extension {name:?} failed to initialize: {message}")]
    Initialize {
        /// Extension name.
        name: String,
        /// Failure description.
        message: String,
    },
    /// The extension failed mid-execution.
    #[error("extension {name:?} failed: {message}")]
    Execute {
        /// Extension name.
        name: String,
        /// Failure description.
        message: String,
    },
}
