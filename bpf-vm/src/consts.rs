//! VM parameters

/// Maximum packet buffer size, in bytes.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Maximum number of instructions in a program.
pub const MAX_PROGRAM_LENGTH: usize = 4096;

/// Instructions dispatched before one execution is aborted.
///
/// The verifier rejects backward edges, so a validated program can never
/// reach this; it guards against verifier bugs.
pub const STEP_BUDGET: u64 = 1024 * 1024;

/// Number of scratch slots in the register file.
pub const SCRATCH_SLOT_COUNT: usize = 16;

/// Number of protocol layers tracked per context.
pub const PROTOCOL_LAYER_COUNT: usize = 16;

/// Register file slot holding the accumulator.
pub const REG_A: usize = 0;

/// Register file slot holding the index register.
pub const REG_X: usize = 1;

/// All ALU results are truncated to this many value bits.
pub const VALUE_MASK: u64 = u32::MAX as u64;

static_assertions::const_assert!(MAX_PACKET_SIZE <= u32::MAX as usize);
static_assertions::const_assert!(MAX_PROGRAM_LENGTH <= u32::MAX as usize);
