//! Register file: `A`, `X`, the scratch slots, and the extension slots.

use crate::consts::{REG_A, REG_X, SCRATCH_SLOT_COUNT};

/// Register value representation.
///
/// Slots are 64 bits wide so unsigned 32-bit results never pick up sign
/// extension on the way through.
pub type Word = u64;

bitflags::bitflags! {
    /// Sticky error bits exposed through the status slot.
    ///
    /// Bits survive across instructions until explicitly cleared.
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ErrorFlags: u64 {
        /// A CRC check failed.
        const CRC = 0x01;
        /// The layer-3 header checksum is wrong.
        const L3_CHECKSUM = 0x02;
        /// The layer-4 checksum is wrong.
        const L4_CHECKSUM = 0x04;
        /// A load ran past the visible packet, or the capture was short.
        const TRUNCATED = 0x08;
        /// The packet contradicts its own framing.
        const MALFORMED = 0x10;
    }
}

/// The sixteen general slots plus the named extension slots.
///
/// `A` and `X` are slots 0 and 1 of the same array the scratch slots
/// live in, per classic BPF convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    slots: [Word; SCRATCH_SLOT_COUNT],
    modified: u16,
    error: Word,
    frame_len: Word,
    l3_offset: Word,
    l4_offset: Word,
    payload_offset: Word,
}

impl RegisterFile {
    /// Creates a zeroed register file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator.
    pub const fn a(&self) -> Word {
        self.slots[REG_A]
    }

    /// Sets the accumulator.
    pub fn set_a(&mut self, value: Word) {
        self.set_scratch(REG_A, value);
    }

    /// Index register.
    pub const fn x(&self) -> Word {
        self.slots[REG_X]
    }

    /// Sets the index register.
    pub fn set_x(&mut self, value: Word) {
        self.set_scratch(REG_X, value);
    }

    /// Scratch slot `k`.
    ///
    /// # Panics
    /// When `k` is not a valid slot index; the verifier rejects such
    /// programs before execution.
    pub fn scratch(&self, k: usize) -> Word {
        self.slots[k]
    }

    /// Writes scratch slot `k` and records the write.
    pub fn set_scratch(&mut self, k: usize, value: Word) {
        self.slots[k] = value;
        self.modified |= 1 << k;
    }

    /// Whether slot `k` has been written since the last reset (diagnostic).
    pub const fn is_modified(&self, k: usize) -> bool {
        self.modified & (1 << k) != 0
    }

    /// Current error bits.
    pub fn error(&self) -> ErrorFlags {
        ErrorFlags::from_bits_truncate(self.error)
    }

    /// Ors `flags` into the status slot.
    pub fn set_error(&mut self, flags: ErrorFlags) {
        self.error |= flags.bits();
    }

    /// Clears every error bit.
    pub fn clear_errors(&mut self) {
        self.error = 0;
    }

    /// Frame length slot.
    pub const fn frame_len(&self) -> Word {
        self.frame_len
    }

    /// Sets the frame length slot.
    pub fn set_frame_len(&mut self, value: Word) {
        self.frame_len = value;
    }

    /// Layer-3 header offset slot.
    pub const fn l3_offset(&self) -> Word {
        self.l3_offset
    }

    /// Sets the layer-3 header offset slot.
    pub fn set_l3_offset(&mut self, value: Word) {
        self.l3_offset = value;
    }

    /// Layer-4 header offset slot.
    pub const fn l4_offset(&self) -> Word {
        self.l4_offset
    }

    /// Sets the layer-4 header offset slot.
    pub fn set_l4_offset(&mut self, value: Word) {
        self.l4_offset = value;
    }

    /// Payload offset slot.
    pub const fn payload_offset(&self) -> Word {
        self.payload_offset
    }

    /// Sets the payload offset slot.
    pub fn set_payload_offset(&mut self, value: Word) {
        self.payload_offset = value;
    }

    /// Zeroes every slot, flag and error bit.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
