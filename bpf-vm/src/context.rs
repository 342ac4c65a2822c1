//! Execution context: everything one packet evaluation mutates.

use crate::consts::PROTOCOL_LAYER_COUNT;
use crate::error::MemoryAccessError;
use crate::memory::PacketMemory;
use crate::protocol::ProtocolInfo;
use crate::registers::RegisterFile;
use crate::tracer::Tracer;

/// Per-thread execution state.
///
/// Owns the packet memory and register file exclusively; a program is only
/// borrowed for the duration of one `execute` call. Create one context per
/// thread and [`reset`](ExecutionContext::reset) it between packets.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    memory: PacketMemory,
    registers: RegisterFile,
    layers: Vec<ProtocolInfo>,
    tracer: Tracer,
    pc: usize,
    terminated: bool,
    result: u32,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Creates a fresh context with empty packet memory.
    pub fn new() -> Self {
        Self {
            memory: PacketMemory::new(),
            registers: RegisterFile::new(),
            layers: vec![ProtocolInfo::default(); PROTOCOL_LAYER_COUNT],
            tracer: Tracer::new(),
            pc: 0,
            terminated: false,
            result: 0,
        }
    }

    /// Loads the next packet to evaluate.
    ///
    /// Also mirrors the frame length into the register file's frame
    /// length slot for the check extensions.
    pub fn load_packet(&mut self, bytes: &[u8]) -> Result<(), MemoryAccessError> {
        self.memory.load_packet(bytes)?;
        self.registers.set_frame_len(bytes.len() as u64);
        Ok(())
    }

    /// Packet memory.
    pub const fn memory(&self) -> &PacketMemory {
        &self.memory
    }

    /// Mutable packet memory.
    pub fn memory_mut(&mut self) -> &mut PacketMemory {
        &mut self.memory
    }

    /// Register file.
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Mutable register file.
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Protocol metadata for `layer`.
    pub fn layer(&self, layer: usize) -> Option<&ProtocolInfo> {
        self.layers.get(layer)
    }

    /// Mutable protocol metadata for `layer`.
    pub fn layer_mut(&mut self, layer: usize) -> Option<&mut ProtocolInfo> {
        self.layers.get_mut(layer)
    }

    /// Execution tracer; disabled by default.
    pub const fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Mutable execution tracer.
    pub fn tracer_mut(&mut self) -> &mut Tracer {
        &mut self.tracer
    }

    /// Program counter.
    pub const fn pc(&self) -> usize {
        self.pc
    }

    pub(crate) fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Whether the last execution ran to a return.
    pub const fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub(crate) fn set_terminated(&mut self, terminated: bool) {
        self.terminated = terminated;
    }

    /// Verdict of the last execution.
    pub const fn result(&self) -> u32 {
        self.result
    }

    pub(crate) fn set_result(&mut self, result: u32) {
        self.result = result;
    }

    /// Rewinds execution state for a fresh run over the loaded packet.
    ///
    /// Error bits are left alone; they are sticky until the caller resets
    /// the context.
    pub(crate) fn begin_execution(&mut self) {
        self.pc = 0;
        self.terminated = false;
        self.result = 0;
        self.tracer.clear();
    }

    /// Returns the context to the zero state.
    ///
    /// The packet buffer keeps its allocation so contexts can be reused
    /// across packets without reallocating.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.registers.reset();
        for layer in &mut self.layers {
            layer.clear();
        }
        self.tracer.clear();
        self.pc = 0;
        self.terminated = false;
        self.result = 0;
    }

    /// Splits the context into the views an extension handler receives.
    pub(crate) fn extension_views(
        &mut self,
    ) -> (&PacketMemory, &mut RegisterFile, &mut [ProtocolInfo]) {
        (&self.memory, &mut self.registers, &mut self.layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::ErrorFlags;

    #[test]
    fn reset_returns_to_the_zero_state() {
        let mut ctx = ExecutionContext::new();
        ctx.load_packet(&[1, 2, 3, 4]).unwrap();
        ctx.registers_mut().set_a(9);
        ctx.registers_mut().set_error(ErrorFlags::CRC);
        ctx.layer_mut(0).unwrap().record(0x0800, 14, 20);

        ctx.reset();
        assert_eq!(ctx.registers().a(), 0);
        assert!(ctx.registers().error().is_empty());
        assert!(!ctx.memory().is_initialized());
        assert!(!ctx.layer(0).unwrap().is_present());
    }

    #[test]
    fn loading_a_packet_sets_the_frame_length_slot() {
        let mut ctx = ExecutionContext::new();
        ctx.load_packet(&[0; 60]).unwrap();
        assert_eq!(ctx.registers().frame_len(), 60);
    }
}
